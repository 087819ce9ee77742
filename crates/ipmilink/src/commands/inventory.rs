//! `ipmilink inventory`: decode an inventory cache file offline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use ipmilink_core::{FruEntry, InventoryCache, InventoryHeader, InventorySnapshot, SensorRecord};

use crate::cli::{GlobalOpts, InventoryArgs, InventorySection, OutputFormat};
use crate::error::CliError;
use crate::output;

// ── Report ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct InventoryReport {
    connection: String,
    host: String,
    created: DateTime<Utc>,
    header: HeaderView,
    skipped_records: usize,
    sensors: Vec<SensorView>,
    frus: Vec<FruView>,
    orphans: Vec<String>,
}

#[derive(Debug, Serialize)]
struct HeaderView {
    sdr_version: String,
    record_count: u16,
    free_space: u16,
    most_recent_addition: Option<DateTime<Utc>>,
    most_recent_erase: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct SensorView {
    key: String,
    record_id: u16,
    kind: String,
    owner_address: u8,
    owner_lun: u8,
    sensor_number: u8,
    sensor_type: u8,
    threshold: bool,
    fru: Option<u8>,
}

#[derive(Debug, Serialize)]
struct FruView {
    fru_slave_address: u8,
    name: String,
    entity: String,
    device_access_address: u8,
    cooling_domain: bool,
    sensors: Vec<String>,
}

/// SDR version byte, BCD with the minor digit in the high nibble (51h = 1.5).
fn sdr_version(version: u8) -> String {
    format!("{}.{}", version & 0x0F, version >> 4)
}

impl From<InventoryHeader> for HeaderView {
    fn from(h: InventoryHeader) -> Self {
        Self {
            sdr_version: sdr_version(h.version),
            record_count: h.record_count,
            free_space: h.free_space,
            most_recent_addition: h.addition_time(),
            most_recent_erase: h.erase_time(),
        }
    }
}

impl SensorView {
    fn new(sensor: &SensorRecord, snapshot: &InventorySnapshot) -> Self {
        let key = sensor.key();
        Self {
            fru: snapshot.owner_of(&key),
            key,
            record_id: sensor.record_id,
            kind: sensor.kind.to_string(),
            owner_address: sensor.target().slave_address,
            owner_lun: sensor.owner_lun,
            sensor_number: sensor.sensor_number,
            sensor_type: sensor.sensor_type,
            threshold: sensor.is_threshold(),
        }
    }
}

impl From<&FruEntry> for FruView {
    fn from(fru: &FruEntry) -> Self {
        let r = &fru.record;
        Self {
            fru_slave_address: r.fru_slave_address,
            name: r.id_string.clone(),
            entity: format!("{}:{}", r.entity_id, r.entity_instance),
            device_access_address: r.target().slave_address,
            cooling_domain: r.is_cooling_domain(),
            sensors: fru.sensors.iter().map(|s| s.key()).collect(),
        }
    }
}

impl InventoryReport {
    fn new(cache: &InventoryCache, snapshot: &InventorySnapshot) -> Self {
        Self {
            connection: cache.connection.clone(),
            host: cache.host.clone(),
            created: cache.created,
            header: snapshot.header().into(),
            skipped_records: snapshot.skipped(),
            sensors: snapshot
                .sensors()
                .iter()
                .map(|s| SensorView::new(s, snapshot))
                .collect(),
            frus: snapshot.frus().iter().map(FruView::from).collect(),
            orphans: snapshot.orphans().iter().map(|s| s.key()).collect(),
        }
    }
}

// ── Table rows ──────────────────────────────────────────────────────

fn hex(byte: u8) -> String {
    format!("{byte:#04x}")
}

fn or_dash(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(|| "-".into(), |t| t.to_rfc3339())
}

#[derive(Tabled)]
struct SensorRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Record")]
    record_id: u16,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Owner")]
    owner: String,
    #[tabled(rename = "Number")]
    number: u8,
    #[tabled(rename = "Type")]
    sensor_type: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
    #[tabled(rename = "FRU")]
    fru: String,
}

impl From<&SensorView> for SensorRow {
    fn from(s: &SensorView) -> Self {
        Self {
            key: s.key.clone(),
            record_id: s.record_id,
            kind: s.kind.clone(),
            owner: format!("{}/{}", hex(s.owner_address), s.owner_lun),
            number: s.sensor_number,
            sensor_type: hex(s.sensor_type),
            threshold: if s.threshold { "yes" } else { "no" }.into(),
            fru: s.fru.map(|f| f.to_string()).unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct FruRow {
    #[tabled(rename = "FRU")]
    fru: u8,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Controller")]
    controller: String,
    #[tabled(rename = "Sensors")]
    sensors: String,
}

impl From<&FruView> for FruRow {
    fn from(f: &FruView) -> Self {
        let mut entity = f.entity.clone();
        if f.cooling_domain {
            entity.push_str(" (cooling)");
        }
        Self {
            fru: f.fru_slave_address,
            name: f.name.clone(),
            entity,
            controller: hex(f.device_access_address),
            sensors: f.sensors.join("\n"),
        }
    }
}

#[derive(Tabled)]
struct OrphanRow {
    #[tabled(rename = "Unclaimed sensor")]
    key: String,
}

fn header_detail(report: &InventoryReport) -> String {
    let h = &report.header;
    output::detail(&[
        ("Connection", report.connection.clone()),
        ("Host", report.host.clone()),
        ("Created", report.created.to_rfc3339()),
        ("SDR version", h.sdr_version.clone()),
        ("Records", h.record_count.to_string()),
        ("Free space", h.free_space.to_string()),
        ("Last addition", or_dash(h.most_recent_addition)),
        ("Last erase", or_dash(h.most_recent_erase)),
        ("Skipped records", report.skipped_records.to_string()),
    ])
}

fn full_detail(report: &InventoryReport) -> String {
    let sensors: Vec<SensorRow> = report.sensors.iter().map(SensorRow::from).collect();
    let frus: Vec<FruRow> = report.frus.iter().map(FruRow::from).collect();
    let orphans: Vec<OrphanRow> = report
        .orphans
        .iter()
        .map(|key| OrphanRow { key: key.clone() })
        .collect();

    let mut sections = vec![
        header_detail(report),
        format!(
            "Sensors ({})\n{}",
            sensors.len(),
            output::render_table(&sensors)
        ),
        format!("FRUs ({})\n{}", frus.len(), output::render_table(&frus)),
    ];
    if !orphans.is_empty() {
        sections.push(format!(
            "Orphans ({})\n{}",
            orphans.len(),
            output::render_table(&orphans)
        ));
    }
    sections.join("\n\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: &InventoryArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cache = InventoryCache::load(&args.cache_file)?;
    let snapshot = InventorySnapshot::from_cache(&cache)?;
    let report = InventoryReport::new(&cache, &snapshot);
    tracing::debug!(
        connection = %report.connection,
        sensors = report.sensors.len(),
        frus = report.frus.len(),
        "inventory decoded"
    );

    let out = render(&report, args.section, &global.output)?;
    output::print_output(&out, global.quiet)
}

fn render(
    report: &InventoryReport,
    section: InventorySection,
    format: &OutputFormat,
) -> Result<String, CliError> {
    match section {
        InventorySection::All => output::render_single(format, report, full_detail, |r| {
            r.sensors
                .iter()
                .map(|s| s.key.clone())
                .collect::<Vec<_>>()
                .join("\n")
        }),
        InventorySection::Header => output::render_single(
            format,
            &report.header,
            |_| header_detail(report),
            |h| h.record_count.to_string(),
        ),
        InventorySection::Sensors => output::render_list(
            format,
            &report.sensors,
            |s| SensorRow::from(s),
            |s| s.key.clone(),
        ),
        InventorySection::Frus => output::render_list(
            format,
            &report.frus,
            |f| FruRow::from(f),
            |f| f.fru_slave_address.to_string(),
        ),
        InventorySection::Orphans => output::render_list(
            format,
            &report.orphans,
            |key| OrphanRow { key: key.clone() },
            String::clone,
        ),
    }
}
