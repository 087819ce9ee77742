// ── Inventory catalog ──
//
// Typed view of one controller's SDR repository: sensors by key, FRU
// locators by slave address, sensor→FRU association and the status
// LEDs found on each FRU. A load builds a complete new snapshot off to
// the side and publishes it with one atomic swap, so lookups from other
// tasks never see a half-built catalog and never wait on device I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use strum::Display;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::InventoryCache;
use crate::error::CoreError;
use crate::sdr::{self, FruLocatorRecord, InventoryHeader, LedRecord, SdrRecord, SensorRecord};
use crate::session::ControllerSession;

/// FRUs that are not physical hardware. Asking them for LEDs fails or,
/// for the telco alarm, times out.
const LED_EXCLUSION_LIST: &[&str] = &[
    "SHELF FRU INFO",
    "UTCA CARRIER",
    "SH FRU DEV1",
    "SH FRU DEV2",
    "MCH DA INFO",
    "BMC FRU",
    "TELCO ALARM",
];

/// Outcome of one [`InventoryCatalog::process`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Staleness {
    /// Nothing changed.
    Fresh,
    /// The session's cache file no longer matched the catalog; reloaded.
    CacheChanged,
    /// The live controller reported a different repository; the cache
    /// was rebuilt and the catalog reloaded.
    RemoteChanged,
}

// ── FRU entry ───────────────────────────────────────────────────────

/// A FRU locator with the sensors it claimed and its status LEDs.
#[derive(Debug, Clone)]
pub struct FruEntry {
    pub record: FruLocatorRecord,
    pub sensors: Vec<Arc<SensorRecord>>,
    pub leds: Vec<LedRecord>,
}

impl FruEntry {
    pub fn led(&self, led_id: u8) -> Option<&LedRecord> {
        self.leds.iter().find(|led| led.led_id == led_id)
    }

    fn leds_excluded(&self) -> bool {
        LED_EXCLUSION_LIST.contains(&self.record.id_string.as_str())
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// One complete, immutable catalog generation.
#[derive(Debug, Clone)]
pub struct InventorySnapshot {
    header: InventoryHeader,
    loaded_at: DateTime<Utc>,
    /// Every sensor in repository order.
    sensors: Vec<Arc<SensorRecord>>,
    by_key: HashMap<String, Arc<SensorRecord>>,
    /// FRU locators in repository order.
    frus: Vec<FruEntry>,
    fru_index: HashMap<u8, usize>,
    orphans: Vec<Arc<SensorRecord>>,
    /// Sensor key → slave address of the owning FRU.
    owners: HashMap<String, u8>,
    skipped: usize,
}

impl InventorySnapshot {
    /// Decode and index raw records. LEDs are not discovered here.
    ///
    /// Fails on the first record that does not decode and on a sensor
    /// key that appears twice.
    pub fn build(header: InventoryHeader, records: &[Bytes]) -> Result<Self, CoreError> {
        let mut sensors: Vec<Arc<SensorRecord>> = Vec::new();
        let mut by_key = HashMap::new();
        let mut frus = Vec::new();
        let mut skipped = 0;

        for raw in records {
            match sdr::decode(raw)? {
                SdrRecord::Sensor(sensor) => {
                    let key = sensor.key();
                    if by_key.contains_key(&key) {
                        return Err(CoreError::protocol(format!(
                            "duplicate sensor key '{key}' (record {})",
                            sensor.record_id
                        )));
                    }
                    let sensor = Arc::new(sensor);
                    by_key.insert(key, Arc::clone(&sensor));
                    sensors.push(sensor);
                }
                SdrRecord::FruLocator(record) => frus.push(FruEntry {
                    record,
                    sensors: Vec::new(),
                    leds: Vec::new(),
                }),
                SdrRecord::Skipped {
                    record_id,
                    record_type,
                } => {
                    debug!(
                        record_id,
                        record_type = sdr::record::record_type_name(record_type),
                        "skipping SDR record"
                    );
                    skipped += 1;
                }
            }
        }

        let (orphans, owners) = associate(&sensors, &mut frus);
        let mut fru_index = HashMap::new();
        for (i, fru) in frus.iter().enumerate() {
            fru_index.entry(fru.record.fru_slave_address).or_insert(i);
        }

        Ok(Self {
            header,
            loaded_at: Utc::now(),
            sensors,
            by_key,
            frus,
            fru_index,
            orphans,
            owners,
            skipped,
        })
    }

    pub fn from_cache(cache: &InventoryCache) -> Result<Self, CoreError> {
        Self::build(cache.header, &cache.records)
    }

    pub fn header(&self) -> InventoryHeader {
        self.header
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn sensors(&self) -> &[Arc<SensorRecord>] {
        &self.sensors
    }

    pub fn sensor(&self, key: &str) -> Option<&Arc<SensorRecord>> {
        self.by_key.get(key)
    }

    pub fn frus(&self) -> &[FruEntry] {
        &self.frus
    }

    /// First FRU locator with this slave address.
    pub fn fru(&self, fru_slave_address: u8) -> Option<&FruEntry> {
        self.fru_index
            .get(&fru_slave_address)
            .and_then(|&i| self.frus.get(i))
    }

    pub fn led(&self, fru_slave_address: u8, led_id: u8) -> Option<&LedRecord> {
        self.fru(fru_slave_address)?.led(led_id)
    }

    /// Sensors no FRU claimed.
    pub fn orphans(&self) -> &[Arc<SensorRecord>] {
        &self.orphans
    }

    /// Slave address of the FRU that owns the sensor with `key`.
    pub fn owner_of(&self, key: &str) -> Option<u8> {
        self.owners.get(key).copied()
    }

    /// Records of types the catalog does not use.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Ask every FRU for its status LEDs. Failures are logged and leave
    /// that FRU without LEDs.
    pub async fn discover_leds(&mut self, session: &mut ControllerSession) {
        for fru in &mut self.frus {
            if fru.leds_excluded() {
                debug!(fru = %fru.record.id_string, "LED discovery skipped");
                continue;
            }
            if !session.is_connected() {
                break;
            }
            match session.discover_leds(&fru.record).await {
                Ok(leds) => {
                    debug!(fru = %fru.record.id_string, count = leds.len(), "LEDs discovered");
                    fru.leds = leds;
                }
                Err(e) => {
                    warn!(fru = %fru.record.id_string, error = %e, "LED discovery failed");
                }
            }
        }
    }
}

/// Let each FRU, in repository order, claim matching sensors from the
/// set nobody has claimed yet. Returns the leftovers and the reverse map.
fn associate(
    sensors: &[Arc<SensorRecord>],
    frus: &mut [FruEntry],
) -> (Vec<Arc<SensorRecord>>, HashMap<String, u8>) {
    let mut orphans = sensors.to_vec();
    let mut owners = HashMap::new();

    for fru in frus.iter_mut() {
        let (claimed, rest): (Vec<_>, Vec<_>) = orphans
            .into_iter()
            .partition(|sensor| fru.record.claims(sensor));
        for sensor in &claimed {
            owners.insert(sensor.key(), fru.record.fru_slave_address);
        }
        fru.sensors = claimed;
        orphans = rest;
    }
    (orphans, owners)
}

// ── Catalog ─────────────────────────────────────────────────────────

/// The catalog of one connection.
#[derive(Debug)]
pub struct InventoryCatalog {
    connection: String,
    live_check_interval: Duration,
    snapshot: ArcSwapOption<InventorySnapshot>,
    /// Header of the most recent load attempt, successful or not. Both
    /// staleness checks compare against it, so a repository that fails
    /// to load is not retried until it changes again.
    attempted: Mutex<Option<InventoryHeader>>,
    last_live_check: Mutex<Option<Instant>>,
}

impl InventoryCatalog {
    pub fn new(connection: impl Into<String>, live_check_interval: Duration) -> Self {
        Self {
            connection: connection.into(),
            live_check_interval,
            snapshot: ArcSwapOption::empty(),
            attempted: Mutex::new(None),
            last_live_check: Mutex::new(None),
        }
    }

    /// The current generation, if one has been loaded.
    pub fn snapshot(&self) -> Option<Arc<InventorySnapshot>> {
        self.snapshot.load_full()
    }

    pub fn is_initialized(&self) -> bool {
        self.snapshot.load().is_some()
    }

    pub fn header(&self) -> Option<InventoryHeader> {
        self.snapshot().map(|s| s.header)
    }

    pub fn find_sensor(&self, key: &str) -> Option<Arc<SensorRecord>> {
        self.snapshot()?.sensor(key).cloned()
    }

    pub fn find_fru(&self, fru_slave_address: u8) -> Option<FruEntry> {
        self.snapshot()?.fru(fru_slave_address).cloned()
    }

    pub fn find_led(&self, fru_slave_address: u8, led_id: u8) -> Option<LedRecord> {
        self.snapshot()?.led(fru_slave_address, led_id).copied()
    }

    /// Rebuild from the session's open cache, discover LEDs, and publish.
    pub async fn load(&self, session: &mut ControllerSession) -> Result<(), CoreError> {
        let cache = session.cache().ok_or_else(|| CoreError::Disconnected {
            context: session.context(),
        })?;
        *self.attempted.lock().unwrap_or_else(PoisonError::into_inner) = Some(cache.header);
        let mut snapshot = InventorySnapshot::from_cache(&cache).map_err(|e| {
            warn!(connection = %self.connection, error = %e, "inventory catalog load failed");
            e.with_context(&session.context())
        })?;
        snapshot.discover_leds(session).await;

        info!(
            connection = %self.connection,
            sensors = snapshot.sensors.len(),
            frus = snapshot.frus.len(),
            orphans = snapshot.orphans.len(),
            skipped = snapshot.skipped,
            "inventory catalog loaded"
        );
        self.snapshot.store(Some(Arc::new(snapshot)));
        self.mark_live_check();
        Ok(())
    }

    /// Periodic staleness check.
    ///
    /// First against the session's cache header (every call), then
    /// against the live controller once per live-check interval.
    pub async fn process(&self, session: &mut ControllerSession) -> Result<Staleness, CoreError> {
        if let Some(cached) = session.cache_header() {
            let changed = self
                .tracked_header()
                .is_none_or(|loaded| loaded.differs_from(&cached));
            if changed {
                info!(connection = %self.connection, "inventory cache changed, reloading catalog");
                self.load(session).await?;
                return Ok(Staleness::CacheChanged);
            }
        }

        if !session.is_connected() || !self.live_check_due() {
            return Ok(Staleness::Fresh);
        }
        self.mark_live_check();

        let live = session.live_header().await?;
        let Some(loaded) = self.tracked_header() else {
            return Ok(Staleness::Fresh);
        };
        if !loaded.differs_from(&live) {
            return Ok(Staleness::Fresh);
        }

        info!(
            connection = %self.connection,
            changes = %loaded.changes(&live).join(", "),
            "controller inventory changed, rebuilding cache"
        );
        session.rebuild_cache().await?;
        self.load(session).await?;
        Ok(Staleness::RemoteChanged)
    }

    fn tracked_header(&self) -> Option<InventoryHeader> {
        let attempted = *self.attempted.lock().unwrap_or_else(PoisonError::into_inner);
        attempted.or_else(|| self.header())
    }

    fn live_check_due(&self) -> bool {
        self.last_live_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none_or(|at| at.elapsed() >= self.live_check_interval)
    }

    fn mark_live_check(&self) {
        *self
            .last_live_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }
}
