// ── SDR record decoding ──
//
// Turns raw repository records into typed sensor and FRU locator
// records. Offsets follow the IPMI v2.0 SDR layouts; record types the
// catalog does not use are reported as skipped.

use bytes::Bytes;
use ipmilink_api::IpmbTarget;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use super::scaling::{AnalogFormat, DecodingParams, Linearization};
use crate::address::sensor_key;
use crate::error::{CoreError, SensorLabel};

// ── Record types ────────────────────────────────────────────────────

pub const RECORD_TYPE_FULL_SENSOR: u8 = 0x01;
pub const RECORD_TYPE_COMPACT_SENSOR: u8 = 0x02;
pub const RECORD_TYPE_EVENT_ONLY: u8 = 0x03;
pub const RECORD_TYPE_ENTITY_ASSOCIATION: u8 = 0x08;
pub const RECORD_TYPE_DEVICE_RELATIVE_ASSOCIATION: u8 = 0x09;
pub const RECORD_TYPE_FRU_DEVICE_LOCATOR: u8 = 0x11;
pub const RECORD_TYPE_MC_DEVICE_LOCATOR: u8 = 0x12;

/// Event/reading type code of threshold-based sensors.
pub const EVENT_READING_TYPE_THRESHOLD: u8 = 0x01;
/// Entity id of a cooling domain.
pub const ENTITY_ID_COOLING_DOMAIN: u8 = 0x1E;
/// Sensor type of a fan.
pub const SENSOR_TYPE_FAN: u8 = 0x04;

const HEADER_LEN: usize = 5;

/// Name of a record type for logs and reports.
pub fn record_type_name(record_type: u8) -> &'static str {
    match record_type {
        RECORD_TYPE_FULL_SENSOR => "full sensor",
        RECORD_TYPE_COMPACT_SENSOR => "compact sensor",
        RECORD_TYPE_EVENT_ONLY => "event-only sensor",
        RECORD_TYPE_ENTITY_ASSOCIATION => "entity association",
        RECORD_TYPE_DEVICE_RELATIVE_ASSOCIATION => "device-relative entity association",
        RECORD_TYPE_FRU_DEVICE_LOCATOR => "FRU device locator",
        RECORD_TYPE_MC_DEVICE_LOCATOR => "management controller locator",
        _ => "unknown",
    }
}

// ── Decoded records ─────────────────────────────────────────────────

/// One decoded repository record.
#[derive(Debug, Clone, PartialEq)]
pub enum SdrRecord {
    Sensor(SensorRecord),
    FruLocator(FruLocatorRecord),
    Skipped { record_id: u16, record_type: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SensorRecordKind {
    Full,
    Compact,
}

/// A full or compact sensor record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRecord {
    pub record_id: u16,
    pub kind: SensorRecordKind,
    pub owner_id_type: u8,
    pub owner_id: u8,
    pub owner_lun: u8,
    pub channel: u8,
    pub sensor_number: u8,
    pub entity_id: u8,
    pub entity_instance: u8,
    pub sensor_type: u8,
    pub event_reading_type: u8,
    pub analog_format: AnalogFormat,
    pub base_unit: u8,
    /// Only full sensor records carry decoding parameters.
    pub decoding: Option<DecodingParams>,
    pub id_string: String,
    #[serde(skip)]
    pub raw: Bytes,
}

impl SensorRecord {
    /// Catalog lookup key: `entity_id:entity_instance:id_string`.
    pub fn key(&self) -> String {
        sensor_key(self.entity_id, self.entity_instance, &self.id_string)
    }

    pub fn is_threshold(&self) -> bool {
        self.event_reading_type == EVENT_READING_TYPE_THRESHOLD
    }

    pub fn is_fan(&self) -> bool {
        self.sensor_type == SENSOR_TYPE_FAN
    }

    /// Where sensor commands for this record are sent.
    pub fn target(&self) -> IpmbTarget {
        IpmbTarget::new(self.channel, self.owner_id << 1, self.owner_lun)
    }

    /// Decoding parameters, or a protocol error for compact records.
    pub fn decoding(&self) -> Result<&DecodingParams, CoreError> {
        self.decoding.as_ref().ok_or_else(|| {
            CoreError::protocol(format!(
                "{} sensor record {} carries no decoding parameters",
                self.kind, self.record_id
            ))
        })
    }

    pub fn label(&self) -> SensorLabel {
        SensorLabel {
            entity_id: self.entity_id,
            entity_instance: self.entity_instance,
            id_string: self.id_string.clone(),
        }
    }
}

/// A FRU device locator record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FruLocatorRecord {
    pub record_id: u16,
    /// 7-bit address of the controller that provides access to the FRU.
    pub device_access_address: u8,
    /// FRU device id (logical FRUs) or slave address (physical FRUs).
    pub fru_slave_address: u8,
    pub logical: bool,
    pub access_lun: u8,
    pub private_bus_id: u8,
    pub channel: u8,
    pub device_type: u8,
    pub entity_id: u8,
    pub entity_instance: u8,
    pub id_string: String,
}

impl FruLocatorRecord {
    /// Where PICMG LED commands for this FRU are sent.
    pub fn target(&self) -> IpmbTarget {
        IpmbTarget::new(self.channel, self.device_access_address << 1, IpmbTarget::LUN_BMC)
    }

    pub fn is_cooling_domain(&self) -> bool {
        self.entity_id == ENTITY_ID_COOLING_DOMAIN
    }

    /// Whether this FRU owns `sensor`: same entity, or a fan in the
    /// cooling domain of the same instance.
    pub fn claims(&self, sensor: &SensorRecord) -> bool {
        let same_entity =
            self.entity_id == sensor.entity_id && self.entity_instance == sensor.entity_instance;
        let cooled_fan = self.is_cooling_domain()
            && sensor.is_fan()
            && self.entity_instance == sensor.entity_instance;
        same_entity || cooled_fan
    }
}

// ── LEDs ────────────────────────────────────────────────────────────

/// PICMG LED colors, in capability bit order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum LedColor {
    Off,
    Blue,
    Red,
    Green,
    Amber,
    Orange,
    White,
}

impl LedColor {
    const ALL: [Self; 7] = [
        Self::Off,
        Self::Blue,
        Self::Red,
        Self::Green,
        Self::Amber,
        Self::Orange,
        Self::White,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Highest color whose bit is set in a capability mask; `Off` if none.
    pub fn highest_supported(mask: u8) -> Self {
        Self::ALL
            .iter()
            .enumerate()
            .rev()
            .find(|(bit, _)| mask & (1 << bit) != 0)
            .map_or(Self::Off, |(_, color)| *color)
    }
}

/// A status LED discovered on a FRU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedRecord {
    pub device_access_address: u8,
    pub channel: u8,
    pub fru_slave_address: u8,
    pub led_id: u8,
    pub color: LedColor,
}

impl LedRecord {
    pub fn target(&self) -> IpmbTarget {
        IpmbTarget::new(self.channel, self.device_access_address << 1, IpmbTarget::LUN_BMC)
    }
}

// ── Decoding ────────────────────────────────────────────────────────

/// Decode one raw record.
pub fn decode(data: &Bytes) -> Result<SdrRecord, CoreError> {
    let reader = Reader::new(data)?;
    match reader.record_type {
        RECORD_TYPE_FULL_SENSOR => {
            decode_sensor(&reader, data, SensorRecordKind::Full).map(SdrRecord::Sensor)
        }
        RECORD_TYPE_COMPACT_SENSOR => {
            decode_sensor(&reader, data, SensorRecordKind::Compact).map(SdrRecord::Sensor)
        }
        RECORD_TYPE_FRU_DEVICE_LOCATOR => decode_fru_locator(&reader).map(SdrRecord::FruLocator),
        record_type => Ok(SdrRecord::Skipped {
            record_id: reader.record_id,
            record_type,
        }),
    }
}

/// Bounds-checked view over one record.
struct Reader<'a> {
    data: &'a [u8],
    record_id: u16,
    record_type: u8,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Result<Self, CoreError> {
        let Some(header) = data.get(..HEADER_LEN) else {
            return Err(CoreError::protocol(format!(
                "SDR record too short for its header ({} bytes)",
                data.len()
            )));
        };
        Ok(Self {
            data,
            record_id: u16::from_le_bytes([header[0], header[1]]),
            record_type: header[3],
        })
    }

    fn byte(&self, offset: usize) -> Result<u8, CoreError> {
        self.data.get(offset).copied().ok_or_else(|| self.truncated(offset + 1))
    }

    fn truncated(&self, needed: usize) -> CoreError {
        CoreError::protocol(format!(
            "{} record {} truncated: need {needed} bytes, have {}",
            record_type_name(self.record_type),
            self.record_id,
            self.data.len()
        ))
    }

    /// Id string from its type/length byte at `offset`.
    fn id_string(&self, offset: usize) -> Result<String, CoreError> {
        let len = usize::from(self.byte(offset)? & 0x1F);
        let start = offset + 1;
        let bytes = self
            .data
            .get(start..start + len)
            .ok_or_else(|| self.truncated(start + len))?;
        let text: String = bytes.iter().map(|&b| char::from(b)).collect();
        Ok(text.trim_end_matches('\0').to_owned())
    }
}

struct SensorOffsets {
    units1: usize,
    id_string: usize,
}

const FULL_OFFSETS: SensorOffsets = SensorOffsets {
    units1: 20,
    id_string: 47,
};

const COMPACT_OFFSETS: SensorOffsets = SensorOffsets {
    units1: 20,
    id_string: 31,
};

fn decode_sensor(
    r: &Reader<'_>,
    raw: &Bytes,
    kind: SensorRecordKind,
) -> Result<SensorRecord, CoreError> {
    let offsets = match kind {
        SensorRecordKind::Full => FULL_OFFSETS,
        SensorRecordKind::Compact => COMPACT_OFFSETS,
    };

    let owner = r.byte(5)?;
    let lun_channel = r.byte(6)?;
    let analog_format = AnalogFormat::from_bits(r.byte(offsets.units1)? >> 6);

    let decoding = match kind {
        SensorRecordKind::Full => Some(decode_params(r, analog_format)?),
        SensorRecordKind::Compact => None,
    };

    Ok(SensorRecord {
        record_id: r.record_id,
        kind,
        owner_id_type: owner & 0x01,
        owner_id: owner >> 1,
        owner_lun: lun_channel & 0x03,
        channel: lun_channel >> 4,
        sensor_number: r.byte(7)?,
        entity_id: r.byte(8)?,
        entity_instance: r.byte(9)? & 0x7F,
        sensor_type: r.byte(12)?,
        event_reading_type: r.byte(13)?,
        analog_format,
        base_unit: r.byte(21)?,
        decoding,
        id_string: r.id_string(offsets.id_string)?,
        raw: raw.clone(),
    })
}

fn decode_params(r: &Reader<'_>, analog_format: AnalogFormat) -> Result<DecodingParams, CoreError> {
    let exponents = r.byte(29)?;
    Ok(DecodingParams {
        analog_format,
        linearization: Linearization::from_code(r.byte(23)?),
        m: ten_bit(r.byte(24)?, r.byte(25)?),
        b: ten_bit(r.byte(26)?, r.byte(27)?),
        r_exponent: four_bit(exponents >> 4),
        b_exponent: four_bit(exponents & 0x0F),
    })
}

fn decode_fru_locator(r: &Reader<'_>) -> Result<FruLocatorRecord, CoreError> {
    let access = r.byte(7)?;
    Ok(FruLocatorRecord {
        record_id: r.record_id,
        device_access_address: r.byte(5)? >> 1,
        fru_slave_address: r.byte(6)?,
        logical: access & 0x80 != 0,
        access_lun: (access >> 3) & 0x03,
        private_bus_id: access & 0x07,
        channel: r.byte(8)? >> 4,
        device_type: r.byte(10)?,
        entity_id: r.byte(12)?,
        entity_instance: r.byte(13)?,
        id_string: r.id_string(15)?,
    })
}

/// 10-bit two's complement from a low byte and the top two bits of `high`.
fn ten_bit(low: u8, high: u8) -> i16 {
    let value = u16::from(low) | (u16::from(high & 0xC0) << 2);
    i16::from_ne_bytes((value << 6).to_ne_bytes()) >> 6
}

/// 4-bit two's complement from the low nibble.
fn four_bit(nibble: u8) -> i8 {
    i8::from_ne_bytes([nibble << 4]) >> 4
}
