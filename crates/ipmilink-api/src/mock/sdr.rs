// ── Raw SDR record builders ──
//
// Encode the record layouts a mock repository serves: full and compact
// sensors and FRU device locators. Fields not listed here are zero.

use bytes::Bytes;

/// A full sensor record (type 0x01).
#[derive(Debug, Clone)]
pub struct FullSensor {
    pub record_id: u16,
    /// 7-bit owner id; the mock serves readings at `owner_id << 1`.
    pub owner_id: u8,
    pub owner_lun: u8,
    pub channel: u8,
    pub sensor_number: u8,
    pub entity_id: u8,
    pub entity_instance: u8,
    pub sensor_type: u8,
    pub event_reading_type: u8,
    /// Analog data format, 0..=3.
    pub analog_format: u8,
    pub linearization: u8,
    pub m: i16,
    pub b: i16,
    pub r_exponent: i8,
    pub b_exponent: i8,
    pub id: String,
}

impl FullSensor {
    /// A threshold temperature sensor owned by the BMC with identity scaling.
    pub fn new(record_id: u16, entity_id: u8, entity_instance: u8, id: &str) -> Self {
        Self {
            record_id,
            owner_id: 0x10,
            owner_lun: 0,
            channel: 0,
            sensor_number: record_id.to_le_bytes()[0],
            entity_id,
            entity_instance,
            sensor_type: 0x01,
            event_reading_type: 0x01,
            analog_format: 0,
            linearization: 0,
            m: 1,
            b: 0,
            r_exponent: 0,
            b_exponent: 0,
            id: id.to_owned(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut rec = vec![0u8; 48];
        header(&mut rec, self.record_id, 0x01);
        rec[5] = self.owner_id << 1;
        rec[6] = (self.channel << 4) | (self.owner_lun & 0x03);
        rec[7] = self.sensor_number;
        rec[8] = self.entity_id;
        rec[9] = self.entity_instance & 0x7F;
        rec[12] = self.sensor_type;
        rec[13] = self.event_reading_type;
        rec[20] = (self.analog_format & 0x03) << 6;
        rec[23] = self.linearization & 0x7F;
        let (m_low, m_high) = ten_bit(self.m);
        rec[24] = m_low;
        rec[25] = m_high;
        let (b_low, b_high) = ten_bit(self.b);
        rec[26] = b_low;
        rec[27] = b_high;
        rec[29] = (nibble(self.r_exponent) << 4) | nibble(self.b_exponent);
        id_string(rec, 47, &self.id)
    }
}

/// A compact sensor record (type 0x02).
#[derive(Debug, Clone)]
pub struct CompactSensor {
    pub record_id: u16,
    pub owner_id: u8,
    pub sensor_number: u8,
    pub entity_id: u8,
    pub entity_instance: u8,
    pub sensor_type: u8,
    pub event_reading_type: u8,
    pub id: String,
}

impl CompactSensor {
    /// A discrete sensor owned by the BMC.
    pub fn new(record_id: u16, entity_id: u8, entity_instance: u8, id: &str) -> Self {
        Self {
            record_id,
            owner_id: 0x10,
            sensor_number: record_id.to_le_bytes()[0],
            entity_id,
            entity_instance,
            sensor_type: 0x08,
            event_reading_type: 0x6F,
            id: id.to_owned(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut rec = vec![0u8; 32];
        header(&mut rec, self.record_id, 0x02);
        rec[5] = self.owner_id << 1;
        rec[7] = self.sensor_number;
        rec[8] = self.entity_id;
        rec[9] = self.entity_instance & 0x7F;
        rec[12] = self.sensor_type;
        rec[13] = self.event_reading_type;
        id_string(rec, 31, &self.id)
    }
}

/// A FRU device locator record (type 0x11).
#[derive(Debug, Clone)]
pub struct FruLocator {
    pub record_id: u16,
    /// 7-bit device access address.
    pub device_access_address: u8,
    pub fru_device_id: u8,
    pub logical: bool,
    pub channel: u8,
    pub entity_id: u8,
    pub entity_instance: u8,
    pub id: String,
}

impl FruLocator {
    /// A logical FRU behind the MCH at 0x41 on the primary channel.
    pub fn new(record_id: u16, fru_device_id: u8, entity_id: u8, entity_instance: u8, id: &str) -> Self {
        Self {
            record_id,
            device_access_address: 0x41,
            fru_device_id,
            logical: true,
            channel: 0,
            entity_id,
            entity_instance,
            id: id.to_owned(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut rec = vec![0u8; 16];
        header(&mut rec, self.record_id, 0x11);
        rec[5] = self.device_access_address << 1;
        rec[6] = self.fru_device_id;
        rec[7] = if self.logical { 0x80 } else { 0x00 };
        rec[8] = self.channel << 4;
        rec[10] = 0x10;
        rec[12] = self.entity_id;
        rec[13] = self.entity_instance;
        id_string(rec, 15, &self.id)
    }
}

/// A record of a type the engine skips, e.g. 0x12 (MC locator).
pub fn other(record_id: u16, record_type: u8) -> Bytes {
    let mut rec = vec![0u8; 16];
    header(&mut rec, record_id, record_type);
    rec[4] = 11;
    Bytes::from(rec)
}

fn header(rec: &mut [u8], record_id: u16, record_type: u8) {
    let [lo, hi] = record_id.to_le_bytes();
    rec[0] = lo;
    rec[1] = hi;
    rec[2] = 0x51;
    rec[3] = record_type;
}

/// Append an 8-bit ASCII id string at `offset` and fix up the length byte.
fn id_string(mut rec: Vec<u8>, offset: usize, id: &str) -> Bytes {
    let len = id.len().min(0x1F);
    rec.truncate(offset);
    rec.push(0xC0 | u8::try_from(len).unwrap_or(0x1F));
    rec.extend_from_slice(&id.as_bytes()[..len]);
    rec[4] = u8::try_from(rec.len() - 5).unwrap_or(u8::MAX);
    Bytes::from(rec)
}

fn ten_bit(value: i16) -> (u8, u8) {
    let [low, high] = value.to_le_bytes();
    (low, (high & 0x03) << 6)
}

fn nibble(value: i8) -> u8 {
    value.to_le_bytes()[0] & 0x0F
}
