// ── Sensor Data Repository ──
//
// Record decoding, the repository header snapshot and value scaling.

pub mod header;
pub mod record;
pub mod scaling;

pub use header::InventoryHeader;
pub use record::{
    FruLocatorRecord, LedColor, LedRecord, SdrRecord, SensorRecord, SensorRecordKind, decode,
};
pub use scaling::{AnalogFormat, DecodingParams, Linearization, round2};
