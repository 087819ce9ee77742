// ── Domain model ──
//
// Types exchanged between callers and connection workers.

pub mod entity;

pub use entity::{AlarmStatus, Entity, Severity, Value, fields};
