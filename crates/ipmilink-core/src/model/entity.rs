// ── Result bag ──
//
// Entity carries values between the caller's record and the worker
// without a fixed schema: field name → Int | Double | Str.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Field names ─────────────────────────────────────────────────────

/// Field names an operation may populate.
pub mod fields {
    pub const VAL: &str = "VAL";
    pub const HIHI: &str = "HIHI";
    pub const HIGH: &str = "HIGH";
    pub const LOW: &str = "LOW";
    pub const LOLO: &str = "LOLO";
    pub const HYST: &str = "HYST";
    pub const THRESHOLDS_READABLE: &str = "THRESHOLDS_READABLE";
    pub const SEVR: &str = "SEVR";
    pub const STAT: &str = "STAT";
    pub const COLOR: &str = "COLOR";
}

// ── Value ───────────────────────────────────────────────────────────

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Double(f64),
    Str(String),
}

impl Value {
    /// Integer view. Doubles truncate toward zero; strings have none.
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Double(d) if d.is_finite() => Some(d.trunc() as i64),
            Self::Double(_) | Self::Str(_) => None,
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Double(d) => Some(*d),
            Self::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

// ── Alarm codes ─────────────────────────────────────────────────────

/// Record alarm severity written to `SEVR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    NoAlarm,
    Minor,
    Major,
    Invalid,
}

impl Severity {
    pub fn code(self) -> i64 {
        match self {
            Self::NoAlarm => 0,
            Self::Minor => 1,
            Self::Major => 2,
            Self::Invalid => 3,
        }
    }
}

/// Record alarm status written to `STAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmStatus {
    NoAlarm,
    Read,
    Write,
    Comm,
}

impl AlarmStatus {
    pub fn code(self) -> i64 {
        match self {
            Self::NoAlarm => 0,
            Self::Read => 1,
            Self::Write => 2,
            Self::Comm => 9,
        }
    }
}

// ── Entity ──────────────────────────────────────────────────────────

/// Ordered field name → value mapping passed to and from a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity {
    fields: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn double(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Copy every field of `other` over this one.
    pub fn merge(&mut self, other: Entity) {
        self.fields.extend(other.fields);
    }

    pub fn set_status(&mut self, severity: Severity, status: AlarmStatus) {
        self.set(fields::SEVR, severity.code());
        self.set(fields::STAT, status.code());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_and_keeps_others() {
        let mut entity = Entity::new().with(fields::VAL, 1_i64).with("DESC", "fan");
        entity.merge(Entity::new().with(fields::VAL, 21.5).with(fields::HYST, 2.0));

        assert_eq!(entity.double(fields::VAL), Some(21.5));
        assert_eq!(entity.string("DESC"), Some("fan"));
        assert_eq!(entity.len(), 3);
    }

    #[test]
    fn failure_status_codes() {
        let mut entity = Entity::new();
        entity.set_status(Severity::Invalid, AlarmStatus::Comm);
        assert_eq!(entity.int(fields::SEVR), Some(3));
        assert_eq!(entity.int(fields::STAT), Some(9));
    }

    #[test]
    fn numeric_views() {
        let entity = Entity::new()
            .with(fields::VAL, 2.9)
            .with(fields::HIGH, 7_i64)
            .with(fields::COLOR, "red");
        assert_eq!(entity.int(fields::VAL), Some(2));
        assert_eq!(entity.double(fields::HIGH), Some(7.0));
        assert_eq!(entity.int(fields::COLOR), None);
        assert!(entity.has_field(fields::COLOR));
        assert!(!entity.has_field(fields::LOLO));
    }

    #[test]
    fn iterates_in_field_order() {
        let entity = Entity::new().with("b", 1_i64).with("a", 2_i64);
        let names: Vec<&str> = entity.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn serializes_as_plain_map() {
        let entity = Entity::new().with(fields::VAL, 42.0).with(fields::COLOR, "blue");
        let json = serde_json::to_string(&entity).unwrap();
        assert_eq!(json, r#"{"COLOR":"blue","VAL":42.0}"#);
    }
}
