// ── Repository header ──
//
// Snapshot of "Get SDR Repository Info" kept alongside a loaded catalog
// and compared against fresh queries to detect a changed inventory.

use chrono::{DateTime, Utc};
use ipmilink_api::SdrRepositoryInfo;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InventoryHeader {
    pub version: u8,
    pub record_count: u16,
    pub free_space: u16,
    pub most_recent_addition: u32,
    pub most_recent_erase: u32,
}

impl InventoryHeader {
    /// Whether `other` describes a different repository content. Free
    /// space alone is not a content change.
    pub fn differs_from(&self, other: &Self) -> bool {
        !self.changes(other).is_empty()
    }

    /// Human-readable list of the fields that differ, for logging.
    pub fn changes(&self, other: &Self) -> Vec<String> {
        let mut out = Vec::new();
        if self.version != other.version {
            out.push(format!(
                "version {:#04x} -> {:#04x}",
                self.version, other.version
            ));
        }
        if self.record_count != other.record_count {
            out.push(format!(
                "record count {} -> {}",
                self.record_count, other.record_count
            ));
        }
        if self.most_recent_addition != other.most_recent_addition {
            out.push(format!(
                "last addition {} -> {}",
                format_timestamp(self.most_recent_addition),
                format_timestamp(other.most_recent_addition)
            ));
        }
        if self.most_recent_erase != other.most_recent_erase {
            out.push(format!(
                "last erase {} -> {}",
                format_timestamp(self.most_recent_erase),
                format_timestamp(other.most_recent_erase)
            ));
        }
        out
    }

    pub fn addition_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.most_recent_addition), 0)
    }

    pub fn erase_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.most_recent_erase), 0)
    }
}

impl From<SdrRepositoryInfo> for InventoryHeader {
    fn from(info: SdrRepositoryInfo) -> Self {
        Self {
            version: info.sdr_version,
            record_count: info.record_count,
            free_space: info.free_space,
            most_recent_addition: info.most_recent_addition,
            most_recent_erase: info.most_recent_erase,
        }
    }
}

fn format_timestamp(secs: u32) -> String {
    DateTime::from_timestamp(i64::from(secs), 0)
        .map_or_else(|| secs.to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> InventoryHeader {
        InventoryHeader {
            version: 0x51,
            record_count: 12,
            free_space: 4096,
            most_recent_addition: 1_700_000_000,
            most_recent_erase: 1_600_000_000,
        }
    }

    #[test]
    fn identical_headers_do_not_differ() {
        assert!(!header().differs_from(&header()));
    }

    #[test]
    fn any_single_field_change_is_detected() {
        let base = header();
        let variants = [
            InventoryHeader {
                version: 0x02,
                ..base
            },
            InventoryHeader {
                record_count: 13,
                ..base
            },
            InventoryHeader {
                most_recent_addition: base.most_recent_addition + 1,
                ..base
            },
            InventoryHeader {
                most_recent_erase: base.most_recent_erase + 1,
                ..base
            },
        ];
        for changed in variants {
            assert!(base.differs_from(&changed), "{changed:?}");
            assert_eq!(base.changes(&changed).len(), 1);
        }
    }

    #[test]
    fn free_space_is_not_a_content_change() {
        let base = header();
        let other = InventoryHeader {
            free_space: 100,
            ..base
        };
        assert!(!base.differs_from(&other));
    }

    #[test]
    fn converts_from_repository_info() {
        let info = SdrRepositoryInfo {
            completion_code: 0,
            sdr_version: 0x51,
            record_count: 3,
            free_space: 10,
            most_recent_addition: 5,
            most_recent_erase: 6,
        };
        let h = InventoryHeader::from(info);
        assert_eq!(h.record_count, 3);
        assert_eq!(h.erase_time().map(|t| t.timestamp()), Some(6));
    }
}
