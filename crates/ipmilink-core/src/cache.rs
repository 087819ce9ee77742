// ── Inventory cache artifact ──
//
// One JSON file per connection holding the repository header and every
// raw SDR record in repository order. The file is written whole and
// replaced whole; it is never patched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use ipmilink_api::IpmiTransport;
use ipmilink_api::types::{COMPLETION_OK, SDR_FIRST_RECORD, SDR_LAST_RECORD};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::sdr::InventoryHeader;

/// Format tag written into every cache file.
pub const CACHE_FORMAT: &str = "ipmilink-sdr-cache/1";

/// Extra records a repository walk may return beyond the advertised
/// count before it is treated as looping.
const WALK_SLACK: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryCache {
    pub format: String,
    pub connection: String,
    pub host: String,
    pub created: DateTime<Utc>,
    pub header: InventoryHeader,
    pub records: Vec<Bytes>,
}

/// What was found at a cache path.
#[derive(Debug)]
pub enum CacheStatus {
    Missing,
    /// Present but unusable; the reason is for logging.
    Invalid(String),
    Valid(InventoryCache),
}

impl InventoryCache {
    pub fn new(
        connection: impl Into<String>,
        host: impl Into<String>,
        header: InventoryHeader,
        records: Vec<Bytes>,
    ) -> Self {
        Self {
            format: CACHE_FORMAT.to_owned(),
            connection: connection.into(),
            host: host.into(),
            created: Utc::now(),
            header,
            records,
        }
    }

    /// Inspect the file at `path` without modifying it.
    pub fn inspect(path: &Path) -> Result<CacheStatus, CoreError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheStatus::Missing),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Ok(CacheStatus::Invalid(e.to_string()));
            }
            Err(e) => return Err(CoreError::cache(path, e)),
        };
        let cache: Self = match serde_json::from_str(&text) {
            Ok(cache) => cache,
            Err(e) => return Ok(CacheStatus::Invalid(e.to_string())),
        };
        Ok(match cache.structural_problem() {
            Some(reason) => CacheStatus::Invalid(reason),
            None => CacheStatus::Valid(cache),
        })
    }

    /// Load a cache file, treating anything but a valid file as an error.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        match Self::inspect(path)? {
            CacheStatus::Valid(cache) => Ok(cache),
            CacheStatus::Missing => Err(CoreError::cache(
                path,
                io::Error::new(io::ErrorKind::NotFound, "cache file does not exist"),
            )),
            CacheStatus::Invalid(reason) => Err(CoreError::cache(
                path,
                io::Error::new(io::ErrorKind::InvalidData, reason),
            )),
        }
    }

    fn structural_problem(&self) -> Option<String> {
        if self.format != CACHE_FORMAT {
            return Some(format!("unknown cache format '{}'", self.format));
        }
        if self.records.len() != usize::from(self.header.record_count) {
            return Some(format!(
                "header advertises {} records, file holds {}",
                self.header.record_count,
                self.records.len()
            ));
        }
        None
    }

    /// Write the whole file, creating the directory if needed. The data
    /// goes to a sibling temp file first so a crash never leaves half a
    /// cache behind.
    pub fn write(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| CoreError::cache(dir, e))?;
        }
        let json = serde_json::to_vec(self)
            .map_err(|e| CoreError::cache(path, io::Error::other(e)))?;
        let tmp = tmp_path(path);
        fs::write(&tmp, json).map_err(|e| CoreError::cache(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| CoreError::cache(path, e))?;
        debug!(path = %path.display(), records = self.records.len(), "inventory cache written");
        Ok(())
    }
}

/// Delete a cache file. A file that is already gone is fine.
pub fn remove(path: &Path) -> Result<(), CoreError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "inventory cache deleted");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::cache(path, e)),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Walk the whole repository with "Get SDR", starting at the first
/// record and following `next_record_id` to the end marker.
pub async fn read_repository(
    transport: &mut dyn IpmiTransport,
    header: &InventoryHeader,
) -> Result<Vec<Bytes>, CoreError> {
    let expected = usize::from(header.record_count);
    let limit = expected + WALK_SLACK;
    let mut records = Vec::with_capacity(expected);
    let mut record_id = SDR_FIRST_RECORD;

    while record_id != SDR_LAST_RECORD {
        if records.len() >= limit {
            return Err(CoreError::protocol(format!(
                "SDR walk did not terminate after {limit} records"
            )));
        }
        let entry = transport.get_sdr(record_id).await?;
        if entry.completion_code != COMPLETION_OK {
            return Err(CoreError::protocol(format!(
                "Get SDR {record_id:#06x} returned completion code {:#04x}",
                entry.completion_code
            )));
        }
        records.push(entry.data);
        record_id = entry.next_record_id;
    }

    if records.len() != expected {
        return Err(CoreError::protocol(format!(
            "repository advertises {expected} records but {} were read",
            records.len()
        )));
    }
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ipmilink_api::SessionParams;
    use ipmilink_api::mock::{CC_NOT_PRESENT, MockTransport};

    use super::*;

    fn header(count: u16) -> InventoryHeader {
        InventoryHeader {
            version: 0x51,
            record_count: count,
            ..InventoryHeader::default()
        }
    }

    fn records() -> Vec<Bytes> {
        vec![
            Bytes::from_static(&[0, 0, 0x51, 0x12, 0]),
            Bytes::from_static(&[1, 0, 0x51, 0x03, 0]),
        ]
    }

    #[test]
    fn write_then_inspect_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/crate1.mch.cache");
        let cache = InventoryCache::new("crate1", "mch", header(2), records());
        cache.write(&path).unwrap();

        let CacheStatus::Valid(loaded) = InventoryCache::inspect(&path).unwrap() else {
            panic!("expected a valid cache");
        };
        assert_eq!(loaded, cache);
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.h.cache");
        assert!(matches!(
            InventoryCache::inspect(&path).unwrap(),
            CacheStatus::Missing
        ));

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            InventoryCache::inspect(&path).unwrap(),
            CacheStatus::Invalid(_)
        ));

        InventoryCache::new("c", "h", header(5), records())
            .write(&path)
            .unwrap();
        let CacheStatus::Invalid(reason) = InventoryCache::inspect(&path).unwrap() else {
            panic!("count mismatch must be invalid");
        };
        assert!(reason.contains("advertises 5"));
        assert!(matches!(
            InventoryCache::load(&path),
            Err(CoreError::Cache { .. })
        ));
    }

    #[test]
    fn removing_a_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove(&dir.path().join("absent.cache")).is_ok());
    }

    #[test]
    fn walks_repository_in_order() {
        let (mut transport, handle) = MockTransport::new();
        handle.state().set_records(records());

        let walked = tokio_test::block_on(async {
            transport
                .open_session(&SessionParams::new("mch"))
                .await
                .unwrap();
            read_repository(&mut transport, &header(2)).await
        })
        .unwrap();
        assert_eq!(walked, records());
    }

    #[tokio::test]
    async fn count_mismatch_fails_the_walk() {
        let (mut transport, handle) = MockTransport::new();
        handle.state().set_records(records());
        transport
            .open_session(&SessionParams::new("mch"))
            .await
            .unwrap();

        assert!(matches!(
            read_repository(&mut transport, &header(3)).await,
            Err(CoreError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn completion_code_fails_the_walk() {
        let (mut transport, handle) = MockTransport::new();
        transport
            .open_session(&SessionParams::new("mch"))
            .await
            .unwrap();
        handle.state().info.record_count = 1;

        let err = read_repository(&mut transport, &header(1)).await.unwrap_err();
        assert!(err.to_string().contains(&format!("{CC_NOT_PRESENT:#04x}")));
    }
}
