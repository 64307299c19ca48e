//! Durable snapshot of every listing seen so far.
//!
//! - `Snapshot`: the in-memory mapping `(source_hash, item_id) -> record`.
//! - `SnapshotStore`: loads and persists it as delimited rows
//!   `source_hash,item_id,price,updated_at`, no header.
//! - `codec`: the row reader/writer.

pub mod codec;

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use crate::model::{SnapshotKey, SnapshotRecord};

const FIELDS_PER_ROW: usize = 4;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt snapshot at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: HashMap<SnapshotKey, SnapshotRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &SnapshotKey) -> Option<&SnapshotRecord> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &SnapshotKey) -> Option<&mut SnapshotRecord> {
        self.records.get_mut(key)
    }

    /// Insert or replace the record stored under its own key.
    pub fn upsert(&mut self, record: SnapshotRecord) -> Option<SnapshotRecord> {
        self.records.insert(record.key(), record)
    }

    pub fn records(&self) -> impl Iterator<Item = &SnapshotRecord> {
        self.records.values()
    }
}

impl FromIterator<SnapshotRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = SnapshotRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.upsert(record);
        }
        snapshot
    }
}

/// File-backed snapshot persistence.
///
/// With `strict` unset, unreadable price or timestamp fields decode as `0` and
/// the Unix epoch, and short rows are skipped. With `strict` set the same
/// conditions fail the load with `StoreError::Corrupt`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    strict: bool,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is a first run and yields an empty snapshot. Bytes that
    /// are not UTF-8 are replaced in permissive mode and reported as
    /// `StoreError::Corrupt` in strict mode.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Snapshot, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no snapshot yet; starting empty");
                return Ok(Snapshot::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                let valid = err.utf8_error().valid_up_to();
                let bytes = err.into_bytes();
                let line = bytes[..valid].iter().filter(|&&b| b == b'\n').count() + 1;
                if self.strict {
                    return Err(StoreError::Corrupt {
                        line,
                        reason: "invalid UTF-8".into(),
                    });
                }
                warn!(line, "snapshot is not valid UTF-8; replacing bad bytes");
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };

        let mut snapshot = Snapshot::new();
        for row in codec::parse_rows(&text, FIELDS_PER_ROW) {
            if let Some(record) = self.decode_row(row)? {
                snapshot.upsert(record);
            }
        }
        debug!(records = snapshot.len(), "snapshot loaded");
        Ok(snapshot)
    }

    fn decode_row(&self, row: codec::Row) -> Result<Option<SnapshotRecord>, StoreError> {
        let line = row.line;
        let [source_hash, item_id, price, updated_at]: [String; FIELDS_PER_ROW] =
            match row.fields.try_into() {
                Ok(fields) => fields,
                Err(fields) => {
                    let reason = format!("expected {FIELDS_PER_ROW} fields, found {}", fields.len());
                    if self.strict {
                        return Err(StoreError::Corrupt { line, reason });
                    }
                    warn!(line, %reason, "skipping snapshot row");
                    return Ok(None);
                }
            };

        let price = match price.trim().parse::<i64>() {
            Ok(price) => price,
            Err(_) if self.strict => {
                return Err(StoreError::Corrupt {
                    line,
                    reason: format!("price {price:?} is not an integer"),
                })
            }
            Err(_) => {
                warn!(line, %price, "non-numeric price in snapshot; reading as 0");
                0
            }
        };

        let updated_at = match DateTime::parse_from_rfc3339(updated_at.trim()) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(_) if self.strict => {
                return Err(StoreError::Corrupt {
                    line,
                    reason: format!("timestamp {updated_at:?} is not RFC 3339"),
                })
            }
            Err(_) => {
                warn!(line, %updated_at, "unreadable timestamp in snapshot; reading as epoch");
                DateTime::<Utc>::UNIX_EPOCH
            }
        };

        Ok(Some(SnapshotRecord {
            source_hash,
            item_id,
            price,
            updated_at,
        }))
    }

    /// Overwrite the snapshot file with every record. The rows go to a sibling
    /// temp file, which is synced and then renamed into place, so readers never
    /// see a half-written snapshot. The temp file is removed on failure.
    #[instrument(skip_all, fields(path = %self.path.display(), records = snapshot.len()))]
    pub async fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let mut buf = Vec::new();
        for record in snapshot.records() {
            let price = record.price.to_string();
            let updated_at = record.updated_at.to_rfc3339_opts(SecondsFormat::AutoSi, true);
            codec::write_row(
                &mut buf,
                &[
                    record.source_hash.as_str(),
                    record.item_id.as_str(),
                    price.as_str(),
                    updated_at.as_str(),
                ],
            )
            .map_err(io_err)?;
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }
        let tmp = temp_path(&self.path);
        if let Err(source) = write_synced(&tmp, &buf).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err(source));
        }
        if let Err(source) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err(source));
        }
        debug!(bytes = buf.len(), "snapshot persisted");
        Ok(())
    }
}

async fn write_synced(path: &Path, buf: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(buf).await?;
    file.sync_all().await
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record(hash: &str, id: &str, price: i64, secs: i64) -> SnapshotRecord {
        SnapshotRecord {
            source_hash: hash.into(),
            item_id: id.into(),
            price,
            updated_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let td = tempdir().unwrap();
        let store = SnapshotStore::new(td.path().join("nope.csv"));
        let snapshot = store.load().await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn persist_then_load_round_trips() {
        let td = tempdir().unwrap();
        let store = SnapshotStore::new(td.path().join("state").join("analysis_results.csv"));
        let snapshot: Snapshot = vec![
            record("a1b2c3", "/item/bici-1", 360, 1_714_557_600),
            record("a1b2c3", "/item/q?x=1,2", 25, 1_714_557_601),
            record("ffee00", "/item/bici-1", 340, 1_714_557_602),
        ]
        .into_iter()
        .collect();

        store.persist(&snapshot).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!temp_path(store.path()).exists());
    }

    #[tokio::test]
    async fn persist_overwrites_previous_content() {
        let td = tempdir().unwrap();
        let store = SnapshotStore::new(td.path().join("s.csv"));
        let first: Snapshot = vec![record("h", "a", 1, 0), record("h", "b", 2, 0)]
            .into_iter()
            .collect();
        store.persist(&first).await.unwrap();
        let second: Snapshot = vec![record("h", "c", 3, 0)].into_iter().collect();
        store.persist(&second).await.unwrap();
        assert_eq!(store.load().await.unwrap(), second);
    }

    #[tokio::test]
    async fn reads_legacy_rows() {
        let td = tempdir().unwrap();
        let path = td.path().join("legacy.csv");
        std::fs::write(
            &path,
            "a1b2c3,/item/bici-1,360,2024-05-01T12:00:00+02:00\n",
        )
        .unwrap();
        let snapshot = SnapshotStore::new(&path).load().await.unwrap();
        let rec = snapshot
            .get(&SnapshotKey::new("a1b2c3", "/item/bici-1"))
            .unwrap();
        assert_eq!(rec.price, 360);
        assert_eq!(rec.updated_at, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn permissive_load_tolerates_bad_fields() {
        let td = tempdir().unwrap();
        let path = td.path().join("bad.csv");
        std::fs::write(
            &path,
            "h,a,abc,2024-05-01T10:00:00Z\nh,b,5,yesterday\nh,short\n",
        )
        .unwrap();
        let snapshot = SnapshotStore::new(&path).load().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(&SnapshotKey::new("h", "a")).unwrap().price, 0);
        assert_eq!(
            snapshot.get(&SnapshotKey::new("h", "b")).unwrap().updated_at,
            DateTime::<Utc>::UNIX_EPOCH
        );
    }

    #[tokio::test]
    async fn strict_load_fails_closed() {
        let td = tempdir().unwrap();
        let path = td.path().join("bad.csv");
        std::fs::write(&path, "h,a,1,2024-05-01T10:00:00Z\nh,b,abc,2024-05-01T10:00:00Z\n").unwrap();
        let err = SnapshotStore::new(&path).strict(true).load().await.unwrap_err();
        match err {
            StoreError::Corrupt { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("price"));
            }
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn persist_into_unwritable_location_is_io_error() {
        let td = tempdir().unwrap();
        // A regular file where the parent directory should be.
        let blocker = td.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let store = SnapshotStore::new(blocker.join("s.csv"));
        let err = store.persist(&Snapshot::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[tokio::test]
    async fn stray_quote_keeps_following_rows() {
        let td = tempdir().unwrap();
        let path = td.path().join("s.csv");
        std::fs::write(
            &path,
            "h,\"a,1,2024-05-01T10:00:00Z\nh,b,2,2024-05-01T10:00:00Z\nh,c,3,2024-05-01T10:00:00Z\n",
        )
        .unwrap();
        let store = SnapshotStore::new(&path);
        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.get(&SnapshotKey::new("h", "\"a")).is_none());

        store.persist(&snapshot).await.unwrap();
        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.get(&SnapshotKey::new("h", "b")).unwrap().price, 2);
        assert_eq!(reloaded.get(&SnapshotKey::new("h", "c")).unwrap().price, 3);
    }

    #[tokio::test]
    async fn stray_quote_fails_strict_load_at_its_line() {
        let td = tempdir().unwrap();
        let path = td.path().join("s.csv");
        std::fs::write(&path, "h,a,1,2024-05-01T10:00:00Z\nh,\"b,2,2024-05-01T10:00:00Z\nh,c,3,t\n").unwrap();
        let err = SnapshotStore::new(&path).strict(true).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { line: 2, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_when_permissive() {
        let td = tempdir().unwrap();
        let path = td.path().join("s.csv");
        std::fs::write(&path, b"h,a,1,2024-05-01T10:00:00Z\nh,b\xff,2,2024-05-01T10:00:00Z\n").unwrap();
        let snapshot = SnapshotStore::new(&path).load().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(&SnapshotKey::new("h", "a")).unwrap().price, 1);
        assert_eq!(snapshot.get(&SnapshotKey::new("h", "b\u{FFFD}")).unwrap().price, 2);
    }

    #[tokio::test]
    async fn invalid_utf8_fails_strict_load() {
        let td = tempdir().unwrap();
        let path = td.path().join("s.csv");
        std::fs::write(&path, b"h,a,1,2024-05-01T10:00:00Z\nh,b\xff,2,2024-05-01T10:00:00Z\n").unwrap();
        let err = SnapshotStore::new(&path).strict(true).load().await.unwrap_err();
        match err {
            StoreError::Corrupt { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("UTF-8"));
            }
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_rename_removes_temp_file() {
        let td = tempdir().unwrap();
        // A non-empty directory where the snapshot file should be.
        let path = td.path().join("s.csv");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();
        let store = SnapshotStore::new(&path);
        let snapshot: Snapshot = vec![record("h", "a", 1, 0)].into_iter().collect();

        let err = store.persist(&snapshot).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(!temp_path(&path).exists());
        assert!(path.join("keep").exists());
    }
}
