//! First-seen timestamps per inactive identifier, persisted with redb.
//!
//! Keys are the full identifier (`<host>:<path>`), values the Unix time in
//! seconds as 8 big-endian bytes. Every write is its own transaction, so a run
//! that aborts half-way keeps exactly the writes it already made.

use crate::Result;
use anyhow::{Context, bail};
use redb::{Database, ReadableTable, TableDefinition, TableError};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const FIRST_SEEN: TableDefinition<&str, &[u8]> = TableDefinition::new("first_seen");

/// Age after which an inactive identifier is reported as stale.
pub const STALE_AFTER: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Where an observed identifier stands relative to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Fresh(Duration),
    Stale(Duration),
}

/// Classify an identifier first seen at `first_seen` (absent if never seen).
///
/// Stale means strictly older than [`STALE_AFTER`]. Timestamps in the future
/// count as age zero.
pub fn classify(first_seen: Option<u64>, now: u64) -> Status {
    match first_seen {
        None => Status::New,
        Some(ts) => {
            let age = Duration::from_secs(now.saturating_sub(ts));
            if age > STALE_AFTER {
                Status::Stale(age)
            } else {
                Status::Fresh(age)
            }
        }
    }
}

pub fn unix_seconds(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn encode_timestamp(ts: u64) -> [u8; 8] {
    ts.to_be_bytes()
}

pub fn decode_timestamp(bytes: &[u8]) -> Option<u64> {
    <[u8; 8]>::try_from(bytes).ok().map(u64::from_be_bytes)
}

/// Open handle on the store. The database is closed when this is dropped.
pub struct StalenessCache {
    db: Database,
}

impl std::fmt::Debug for StalenessCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StalenessCache").finish_non_exhaustive()
    }
}

impl StalenessCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path)
            .with_context(|| format!("open cache database {}", path.display()))?;
        tracing::debug!(path = %path.display(), "opened cache");
        Ok(Self { db })
    }

    /// Every cached identifier with its first-seen time.
    pub fn load_all(&self) -> Result<BTreeMap<String, u64>> {
        let txn = self.db.begin_read().context("begin cache read")?;
        let table = match txn.open_table(FIRST_SEEN) {
            Ok(table) => table,
            // Nothing has been written yet.
            Err(TableError::TableDoesNotExist(_)) => return Ok(BTreeMap::new()),
            Err(e) => return Err(e).context("open cache table"),
        };

        let mut out = BTreeMap::new();
        for entry in table.iter().context("scan cache")? {
            let (key, value) = entry.context("read cache entry")?;
            let id = key.value().to_string();
            let Some(ts) = decode_timestamp(value.value()) else {
                bail!(
                    "corrupt cache entry {:?}: expected 8-byte timestamp, got {} bytes",
                    id,
                    value.value().len()
                );
            };
            out.insert(id, ts);
        }
        Ok(out)
    }

    /// Store `now` as the first-seen time of `id`, overwriting any entry.
    pub fn record_seen(&self, id: &str, now: u64) -> Result<()> {
        let txn = self.db.begin_write().context("begin cache write")?;
        {
            let mut table = txn.open_table(FIRST_SEEN).context("open cache table")?;
            let bytes = encode_timestamp(now);
            table.insert(id, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let txn = self.db.begin_write().context("begin cache write")?;
        {
            let mut table = txn.open_table(FIRST_SEEN).context("open cache table")?;
            table.remove(id)?;
        }
        txn.commit()?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn put_raw(&self, id: &str, value: &[u8]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FIRST_SEEN)?;
            table.insert(id, value)?;
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DAY: u64 = 24 * 60 * 60;

    fn temp_cache() -> (tempfile::TempDir, StalenessCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = StalenessCache::open(dir.path().join("database.db")).unwrap();
        (dir, cache)
    }

    #[test]
    fn staleness_boundary() {
        let now = 1_700_000_000;
        assert_eq!(classify(None, now), Status::New);
        assert_eq!(
            classify(Some(now - 30 * DAY), now),
            Status::Fresh(Duration::from_secs(30 * DAY))
        );
        assert_eq!(
            classify(Some(now - 30 * DAY - 1), now),
            Status::Stale(Duration::from_secs(30 * DAY + 1))
        );
        assert_eq!(classify(Some(now + 60), now), Status::Fresh(Duration::ZERO));
    }

    #[test]
    fn timestamps_are_big_endian() {
        assert_eq!(encode_timestamp(1), [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(decode_timestamp(&[0, 0, 0, 0, 0x65, 0x53, 0xf1, 0x00]), Some(0x6553_f100));
        assert_eq!(decode_timestamp(&[1, 2, 3]), None);
    }

    #[test]
    fn fresh_store_is_empty() {
        let (_dir, cache) = temp_cache();
        assert!(cache.load_all().unwrap().is_empty());
    }

    #[test]
    fn record_and_remove() {
        let (_dir, cache) = temp_cache();
        cache.record_seen("r1:system syslog", 100).unwrap();
        cache.record_seen("r2:protocols", 200).unwrap();
        cache.record_seen("r1:system syslog", 150).unwrap();

        let all = cache.load_all().unwrap();
        assert_eq!(all.get("r1:system syslog"), Some(&150));
        assert_eq!(all.get("r2:protocols"), Some(&200));

        cache.remove("r2:protocols").unwrap();
        cache.remove("r9:never-there").unwrap();
        let all = cache.load_all().unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["r1:system syslog"]);
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.db");
        {
            let cache = StalenessCache::open(&path).unwrap();
            cache.record_seen("r1:protocols", 42).unwrap();
        }
        let cache = StalenessCache::open(&path).unwrap();
        assert_eq!(cache.load_all().unwrap().get("r1:protocols"), Some(&42));
    }

    #[test]
    fn corrupt_value_is_an_error() {
        let (_dir, cache) = temp_cache();
        cache.put_raw("r1:protocols", &[1, 2, 3]).unwrap();
        let err = cache.load_all().unwrap_err();
        assert!(err.to_string().contains("corrupt cache entry"));
    }
}
