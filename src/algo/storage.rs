//! SQLite-backed store for preprocessed datasets.
//!
//! Each snapshot is keyed by its preprocessing fingerprint and stored as a
//! JSON blob. The storage layer is opt-in via the `cache` feature.

use rusqlite::{params, Connection, OptionalExtension};

use super::cache::{self, CacheMeta};
use crate::error::{Result, ScreenError};
use crate::preprocess::Prepared;

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> ScreenError + '_ {
    move |e| ScreenError::Cache(format!("{context}: {e}"))
}

/// SQLite-backed cache of `Prepared` snapshots.
pub struct CacheDb {
    conn: Connection,
}

impl CacheDb {
    /// Open (or create) a cache database at the given path.
    pub fn open_or_create(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ScreenError::Cache(format!("Failed to open cache DB at '{path}': {e}")))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err("Failed to set PRAGMA"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS prepared_snapshots (
                fingerprint   INTEGER PRIMARY KEY,
                row_count     INTEGER NOT NULL,
                version       TEXT NOT NULL,
                created_at    INTEGER NOT NULL,
                payload       BLOB NOT NULL
            );",
        )
        .map_err(db_err("Failed to create cache schema"))?;

        Ok(Self { conn })
    }

    /// Raw snapshot lookup. Returns `None` on cache miss.
    pub fn get(&self, fingerprint: u64) -> Result<Option<(CacheMeta, Vec<u8>)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT row_count, version, created_at, payload
                 FROM prepared_snapshots
                 WHERE fingerprint = ?1",
            )
            .map_err(db_err("Failed to prepare SELECT"))?;

        let result = stmt
            .query_row(params![fingerprint as i64], |row| {
                let row_count: i64 = row.get(0)?;
                let version: String = row.get(1)?;
                let created_at: i64 = row.get(2)?;
                let payload: Vec<u8> = row.get(3)?;
                Ok((row_count, version, created_at, payload))
            })
            .optional()
            .map_err(db_err("Failed to query cache"))?;

        Ok(result.map(|(row_count, version, created_at, payload)| {
            let meta = CacheMeta {
                fingerprint,
                row_count: row_count as usize,
                version,
                created_at: created_at as u64,
            };
            (meta, payload)
        }))
    }

    /// Store (upsert) a snapshot payload.
    pub fn put(&self, meta: &CacheMeta, payload: &[u8]) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO prepared_snapshots (fingerprint, row_count, version, created_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(fingerprint)
                 DO UPDATE SET row_count = excluded.row_count,
                               version = excluded.version,
                               created_at = excluded.created_at,
                               payload = excluded.payload",
                params![
                    meta.fingerprint as i64,
                    meta.row_count as i64,
                    meta.version,
                    meta.created_at as i64,
                    payload,
                ],
            )
            .map_err(db_err("Failed to upsert snapshot"))?;
        Ok(())
    }

    /// A valid `Prepared` for `fingerprint`, if one is stored. Stale or
    /// undecodable snapshots count as misses.
    pub fn load_prepared(&self, fingerprint: u64, row_count: usize) -> Result<Option<Prepared>> {
        let Some((meta, payload)) = self.get(fingerprint)? else {
            return Ok(None);
        };
        if !cache::is_valid(&meta, fingerprint, row_count) {
            return Ok(None);
        }
        Ok(serde_json::from_slice(&payload).ok())
    }

    pub fn store_prepared(&self, fingerprint: u64, prepared: &Prepared) -> Result<()> {
        let payload = serde_json::to_vec(prepared)?;
        self.put(&CacheMeta::new(fingerprint, prepared.len()), &payload)
    }

    /// Delete every snapshot. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        self.conn
            .execute("DELETE FROM prepared_snapshots", [])
            .map_err(db_err("Failed to clear cache"))
    }

    /// Metadata about all cached snapshots (for `screen cache info`).
    pub fn info(&self) -> Result<Vec<SnapshotInfo>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT fingerprint, row_count, version, created_at, length(payload)
                 FROM prepared_snapshots
                 ORDER BY created_at DESC",
            )
            .map_err(db_err("Failed to prepare info query"))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SnapshotInfo {
                    fingerprint: row.get::<_, i64>(0)? as u64,
                    row_count: row.get::<_, i64>(1)? as usize,
                    version: row.get(2)?,
                    created_at: row.get::<_, i64>(3)? as u64,
                    payload_bytes: row.get::<_, i64>(4)? as usize,
                })
            })
            .map_err(db_err("Failed to query info"))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(db_err("Failed to read row"))?);
        }
        Ok(result)
    }

    /// Total size of the database file in bytes (approximate).
    pub fn db_size_bytes(&self) -> Result<u64> {
        let page_count: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .map_err(db_err("Failed to get page_count"))?;
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .map_err(db_err("Failed to get page_size"))?;
        Ok((page_count * page_size) as u64)
    }
}

/// Info record for a cached snapshot (returned by `CacheDb::info()`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct SnapshotInfo {
    pub fingerprint: u64,
    pub row_count: usize,
    pub version: String,
    pub created_at: u64,
    pub payload_bytes: usize,
}
