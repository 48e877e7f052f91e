//! Fingerprints and metadata for reusing preprocessed datasets.
//!
//! This module is always compiled (no feature gate). Only the storage backend
//! (`storage.rs`) requires the `cache` feature with rusqlite.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::columns::ColumnOverrides;
use crate::table::Table;

/// Metadata stored alongside a cached preprocessing snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Hash of the dataset plus every preprocessing input.
    pub fingerprint: u64,
    /// Number of input rows when the snapshot was cached.
    pub row_count: usize,
    /// Crate version when the snapshot was created (detects upgrades).
    pub version: String,
    /// Unix timestamp when the snapshot was created.
    pub created_at: u64,
}

impl CacheMeta {
    /// Create a new CacheMeta with the current version and timestamp.
    pub fn new(fingerprint: u64, row_count: usize) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            fingerprint,
            row_count,
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at,
        }
    }
}

/// SipHash-1-3 of any serializable value's JSON form.
pub fn args_hash(args: &impl Serialize) -> u64 {
    let json = serde_json::to_string(args).unwrap_or_default();
    let mut hasher = SipHasher13::new();
    json.hash(&mut hasher);
    hasher.finish()
}

#[derive(Serialize)]
struct PreprocessInputs<'a> {
    table: &'a Table,
    overrides: &'a ColumnOverrides,
    geo_cell_km: Option<f64>,
    as_of: NaiveDate,
}

/// Cache key for a preprocessing run. Changes when the data, the column
/// overrides, the grid size or the reference date change; threshold changes
/// leave it alone.
pub fn fingerprint(
    table: &Table,
    overrides: &ColumnOverrides,
    geo_cell_km: Option<f64>,
    as_of: NaiveDate,
) -> u64 {
    args_hash(&PreprocessInputs {
        table,
        overrides,
        geo_cell_km,
        as_of,
    })
}

/// A snapshot is valid only if fingerprint, row count and crate version all
/// match.
pub fn is_valid(meta: &CacheMeta, fingerprint: u64, row_count: usize) -> bool {
    meta.fingerprint == fingerprint
        && meta.row_count == row_count
        && meta.version == env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::Role;
    use serde_json::json;

    fn table(title: &str) -> Table {
        Table::from_records(&[json!({"Title": title, "Amount": 100})]).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn fingerprint_deterministic() {
        let o = ColumnOverrides::new();
        assert_eq!(
            fingerprint(&table("a"), &o, None, day()),
            fingerprint(&table("a"), &o, None, day())
        );
    }

    #[test]
    fn fingerprint_changes_with_each_input() {
        let o = ColumnOverrides::new();
        let base = fingerprint(&table("a"), &o, None, day());
        assert_ne!(base, fingerprint(&table("b"), &o, None, day()));
        assert_ne!(base, fingerprint(&table("a"), &o, Some(1.0), day()));
        assert_ne!(
            base,
            fingerprint(&table("a"), &o, None, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
        let o2 = ColumnOverrides::new().disable(Role::Amount);
        assert_ne!(base, fingerprint(&table("a"), &o2, None, day()));
    }

    #[test]
    fn args_hash_changes_with_params() {
        #[derive(Serialize)]
        struct Args {
            k: f64,
        }
        assert_ne!(args_hash(&Args { k: 1.5 }), args_hash(&Args { k: 2.0 }));
    }

    #[test]
    fn cache_meta_new_has_current_version() {
        let meta = CacheMeta::new(42, 100);
        assert_eq!(meta.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(meta.fingerprint, 42);
        assert_eq!(meta.row_count, 100);
        assert!(meta.created_at > 0);
    }

    #[test]
    fn is_valid_checks_all_signals() {
        let meta = CacheMeta::new(42, 100);
        assert!(is_valid(&meta, 42, 100));
        assert!(!is_valid(&meta, 43, 100));
        assert!(!is_valid(&meta, 42, 99));
        let mut old = meta.clone();
        old.version = "0.0.0".into();
        assert!(!is_valid(&old, 42, 100));
    }

    #[test]
    fn cache_meta_serde_roundtrip() {
        let meta = CacheMeta::new(12345, 500);
        let json = serde_json::to_string(&meta).unwrap();
        let parsed: CacheMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.fingerprint, meta.fingerprint);
        assert_eq!(parsed.row_count, meta.row_count);
        assert_eq!(parsed.version, meta.version);
        assert_eq!(parsed.created_at, meta.created_at);
    }
}
