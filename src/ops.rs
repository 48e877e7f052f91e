//! Shared operation wrappers for every front end.
//!
//! Each `op_*` function is a pure, synchronous wrapper around the pipeline.
//! Input and output are `serde_json::Value`, so the CLI and any embedding
//! application render the same structures.
//!
//! When the `cache` feature is enabled, `op_screen_cached` accepts a
//! `cache_path`. On a hit, preprocessing is skipped.

use serde_json::{json, Value};

use crate::algo::similarity::{self, Metric};
use crate::columns::{self, ColumnOverrides};
use crate::contractor::ContractorReport;
use crate::error::{Result, ScreenError};
use crate::flags::View;
use crate::matching;
use crate::preprocess::Prepared;
use crate::table::Table;
use crate::{prepare, screen_prepared, Screening, ScreeningConfig};

#[cfg(feature = "cache")]
use crate::algo::{cache, storage};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn contractors_json(report: &ContractorReport) -> Value {
    let summary = match (&report.summary, &report.note) {
        (Some(s), _) => s.to_rows(),
        (None, Some(note)) => vec![json!({"Note": note})],
        (None, None) => Vec::new(),
    };
    json!({
        "table": report.rows,
        "summary": summary,
        "note": report.note,
        "unit_metric": report.unit_metric,
        "unit_cost_cutoff": report.unit_cost_cutoff,
    })
}

/// Render a finished screening run.
pub fn screening_json(s: &Screening) -> Value {
    let p = &s.prepared;
    let mut views = serde_json::Map::new();
    for view in View::ALL {
        views.insert(view.as_str().into(), Value::Array(s.flags.view(p, view)));
    }
    let summary = s.flags.summary();
    json!({
        "columns": p.columns.to_json(),
        "missing_roles": p.columns.missing(),
        "annotated": s.flags.annotated(p),
        "views": views,
        "summary": summary.to_rows(),
        "counts": summary,
        "contractors": contractors_json(&s.contractors),
        "audit": {
            "units": p.unit_audit(),
            "cost": s.flags.cost,
            "redundant_groups": s.flags.redundant_groups,
        },
    })
}

// ── Operations ───────────────────────────────────────────────────────────────

/// Resolved role → column map for a dataset's header.
pub fn op_detect(rows: &[Value], overrides: &ColumnOverrides) -> Result<Value> {
    let table = Table::from_records(rows)?;
    let map = columns::detect(table.columns(), overrides)?;
    Ok(json!({
        "columns": map.to_json(),
        "missing_roles": map.missing(),
        "total_columns": table.columns().len(),
    }))
}

/// Full screening run over JSON records.
pub fn op_screen(rows: &[Value], config: &ScreeningConfig) -> Result<Value> {
    let table = Table::from_records(rows)?;
    let prepared = prepare(&table, config)?;
    Ok(screening_json(&screen_prepared(prepared, config)?))
}

/// Rerun only the threshold-dependent stages over an earlier preprocessing.
pub fn op_rescreen(prepared: &Prepared, config: &ScreeningConfig) -> Result<Value> {
    Ok(screening_json(&screen_prepared(prepared.clone(), config)?))
}

/// Contractor table only.
pub fn op_contractors(rows: &[Value], config: &ScreeningConfig) -> Result<Value> {
    let table = Table::from_records(rows)?;
    let s = screen_prepared(prepare(&table, config)?, config)?;
    Ok(contractors_json(&s.contractors))
}

/// Candidate pairs between project records and a ledger, with templates.
pub fn op_match(base_rows: &[Value], budget_rows: &[Value], config: &ScreeningConfig) -> Result<Value> {
    let base = prepare(&Table::from_records(base_rows)?, config)?;
    // The ledger has its own header; project-side overrides do not apply.
    let ledger_config = ScreeningConfig {
        overrides: ColumnOverrides::new(),
        ..config.clone()
    };
    let budget = prepare(&Table::from_records(budget_rows)?, &ledger_config)?;
    let report = matching::match_datasets(&base, &budget);
    Ok(serde_json::to_value(report)?)
}

pub fn op_similarity(a: &str, b: &str, metric_name: &str, all: bool) -> Result<Value> {
    if all {
        let mut results = serde_json::Map::new();
        results.insert("a".into(), Value::String(a.into()));
        results.insert("b".into(), Value::String(b.into()));
        for name in Metric::all_names() {
            if let Some(metric) = Metric::from_str(name) {
                results.insert((*name).into(), json!(similarity::similarity(a, b, metric)));
            }
        }
        results.insert("components".into(), json!(similarity::composite(a, b)));
        Ok(Value::Object(results))
    } else {
        let metric = Metric::from_str(metric_name)
            .ok_or_else(|| ScreenError::UnknownMetric(metric_name.to_string()))?;
        let score = similarity::similarity(a, b, metric);
        Ok(json!({
            "a": a, "b": b, "metric": metric_name, "similarity": score
        }))
    }
}

// ── Cache-aware operations ──────────────────────────────────────────────────
//
// When the `cache` feature is enabled and a path is provided, the
// preprocessed dataset is looked up by fingerprint before being rebuilt.

/// Screen with optional preprocessing reuse.
pub fn op_screen_cached(
    rows: &[Value],
    config: &ScreeningConfig,
    cache_path: Option<&str>,
) -> Result<Value> {
    let table = Table::from_records(rows)?;

    #[cfg(feature = "cache")]
    if let Some(path) = cache_path {
        config.validate()?;
        let as_of = config.as_of_or_today();
        let fp = cache::fingerprint(&table, &config.overrides, config.geo_cell_km, as_of);
        let db = storage::CacheDb::open_or_create(path)?;
        let prepared = match db.load_prepared(fp, table.len())? {
            Some(p) => {
                log::info!("Cache hit for fingerprint {fp:016x}");
                p
            }
            None => {
                log::info!("Cache miss for fingerprint {fp:016x}; preprocessing");
                let pinned = ScreeningConfig {
                    as_of: Some(as_of),
                    ..config.clone()
                };
                let p = prepare(&table, &pinned)?;
                db.store_prepared(fp, &p)?;
                p
            }
        };
        return Ok(screening_json(&screen_prepared(prepared, config)?));
    }

    let _ = cache_path; // unused when the cache feature is off
    Ok(screening_json(&screen_prepared(prepare(&table, config)?, config)?))
}

#[cfg(feature = "cache")]
pub fn op_cache_info(cache_path: &str) -> Result<Value> {
    let db = storage::CacheDb::open_or_create(cache_path)?;
    let snapshots = db.info()?;
    Ok(json!({
        "path": cache_path,
        "size_bytes": db.db_size_bytes()?,
        "snapshots": snapshots,
    }))
}

#[cfg(feature = "cache")]
pub fn op_cache_clear(cache_path: &str) -> Result<Value> {
    let db = storage::CacheDb::open_or_create(cache_path)?;
    let deleted = db.clear()?;
    Ok(json!({"path": cache_path, "deleted": deleted}))
}
