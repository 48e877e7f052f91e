//! Potential Ghost: completion claims the dates do not back up.

use chrono::NaiveDate;
use log::debug;

use crate::algo::dates::days_between;
use crate::algo::stats;
use crate::preprocess::Project;

/// Days an open project may run past its start before it looks abandoned.
pub const LONG_OPEN_DAYS: i64 = 730;
/// A "completed" project finishing faster than this is suspicious when costly.
pub const VERY_SHORT_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct GhostParams {
    pub high_amount_percentile: f64,
    pub use_target_overrun: bool,
    pub grace_days: i64,
    pub as_of: NaiveDate,
}

/// Amount at or above which a record counts as high-amount. `None` when no
/// record has an amount.
pub fn high_amount_cutoff(projects: &[Project], percentile: f64) -> Option<f64> {
    let amounts: Vec<f64> = projects.iter().filter_map(|p| p.amount).collect();
    stats::percentile(&amounts, percentile)
}

/// Every ghost condition that holds for `p`, in a fixed order.
pub fn reasons(p: &Project, high_cutoff: Option<f64>, params: &GhostParams) -> Vec<String> {
    let completeish = p.is_completeish();
    let has_start = p.start.is_some();
    let has_end = p.end.is_some();
    let high_amount = match (p.amount, high_cutoff) {
        (Some(a), Some(cut)) => a >= cut,
        _ => false,
    };
    let very_short = match (p.start, p.end) {
        (Some(s), Some(e)) => days_between(s, e) < VERY_SHORT_DAYS,
        _ => false,
    };
    let long_open = p
        .start
        .map(|s| days_between(s, params.as_of) > LONG_OPEN_DAYS)
        .unwrap_or(false);

    let mut out = Vec::new();
    if completeish && !has_end {
        out.push("Status complete/≈100% but no completion date".to_string());
    }
    if completeish && very_short && high_amount {
        out.push(format!("Completion < {VERY_SHORT_DAYS} days with high amount"));
    }
    if long_open && !has_end {
        out.push(">2 years since start with no completion date".to_string());
    }
    if !has_start && !has_end && high_amount {
        out.push("No dates recorded despite high amount".to_string());
    }
    if params.use_target_overrun {
        let overrun = p
            .target
            .map(|t| days_between(t, params.as_of) > params.grace_days)
            .unwrap_or(false);
        if overrun && (!completeish || !has_end) {
            out.push(format!(
                "Target completion + {}d grace elapsed; not completed",
                params.grace_days
            ));
        }
    }
    out
}

/// `(flagged, reason)` per record.
pub fn detect(projects: &[Project], params: &GhostParams) -> Vec<(bool, String)> {
    let cutoff = high_amount_cutoff(projects, params.high_amount_percentile);
    debug!(
        "High-amount cutoff at p{}: {:?}",
        params.high_amount_percentile, cutoff
    );
    projects
        .iter()
        .map(|p| {
            let r = reasons(p, cutoff, params);
            (!r.is_empty(), r.join("; "))
        })
        .collect()
}
