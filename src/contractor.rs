//! Contractor Aggregator: roll project flags up into per-contractor risk
//! indicators.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::algo::stats;
use crate::columns::Role;
use crate::config::ContractorThresholds;
use crate::flags::{CostMetric, FlagReport};
use crate::preprocess::{Prepared, Project};

pub const NO_CONTRACTOR_NOTE: &str = "No contractor column detected";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContractorRow {
    /// Name as first seen in the data.
    pub contractor: String,
    /// Normalized name the records are grouped by.
    pub key: String,
    pub projects: usize,
    pub ghost_flags: usize,
    pub never_ending_flags: usize,
    pub costly_flags: usize,
    pub redundant_flags: usize,
    pub repeated_issue_flags: usize,
    pub rate_costly_outliers: f64,
    pub mean_cost_per_km: Option<f64>,
    pub mean_cost_per_sq_km: Option<f64>,
    pub max_share_in_area_year: f64,
    #[serde(rename = "IND_Concentration")]
    pub concentration: bool,
    #[serde(rename = "IND_RepeatedIssues")]
    pub repeated_issues: bool,
    #[serde(rename = "IND_HighMeanUnitCost")]
    pub high_mean_unit_cost: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorSummary {
    pub contractors: usize,
    pub with_concentration: usize,
    pub with_repeated_issues: usize,
    pub with_high_mean_unit_cost: usize,
    pub high_cost_percentile: f64,
    pub records_without_contractor: usize,
}

impl ContractorSummary {
    pub fn to_rows(&self) -> Vec<Value> {
        vec![
            json!({"Indicator": "Contractors (detected)", "Count": self.contractors}),
            json!({"Indicator": "With Concentration flag", "Count": self.with_concentration}),
            json!({"Indicator": "With Repeated Issues flag", "Count": self.with_repeated_issues}),
            json!({
                "Indicator": format!("High Mean Unit Cost ≥ p{}", self.high_cost_percentile),
                "Count": self.with_high_mean_unit_cost
            }),
            json!({"Indicator": "Records without contractor", "Count": self.records_without_contractor}),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorReport {
    pub rows: Vec<ContractorRow>,
    pub summary: Option<ContractorSummary>,
    /// Set when no table could be built.
    pub note: Option<String>,
    pub unit_metric: Option<CostMetric>,
    pub unit_cost_cutoff: Option<f64>,
}

impl ContractorReport {
    fn empty(note: &str) -> Self {
        Self {
            rows: Vec::new(),
            summary: None,
            note: Some(note.to_string()),
            unit_metric: None,
            unit_cost_cutoff: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ContractorRow> {
        self.rows.iter().find(|r| r.key == key)
    }
}

#[derive(Default)]
struct Tally<'a> {
    name: Option<&'a str>,
    projects: usize,
    ghost: usize,
    never: usize,
    costly: usize,
    redundant: usize,
    per_km: Vec<f64>,
    per_sq_km: Vec<f64>,
}

/// Largest share each contractor holds of any single (area, year) cluster.
/// Shares are over every record in the cluster, named or not.
pub fn max_cluster_shares(projects: &[Project]) -> BTreeMap<String, f64> {
    let mut clusters: BTreeMap<(&str, Option<i32>), Vec<&Project>> = BTreeMap::new();
    for p in projects {
        clusters.entry((p.area_key.as_str(), p.year)).or_default().push(p);
    }

    let mut best: BTreeMap<String, f64> = BTreeMap::new();
    for members in clusters.values() {
        let total = members.len() as f64;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for p in members.iter().filter(|p| !p.contractor_norm.is_empty()) {
            *counts.entry(p.contractor_norm.as_str()).or_default() += 1;
        }
        for (name, n) in counts {
            let share = n as f64 / total;
            let slot = best.entry(name.to_string()).or_insert(0.0);
            if share > *slot {
                *slot = share;
            }
        }
    }
    best
}

/// Build the contractor table from preprocessed records and their flags.
pub fn aggregate(
    prepared: &Prepared,
    flags: &FlagReport,
    thresholds: &ContractorThresholds,
) -> ContractorReport {
    if !prepared.columns.has(Role::Contractor) {
        warn!("{NO_CONTRACTOR_NOTE}; contractor table is empty");
        return ContractorReport::empty(NO_CONTRACTOR_NOTE);
    }

    let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();
    let mut unnamed = 0usize;
    for (p, f) in prepared.projects.iter().zip(&flags.flags) {
        if p.contractor_norm.is_empty() {
            unnamed += 1;
            continue;
        }
        let t = tallies.entry(p.contractor_norm.as_str()).or_default();
        if t.name.is_none() {
            t.name = p.contractor.as_deref().map(str::trim);
        }
        t.projects += 1;
        t.ghost += f.ghost as usize;
        t.never += f.never_ending as usize;
        t.costly += f.costly as usize;
        t.redundant += f.redundant as usize;
        t.per_km.extend(p.cost_per_km);
        t.per_sq_km.extend(p.cost_per_sq_km);
    }

    let shares = max_cluster_shares(&prepared.projects);
    let mut rows: Vec<ContractorRow> = tallies
        .into_iter()
        .map(|(key, t)| {
            let repeated = t.ghost + t.never + t.costly;
            let max_share = shares.get(key).copied().unwrap_or(0.0);
            ContractorRow {
                contractor: t.name.unwrap_or(key).to_string(),
                key: key.to_string(),
                projects: t.projects,
                ghost_flags: t.ghost,
                never_ending_flags: t.never,
                costly_flags: t.costly,
                redundant_flags: t.redundant,
                repeated_issue_flags: repeated,
                rate_costly_outliers: t.costly as f64 / t.projects as f64,
                mean_cost_per_km: stats::mean(&t.per_km),
                mean_cost_per_sq_km: stats::mean(&t.per_sq_km),
                max_share_in_area_year: max_share,
                concentration: max_share >= thresholds.concentration_share,
                repeated_issues: repeated >= thresholds.min_repeated_flags,
                high_mean_unit_cost: false,
            }
        })
        .collect();

    let km = rows.iter().filter(|r| r.mean_cost_per_km.is_some()).count();
    let sq = rows.iter().filter(|r| r.mean_cost_per_sq_km.is_some()).count();
    let metric = CostMetric::choose(km, sq);
    let mean_of = |r: &ContractorRow| match metric {
        CostMetric::CostPerKm => r.mean_cost_per_km,
        CostMetric::CostPerSqKm => r.mean_cost_per_sq_km,
    };
    let means: Vec<f64> = rows.iter().filter_map(mean_of).collect();
    let cutoff = stats::percentile(&means, thresholds.high_cost_percentile);
    if let Some(cut) = cutoff {
        for r in rows.iter_mut() {
            r.high_mean_unit_cost = mean_of(r).map(|m| m >= cut).unwrap_or(false);
        }
    }

    rows.sort_by(risk_order);

    let summary = ContractorSummary {
        contractors: rows.len(),
        with_concentration: rows.iter().filter(|r| r.concentration).count(),
        with_repeated_issues: rows.iter().filter(|r| r.repeated_issues).count(),
        with_high_mean_unit_cost: rows.iter().filter(|r| r.high_mean_unit_cost).count(),
        high_cost_percentile: thresholds.high_cost_percentile,
        records_without_contractor: unnamed,
    };
    info!(
        "Aggregated {} contractors ({} records without a contractor name)",
        summary.contractors, unnamed
    );

    ContractorReport {
        rows,
        summary: Some(summary),
        note: None,
        unit_metric: Some(metric),
        unit_cost_cutoff: cutoff,
    }
}

/// Highest-risk first: indicators, then outlier rate, then volume.
fn risk_order(a: &ContractorRow, b: &ContractorRow) -> Ordering {
    b.repeated_issues
        .cmp(&a.repeated_issues)
        .then(b.concentration.cmp(&a.concentration))
        .then(b.high_mean_unit_cost.cmp(&a.high_mean_unit_cost))
        .then(b.rate_costly_outliers.total_cmp(&a.rate_costly_outliers))
        .then(b.projects.cmp(&a.projects))
        .then_with(|| a.key.cmp(&b.key))
}
