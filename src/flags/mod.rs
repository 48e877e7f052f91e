//! Flag Engine: four independent per-record flags with reason trails.

pub mod costly;
pub mod ghost;
pub mod never_ending;
pub mod redundant;

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::algo::stats::IqrBounds;
use crate::config::FlagThresholds;
use crate::preprocess::Prepared;

pub use costly::CostMetric;

/// Flags and reasons for one record. The four booleans are always set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFlags {
    pub redundant: bool,
    pub redundant_group: Option<u32>,
    pub redundant_peers: Vec<String>,
    pub reason_redundant: String,
    pub ghost: bool,
    pub reason_ghost: String,
    pub never_ending: bool,
    pub reason_never_ending: String,
    pub costly: bool,
    pub cost_rate: Option<f64>,
    pub cost_rate_percentile: Option<f64>,
    pub reason_costly: String,
}

impl ProjectFlags {
    pub fn any(&self) -> bool {
        self.redundant || self.ghost || self.never_ending || self.costly
    }
}

/// The filtered views offered alongside the annotated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    Redundant,
    Ghost,
    NeverEnding,
    Costly,
    Flagged,
}

impl View {
    pub const ALL: [View; 5] = [
        View::Redundant,
        View::Ghost,
        View::NeverEnding,
        View::Costly,
        View::Flagged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redundant => "redundant",
            Self::Ghost => "ghost",
            Self::NeverEnding => "never-ending",
            Self::Costly => "costly",
            Self::Flagged => "flagged",
        }
    }

    pub fn includes(&self, f: &ProjectFlags) -> bool {
        match self {
            Self::Redundant => f.redundant,
            Self::Ghost => f.ghost,
            Self::NeverEnding => f.never_ending,
            Self::Costly => f.costly,
            Self::Flagged => f.any(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSummary {
    pub total_records: usize,
    pub redundant: usize,
    pub potential_ghost: usize,
    pub never_ending: usize,
    pub costly: usize,
    pub any_flag: usize,
}

impl FlagSummary {
    /// `[{Flag, Count}]` rows in the order operators expect.
    pub fn to_rows(&self) -> Vec<Value> {
        [
            ("RedundantSameAreaYear", self.redundant),
            ("PotentialGhost", self.potential_ghost),
            ("NeverEnding", self.never_ending),
            ("Costly", self.costly),
            ("AnyFlag", self.any_flag),
        ]
        .iter()
        .map(|(flag, count)| json!({"Flag": flag, "Count": count}))
        .collect()
    }
}

/// Which cost metric the Costly flag used and the fences it derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAudit {
    pub metric: CostMetric,
    pub unit: String,
    pub bounds: Option<IqrBounds>,
    pub k: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagReport {
    pub flags: Vec<ProjectFlags>,
    pub redundant_groups: usize,
    pub cost: CostAudit,
}

impl FlagReport {
    pub fn summary(&self) -> FlagSummary {
        let count = |pred: fn(&ProjectFlags) -> bool| self.flags.iter().filter(|f| pred(f)).count();
        FlagSummary {
            total_records: self.flags.len(),
            redundant: count(|f| f.redundant),
            potential_ghost: count(|f| f.ghost),
            never_ending: count(|f| f.never_ending),
            costly: count(|f| f.costly),
            any_flag: count(ProjectFlags::any),
        }
    }

    /// The source row with derived and flag columns appended.
    pub fn annotated_row(&self, prepared: &Prepared, i: usize) -> Value {
        let project = &prepared.projects[i];
        let f = &self.flags[i];
        let mut row: Map<String, Value> = prepared.table.record(project.row);
        row.extend(project.derived_fields());
        row.insert("_flag_redundant".into(), json!(f.redundant));
        row.insert("_redundant_group".into(), json!(f.redundant_group));
        row.insert("_redundant_peers".into(), json!(f.redundant_peers));
        row.insert("_reason_redundant".into(), json!(f.reason_redundant));
        row.insert("_flag_ghost".into(), json!(f.ghost));
        row.insert("_reason_ghost".into(), json!(f.reason_ghost));
        row.insert("_flag_never_ending".into(), json!(f.never_ending));
        row.insert("_reason_never_ending".into(), json!(f.reason_never_ending));
        row.insert("_flag_costly".into(), json!(f.costly));
        row.insert("_cost_rate".into(), json!(f.cost_rate));
        row.insert("_cost_rate_unit".into(), json!(self.cost.unit));
        row.insert("_cost_rate_percentile".into(), json!(f.cost_rate_percentile));
        row.insert("_cost_metric".into(), json!(self.cost.metric.as_str()));
        row.insert("_cost_outlier_low".into(), json!(self.cost.bounds.map(|b| b.low)));
        row.insert("_cost_outlier_high".into(), json!(self.cost.bounds.map(|b| b.high)));
        row.insert("_reason_costly".into(), json!(f.reason_costly));
        Value::Object(row)
    }

    pub fn annotated(&self, prepared: &Prepared) -> Vec<Value> {
        (0..self.flags.len())
            .map(|i| self.annotated_row(prepared, i))
            .collect()
    }

    pub fn view(&self, prepared: &Prepared, view: View) -> Vec<Value> {
        (0..self.flags.len())
            .filter(|&i| view.includes(&self.flags[i]))
            .map(|i| self.annotated_row(prepared, i))
            .collect()
    }
}

/// Run all four flags over a preprocessed dataset. Never fails; missing
/// evidence leaves a flag false.
pub fn compute_flags(prepared: &Prepared, thresholds: &FlagThresholds) -> FlagReport {
    let projects = &prepared.projects;

    let red = redundant::detect(projects, thresholds.redundant_similarity);
    let ghost = ghost::detect(
        projects,
        &ghost::GhostParams {
            high_amount_percentile: thresholds.ghost_high_amount_percentile,
            use_target_overrun: thresholds.use_target_overrun,
            grace_days: thresholds.grace_days,
            as_of: prepared.as_of,
        },
    );
    let never = never_ending::detect(projects, thresholds.never_ending_days);
    let cost = costly::detect(projects, thresholds.cost_iqr_k);

    let mut flags = Vec::with_capacity(projects.len());
    for i in 0..projects.len() {
        flags.push(ProjectFlags {
            redundant: red.flagged[i],
            redundant_group: red.group[i],
            redundant_peers: red.peers[i].clone(),
            reason_redundant: red.reasons[i].clone(),
            ghost: ghost[i].0,
            reason_ghost: ghost[i].1.clone(),
            never_ending: never[i].0,
            reason_never_ending: never[i].1.clone(),
            costly: cost.flagged[i],
            cost_rate: cost.rates[i],
            cost_rate_percentile: cost.percentiles[i],
            reason_costly: cost.reasons[i].clone(),
        });
    }

    let report = FlagReport {
        flags,
        redundant_groups: red.groups,
        cost: CostAudit {
            metric: cost.metric,
            unit: cost.metric.unit().to_string(),
            bounds: cost.bounds,
            k: thresholds.cost_iqr_k,
        },
    };
    let s = report.summary();
    info!(
        "Flagged {} of {} records (redundant {} in {} groups, ghost {}, never-ending {}, costly {})",
        s.any_flag,
        s.total_records,
        s.redundant,
        report.redundant_groups,
        s.potential_ghost,
        s.never_ending,
        s.costly
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnOverrides;
    use crate::preprocess::preprocess;
    use crate::table::Table;
    use chrono::NaiveDate;

    fn prepared() -> Prepared {
        let t = Table::from_records(&[
            json!({"Title": "Santa Cruz Seawall Phase 1", "Region": "A", "Year": 2023, "Amount": 10, "Length": 1}),
            json!({"Title": "Santa Cruz Seawall Phase 2", "Region": "A", "Year": 2023, "Amount": 12, "Length": 1}),
            json!({"Title": "Mabini Bridge", "Region": "B", "Year": 2023, "Amount": 11, "Length": 1}),
        ])
        .unwrap();
        let as_of = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        preprocess(&t, &ColumnOverrides::new(), None, as_of).unwrap()
    }

    #[test]
    fn annotated_rows_carry_all_flag_columns() {
        let p = prepared();
        let report = compute_flags(&p, &FlagThresholds::default());
        let rows = report.annotated(&p);
        assert_eq!(rows.len(), 3);
        for row in &rows {
            for key in ["_flag_redundant", "_flag_ghost", "_flag_never_ending", "_flag_costly"] {
                assert!(row[key].is_boolean(), "{key} not boolean");
            }
            assert_eq!(row["_cost_rate_unit"], "₱/km");
            assert_eq!(row["_cost_metric"], "cost_per_km");
        }
        assert_eq!(rows[0]["Title"], "Santa Cruz Seawall Phase 1");
        assert_eq!(rows[0]["_redundant_group"], 1);
    }

    #[test]
    fn views_filter_by_flag() {
        let p = prepared();
        let report = compute_flags(&p, &FlagThresholds::default());
        assert_eq!(report.view(&p, View::Redundant).len(), 2);
        assert_eq!(report.view(&p, View::Flagged).len(), report.summary().any_flag);
    }

    #[test]
    fn summary_rows_in_order() {
        let p = prepared();
        let rows = compute_flags(&p, &FlagThresholds::default()).summary().to_rows();
        let names: Vec<&str> = rows.iter().map(|r| r["Flag"].as_str().unwrap()).collect();
        assert_eq!(
            names,
            ["RedundantSameAreaYear", "PotentialGhost", "NeverEnding", "Costly", "AnyFlag"]
        );
        assert_eq!(rows[0]["Count"], 2);
    }
}
