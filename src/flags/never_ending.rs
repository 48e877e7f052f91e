//! Never-Ending: long-running projects, and titles that keep coming back
//! year after year in the same area.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;

use crate::algo::similarity::token_set_ratio;
use crate::preprocess::Project;

/// Token-set ratio at which two titles count as the same recurring project.
pub const RECURRENCE_SIMILARITY_PCT: f64 = 70.0;
/// Distinct years a title must recur across.
pub const RECURRENCE_MIN_YEARS: usize = 3;

/// Number of distinct years among records in the same area whose title is
/// similar to record `i`'s, itself included. `None` when `i` has no year or
/// no title.
fn recurrence_years(projects: &[Project], members: &[usize], i: usize) -> Option<usize> {
    let base = &projects[i];
    base.year?;
    base.title.as_ref()?;
    let years: BTreeSet<i32> = members
        .iter()
        .map(|&j| &projects[j])
        .filter(|other| other.title.is_some())
        .filter(|other| token_set_ratio(&other.title_core, &base.title_core) >= RECURRENCE_SIMILARITY_PCT)
        .filter_map(|other| other.year)
        .collect();
    Some(years.len())
}

/// Per record, the number of distinct years its title recurs across when
/// that reaches the minimum.
pub fn recurrences(projects: &[Project]) -> Vec<Option<usize>> {
    let mut by_area: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, p) in projects.iter().enumerate() {
        by_area.entry(p.area_key.as_str()).or_default().push(i);
    }

    let found: Vec<(usize, usize)> = by_area
        .into_values()
        .collect::<Vec<_>>()
        .par_iter()
        .flat_map_iter(|members| {
            members
                .iter()
                .filter_map(|&i| {
                    recurrence_years(projects, members, i)
                        .filter(|&n| n >= RECURRENCE_MIN_YEARS)
                        .map(|n| (i, n))
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let mut out = vec![None; projects.len()];
    for (i, n) in found {
        out[i] = Some(n);
    }
    out
}

/// `(flagged, reason)` per record.
pub fn detect(projects: &[Project], never_ending_days: i64) -> Vec<(bool, String)> {
    let recurring = recurrences(projects);
    projects
        .iter()
        .zip(recurring)
        .map(|(p, years)| {
            let mut reasons = Vec::new();
            if let Some(d) = p.duration_days.filter(|&d| d >= never_ending_days) {
                reasons.push(format!("Duration {d} days ≥ {never_ending_days} days"));
            }
            if let Some(n) = years {
                reasons.push(format!("Similar titles across {n} years in same area"));
            }
            (!reasons.is_empty(), reasons.join("; "))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnOverrides;
    use crate::preprocess::preprocess;
    use crate::table::Table;
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    fn projects(records: &[Value]) -> Vec<Project> {
        let t = Table::from_records(records).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        preprocess(&t, &ColumnOverrides::new(), None, as_of).unwrap().projects
    }

    #[test]
    fn long_duration_flagged() {
        let p = projects(&[
            json!({"Title": "a", "Start": "2021-06-01"}),
            json!({"Title": "b", "Start": "2024-01-01"}),
        ]);
        let out = detect(&p, 730);
        assert!(out[0].0);
        assert!(out[0].1.starts_with("Duration 1125 days"));
        assert!(!out[1].0);
    }

    #[test]
    fn recurring_title_across_three_years() {
        let p = projects(&[
            json!({"Title": "Desilting of Pampanga River Channel", "Region": "III", "Year": 2020}),
            json!({"Title": "Desilting of Pampanga River Channel", "Region": "III", "Year": 2021}),
            json!({"Title": "Desilting Pampanga River Channel", "Region": "III", "Year": 2022}),
            json!({"Title": "Desilting of Pampanga River Channel", "Region": "IV", "Year": 2022}),
        ]);
        let out = detect(&p, 730);
        for r in &out[..3] {
            assert!(r.0);
            assert_eq!(r.1, "Similar titles across 3 years in same area");
        }
        assert!(!out[3].0);
    }

    #[test]
    fn two_years_not_enough() {
        let p = projects(&[
            json!({"Title": "Mabini Seawall", "Region": "A", "Year": 2020}),
            json!({"Title": "Mabini Seawall", "Region": "A", "Year": 2021}),
            json!({"Title": "Mabini Seawall", "Region": "A", "Year": 2021}),
        ]);
        assert!(detect(&p, 730).iter().all(|r| !r.0));
    }

    #[test]
    fn higher_threshold_flags_fewer() {
        let p = projects(&[
            json!({"Title": "a", "Start": "2021-06-01"}),
            json!({"Title": "b", "Start": "2022-06-01"}),
        ]);
        let lo = detect(&p, 365).iter().filter(|r| r.0).count();
        let hi = detect(&p, 1825).iter().filter(|r| r.0).count();
        assert_eq!((lo, hi), (2, 0));
    }
}
