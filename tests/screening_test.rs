use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use infra_screen::contractor::NO_CONTRACTOR_NOTE;
use infra_screen::{screen, ContractorThresholds, FlagThresholds, ScreeningConfig, Table};
use serde_json::{json, Value};

fn config() -> ScreeningConfig {
    ScreeningConfig {
        as_of: NaiveDate::from_ymd_opt(2024, 6, 30),
        ..Default::default()
    }
}

fn with_flags(flags: FlagThresholds) -> ScreeningConfig {
    ScreeningConfig {
        flags,
        ..config()
    }
}

#[allow(clippy::too_many_arguments)]
fn record(
    title: &str,
    contractor: Option<&str>,
    region: &str,
    province: &str,
    year: i32,
    amount: f64,
    length: Option<f64>,
    status: &str,
    start: Option<&str>,
    end: Option<&str>,
    target: Option<&str>,
) -> Value {
    json!({
        "Title": title,
        "Contractor": contractor,
        "Region": region,
        "Province": province,
        "Year": year,
        "Amount": amount,
        "Length": length,
        "Status": status,
        "Start Date": start,
        "End Date": end,
        "Target Date": target,
    })
}

/// A small mixed portfolio touching every flag.
fn portfolio() -> Table {
    let rows = vec![
        record("Construction of Flood Control Structure Along Santa Cruz River Phase 1", Some("Acme Builders"), "Region-A", "Province-B", 2023, 5_000_000.0, Some(1.0), "Ongoing", Some("2023-02-01"), None, Some("2024-12-31")),
        record("Construction of Flood Control Structure Along Santa Cruz River Phase 2", Some("Acme Builders"), "Region-A", "Province-B", 2023, 5_200_000.0, Some(1.1), "Ongoing", Some("2023-03-01"), None, Some("2024-12-31")),
        record("Santa Cruz River Revetment Phase 3", Some("Acme Builders"), "Region-A", "Province-B", 2023, 4_800_000.0, Some(0.9), "Completed", Some("2023-01-10"), Some("2023-11-30"), Some("2023-12-31")),
        record("Mabini Bridge Rehabilitation", Some("Beta Construction"), "Region-A", "Province-C", 2022, 12_000_000.0, Some(0.2), "100% complete", Some("2022-01-15"), None, Some("2022-12-31")),
        record("Rizal Farm-to-Market Road", Some("Beta Construction"), "Region-B", "Province-D", 2021, 3_000_000.0, Some(2.0), "Ongoing", Some("2021-05-01"), None, Some("2022-05-01")),
        record("Rizal Farm-to-Market Road", Some("Gamma Corp"), "Region-B", "Province-D", 2022, 3_100_000.0, Some(2.0), "Ongoing", Some("2022-05-01"), None, Some("2023-05-01")),
        record("Rizal Farm-to-Market Road", Some("Gamma Corp"), "Region-B", "Province-D", 2023, 3_050_000.0, Some(2.0), "Completed", Some("2023-05-01"), Some("2023-12-15"), Some("2023-12-31")),
        record("Dike at Pampanga Riverside", None, "Region-C", "Province-E", 2023, 2_000_000.0, Some(1.0), "Completed", Some("2023-01-01"), Some("2023-01-03"), None),
        record("Drainage Canal Dredging Lot 4", Some("Delta Works"), "Region-C", "Province-E", 2023, 50_000_000.0, Some(0.5), "100%", None, None, None),
        record("School Building Annex", Some("Delta Works"), "Region-C", "Province-E", 2024, 2_500_000.0, None, "Ongoing", Some("2024-02-01"), None, Some("2024-10-01")),
        record("Coastal Seawall", Some("acme builders"), "Region-A", "Province-B", 2024, 6_000_000.0, Some(1.2), "Ongoing", Some("2024-01-01"), None, Some("2024-03-31")),
    ];
    Table::from_records(&rows).unwrap()
}

fn flagged_set(s: &infra_screen::Screening, pick: impl Fn(&infra_screen::flags::ProjectFlags) -> bool) -> BTreeSet<usize> {
    s.flags
        .flags
        .iter()
        .enumerate()
        .filter(|(_, f)| pick(f))
        .map(|(i, _)| i)
        .collect()
}

// ── Properties ──────────────────────────────────────────────────────────────

#[test]
fn every_record_gets_four_boolean_flags() {
    let s = screen(&portfolio(), &config()).unwrap();
    let rows = s.flags.annotated(&s.prepared);
    assert_eq!(rows.len(), 11);
    for row in rows {
        for key in ["_flag_redundant", "_flag_ghost", "_flag_never_ending", "_flag_costly"] {
            assert!(row[key].is_boolean(), "{key} is {:?}", row[key]);
        }
    }
}

#[test]
fn redundancy_groups_are_closed_and_disjoint() {
    let s = screen(&portfolio(), &config()).unwrap();
    let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, f) in s.flags.flags.iter().enumerate() {
        assert_eq!(f.redundant, f.redundant_group.is_some());
        if let Some(g) = f.redundant_group {
            groups.entry(g).or_default().push(i);
        }
    }
    assert_eq!(groups.len(), s.flags.redundant_groups);
    let ids: Vec<u32> = groups.keys().copied().collect();
    let expected: Vec<u32> = (1..=groups.len() as u32).collect();
    assert_eq!(ids, expected);

    let projects = &s.prepared.projects;
    for members in groups.values() {
        assert!(members.len() >= 2);
        for &i in members {
            assert_eq!(projects[i].area_key, projects[members[0]].area_key);
            assert_eq!(projects[i].year, projects[members[0]].year);
            let peers: BTreeSet<&str> = s.flags.flags[i]
                .redundant_peers
                .iter()
                .map(String::as_str)
                .collect();
            let others: BTreeSet<&str> = members
                .iter()
                .filter(|&&j| j != i)
                .filter_map(|&j| projects[j].title.as_deref())
                .collect();
            assert_eq!(peers, others);
        }
    }
}

#[test]
fn screening_is_deterministic() {
    let a = screen(&portfolio(), &config()).unwrap();
    let b = screen(&portfolio(), &config()).unwrap();
    assert_eq!(a.flags, b.flags);
    assert_eq!(a.contractors, b.contractors);
    assert_eq!(
        serde_json::to_string(&a.flags.annotated(&a.prepared)).unwrap(),
        serde_json::to_string(&b.flags.annotated(&b.prepared)).unwrap()
    );
}

#[test]
fn stricter_similarity_never_adds_redundant_flags() {
    let mut previous: Option<BTreeSet<usize>> = None;
    for t in [0.40, 0.50, 0.60, 0.70, 0.80, 0.90, 0.95] {
        let s = screen(
            &portfolio(),
            &with_flags(FlagThresholds {
                redundant_similarity: t,
                ..Default::default()
            }),
        )
        .unwrap();
        let now = flagged_set(&s, |f| f.redundant);
        if let Some(prev) = &previous {
            assert!(now.is_subset(prev), "threshold {t} added flags");
        }
        previous = Some(now);
    }
}

#[test]
fn larger_iqr_k_never_adds_costly_flags() {
    let mut previous: Option<BTreeSet<usize>> = None;
    for k in [0.5, 1.0, 1.5, 2.0, 3.0] {
        let s = screen(
            &portfolio(),
            &with_flags(FlagThresholds {
                cost_iqr_k: k,
                ..Default::default()
            }),
        )
        .unwrap();
        let now = flagged_set(&s, |f| f.costly);
        if let Some(prev) = &previous {
            assert!(now.is_subset(prev), "k={k} added flags");
        }
        previous = Some(now);
    }
}

#[test]
fn longer_never_ending_days_never_adds_duration_flags() {
    let mut previous: Option<BTreeSet<usize>> = None;
    for days in [365, 730, 1095, 1460, 1825] {
        let s = screen(
            &portfolio(),
            &with_flags(FlagThresholds {
                never_ending_days: days,
                ..Default::default()
            }),
        )
        .unwrap();
        let now = flagged_set(&s, |f| f.reason_never_ending.contains("Duration"));
        if let Some(prev) = &previous {
            assert!(now.is_subset(prev), "{days} days added flags");
        }
        previous = Some(now);
    }
}

#[test]
fn contractor_project_counts_match_annotated_rows() {
    let s = screen(&portfolio(), &config()).unwrap();
    let rows = s.flags.annotated(&s.prepared);
    assert!(!s.contractors.rows.is_empty());
    for c in &s.contractors.rows {
        let n = rows
            .iter()
            .filter(|r| r["_contractor_norm"] == c.key.as_str())
            .count();
        assert_eq!(c.projects, n, "contractor {}", c.key);
    }
    let acme = s.contractors.get("acme builders").unwrap();
    assert_eq!(acme.projects, 4);
    assert_eq!(s.contractors.summary.as_ref().unwrap().records_without_contractor, 1);
}

#[test]
fn concentration_matches_independent_share() {
    for share in [0.10, 0.30, 0.50, 0.70, 0.90] {
        let cfg = ScreeningConfig {
            contractors: ContractorThresholds {
                concentration_share: share,
                ..Default::default()
            },
            ..config()
        };
        let s = screen(&portfolio(), &cfg).unwrap();
        let rows = s.flags.annotated(&s.prepared);

        let mut clusters: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
        for r in &rows {
            let key = (r["_area_key"].to_string(), r["_year"].to_string());
            let name = r["_contractor_norm"].as_str().unwrap_or_default().to_string();
            clusters.entry(key).or_default().push(name);
        }
        let mut best: BTreeMap<String, f64> = BTreeMap::new();
        for names in clusters.values() {
            for name in names.iter().filter(|n| !n.is_empty()) {
                let n = names.iter().filter(|m| *m == name).count();
                let s = n as f64 / names.len() as f64;
                let slot = best.entry(name.clone()).or_insert(0.0);
                *slot = slot.max(s);
            }
        }

        for c in &s.contractors.rows {
            let expected = best[&c.key] >= share;
            assert_eq!(c.concentration, expected, "{} at {share}", c.key);
        }
    }
}

// ── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn numbered_phases_are_redundant() {
    let t = Table::from_records(&[
        json!({"Title": "Construction of Flood Control Structure Along Santa Cruz River Phase 1", "Region": "Region-A", "Province": "Province-B", "Year": 2023}),
        json!({"Title": "Construction of Flood Control Structure Along Santa Cruz River Phase 2", "Region": "Region-A", "Province": "Province-B", "Year": 2023}),
    ])
    .unwrap();
    let s = screen(&t, &config()).unwrap();
    assert_eq!(s.prepared.projects[0].area_key, "region-a, province-b");
    let f = &s.flags.flags;
    assert!(f[0].redundant && f[1].redundant);
    assert_eq!(f[0].redundant_group, f[1].redundant_group);
    assert_eq!(
        f[0].redundant_peers,
        ["Construction of Flood Control Structure Along Santa Cruz River Phase 2"]
    );
    assert_eq!(
        f[1].redundant_peers,
        ["Construction of Flood Control Structure Along Santa Cruz River Phase 1"]
    );
}

#[test]
fn complete_status_without_end_date_is_ghost() {
    let t = Table::from_records(&[
        json!({"Title": "Road A", "Status": "Ongoing", "Amount": 100, "End Date": null}),
        json!({"Title": "Road B", "Status": "Ongoing", "Amount": 200, "End Date": null}),
        json!({"Title": "Road C", "Status": "Ongoing", "Amount": 300, "End Date": null}),
        json!({"Title": "Road D", "Status": "Ongoing", "Amount": 400, "End Date": null}),
        json!({"Title": "Bridge E", "Status": "100% Complete", "Amount": 1000, "End Date": null}),
    ])
    .unwrap();
    let s = screen(&t, &config()).unwrap();
    let f = &s.flags.flags[4];
    assert!(f.ghost);
    assert!(f.reason_ghost.contains("no completion date"), "{}", f.reason_ghost);
}

#[test]
fn three_year_open_project_is_never_ending() {
    let t = Table::from_records(&[
        json!({"Title": "Pier Extension", "Start Date": "2021-06-30", "End Date": null}),
        json!({"Title": "Wharf Repair", "Start Date": "2024-01-15", "End Date": null}),
    ])
    .unwrap();
    let s = screen(&t, &config()).unwrap();
    let f = &s.flags.flags;
    assert!(f[0].never_ending);
    assert!(f[0].reason_never_ending.starts_with("Duration "));
    assert!(f[0].reason_never_ending.contains("≥ 730 days"));
    assert!(!f[1].never_ending);
}

#[test]
fn two_digit_year_start_gives_recent_duration() {
    let t = Table::from_records(&[
        json!({"Title": "Pier Extension", "Start Date": "01/10/24", "End Date": null}),
    ])
    .unwrap();
    let s = screen(&t, &config()).unwrap();
    let p = &s.prepared.projects[0];
    assert_eq!(p.start, NaiveDate::from_ymd_opt(2024, 1, 10));
    assert_eq!(p.duration_days, Some(172));
    assert!(!s.flags.flags[0].never_ending);
    assert!(!s.flags.flags[0].ghost);
}

#[test]
fn single_cost_outlier_is_costly() {
    let records: Vec<Value> = [10.0, 12.0, 11.0, 13.0, 9.0, 500.0]
        .iter()
        .zip(["Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot"])
        .map(|(amount, title)| json!({"Title": title, "Amount": amount, "Length": 1}))
        .collect();
    let s = screen(&Table::from_records(&records).unwrap(), &config()).unwrap();
    let costly: Vec<bool> = s.flags.flags.iter().map(|f| f.costly).collect();
    assert_eq!(costly, [false, false, false, false, false, true]);
    let bounds = s.flags.cost.bounds.unwrap();
    assert!((bounds.low - 6.5).abs() < 1e-9);
    assert!((bounds.high - 16.5).abs() < 1e-9);
}

#[test]
fn missing_contractor_column_still_flags_projects() {
    let records: Vec<Value> = [10.0, 12.0, 11.0, 13.0, 9.0, 500.0]
        .iter()
        .zip(["Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot"])
        .map(|(amount, title)| json!({"Title": title, "Amount": amount, "Length": 1}))
        .collect();
    let s = screen(&Table::from_records(&records).unwrap(), &config()).unwrap();
    assert!(s.contractors.rows.is_empty());
    assert_eq!(s.contractors.note.as_deref(), Some(NO_CONTRACTOR_NOTE));
    assert_eq!(s.flags.summary().costly, 1);
}

#[test]
fn recurring_titles_across_years_are_never_ending() {
    let s = screen(&portfolio(), &config()).unwrap();
    for i in [4, 5, 6] {
        let f = &s.flags.flags[i];
        assert!(f.never_ending);
        assert!(
            f.reason_never_ending.contains("Similar titles across 3 years in same area"),
            "{}",
            f.reason_never_ending
        );
    }
}

#[test]
fn out_of_range_threshold_is_rejected() {
    let cfg = with_flags(FlagThresholds {
        cost_iqr_k: 5.0,
        ..Default::default()
    });
    let err = screen(&portfolio(), &cfg).unwrap_err();
    assert!(err.to_string().contains("cost_iqr_k"));
}
