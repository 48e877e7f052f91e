//! Redundant: near-duplicate titles within one (area, year) cluster.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use rayon::prelude::*;

use crate::algo::graph::connected_components;
use crate::algo::similarity::token_set_ratio;
use crate::algo::text;
use crate::preprocess::Project;

/// Shared non-generic tokens two titles need before they can link.
pub const MIN_SHARED_TOKENS: usize = 2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedundantOutcome {
    pub flagged: Vec<bool>,
    pub group: Vec<Option<u32>>,
    pub peers: Vec<Vec<String>>,
    pub reasons: Vec<String>,
    pub groups: usize,
}

/// Records grouped by `(area_key, year)` in key order. Records without a
/// title are left out.
pub fn clusters(projects: &[Project]) -> Vec<Vec<usize>> {
    let mut by_key: BTreeMap<(&str, Option<i32>), Vec<usize>> = BTreeMap::new();
    for (i, p) in projects.iter().enumerate() {
        if p.title.is_some() {
            by_key.entry((p.area_key.as_str(), p.year)).or_default().push(i);
        }
    }
    by_key.into_values().collect()
}

/// Link two titles when their core token-set ratio reaches `threshold_pct`
/// and they share enough distinguishing tokens.
pub fn linked(
    core_a: &str,
    core_b: &str,
    tokens_a: &BTreeSet<String>,
    tokens_b: &BTreeSet<String>,
    threshold_pct: f64,
) -> bool {
    token_set_ratio(core_a, core_b) >= threshold_pct
        && text::distinguishing_overlap(tokens_a, tokens_b) >= MIN_SHARED_TOKENS
}

/// Connected components of size ≥ 2 within one cluster, as indices into
/// `projects`.
fn cluster_components(projects: &[Project], members: &[usize], threshold_pct: f64) -> Vec<Vec<usize>> {
    let tokens: Vec<BTreeSet<String>> = members
        .iter()
        .map(|&i| text::token_set(&projects[i].title_core))
        .collect();

    let mut edges = Vec::new();
    for a in 0..members.len() {
        for b in (a + 1)..members.len() {
            let pa = &projects[members[a]];
            let pb = &projects[members[b]];
            if linked(&pa.title_core, &pb.title_core, &tokens[a], &tokens[b], threshold_pct) {
                edges.push((a, b));
            }
        }
    }

    connected_components(members.len(), &edges, 2)
        .into_iter()
        .map(|comp| comp.into_iter().map(|local| members[local]).collect())
        .collect()
}

/// Flag every member of a duplicate chain. Group ids run from 1 in cluster
/// order, then by each component's first record.
pub fn detect(projects: &[Project], similarity: f64) -> RedundantOutcome {
    let n = projects.len();
    let mut out = RedundantOutcome {
        flagged: vec![false; n],
        group: vec![None; n],
        peers: vec![Vec::new(); n],
        reasons: vec![String::new(); n],
        groups: 0,
    };

    let threshold_pct = (similarity * 100.0).round();
    let clusters: Vec<Vec<usize>> = clusters(projects)
        .into_iter()
        .filter(|c| c.len() >= 2)
        .collect();
    debug!("Redundancy scan over {} multi-record clusters", clusters.len());

    let components: Vec<Vec<Vec<usize>>> = clusters
        .par_iter()
        .map(|members| cluster_components(projects, members, threshold_pct))
        .collect();

    let mut gid = 0u32;
    for comp in components.into_iter().flatten() {
        gid += 1;
        let reason = format!("Similar title(s) within same area-year; {} in group", comp.len());
        for &i in &comp {
            out.flagged[i] = true;
            out.group[i] = Some(gid);
            out.peers[i] = comp
                .iter()
                .filter(|&&j| j != i)
                .filter_map(|&j| projects[j].title.clone())
                .collect();
            out.reasons[i] = reason.clone();
        }
    }
    out.groups = gid as usize;
    out
}
