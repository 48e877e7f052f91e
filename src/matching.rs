//! Matching/Linkage Engine: blocked fuzzy title matching between project
//! records and an external ledger, plus scaffolds for hand-curated
//! canonicalization.
//!
//! Output is a review list. Nothing here asserts that two records are the
//! same project.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use log::{debug, info};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::algo::similarity::{composite_normalized, CompositeScore};
use crate::algo::text;
use crate::columns::{column_pattern, find_columns, Role};
use crate::preprocess::{Prepared, Project};

/// Minimum composite score for a pair to be listed.
pub const ACCEPT_THRESHOLD: f64 = 0.60;
/// Candidates kept per source record.
pub const TOP_K: usize = 5;
/// Ledger columns copied onto each candidate.
pub const MAX_AMOUNT_COLUMNS: usize = 10;
pub const LOCATION_TEMPLATE_CAP: usize = 2000;
pub const TITLE_TEMPLATE_CAP: usize = 5000;
pub const STRATEGY_LABEL: &str = "Fuzzy Flexible (≥0.60)";

static AMOUNT_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    column_pattern(r"(budget|amount|appropriation|gaa|nep|gab|allotment|obligation|cost)")
});
static CODE_LIKE: LazyLock<Regex> = LazyLock::new(|| column_pattern(r"(code|id|contract|uacs|pap)"));

/// Comparison block. Each record takes the most specific key its data
/// supports; only records with identical keys are compared.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlockKey {
    RegionYear(String, i32),
    Region(String),
    ProvinceYear(String, i32),
    Province(String),
    Year(i32),
    Global,
}

impl BlockKey {
    pub fn of(p: &Project) -> Self {
        let region = text::normalize_opt(p.region.as_deref());
        let province = text::normalize_opt(p.province.as_deref());
        match (region.is_empty(), province.is_empty(), p.year) {
            (false, _, Some(y)) => Self::RegionYear(region, y),
            (false, _, None) => Self::Region(region),
            (true, false, Some(y)) => Self::ProvinceYear(province, y),
            (true, false, None) => Self::Province(province),
            (true, true, Some(y)) => Self::Year(y),
            (true, true, None) => Self::Global,
        }
    }

    /// `kind|value|year`, with year 0 when the block has none.
    pub fn label(&self) -> String {
        match self {
            Self::RegionYear(r, y) => format!("region_year|{r}|{y}"),
            Self::Region(r) => format!("region|{r}|0"),
            Self::ProvinceYear(p, y) => format!("prov_year|{p}|{y}"),
            Self::Province(p) => format!("prov|{p}|0"),
            Self::Year(y) => format!("year||{y}"),
            Self::Global => "global||0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub base_row: usize,
    pub budget_row: usize,
    pub block: String,
    pub sim_composite: f64,
    pub sim_jaccard: f64,
    pub sim_partial: f64,
    pub sim_seqratio: f64,
    pub sim_prefix: f64,
    pub base_title: String,
    pub budget_title: String,
    pub base_region: Option<String>,
    pub budget_region: Option<String>,
    pub base_province: Option<String>,
    pub budget_province: Option<String>,
    pub base_city: Option<String>,
    pub budget_city: Option<String>,
    pub base_year: Option<i32>,
    pub budget_year: Option<i32>,
    /// Amount-like ledger fields, keyed `budget::<column>`.
    #[serde(flatten)]
    pub budget_amounts: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocationTemplateRow {
    pub field: String,
    pub base: String,
    pub budget: String,
    pub canonical: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TitlePairRow {
    pub base_title: String,
    pub budget_title: String,
    pub title_canonical: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CodePairRow {
    pub base_column: String,
    pub base_value: String,
    pub budget_column: String,
    pub budget_value: String,
    pub canonical_code: String,
}

/// Code mapping scaffold. Rows start empty; the column lists show where
/// codes might live on each side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodePairTemplate {
    pub base_columns: Vec<String>,
    pub budget_columns: Vec<String>,
    pub rows: Vec<CodePairRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Templates {
    pub location: Vec<LocationTemplateRow>,
    pub title_pairs: Vec<TitlePairRow>,
    pub code_pairs: CodePairTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReport {
    pub candidates: Vec<MatchCandidate>,
    pub templates: Templates,
    pub report: Vec<Value>,
    pub blocks_compared: usize,
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Sorted distinct values of `role`'s column, capped.
fn distinct_values(p: &Prepared, role: Role, cap: usize) -> Vec<String> {
    let mut vals = p
        .columns
        .index(role)
        .map(|c| p.table.distinct_text(c))
        .unwrap_or_default();
    vals.truncate(cap);
    vals
}

fn pad_pair(mut a: Vec<String>, mut b: Vec<String>) -> (Vec<String>, Vec<String>) {
    let n = a.len().max(b.len()).max(1);
    a.resize(n, String::new());
    b.resize(n, String::new());
    (a, b)
}

/// Canonicalization scaffolds for a follow-up curation pass.
pub fn templates(base: &Prepared, budget: &Prepared) -> Templates {
    let mut location = Vec::new();
    for (label, role) in [
        ("Region", Role::Region),
        ("Province", Role::Province),
        ("CityMunicipality", Role::City),
    ] {
        let (left, right) = pad_pair(
            distinct_values(base, role, LOCATION_TEMPLATE_CAP),
            distinct_values(budget, role, LOCATION_TEMPLATE_CAP),
        );
        location.extend(left.into_iter().zip(right).map(|(b, g)| LocationTemplateRow {
            field: label.to_string(),
            base: b,
            budget: g,
            canonical: String::new(),
        }));
    }

    let (left, right) = pad_pair(
        distinct_values(base, Role::Title, TITLE_TEMPLATE_CAP),
        distinct_values(budget, Role::Title, TITLE_TEMPLATE_CAP),
    );
    let title_pairs = left
        .into_iter()
        .zip(right)
        .map(|(b, g)| TitlePairRow {
            base_title: b,
            budget_title: g,
            title_canonical: String::new(),
        })
        .collect();

    let code_cols = |p: &Prepared| -> Vec<String> {
        find_columns(p.table.columns(), &CODE_LIKE)
            .into_iter()
            .map(str::to_string)
            .collect()
    };

    Templates {
        location,
        title_pairs,
        code_pairs: CodePairTemplate {
            base_columns: code_cols(base),
            budget_columns: code_cols(budget),
            rows: Vec::new(),
        },
    }
}

struct Side<'a> {
    project: &'a Project,
    tokens: BTreeSet<String>,
}

fn candidate(
    budget: &Prepared,
    block: &BlockKey,
    a: &Project,
    b: &Project,
    score: CompositeScore,
    amount_cols: &[(usize, String)],
) -> MatchCandidate {
    let budget_amounts = amount_cols
        .iter()
        .map(|(c, name)| (format!("budget::{name}"), budget.table.cell(b.row, *c).clone()))
        .collect();
    let title = |p: &Project| p.title.clone().unwrap_or_default();
    MatchCandidate {
        base_row: a.row,
        budget_row: b.row,
        block: block.label(),
        sim_composite: round4(score.composite),
        sim_jaccard: round4(score.jaccard),
        sim_partial: round4(score.partial),
        sim_seqratio: round4(score.sequence),
        sim_prefix: round4(score.prefix),
        base_title: title(a),
        budget_title: title(b),
        base_region: a.region.clone(),
        budget_region: b.region.clone(),
        base_province: a.province.clone(),
        budget_province: b.province.clone(),
        base_city: a.city.clone(),
        budget_city: b.city.clone(),
        base_year: a.year,
        budget_year: b.year,
        budget_amounts,
    }
}

fn by_block(p: &Prepared) -> BTreeMap<BlockKey, Vec<Side<'_>>> {
    let mut blocks: BTreeMap<BlockKey, Vec<Side<'_>>> = BTreeMap::new();
    for project in p.projects.iter().filter(|p| !p.title_norm.is_empty()) {
        blocks.entry(BlockKey::of(project)).or_default().push(Side {
            project,
            tokens: text::token_set(&project.title_norm),
        });
    }
    blocks
}

/// Ranked candidate pairs between `base` and `budget`, plus templates and
/// a one-row-per-strategy report.
pub fn match_datasets(base: &Prepared, budget: &Prepared) -> MatchReport {
    let base_blocks = by_block(base);
    let budget_blocks = by_block(budget);

    let amount_cols: Vec<(usize, String)> = budget
        .table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| AMOUNT_LIKE.is_match(c))
        .take(MAX_AMOUNT_COLUMNS)
        .map(|(i, c)| (i, c.clone()))
        .collect();

    let shared: Vec<(&BlockKey, &Vec<Side>, &Vec<Side>)> = base_blocks
        .iter()
        .filter_map(|(k, left)| budget_blocks.get(k).map(|right| (k, left, right)))
        .collect();
    info!(
        "Matching {} base blocks against {} ledger blocks ({} shared)",
        base_blocks.len(),
        budget_blocks.len(),
        shared.len()
    );

    let mut candidates = Vec::new();
    for (block, left, right) in &shared {
        let per_record: Vec<Vec<MatchCandidate>> = left
            .par_iter()
            .map(|a| {
                let mut scored: Vec<(&Side, CompositeScore)> = right
                    .iter()
                    .map(|b| {
                        let s = composite_normalized(
                            &a.project.title_norm,
                            &b.project.title_norm,
                            &a.tokens,
                            &b.tokens,
                        );
                        (b, s)
                    })
                    .filter(|(_, s)| s.composite >= ACCEPT_THRESHOLD)
                    .collect();
                scored.sort_by(|x, y| y.1.composite.total_cmp(&x.1.composite));
                scored
                    .into_iter()
                    .take(TOP_K)
                    .map(|(b, s)| candidate(budget, block, a.project, b.project, s, &amount_cols))
                    .collect()
            })
            .collect();
        candidates.extend(per_record.into_iter().flatten());
    }
    debug!("{} candidate pairs at composite ≥ {ACCEPT_THRESHOLD}", candidates.len());

    let templates = templates(base, budget);
    let report = vec![
        json!({
            "Strategy": STRATEGY_LABEL,
            "MatchesFound": candidates.len(),
            "Output": "candidates",
        }),
        json!({
            "Strategy": "Templates Generated",
            "MatchesFound": "PSGC/Title/Code templates ready",
            "Output": "location; title_pairs; code_pairs",
        }),
    ];

    MatchReport {
        blocks_compared: shared.len(),
        candidates,
        templates,
        report,
    }
}
