//! Preprocessor: turn raw rows into typed, normalized project records.
//!
//! Everything here depends only on the dataset, the column overrides, the
//! optional grid size and the reference date, so the result can be reused
//! across any number of threshold changes.

use std::sync::LazyLock;

use chrono::NaiveDate;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::algo::dates::{days_between, extract_year, parse_date};
use crate::algo::stats;
use crate::algo::text;
use crate::columns::{self, ColumnMap, ColumnOverrides, Role};
use crate::error::Result;
use crate::table::Table;

static ACCOMPLISHMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:\.\d+)?)").expect("accomplishment pattern is valid")
});

const KM_PER_DEGREE: f64 = 111.32;

/// One input row after preprocessing. `row` indexes back into the source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub row: usize,
    pub title: Option<String>,
    pub title_norm: String,
    /// Normalized title with generic work-type phrases removed.
    pub title_core: String,
    pub contractor: Option<String>,
    pub contractor_norm: String,
    pub status: Option<String>,
    pub region: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub area_key: String,
    pub year: Option<i32>,
    pub amount: Option<f64>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub target: Option<NaiveDate>,
    pub duration_days: Option<i64>,
    pub length_km: Option<f64>,
    pub area_sq_km: Option<f64>,
    pub cost_per_km: Option<f64>,
    pub cost_per_sq_km: Option<f64>,
    pub accomplishment_pct: Option<f64>,
}

impl Project {
    /// Status mentions completion, or accomplishment is at least 99%.
    pub fn is_completeish(&self) -> bool {
        let by_status = self
            .status
            .as_deref()
            .map(|s| s.to_lowercase().contains("complete"))
            .unwrap_or(false);
        by_status || self.accomplishment_pct.unwrap_or(0.0) >= 99.0
    }

    /// Derived columns appended to the annotated output.
    pub fn derived_fields(&self) -> Map<String, Value> {
        let date = |d: Option<NaiveDate>| d.map(|d| d.format("%Y-%m-%d").to_string());
        let mut m = Map::new();
        m.insert("_area_key".into(), json!(self.area_key));
        m.insert("_year".into(), json!(self.year));
        m.insert("_amount".into(), json!(self.amount));
        m.insert("_start_date".into(), json!(date(self.start)));
        m.insert("_end_date".into(), json!(date(self.end)));
        m.insert("_target_date".into(), json!(date(self.target)));
        m.insert("_duration_days".into(), json!(self.duration_days));
        m.insert("_length_km".into(), json!(self.length_km));
        m.insert("_area_sq_km".into(), json!(self.area_sq_km));
        m.insert("_cost_per_km".into(), json!(self.cost_per_km));
        m.insert("_cost_per_sq_km".into(), json!(self.cost_per_sq_km));
        m.insert("_accomplishment_pct".into(), json!(self.accomplishment_pct));
        m.insert("_title_norm".into(), json!(self.title_norm));
        m.insert("_contractor_norm".into(), json!(self.contractor_norm));
        m
    }
}

/// Unit inferred for a length or area column and the factor applied to reach
/// km or sq-km.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitScale {
    pub column: String,
    pub unit: String,
    pub factor: f64,
}

impl UnitScale {
    /// Median > 1000 reads as meters.
    pub fn for_length(column: &str, median: Option<f64>) -> Self {
        let (unit, factor) = match median {
            Some(m) if m > 1000.0 => ("m", 0.001),
            _ => ("km", 1.0),
        };
        Self {
            column: column.to_string(),
            unit: unit.into(),
            factor,
        }
    }

    /// Median > 100000 reads as square meters, [1, 10000] as hectares.
    pub fn for_area(column: &str, median: Option<f64>) -> Self {
        let (unit, factor) = match median {
            Some(m) if m > 100_000.0 => ("sq-m", 1e-6),
            Some(m) if (1.0..=10_000.0).contains(&m) => ("ha", 0.01),
            _ => ("sq-km", 1.0),
        };
        Self {
            column: column.to_string(),
            unit: unit.into(),
            factor,
        }
    }
}

/// How area keys were built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaStrategy {
    Administrative,
    Location,
    GeoGrid,
    None,
}

/// Output of the Preprocessor: the untouched source table, the resolved
/// column map, and one `Project` per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prepared {
    pub table: Table,
    pub columns: ColumnMap,
    pub projects: Vec<Project>,
    pub length_scale: Option<UnitScale>,
    pub area_scale: Option<UnitScale>,
    pub area_strategy: AreaStrategy,
    pub as_of: NaiveDate,
}

impl Prepared {
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn unit_audit(&self) -> Value {
        json!({
            "length": self.length_scale,
            "area": self.area_scale,
            "area_strategy": self.area_strategy,
            "as_of": self.as_of.format("%Y-%m-%d").to_string(),
        })
    }
}

/// Run column detection and derive every per-record attribute.
pub fn preprocess(
    table: &Table,
    overrides: &ColumnOverrides,
    geo_cell_km: Option<f64>,
    as_of: NaiveDate,
) -> Result<Prepared> {
    let cols = columns::detect(table.columns(), overrides)?;
    let text_of = |role: Role, row: usize| cols.index(role).and_then(|c| table.text(row, c));
    let number_of = |role: Role, row: usize| cols.index(role).and_then(|c| table.number(row, c));
    let date_of = |role: Role, row: usize| text_of(role, row).and_then(|s| parse_date(&s));

    let length_raw: Vec<Option<f64>> = (0..table.len()).map(|i| number_of(Role::Length, i)).collect();
    let area_raw: Vec<Option<f64>> = (0..table.len()).map(|i| number_of(Role::Area, i)).collect();
    let length_scale = cols
        .name(Role::Length)
        .map(|c| UnitScale::for_length(c, stats::median(&present(&length_raw))));
    let area_scale = cols
        .name(Role::Area)
        .map(|c| UnitScale::for_area(c, stats::median(&present(&area_raw))));
    if let Some(s) = &length_scale {
        info!("Length column '{}' read as {} (x{})", s.column, s.unit, s.factor);
    }
    if let Some(s) = &area_scale {
        info!("Area column '{}' read as {} (x{})", s.column, s.unit, s.factor);
    }

    let admin_roles = [Role::Region, Role::Province, Role::City, Role::Barangay];
    let has_admin = admin_roles.iter().any(|r| cols.has(*r));
    let grid = match geo_cell_km {
        Some(km) if cols.has(Role::Latitude) && cols.has(Role::Longitude) => Some(km),
        _ => None,
    };
    let area_strategy = if grid.is_some() {
        AreaStrategy::GeoGrid
    } else if has_admin {
        AreaStrategy::Administrative
    } else if cols.has(Role::Location) {
        AreaStrategy::Location
    } else {
        AreaStrategy::None
    };
    debug!("Area keys built with {area_strategy:?} strategy");

    let mut projects = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let title = text_of(Role::Title, row);
        let title_norm = text::normalize_opt(title.as_deref());
        let title_core = text::strip_generic_phrases(&title_norm);
        let contractor = text_of(Role::Contractor, row);
        let contractor_norm = text::normalize_opt(contractor.as_deref());
        let status = text_of(Role::Status, row);

        let admin_key = || -> String {
            if has_admin {
                admin_roles
                    .iter()
                    .filter(|r| cols.has(**r))
                    .map(|r| text::normalize_opt(text_of(*r, row).as_deref()))
                    .collect::<Vec<_>>()
                    .join(", ")
            } else {
                text::normalize_opt(text_of(Role::Location, row).as_deref())
            }
        };
        let area_key = match grid {
            Some(km) => match (number_of(Role::Latitude, row), number_of(Role::Longitude, row)) {
                (Some(lat), Some(lon)) => grid_cell(lat, lon, km),
                _ => admin_key(),
            },
            None => admin_key(),
        };

        let start = date_of(Role::Start, row);
        let end = date_of(Role::End, row);
        let target = date_of(Role::Target, row);
        let year = if cols.has(Role::Year) {
            text_of(Role::Year, row).and_then(|s| extract_year(&s))
        } else {
            [start, end, target]
                .into_iter()
                .flatten()
                .next()
                .map(|d| chrono::Datelike::year(&d))
        };
        let duration_days = match (start, end) {
            (Some(s), Some(e)) => Some(days_between(s, e)),
            (Some(s), None) => Some(days_between(s, as_of)),
            _ => None,
        };

        let amount = number_of(Role::Amount, row);
        let length_km = match (&length_scale, length_raw[row]) {
            (Some(s), Some(v)) => Some(v * s.factor),
            _ => None,
        };
        let area_sq_km = match (&area_scale, area_raw[row]) {
            (Some(s), Some(v)) => Some(v * s.factor),
            _ => None,
        };

        let accomplishment_pct = status.as_deref().and_then(|s| {
            ACCOMPLISHMENT_RE
                .captures(s)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(|v| v.clamp(0.0, 100.0))
        });

        projects.push(Project {
            row,
            title,
            title_norm,
            title_core,
            contractor,
            contractor_norm,
            status,
            region: text_of(Role::Region, row).map(|s| s.trim().to_string()),
            province: text_of(Role::Province, row).map(|s| s.trim().to_string()),
            city: text_of(Role::City, row).map(|s| s.trim().to_string()),
            area_key,
            year,
            amount,
            start,
            end,
            target,
            duration_days,
            length_km,
            area_sq_km,
            cost_per_km: safe_div(amount, length_km),
            cost_per_sq_km: safe_div(amount, area_sq_km),
            accomplishment_pct,
        });
    }

    info!(
        "Preprocessed {} records ({} with a title, {} with an amount)",
        projects.len(),
        projects.iter().filter(|p| p.title.is_some()).count(),
        projects.iter().filter(|p| p.amount.is_some()).count()
    );

    Ok(Prepared {
        table: table.clone(),
        columns: cols,
        projects,
        length_scale,
        area_scale,
        area_strategy,
        as_of,
    })
}

/// `a / b`, absent when either side is missing or the result is not finite.
pub fn safe_div(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) if b != 0.0 => Some(a / b).filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Square grid cell of roughly `km` on a side containing (lat, lon).
pub fn grid_cell(lat: f64, lon: f64, km: f64) -> String {
    let i = (lat * KM_PER_DEGREE / km).floor() as i64;
    let j = (lon * KM_PER_DEGREE * lat.to_radians().cos() / km).floor() as i64;
    format!("cell:{i}:{j}")
}

fn present(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().flatten().copied().collect()
}
