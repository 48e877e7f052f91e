//! Screening parameters, their defaults, and range validation.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::columns::ColumnOverrides;
use crate::error::{Result, ScreenError};

/// Thresholds consumed by the Flag Engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagThresholds {
    /// Title similarity in [0, 1] linking two records as duplicates.
    pub redundant_similarity: f64,
    /// Amount percentile above which a record counts as high-amount.
    pub ghost_high_amount_percentile: f64,
    pub never_ending_days: i64,
    /// Tukey fence multiplier.
    pub cost_iqr_k: f64,
    pub use_target_overrun: bool,
    pub grace_days: i64,
}

impl Default for FlagThresholds {
    fn default() -> Self {
        Self {
            redundant_similarity: 0.60,
            ghost_high_amount_percentile: 75.0,
            never_ending_days: 730,
            cost_iqr_k: 1.5,
            use_target_overrun: true,
            grace_days: 60,
        }
    }
}

impl FlagThresholds {
    pub fn validate(&self) -> Result<()> {
        check_range(
            "redundant_similarity",
            self.redundant_similarity,
            0.40,
            0.95,
            "[0.40, 0.95]",
        )?;
        check_range(
            "ghost_high_amount_percentile",
            self.ghost_high_amount_percentile,
            50.0,
            95.0,
            "[50, 95]",
        )?;
        check_range(
            "never_ending_days",
            self.never_ending_days as f64,
            365.0,
            1825.0,
            "[365, 1825]",
        )?;
        check_range("cost_iqr_k", self.cost_iqr_k, 0.5, 3.0, "[0.5, 3.0]")?;
        check_range("grace_days", self.grace_days as f64, 0.0, 365.0, "[0, 365]")?;
        Ok(())
    }
}

/// Thresholds consumed by the Contractor Aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractorThresholds {
    pub concentration_share: f64,
    pub min_repeated_flags: usize,
    pub high_cost_percentile: f64,
}

impl Default for ContractorThresholds {
    fn default() -> Self {
        Self {
            concentration_share: 0.30,
            min_repeated_flags: 3,
            high_cost_percentile: 90.0,
        }
    }
}

impl ContractorThresholds {
    pub fn validate(&self) -> Result<()> {
        check_range(
            "concentration_share",
            self.concentration_share,
            0.10,
            0.90,
            "[0.10, 0.90]",
        )?;
        check_range(
            "min_repeated_flags",
            self.min_repeated_flags as f64,
            1.0,
            100.0,
            "[1, 100]",
        )?;
        check_range(
            "high_cost_percentile",
            self.high_cost_percentile,
            60.0,
            99.0,
            "[60, 99]",
        )?;
        Ok(())
    }
}

/// Everything a screening run needs besides the dataset itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub flags: FlagThresholds,
    pub contractors: ContractorThresholds,
    pub overrides: ColumnOverrides,
    /// Bucket records by a lat/lon grid of this many kilometers instead of
    /// administrative names, when coordinates are present.
    pub geo_cell_km: Option<f64>,
    /// Reference date standing in for "today". Unset means the local date.
    pub as_of: Option<NaiveDate>,
}

impl ScreeningConfig {
    /// Reject any parameter outside its declared range.
    pub fn validate(&self) -> Result<()> {
        self.flags.validate()?;
        self.contractors.validate()?;
        if let Some(km) = self.geo_cell_km {
            if !km.is_finite() || km <= 0.0 {
                return Err(ScreenError::Config {
                    name: "geo_cell_km",
                    value: km.to_string(),
                    range: "(0, inf)",
                });
            }
        }
        Ok(())
    }

    pub fn as_of_or_today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

fn check_range(name: &'static str, value: f64, lo: f64, hi: f64, range: &'static str) -> Result<()> {
    if value.is_finite() && value >= lo && value <= hi {
        Ok(())
    } else {
        Err(ScreenError::Config {
            name,
            value: value.to_string(),
            range,
        })
    }
}
