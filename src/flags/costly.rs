//! Costly: unit-cost outliers by Tukey fences.

use log::info;
use serde::{Deserialize, Serialize};

use crate::algo::stats::{self, IqrBounds};
use crate::preprocess::Project;

/// Which unit cost the outlier test runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMetric {
    CostPerKm,
    CostPerSqKm,
}

impl CostMetric {
    pub fn unit(&self) -> &'static str {
        match self {
            Self::CostPerKm => "₱/km",
            Self::CostPerSqKm => "₱/sq-km",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CostPerKm => "cost_per_km",
            Self::CostPerSqKm => "cost_per_sq_km",
        }
    }

    pub fn value(&self, p: &Project) -> Option<f64> {
        match self {
            Self::CostPerKm => p.cost_per_km,
            Self::CostPerSqKm => p.cost_per_sq_km,
        }
    }

    /// The metric with more present values; ties go to per-km.
    pub fn choose(km_count: usize, sq_km_count: usize) -> Self {
        if km_count >= sq_km_count {
            Self::CostPerKm
        } else {
            Self::CostPerSqKm
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostlyOutcome {
    pub metric: CostMetric,
    pub bounds: Option<IqrBounds>,
    pub rates: Vec<Option<f64>>,
    pub percentiles: Vec<Option<f64>>,
    pub flagged: Vec<bool>,
    pub reasons: Vec<String>,
}

pub fn detect(projects: &[Project], k: f64) -> CostlyOutcome {
    let km = projects.iter().filter(|p| p.cost_per_km.is_some()).count();
    let sq = projects.iter().filter(|p| p.cost_per_sq_km.is_some()).count();
    let metric = CostMetric::choose(km, sq);

    let rates: Vec<Option<f64>> = projects
        .iter()
        .map(|p| metric.value(p).filter(|v| v.is_finite()))
        .collect();
    let present: Vec<f64> = rates.iter().flatten().copied().collect();
    let bounds = stats::iqr_bounds(&present, k);
    let percentiles = stats::percentile_ranks(&rates);

    match &bounds {
        Some(b) => info!(
            "Cost outliers on {} over {} values: [{:.2}, {:.2}]",
            metric.unit(),
            present.len(),
            b.low,
            b.high
        ),
        None => info!("No {} values; cost outlier test skipped", metric.unit()),
    }

    let mut flagged = vec![false; projects.len()];
    let mut reasons = vec![String::new(); projects.len()];
    if let Some(b) = &bounds {
        for (i, rate) in rates.iter().enumerate() {
            let Some(v) = *rate else { continue };
            if b.contains(v) {
                continue;
            }
            flagged[i] = true;
            let pct = percentiles[i].unwrap_or(0.0) * 100.0;
            reasons[i] = format!(
                "Outlier by IQR in {}: value {:.2} at p{:.0} outside [{:.2}, {:.2}] (k={})",
                metric.unit(),
                v,
                pct,
                b.low,
                b.high,
                k
            );
        }
    }

    CostlyOutcome {
        metric,
        bounds,
        rates,
        percentiles,
        flagged,
        reasons,
    }
}
