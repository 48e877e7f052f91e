//! Anomaly screening for public infrastructure project records.
//!
//! The pipeline is split in two: [`preprocess`] depends only on the dataset
//! and column overrides, and [`flags::compute_flags`] plus
//! [`contractor::aggregate`] are cheap and threshold-dependent. Callers that
//! tweak thresholds interactively keep the [`Prepared`] and rerun only the
//! second half.

pub mod algo;
pub mod columns;
pub mod config;
pub mod contractor;
pub mod error;
pub mod flags;
pub mod matching;
pub mod ops;
pub mod preprocess;
pub mod table;

pub use columns::{ColumnMap, ColumnOverrides, Role};
pub use config::{ContractorThresholds, FlagThresholds, ScreeningConfig};
pub use error::{Result, ScreenError};
pub use preprocess::{Prepared, Project};
pub use table::Table;

use contractor::ContractorReport;
use flags::FlagReport;

/// Everything one screening run produces.
#[derive(Debug, Clone)]
pub struct Screening {
    pub prepared: Prepared,
    pub flags: FlagReport,
    pub contractors: ContractorReport,
}

/// Validate the configuration and preprocess `table`.
pub fn prepare(table: &Table, config: &ScreeningConfig) -> Result<Prepared> {
    config.validate()?;
    preprocess::preprocess(
        table,
        &config.overrides,
        config.geo_cell_km,
        config.as_of_or_today(),
    )
}

/// Threshold-dependent half of the pipeline over an existing [`Prepared`].
pub fn screen_prepared(prepared: Prepared, config: &ScreeningConfig) -> Result<Screening> {
    config.validate()?;
    let flags = flags::compute_flags(&prepared, &config.flags);
    let contractors = contractor::aggregate(&prepared, &flags, &config.contractors);
    Ok(Screening {
        prepared,
        flags,
        contractors,
    })
}

/// Full pipeline: preprocess, flag, aggregate.
pub fn screen(table: &Table, config: &ScreeningConfig) -> Result<Screening> {
    let prepared = prepare(table, config)?;
    screen_prepared(prepared, config)
}
