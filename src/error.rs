use std::io;

use thiserror::Error;

use crate::columns::Role;

/// Failures that mean the caller broke the input contract.
///
/// Data-quality problems (bad dates, non-numeric amounts, missing columns)
/// never surface here; they degrade to absent values and unflagged records.
#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("dataset has no columns")]
    EmptySchema,
    #[error("row {row} has {found} cells but the schema has {expected} columns")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("input is not tabular: {0}")]
    NotTabular(String),
    #[error("override for role '{role}' names column '{column}', which is not in the dataset")]
    UnknownColumn { role: Role, column: String },
    #[error("parameter '{name}' = {value} is outside its allowed range {range}")]
    Config {
        name: &'static str,
        value: String,
        range: &'static str,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ScreenError>;
