use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Failures while reading or validating the transaction file. All of these
/// are fatal to a load.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Data file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Row {row}: invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { row: usize, value: String },

    #[error("Row {row}: invalid {column} '{value}'")]
    InvalidAmount {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("Row {row}: amount must not be negative ({value})")]
    NegativeAmount { row: usize, value: f64 },

    #[error("Row {row}: invalid PPI flag '{value}'")]
    InvalidFlag { row: usize, value: String },

    #[error("Row {row}: unknown contract type '{value}'")]
    UnknownContractType { row: usize, value: String },

    #[error("No transactions in {}", .0.display())]
    Empty(PathBuf),
}

/// Rejected filter input. Callers keep their previous valid criteria.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Unknown contract type: {0}")]
    UnknownContractType(String),
}

#[derive(Error, Debug)]
pub enum SpendError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl From<csv::Error> for SpendError {
    fn from(e: csv::Error) -> Self {
        SpendError::Data(DataError::Csv(e))
    }
}

pub type Result<T> = std::result::Result<T, SpendError>;
