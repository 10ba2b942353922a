use std::path::PathBuf;

use polars::error::PolarsError;
use rust_xlsxwriter::XlsxError;
use thiserror::Error;

/// Errors that can occur while reading time-series data or writing result workbooks
#[derive(Debug, Error)]
pub enum TabularError {
    /// Error when the data file is neither `.csv` nor `.tsv`
    #[error("Unsupported data file '{0}': expected a .csv or .tsv file")]
    UnsupportedExtension(PathBuf),

    /// Error when the data file cannot be parsed
    #[error("Failed to read data: {0}")]
    Polars(#[from] PolarsError),

    /// Error when the data has no time column
    #[error("Data has no time column (expected one of {expected})")]
    MissingTimeColumn { expected: String },

    /// Error when the data has fewer than two time points
    #[error("Data needs at least 2 time points, found {0}")]
    TooFewRows(usize),

    /// Error when the time column is not strictly increasing
    #[error("Time must be strictly increasing (row {row})")]
    NonIncreasingTime { row: usize },

    /// Error when the time column contains missing values
    #[error("Time column contains missing values (row {row})")]
    MissingTime { row: usize },

    /// Error when a column cannot be interpreted as numbers
    #[error("Column '{column}' is not numeric")]
    NonNumeric { column: String },

    /// Error when the data has no observable columns next to the time column
    #[error("Data contains no observable columns")]
    NoObservables,

    /// Error when writing the workbook fails
    #[error("Failed to write workbook: {0}")]
    Xlsx(#[from] XlsxError),
}
