use thiserror::Error;

use crate::io::IOError;
use crate::plotting::PlotError;
use crate::runtime::ExecutionError;
use crate::tabular::TabularError;

/// Errors returned by [`DisFitProblem`](crate::problem::DisFitProblem)
#[derive(Debug, Error)]
pub enum DisFitError {
    /// Error when a setter or constructor receives a value of the wrong type or domain
    #[error("Invalid {field}: {message}")]
    InvalidArgument { field: &'static str, message: String },

    /// Error when an operation needs results but `optimize` has not succeeded yet
    #[error("No results available, run optimize first")]
    MissingResults,

    /// Error when running the generated program fails
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Error when writing an output file fails
    #[error("Failed to write file: {0}")]
    Io(#[from] std::io::Error),

    /// Error when writing the results workbook fails
    #[error(transparent)]
    Tabular(#[from] TabularError),

    /// Error when rendering the plot document fails
    #[error(transparent)]
    Plot(PlotError),

    /// Error when exporting results to JSON fails
    #[error("Failed to serialize results: {0}")]
    Json(#[from] serde_json::Error),

    /// Error when a configuration file cannot be read
    #[error("Failed to load configuration: {0}")]
    Config(#[from] IOError),
}

impl DisFitError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        DisFitError::InvalidArgument {
            field,
            message: message.into(),
        }
    }
}

impl From<PlotError> for DisFitError {
    fn from(error: PlotError) -> Self {
        match error {
            PlotError::UnknownVariable(name) => DisFitError::invalid(
                "variables",
                format!("'{name}' is not a simulated state"),
            ),
            other => DisFitError::Plot(other),
        }
    }
}
