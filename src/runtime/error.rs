use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors that can occur while running the generated program or reading its artifact
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Error when the runtime executable cannot be started
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Error when the runtime exits with a non-zero status
    #[error("Solver runtime exited with {status}:\n{stderr}")]
    NonZeroExit { status: ExitStatus, stderr: String },

    /// Error when the runtime exits successfully but writes no artifact
    #[error("Solver runtime did not write the result artifact {0}")]
    MissingArtifact(PathBuf),

    /// Error when the artifact does not have the expected structure
    #[error("Malformed result artifact: {0}")]
    MalformedArtifact(String),

    /// Error when the artifact is not valid JSON
    #[error("Failed to parse result artifact: {0}")]
    Json(#[from] serde_json::Error),

    /// Error when the temporary workspace cannot be prepared
    #[error("Failed to prepare solver workspace: {0}")]
    Workspace(#[from] std::io::Error),
}
