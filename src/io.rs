use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::problem::{DisFitError, DisFitProblem, Setting};
use crate::runtime::FitRun;

/// Loads a fitting problem from a JSON configuration file.
///
/// The file is an object with the keys `sbml_path` and `data_path` and, optionally,
/// `t_ratio`, `fold_change`, `n_starts` and `optimizer_options`. Relative paths are
/// resolved against the directory of the configuration file.
///
/// ```json
/// {
///   "sbml_path": "ensa_model.xml",
///   "data_path": "ensa_data.csv",
///   "n_starts": 5,
///   "optimizer_options": { "max_iter": 3000, "linear_solver": "mumps" }
/// }
/// ```
///
/// # Arguments
///
/// * `path` - Path to the JSON configuration file
///
/// # Errors
///
/// Returns [`DisFitError::Config`] if the file cannot be read or is not JSON, and
/// [`DisFitError::InvalidArgument`] for missing paths, unknown keys and invalid values.
pub fn load_config(path: impl Into<PathBuf>) -> Result<DisFitProblem, DisFitError> {
    let path = path.into();
    let file = std::fs::File::open(&path).map_err(IOError::FileNotFound)?;
    let config: Value = serde_json::from_reader(file).map_err(IOError::JsonParseError)?;
    let config = config.as_object().ok_or_else(|| {
        DisFitError::invalid("config", "expected a JSON object at the top level")
    })?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    DisFitProblem::from_config(config, base)
}

impl DisFitProblem {
    /// Creates a problem from a parsed configuration object
    ///
    /// # Arguments
    ///
    /// * `config` - Settings keyed by name, see [`load_config`]
    /// * `base` - Directory relative paths are resolved against
    pub fn from_config(config: &Map<String, Value>, base: &Path) -> Result<Self, DisFitError> {
        let sbml_path = config_path(config, Setting::SbmlPath, base)?;
        let data_path = config_path(config, Setting::DataPath, base)?;
        let mut problem = DisFitProblem::new(sbml_path, data_path)?;

        for (key, value) in config {
            if key == Setting::SbmlPath.as_str() || key == Setting::DataPath.as_str() {
                continue;
            }
            problem.set(key, value)?;
        }

        Ok(problem)
    }
}

fn config_path(
    config: &Map<String, Value>,
    setting: Setting,
    base: &Path,
) -> Result<PathBuf, DisFitError> {
    let field = setting.as_str();
    let value = config
        .get(field)
        .ok_or_else(|| DisFitError::invalid(field, "missing from configuration"))?;
    let path = value.as_str().ok_or_else(|| {
        DisFitError::invalid(field, format!("expected a path string, got {value}"))
    })?;

    let path = PathBuf::from(path);
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(base.join(path))
    }
}

/// Saves fit results and diagnostics to a JSON file.
///
/// # Arguments
///
/// * `path` - Output file, overwritten if it exists
/// * `run` - The results to save
pub fn save_results(path: impl AsRef<Path>, run: &FitRun) -> Result<(), IOError> {
    let file = std::fs::File::create(path.as_ref()).map_err(IOError::FileNotFound)?;
    serde_json::to_writer_pretty(file, run).map_err(IOError::JsonParseError)
}

/// Loads fit results previously written by [`save_results`].
pub fn load_results(path: impl AsRef<Path>) -> Result<FitRun, IOError> {
    let file = std::fs::File::open(path.as_ref()).map_err(IOError::FileNotFound)?;
    serde_json::from_reader(file).map_err(IOError::JsonParseError)
}

/// Represents errors that can occur while reading configuration or result files.
#[derive(Error, Debug)]
pub enum IOError {
    /// Indicates that the specified file could not be found, opened or created.
    #[error("File not found: {0}")]
    FileNotFound(#[from] std::io::Error),

    /// Indicates that the file contents could not be parsed or written as JSON.
    #[error("Failed to parse JSON: {0}")]
    JsonParseError(#[from] serde_json::Error),
}
