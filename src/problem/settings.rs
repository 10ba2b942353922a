use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use super::error::DisFitError;
use super::problem::DisFitProblem;
use crate::codegen::OptimizerOptions;

/// Settings of a [`DisFitProblem`] addressable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    SbmlPath,
    DataPath,
    TRatio,
    FoldChange,
    NStarts,
    OptimizerOptions,
}

impl Setting {
    pub const ALL: [Setting; 6] = [
        Setting::SbmlPath,
        Setting::DataPath,
        Setting::TRatio,
        Setting::FoldChange,
        Setting::NStarts,
        Setting::OptimizerOptions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Setting::SbmlPath => "sbml_path",
            Setting::DataPath => "data_path",
            Setting::TRatio => "t_ratio",
            Setting::FoldChange => "fold_change",
            Setting::NStarts => "n_starts",
            Setting::OptimizerOptions => "optimizer_options",
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Setting {
    type Err = DisFitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Setting::ALL
            .into_iter()
            .find(|setting| setting.as_str() == s)
            .ok_or_else(|| {
                DisFitError::invalid(
                    "setting",
                    format!(
                        "unknown setting '{s}', expected one of {}",
                        Setting::ALL.map(|setting| setting.as_str()).join(", ")
                    ),
                )
            })
    }
}

impl DisFitProblem {
    /// Sets a value by name from loosely typed input such as a config file
    ///
    /// Integer settings only accept JSON integers; strings and floats (even `2.0`) are
    /// rejected. Paths must be strings and `optimizer_options` an object.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use disfit::prelude::*;
    /// # let mut problem = DisFitProblem::new("model.xml", "data.csv")?;
    /// problem.set("n_starts", &serde_json::json!(10))?;
    /// assert!(problem.set("n_starts", &serde_json::json!("10")).is_err());
    /// # Ok::<(), DisFitError>(())
    /// ```
    pub fn set(&mut self, key: &str, value: &Value) -> Result<(), DisFitError> {
        let setting: Setting = key.parse()?;
        let field = setting.as_str();

        match setting {
            Setting::SbmlPath => self.set_sbml_path(path_value(field, value)?),
            Setting::DataPath => self.set_data_path(path_value(field, value)?),
            Setting::TRatio => self.set_t_ratio(integer_value(field, value)?),
            Setting::FoldChange => self.set_fold_change(integer_value(field, value)?),
            Setting::NStarts => self.set_n_starts(integer_value(field, value)?),
            Setting::OptimizerOptions => {
                let map = value.as_object().ok_or_else(|| {
                    DisFitError::invalid(field, format!("expected an object, got {value}"))
                })?;
                let options = OptimizerOptions::try_from(map.clone())
                    .map_err(|message| DisFitError::invalid(field, message))?;
                self.set_optimizer_options(options);
                Ok(())
            }
        }
    }

    /// Current value of a setting as JSON
    pub fn get(&self, setting: Setting) -> Value {
        match setting {
            Setting::SbmlPath => Value::from(self.sbml_path().display().to_string()),
            Setting::DataPath => Value::from(self.data_path().display().to_string()),
            Setting::TRatio => Value::from(self.t_ratio()),
            Setting::FoldChange => Value::from(self.fold_change()),
            Setting::NStarts => Value::from(self.n_starts()),
            Setting::OptimizerOptions => {
                Value::Object(self.optimizer_options().clone().into())
            }
        }
    }
}

fn integer_value(field: &'static str, value: &Value) -> Result<i64, DisFitError> {
    match value {
        Value::Number(number) if number.is_i64() || number.is_u64() => number
            .as_i64()
            .ok_or_else(|| DisFitError::invalid(field, format!("{number} is out of range"))),
        other => Err(DisFitError::invalid(
            field,
            format!("expected an integer, got {other}"),
        )),
    }
}

fn path_value<'a>(field: &'static str, value: &'a Value) -> Result<&'a str, DisFitError> {
    value.as_str().ok_or_else(|| {
        DisFitError::invalid(field, format!("expected a path string, got {value}"))
    })
}
