//! Ipopt options passed through to the generated program.
//!
//! Each option becomes one `set_optimizer_attribute(m, "<key>", <value>)` line, in
//! insertion order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sbml::math::julia_number;

/// Value of a solver option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl OptionValue {
    /// Julia literal of the value
    pub fn to_julia(&self) -> String {
        match self {
            OptionValue::Int(value) => value.to_string(),
            OptionValue::Float(value) => julia_number(*value),
            OptionValue::Str(value) => julia_string(value),
            OptionValue::Bool(value) => value.to_string(),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Int(value) => write!(f, "{value}"),
            OptionValue::Float(value) => write!(f, "{value}"),
            OptionValue::Str(value) => write!(f, "{value}"),
            OptionValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl FromStr for OptionValue {
    type Err = std::convert::Infallible;

    /// Interprets command line input as an integer, float, bool or string, in that order
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = s.parse::<i64>() {
            Ok(OptionValue::Int(value))
        } else if let Ok(value) = s.parse::<f64>() {
            Ok(OptionValue::Float(value))
        } else if let Ok(value) = s.parse::<bool>() {
            Ok(OptionValue::Bool(value))
        } else {
            Ok(OptionValue::Str(s.to_string()))
        }
    }
}

impl TryFrom<&Value> for OptionValue {
    type Error = String;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(value) => Ok(OptionValue::Bool(*value)),
            Value::String(value) => Ok(OptionValue::Str(value.clone())),
            Value::Number(number) => match (number.as_i64(), number.as_f64()) {
                (Some(value), _) => Ok(OptionValue::Int(value)),
                (None, Some(value)) => Ok(OptionValue::Float(value)),
                (None, None) => Err(format!("unsupported number {number}")),
            },
            other => Err(format!("expected a number, string or bool, found {other}")),
        }
    }
}

macro_rules! impl_from_option_value {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for OptionValue {
                fn from(value: $source) -> Self {
                    OptionValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_option_value!(
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f64 => Float,
    &str => Str,
    String => Str,
);

/// Ordered mapping of Ipopt option names to values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Map<String, Value>", into = "serde_json::Map<String, Value>")]
pub struct OptimizerOptions {
    entries: Vec<(String, OptionValue)>,
}

impl OptimizerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option, replacing the value of an existing key in place
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or contains characters that cannot be part
    /// of an Ipopt option name.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<OptionValue>,
    ) -> Result<(), String> {
        let key = key.into();
        validate_key(&key)?;
        let value = value.into();

        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    /// Builder-style variant of [`insert`](Self::insert)
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<OptionValue>,
    ) -> Result<Self, String> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a `key=value` pair as given on the command line
    pub fn parse_pair(pair: &str) -> Result<(String, OptionValue), String> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, found '{pair}'"))?;
        let key = key.trim().to_string();
        validate_key(&key)?;
        let value = value
            .trim()
            .parse::<OptionValue>()
            .unwrap_or_else(|never| match never {});
        Ok((key, value))
    }
}

impl TryFrom<serde_json::Map<String, Value>> for OptimizerOptions {
    type Error = String;

    fn try_from(map: serde_json::Map<String, Value>) -> Result<Self, Self::Error> {
        let mut options = OptimizerOptions::new();
        for (key, value) in map.iter() {
            let value = OptionValue::try_from(value)
                .map_err(|message| format!("option '{key}': {message}"))?;
            options.insert(key.as_str(), value)?;
        }
        Ok(options)
    }
}

impl From<OptimizerOptions> for serde_json::Map<String, Value> {
    fn from(options: OptimizerOptions) -> Self {
        options
            .entries
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    OptionValue::Bool(value) => Value::from(value),
                    OptionValue::Int(value) => Value::from(value),
                    OptionValue::Float(value) => Value::from(value),
                    OptionValue::Str(value) => Value::from(value),
                };
                (key, value)
            })
            .collect()
    }
}

fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("option name must not be empty".to_string());
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("invalid option name '{key}'"));
    }
    Ok(())
}

/// Julia string literal, escaping backslashes, quotes and interpolation
pub fn julia_string(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_keeps_order_and_replaces() {
        let mut options = OptimizerOptions::new();
        options.insert("linear_solver", "mumps").unwrap();
        options.insert("max_iter", 100).unwrap();
        options.insert("linear_solver", "ma27").unwrap();

        let keys: Vec<_> = options.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["linear_solver", "max_iter"]);
        assert_eq!(options.get("linear_solver"), Some(&OptionValue::from("ma27")));
    }

    #[test]
    fn test_invalid_keys() {
        let mut options = OptimizerOptions::new();
        assert!(options.insert("", 1).is_err());
        assert!(options.insert("max iter", 1).is_err());
        assert!(options.is_empty());
    }

    #[test]
    fn test_julia_literals() {
        assert_eq!(OptionValue::Int(3000).to_julia(), "3000");
        assert_eq!(OptionValue::Float(1e-6).to_julia(), "1e-6");
        assert_eq!(OptionValue::Float(0.5).to_julia(), "0.5");
        assert_eq!(OptionValue::Float(f64::INFINITY).to_julia(), "Inf");
        assert_eq!(OptionValue::Float(f64::NEG_INFINITY).to_julia(), "-Inf");
        assert_eq!(OptionValue::Float(f64::NAN).to_julia(), "NaN");
        assert_eq!(OptionValue::Bool(true).to_julia(), "true");
        assert_eq!(OptionValue::from("ma27").to_julia(), "\"ma27\"");
        assert_eq!(OptionValue::from("a\"$b").to_julia(), "\"a\\\"\\$b\"");
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            OptimizerOptions::parse_pair("max_iter=50").unwrap(),
            ("max_iter".to_string(), OptionValue::Int(50))
        );
        assert_eq!(
            OptimizerOptions::parse_pair("tol = 1e-8").unwrap(),
            ("tol".to_string(), OptionValue::Float(1e-8))
        );
        assert_eq!(
            OptimizerOptions::parse_pair("linear_solver=ma57").unwrap().1,
            OptionValue::from("ma57")
        );
        assert!(OptimizerOptions::parse_pair("max_iter").is_err());

        let (_, value) = OptimizerOptions::parse_pair("bound_push=inf").unwrap();
        assert_eq!(value.to_julia(), "Inf");
    }

    #[test]
    fn test_deserialize_keeps_order() {
        let options: OptimizerOptions =
            serde_json::from_value(json!({"tol": 1e-8, "print_level": 0, "linear_solver": "mumps"}))
                .unwrap();

        let keys: Vec<_> = options.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["tol", "print_level", "linear_solver"]);
        assert_eq!(options.get("print_level"), Some(&OptionValue::Int(0)));

        let rejected = serde_json::from_value::<OptimizerOptions>(json!({"tol": [1, 2]}));
        assert!(rejected.is_err());
    }
}
