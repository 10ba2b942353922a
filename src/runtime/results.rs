//! Fit Results Module
//!
//! The generated program writes one JSON artifact holding the outcome of every
//! restart:
//!
//! ```json
//! {
//!   "t_sim": [0.0, 0.5, 1.0],
//!   "x": { "1": { "k1": 0.31 } },
//!   "states": { "1": { "S": [1.0, 0.86, 0.74] } },
//!   "objective": { "1": 0.0012 },
//!   "status": { "1": "LOCALLY_SOLVED" }
//! }
//! ```
//!
//! Julia writes `NaN` as `null`, so every number may be missing and is read back as
//! `NaN`. [`parse_results`] validates the artifact and splits it into the
//! [`FitResults`] of the fit and the per-restart [`FitTrace`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::ExecutionError;

/// Fitted value of one parameter in the best restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestFitParameter {
    pub parameter: String,
    pub value: f64,
}

/// Outcome of a fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResults {
    /// Restart index (starting at 1) to parameter name to fitted value
    pub x: BTreeMap<usize, BTreeMap<String, f64>>,
    /// Parameters of the restart with the lowest objective value
    pub x_best: Vec<BestFitParameter>,
    /// Restart index to state name to values on the simulation grid
    pub states: BTreeMap<usize, BTreeMap<String, Vec<f64>>>,
}

impl FitResults {
    /// Names of the simulated states, sorted
    pub fn state_names(&self) -> Vec<&str> {
        self.states
            .values()
            .next()
            .map(|states| states.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Names of the fitted parameters, sorted
    pub fn parameter_names(&self) -> Vec<&str> {
        self.x
            .values()
            .next()
            .map(|x| x.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Best-fit value of a parameter
    pub fn best(&self, parameter: &str) -> Option<f64> {
        self.x_best
            .iter()
            .find(|row| row.parameter == parameter)
            .map(|row| row.value)
    }
}

/// Solver diagnostics of a fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitTrace {
    /// The simulation time grid the states are reported on
    pub time: Vec<f64>,
    /// Objective value per restart
    pub objective: BTreeMap<usize, f64>,
    /// Solver termination status per restart
    pub status: BTreeMap<usize, String>,
    /// Restart the best-fit parameters are taken from
    pub best_start: usize,
}

/// Results and diagnostics of one `optimize` run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRun {
    pub results: FitResults,
    pub trace: FitTrace,
}

#[derive(Deserialize)]
struct RawArtifact {
    t_sim: Vec<Option<f64>>,
    x: BTreeMap<String, BTreeMap<String, Option<f64>>>,
    states: BTreeMap<String, BTreeMap<String, Vec<Option<f64>>>>,
    #[serde(default)]
    objective: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    status: BTreeMap<String, String>,
}

/// Parses the JSON artifact written by the generated program
///
/// # Arguments
///
/// * `json` - Content of the artifact
///
/// # Returns
///
/// The fit results and diagnostics, or [`ExecutionError::MalformedArtifact`] if the
/// artifact is incomplete or inconsistent
pub fn parse_results(json: &str) -> Result<FitRun, ExecutionError> {
    let raw: RawArtifact = serde_json::from_str(json)?;

    let time = values(raw.t_sim);
    if time.is_empty() {
        return Err(malformed("empty simulation time grid"));
    }

    let x = reindex(raw.x)?
        .into_iter()
        .map(|(start, x)| {
            let x = x
                .into_iter()
                .map(|(name, value)| (name, value.unwrap_or(f64::NAN)))
                .collect();
            (start, x)
        })
        .collect::<BTreeMap<usize, BTreeMap<String, f64>>>();

    if x.is_empty() {
        return Err(malformed("no restarts"));
    }

    let states = reindex(raw.states)?
        .into_iter()
        .map(|(start, states)| {
            let states = states
                .into_iter()
                .map(|(name, trajectory)| (name, values(trajectory)))
                .collect();
            (start, states)
        })
        .collect::<BTreeMap<usize, BTreeMap<String, Vec<f64>>>>();

    check_consistency(&x, &states, time.len())?;

    let objective = reindex(raw.objective)?
        .into_iter()
        .map(|(start, value)| (start, value.unwrap_or(f64::NAN)))
        .collect::<BTreeMap<_, _>>();
    let status = reindex(raw.status)?;

    let best_start = best_start(&x, &objective);
    let x_best = x
        .get(&best_start)
        .into_iter()
        .flatten()
        .map(|(parameter, value)| BestFitParameter {
            parameter: parameter.clone(),
            value: *value,
        })
        .collect();

    Ok(FitRun {
        results: FitResults { x, x_best, states },
        trace: FitTrace {
            time,
            objective,
            status,
            best_start,
        },
    })
}

fn check_consistency(
    x: &BTreeMap<usize, BTreeMap<String, f64>>,
    states: &BTreeMap<usize, BTreeMap<String, Vec<f64>>>,
    n_time: usize,
) -> Result<(), ExecutionError> {
    if x.keys().ne(states.keys()) {
        return Err(malformed("restarts of 'x' and 'states' differ"));
    }

    let parameters: Vec<&String> = x
        .values()
        .next()
        .map(|p| p.keys().collect())
        .unwrap_or_default();
    if x.values().any(|p| p.keys().ne(parameters.iter().copied())) {
        return Err(malformed("restarts report different parameters"));
    }

    let names: Vec<&String> = states
        .values()
        .next()
        .map(|s| s.keys().collect())
        .unwrap_or_default();
    for (start, trajectories) in states {
        if trajectories.keys().ne(names.iter().copied()) {
            return Err(malformed("restarts report different states"));
        }
        if let Some((name, values)) = trajectories.iter().find(|(_, v)| v.len() != n_time) {
            return Err(malformed(&format!(
                "state '{name}' of restart {start} has {} values, expected {n_time}",
                values.len()
            )));
        }
    }

    Ok(())
}

/// Restart with the lowest objective, falling back to the first restart
fn best_start(
    x: &BTreeMap<usize, BTreeMap<String, f64>>,
    objective: &BTreeMap<usize, f64>,
) -> usize {
    let first = x.keys().next().copied().unwrap_or(1);

    objective
        .iter()
        .filter(|(start, value)| x.contains_key(start) && !value.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (start, value)| match best {
            Some((_, lowest)) if lowest <= *value => best,
            _ => Some((*start, *value)),
        })
        .map(|(start, _)| start)
        .unwrap_or_else(|| {
            log::warn!("No restart reports an objective value, using restart {first}");
            first
        })
}

fn reindex<T>(map: BTreeMap<String, T>) -> Result<BTreeMap<usize, T>, ExecutionError> {
    map.into_iter()
        .map(|(key, value)| {
            key.parse::<usize>()
                .map(|start| (start, value))
                .map_err(|_| malformed(&format!("restart key '{key}' is not an integer")))
        })
        .collect()
}

fn values(values: Vec<Option<f64>>) -> Vec<f64> {
    values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

fn malformed(message: &str) -> ExecutionError {
    ExecutionError::MalformedArtifact(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ARTIFACT: &str = r#"{
        "t_sim": [0.0, 1.0],
        "x": {"1": {"k": 0.5, "a": 1.0}, "2": {"k": 0.4, "a": 1.1}},
        "states": {"1": {"S": [1.0, 0.6]}, "2": {"S": [1.0, null]}},
        "objective": {"1": 0.2, "2": 0.1},
        "status": {"1": "LOCALLY_SOLVED", "2": "LOCALLY_SOLVED"}
    }"#;

    #[test]
    fn test_parse_results() {
        let run = parse_results(ARTIFACT).unwrap();

        assert_eq!(run.results.x.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(run.results.parameter_names(), vec!["a", "k"]);
        assert_eq!(run.results.state_names(), vec!["S"]);
        assert!(run.results.states[&2]["S"][1].is_nan());
        assert_eq!(run.trace.time, vec![0.0, 1.0]);
        assert_eq!(run.trace.status[&1], "LOCALLY_SOLVED");
    }

    #[test]
    fn test_best_fit_uses_lowest_objective() {
        let run = parse_results(ARTIFACT).unwrap();

        assert_eq!(run.trace.best_start, 2);
        assert_relative_eq!(run.results.best("k").unwrap(), 0.4);
        assert_relative_eq!(run.results.best("a").unwrap(), 1.1);
    }

    #[test]
    fn test_best_fit_ignores_missing_objective() {
        let json = ARTIFACT.replace(r#""2": 0.1"#, r#""2": null"#);
        let run = parse_results(&json).unwrap();
        assert_eq!(run.trace.best_start, 1);
    }

    #[test]
    fn test_best_fit_without_objective() {
        let json = r#"{"t_sim": [0.0], "x": {"3": {"k": 1.0}}, "states": {"3": {"S": [1.0]}}}"#;
        let run = parse_results(json).unwrap();
        assert_eq!(run.trace.best_start, 3);
    }

    #[test]
    fn test_missing_key() {
        let json = r#"{"t_sim": [0.0], "x": {"1": {"k": 1.0}}}"#;
        assert!(matches!(parse_results(json), Err(ExecutionError::Json(_))));
    }

    #[test]
    fn test_inconsistent_restarts() {
        let json = r#"{"t_sim": [0.0], "x": {"1": {"k": 1.0}}, "states": {"2": {"S": [1.0]}}}"#;
        assert!(matches!(
            parse_results(json),
            Err(ExecutionError::MalformedArtifact(_))
        ));
    }

    #[test]
    fn test_trajectory_length_mismatch() {
        let json = r#"{"t_sim": [0.0, 1.0], "x": {"1": {"k": 1.0}}, "states": {"1": {"S": [1.0]}}}"#;
        assert!(matches!(
            parse_results(json),
            Err(ExecutionError::MalformedArtifact(_))
        ));
    }

    #[test]
    fn test_non_integer_restart_key() {
        let json = r#"{"t_sim": [0.0], "x": {"a": {"k": 1.0}}, "states": {"a": {"S": [1.0]}}}"#;
        assert!(matches!(
            parse_results(json),
            Err(ExecutionError::MalformedArtifact(_))
        ));
    }
}
