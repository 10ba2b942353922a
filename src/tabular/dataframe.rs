//! DataFrame views of fit results
//!
//! Each view matches one sheet of the results workbook:
//!
//! - `x`: one row per restart with the fitted value of every parameter
//! - `x_best`: one row per parameter with its best-fit value
//! - `states`: one row per restart and grid point with the value of every state
//!
//! The fixed `iteration` and `time` headers get a trailing underscore when a parameter
//! or state of the model already uses that name.

use polars::prelude::*;

use crate::runtime::FitRun;

impl FitRun {
    /// Fitted parameters per restart
    pub fn x_frame(&self) -> PolarsResult<DataFrame> {
        let results = &self.results;
        let iterations: Vec<i64> = results.x.keys().map(|start| *start as i64).collect();

        let parameters = results.parameter_names();
        let iteration = fixed_column("iteration", &parameters);

        let mut columns = vec![Series::new(&iteration, iterations)];
        for parameter in parameters {
            let values: Vec<Option<f64>> = results
                .x
                .values()
                .map(|x| x.get(parameter).copied())
                .collect();
            columns.push(Series::new(parameter, values));
        }

        DataFrame::new(columns)
    }

    /// Best-fit parameter table
    pub fn x_best_frame(&self) -> PolarsResult<DataFrame> {
        let (parameters, values): (Vec<&str>, Vec<f64>) = self
            .results
            .x_best
            .iter()
            .map(|row| (row.parameter.as_str(), row.value))
            .unzip();

        DataFrame::new(vec![
            Series::new("parameter", parameters),
            Series::new("value", values),
        ])
    }

    /// State trajectories of all restarts in long format
    pub fn states_frame(&self) -> PolarsResult<DataFrame> {
        let results = &self.results;
        let time = &self.trace.time;
        let n_rows = results.states.len() * time.len();

        let mut iterations = Vec::with_capacity(n_rows);
        let mut times = Vec::with_capacity(n_rows);
        for start in results.states.keys() {
            iterations.extend(std::iter::repeat(*start as i64).take(time.len()));
            times.extend_from_slice(time);
        }

        let states = results.state_names();
        let iteration = fixed_column("iteration", &states);
        let time_column = fixed_column("time", &states);

        let mut columns = vec![
            Series::new(&iteration, iterations),
            Series::new(&time_column, times),
        ];
        for state in states {
            let values: Vec<Option<f64>> = results
                .states
                .values()
                .flat_map(|states| match states.get(state) {
                    Some(trajectory) => trajectory.iter().map(|v| Some(*v)).collect::<Vec<_>>(),
                    None => vec![None; time.len()],
                })
                .collect();
            columns.push(Series::new(state, values));
        }

        DataFrame::new(columns)
    }
}

/// Header of a fixed column that does not clash with any of the model names
fn fixed_column(name: &str, taken: &[&str]) -> String {
    let mut column = name.to_string();
    while taken.contains(&column.as_str()) {
        column.push('_');
    }
    column
}
