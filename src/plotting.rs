use plotly::{
    common::{Anchor, Line, Marker, Mode},
    layout::{Annotation, GridPattern, LayoutGrid},
    Bar, Layout, Plot, Scatter,
};
use thiserror::Error;

use crate::runtime::FitRun;
use crate::tabular::TimeSeriesData;

const COLORS: &[&str] = &[
    "green", "blue", "red", "purple", "orange", "yellow", "brown", "pink", "gray", "cyan",
];

const DATA_COLOR: &str = "black";
const DEFAULT_HEIGHT: usize = 300;

/// Creates a figure of a fit
///
/// The figure stacks one panel per variable, showing the fitted trajectory of every
/// restart and the measured data when the variable is observed, and a final panel
/// with the best-fit parameter values.
///
/// # Arguments
///
/// * `run` - Results of the fit
/// * `data` - The measured time series
/// * `variables` - States to plot; `None` plots every simulated state
///
/// # Errors
///
/// Returns [`PlotError::UnknownVariable`] if a requested variable was not simulated.
pub fn plot_fit(
    run: &FitRun,
    data: &TimeSeriesData,
    variables: Option<&[&str]>,
) -> Result<Plot, PlotError> {
    let simulated = run.results.state_names();
    let variables: Vec<&str> = match variables {
        Some(variables) => {
            if let Some(unknown) = variables.iter().find(|v| !simulated.contains(*v)) {
                return Err(PlotError::UnknownVariable(unknown.to_string()));
            }
            variables.to_vec()
        }
        None => simulated,
    };

    if variables.is_empty() {
        return Err(PlotError::NoVariables);
    }

    let rows = variables.len() + 1;
    let mut plot = Plot::new();
    let mut layout = Layout::new()
        .show_legend(true)
        .height(DEFAULT_HEIGHT * rows)
        .grid(
            LayoutGrid::new()
                .rows(rows)
                .columns(1)
                .pattern(GridPattern::Independent),
        );

    for (i, variable) in variables.iter().enumerate() {
        let x_axis = format!("x{}", i + 1);
        let y_axis = format!("y{}", i + 1);

        for (j, (start, states)) in run.results.states.iter().enumerate() {
            let Some(trajectory) = states.get(*variable) else {
                continue;
            };
            let trace = Scatter::new(run.trace.time.clone(), trajectory.clone())
                .name(&format!("{variable} (start {start})"))
                .mode(Mode::Lines)
                .line(Line::new().width(1.5).color(COLORS[j % COLORS.len()]))
                .x_axis(&x_axis)
                .y_axis(&y_axis);
            plot.add_trace(trace);
        }

        if let Some(observable) = data.observable(variable) {
            let (time, values): (Vec<f64>, Vec<f64>) = data
                .time
                .iter()
                .zip(observable.values.iter())
                .filter_map(|(t, value)| value.map(|value| (*t, value)))
                .unzip();
            let trace = Scatter::new(time, values)
                .name(&format!("{variable} (data)"))
                .mode(Mode::Markers)
                .marker(Marker::new().color(DATA_COLOR).size(7))
                .x_axis(&x_axis)
                .y_axis(&y_axis);
            plot.add_trace(trace);
        }

        layout.add_annotation(panel_title(i + 1, variable));
    }

    let (names, values): (Vec<String>, Vec<f64>) = run
        .results
        .x_best
        .iter()
        .map(|row| (row.parameter.clone(), row.value))
        .unzip();
    let panel = rows;
    let trace = Bar::new(names, values)
        .name("best fit")
        .x_axis(&format!("x{panel}"))
        .y_axis(&format!("y{panel}"));
    plot.add_trace(trace);
    layout.add_annotation(panel_title(
        panel,
        &format!("Best-fit parameters (start {})", run.trace.best_start),
    ));

    plot.set_layout(layout);

    Ok(plot)
}

fn panel_title(panel: usize, text: &str) -> Annotation {
    Annotation::new()
        .y_ref(format!("y{panel} domain"))
        .y_anchor(Anchor::Bottom)
        .y(1)
        .text(format!("<b>{text}</b>"))
        .x_ref(format!("x{panel} domain"))
        .x_anchor(Anchor::Center)
        .x(0.5)
        .show_arrow(false)
}

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Variable {0} is not a simulated state")]
    UnknownVariable(String),
    #[error("No variables to plot")]
    NoVariables,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::parse_results;
    use crate::tabular::read_time_series;

    fn fixtures() -> (FitRun, TimeSeriesData) {
        let json = std::fs::read_to_string("tests/data/results_artifact.json").unwrap();
        let run = parse_results(&json).unwrap();
        let data = read_time_series("tests/data/ensa_data.csv").unwrap();
        (run, data)
    }

    fn trace_count(plot: &Plot) -> usize {
        let json: serde_json::Value = serde_json::from_str(&plot.to_json()).unwrap();
        json["data"].as_array().unwrap().len()
    }

    #[test]
    fn test_plot_all_states() {
        let (run, data) = fixtures();
        let plot = plot_fit(&run, &data, None).unwrap();

        // Two restarts and the data for each of the two states, plus the parameter bars
        assert_eq!(trace_count(&plot), 2 * 3 + 1);
    }

    #[test]
    fn test_plot_subset() {
        let (run, data) = fixtures();
        let plot = plot_fit(&run, &data, Some(&["pEnsa"][..])).unwrap();
        assert_eq!(trace_count(&plot), 3 + 1);
        assert!(plot.to_html().contains("pEnsa (data)"));
    }

    #[test]
    fn test_plot_unknown_variable() {
        let (run, data) = fixtures();
        let result = plot_fit(&run, &data, Some(&["Gwl"][..]));
        assert!(matches!(result, Err(PlotError::UnknownVariable(name)) if name == "Gwl"));
    }

    #[test]
    fn test_plot_no_variables() {
        let (run, data) = fixtures();
        let result = plot_fit(&run, &data, Some(&[][..]));
        assert!(matches!(result, Err(PlotError::NoVariables)));
    }
}
