//! Information display module for fitting problems and their results
//!
//! This module implements the `Display` trait for [`DisFitProblem`] and [`FitRun`],
//! rendering their components as nested tables.

use std::fmt::{self, Display};

use tabled::{builder::Builder, settings::Style};

use crate::problem::{DisFitProblem, Setting};
use crate::runtime::{BestFitParameter, FitRun};
use crate::sbml::{Parameter, Species, SymbolKind};

/// Trait for converting components to table records
trait TableRecord {
    /// Column headers of the table
    fn columns() -> Vec<String>;

    /// Values of one row, matching [`TableRecord::columns`]
    fn to_record(&self) -> Vec<String>;
}

impl Display for DisFitProblem {
    /// Formats the settings of the problem and an overview of its model
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(vec!["DisFit Problem"]);

        let mut settings = Builder::default();
        settings.push_record(vec!["Setting", "Value"]);
        for setting in Setting::ALL {
            settings.push_record(vec![setting.to_string(), self.get(setting).to_string()]);
        }
        let mut settings = settings.build();
        settings.with(Style::rounded());
        builder.push_record(vec!["Settings"]);
        builder.push_record(vec![settings.to_string()]);

        let model = self.model();
        let states: Vec<StateRow> = model
            .states()
            .map(|species| StateRow {
                species,
                observed: self.data().observable(&species.id).is_some(),
            })
            .collect();
        builder.push_record(vec!["States"]);
        builder.push_record(vec![to_table(&states)]);

        let parameters: Vec<ParameterRow> = model
            .fitted_parameters()
            .map(|parameter| ParameterRow {
                parameter,
                fold_change: self.fold_change() as f64,
            })
            .collect();
        if !parameters.is_empty() {
            builder.push_record(vec!["Parameters"]);
            builder.push_record(vec![to_table(&parameters)]);
        }

        let ignored: Vec<&str> = self
            .data()
            .observable_names()
            .into_iter()
            .filter(|name| model.symbol_kind(name) != Some(SymbolKind::State))
            .collect();
        if !ignored.is_empty() {
            builder.push_record(vec!["Ignored data columns"]);
            builder.push_record(vec![ignored.join(", ")]);
        }

        let mut table = builder.build();
        table.with(Style::sharp());
        write!(f, "{table}")
    }
}

impl Display for FitRun {
    /// Formats the best-fit parameters and the outcome of every restart
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(vec!["DisFit Results"]);

        builder.push_record(vec![format!(
            "Best-fit parameters (start {})",
            self.trace.best_start
        )]);
        builder.push_record(vec![to_table(&self.results.x_best)]);

        let mut restarts = Builder::default();
        restarts.push_record(vec!["Start", "Objective", "Status"]);
        for start in self.results.x.keys() {
            let objective = self
                .trace
                .objective
                .get(start)
                .map(|value| format!("{value:.6e}"))
                .unwrap_or_else(|| "-".to_string());
            let status = self
                .trace
                .status
                .get(start)
                .cloned()
                .unwrap_or_else(|| "-".to_string());
            let marker = if *start == self.trace.best_start { " *" } else { "" };
            restarts.push_record(vec![format!("{start}{marker}"), objective, status]);
        }
        let mut restarts = restarts.build();
        restarts.with(Style::rounded());
        builder.push_record(vec!["Restarts"]);
        builder.push_record(vec![restarts.to_string()]);

        let mut table = builder.build();
        table.with(Style::sharp());
        write!(f, "{table}")
    }
}

/// Converts a collection of TableRecord implementors to a formatted table string
fn to_table<T: TableRecord>(records: &[T]) -> String {
    let mut builder = Builder::default();
    builder.push_record(T::columns());

    for record in records {
        builder.push_record(record.to_record());
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

impl TableRecord for BestFitParameter {
    fn columns() -> Vec<String> {
        vec!["Parameter".to_string(), "Value".to_string()]
    }

    fn to_record(&self) -> Vec<String> {
        vec![self.parameter.clone(), format!("{:.6}", self.value)]
    }
}

struct StateRow<'a> {
    species: &'a Species,
    observed: bool,
}

impl TableRecord for StateRow<'_> {
    fn columns() -> Vec<String> {
        vec![
            "ID".to_string(),
            "Compartment".to_string(),
            "Initial value".to_string(),
            "Observed".to_string(),
        ]
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.species.id.clone(),
            self.species.compartment.clone(),
            self.species.initial_value.to_string(),
            self.observed.to_string(),
        ]
    }
}

struct ParameterRow<'a> {
    parameter: &'a Parameter,
    fold_change: f64,
}

impl TableRecord for ParameterRow<'_> {
    fn columns() -> Vec<String> {
        vec![
            "ID".to_string(),
            "Nominal".to_string(),
            "Lower".to_string(),
            "Upper".to_string(),
        ]
    }

    /// Bounds of the search space, swapped for negative nominal values
    fn to_record(&self) -> Vec<String> {
        let value = self.parameter.value;
        let (lower, upper) = if value < 0.0 {
            (value * self.fold_change, value / self.fold_change)
        } else {
            (value / self.fold_change, value * self.fold_change)
        };
        vec![
            self.parameter.id.clone(),
            value.to_string(),
            lower.to_string(),
            upper.to_string(),
        ]
    }
}
