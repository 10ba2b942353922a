//! Fitting Problem Module
//!
//! [`DisFitProblem`] ties an SBML model and a time-series data file to the settings of
//! the fit. Every value passes the same validation whether it is given at construction
//! or through a setter, and a rejected value leaves the problem unchanged.
//!
//! The model and the data are read when their paths are set, so the generated Julia
//! program can be rendered at any time without touching the file system.
//!
//! # Example
//!
//! ```no_run
//! use disfit::prelude::*;
//!
//! let mut problem = DisFitProblem::builder("model.xml", "data.csv")
//!     .n_starts(5)
//!     .build()?;
//!
//! problem.write_jl_file("fit.jl")?;
//! problem.optimize()?;
//! problem.write_results("results.xlsx")?;
//! problem.plot_results("results.html", None)?;
//! # Ok::<(), DisFitError>(())
//! ```

use std::path::{Path, PathBuf};

use crate::codegen::{JuliaProgram, OptimizerOptions, OptionValue};
use crate::io::IOError;
use crate::plotting::plot_fit;
use crate::runtime::{
    parse_results, ExecutionError, FitResults, FitRun, FitTrace, JuliaRuntime, SolverRuntime,
};
use crate::sbml::{read_sbml, SbmlModel, SymbolKind};
use crate::tabular::writer::write_workbook;
use crate::tabular::{read_time_series, TimeSeriesData};

use super::error::DisFitError;

pub const DEFAULT_T_RATIO: i64 = 2;
pub const DEFAULT_FOLD_CHANGE: i64 = 2;
pub const DEFAULT_N_STARTS: i64 = 1;

/// File name of the generated program inside the solver workspace
const SCRIPT_NAME: &str = "disfit_problem.jl";

/// File name of the result artifact inside the solver workspace
const ARTIFACT_NAME: &str = "disfit_results.json";

/// A validated file together with its parsed content
#[derive(Debug, Clone)]
struct Source<T> {
    /// Path as given by the caller
    path: PathBuf,
    /// Canonical absolute path
    absolute: PathBuf,
    content: T,
}

/// Results of a fit together with the data it was fitted to
#[derive(Debug, Clone)]
struct Fit {
    run: FitRun,
    data: TimeSeriesData,
}

/// Parameter estimation problem for an SBML model and a time-series data set
#[derive(Debug, Clone)]
pub struct DisFitProblem {
    sbml: Source<SbmlModel>,
    data: Source<TimeSeriesData>,
    t_ratio: i64,
    fold_change: i64,
    n_starts: i64,
    optimizer_options: OptimizerOptions,
    fit: Option<Fit>,
}

#[bon::bon]
impl DisFitProblem {
    /// Creates a problem with all settings given
    ///
    /// Use [`DisFitProblem::builder`] to set only some of them.
    ///
    /// # Arguments
    ///
    /// * `sbml_path` - Path to the SBML model
    /// * `data_path` - Path to the `.csv` or `.tsv` data file
    /// * `t_ratio` - Simulation steps per data interval (positive)
    /// * `fold_change` - Factor bounding the parameter search space (greater than 1)
    /// * `n_starts` - Number of optimisation restarts (positive)
    /// * `optimizer_options` - Ipopt options
    ///
    /// # Errors
    ///
    /// Returns [`DisFitError::InvalidArgument`] for the first value that fails validation.
    #[builder(start_fn = builder, finish_fn = build)]
    pub fn configure(
        #[builder(start_fn, into)] sbml_path: PathBuf,
        #[builder(start_fn, into)] data_path: PathBuf,
        #[builder(default = DEFAULT_T_RATIO)] t_ratio: i64,
        #[builder(default = DEFAULT_FOLD_CHANGE)] fold_change: i64,
        #[builder(default = DEFAULT_N_STARTS)] n_starts: i64,
        #[builder(default)] optimizer_options: OptimizerOptions,
    ) -> Result<Self, DisFitError> {
        let sbml = load_model(&sbml_path)?;
        let data = load_data(&data_path)?;
        check_observables(&sbml.content, &data.content, "data_path")?;

        let mut problem = Self {
            sbml,
            data,
            t_ratio: DEFAULT_T_RATIO,
            fold_change: DEFAULT_FOLD_CHANGE,
            n_starts: DEFAULT_N_STARTS,
            optimizer_options,
            fit: None,
        };

        problem.set_t_ratio(t_ratio)?;
        problem.set_fold_change(fold_change)?;
        problem.set_n_starts(n_starts)?;

        Ok(problem)
    }
}

impl DisFitProblem {
    /// Creates a problem with default settings
    pub fn new(
        sbml_path: impl Into<PathBuf>,
        data_path: impl Into<PathBuf>,
    ) -> Result<Self, DisFitError> {
        Self::builder(sbml_path, data_path).build()
    }

    /// Path of the SBML model as it was given
    pub fn sbml_path(&self) -> &Path {
        &self.sbml.path
    }

    /// Canonical absolute path of the SBML model
    pub fn sbml_absolute_path(&self) -> &Path {
        &self.sbml.absolute
    }

    /// Path of the data file as it was given
    pub fn data_path(&self) -> &Path {
        &self.data.path
    }

    pub fn model(&self) -> &SbmlModel {
        &self.sbml.content
    }

    pub fn data(&self) -> &TimeSeriesData {
        &self.data.content
    }

    pub fn t_ratio(&self) -> i64 {
        self.t_ratio
    }

    pub fn fold_change(&self) -> i64 {
        self.fold_change
    }

    pub fn n_starts(&self) -> i64 {
        self.n_starts
    }

    pub fn optimizer_options(&self) -> &OptimizerOptions {
        &self.optimizer_options
    }

    /// Results of the last successful [`optimize`](Self::optimize)
    pub fn results(&self) -> Option<&FitResults> {
        self.fit.as_ref().map(|fit| &fit.run.results)
    }

    /// Solver diagnostics of the last successful [`optimize`](Self::optimize)
    pub fn trace(&self) -> Option<&FitTrace> {
        self.fit.as_ref().map(|fit| &fit.run.trace)
    }

    /// Results and diagnostics of the last successful [`optimize`](Self::optimize)
    pub fn fit_run(&self) -> Option<&FitRun> {
        self.fit.as_ref().map(|fit| &fit.run)
    }

    fn fitted(&self) -> Result<&Fit, DisFitError> {
        self.fit.as_ref().ok_or(DisFitError::MissingResults)
    }

    /// Replaces the SBML model
    ///
    /// The file must exist, be a valid SBML model with at least one state species and
    /// share at least one observable with the current data.
    pub fn set_sbml_path(&mut self, path: impl Into<PathBuf>) -> Result<(), DisFitError> {
        let sbml = load_model(&path.into())?;
        check_observables(&sbml.content, &self.data.content, "sbml_path")?;
        self.sbml = sbml;
        Ok(())
    }

    /// Replaces the data file
    ///
    /// The file must exist, be a `.csv` or `.tsv` time series and share at least one
    /// observable with the current model.
    pub fn set_data_path(&mut self, path: impl Into<PathBuf>) -> Result<(), DisFitError> {
        let data = load_data(&path.into())?;
        check_observables(&self.sbml.content, &data.content, "data_path")?;
        self.data = data;
        Ok(())
    }

    /// Sets the number of simulation steps per data interval (positive)
    pub fn set_t_ratio(&mut self, t_ratio: i64) -> Result<(), DisFitError> {
        if t_ratio < 1 {
            return Err(DisFitError::invalid(
                "t_ratio",
                format!("must be a positive integer, got {t_ratio}"),
            ));
        }
        self.t_ratio = t_ratio;
        Ok(())
    }

    /// Sets the factor bounding each parameter to `[nominal / fc, nominal * fc]`
    /// (greater than 1)
    pub fn set_fold_change(&mut self, fold_change: i64) -> Result<(), DisFitError> {
        if fold_change <= 1 {
            return Err(DisFitError::invalid(
                "fold_change",
                format!("must be an integer greater than 1, got {fold_change}"),
            ));
        }
        self.fold_change = fold_change;
        Ok(())
    }

    /// Sets the number of optimisation restarts (positive)
    pub fn set_n_starts(&mut self, n_starts: i64) -> Result<(), DisFitError> {
        if n_starts < 1 {
            return Err(DisFitError::invalid(
                "n_starts",
                format!("must be a positive integer, got {n_starts}"),
            ));
        }
        self.n_starts = n_starts;
        Ok(())
    }

    pub fn set_optimizer_options(&mut self, options: OptimizerOptions) {
        self.optimizer_options = options;
    }

    /// Sets a single Ipopt option, replacing an existing value
    pub fn set_optimizer_option(
        &mut self,
        key: impl Into<String>,
        value: impl Into<OptionValue>,
    ) -> Result<(), DisFitError> {
        self.optimizer_options
            .insert(key, value)
            .map_err(|message| DisFitError::invalid("optimizer_options", message))
    }

    /// The generated Julia program for the current configuration
    pub fn julia_code(&self) -> String {
        let code = JuliaProgram {
            model: &self.sbml.content,
            data: &self.data.content,
            sbml_path: &self.sbml.absolute,
            data_path: &self.data.absolute,
            t_ratio: self.t_ratio,
            fold_change: self.fold_change,
            n_starts: self.n_starts,
            options: &self.optimizer_options,
        }
        .render();

        log::debug!("Generated Julia program with {} lines", code.lines().count());
        code
    }

    /// Writes the generated Julia program to a file, overwriting it if it exists
    pub fn write_jl_file(&self, path: impl AsRef<Path>) -> Result<(), DisFitError> {
        std::fs::write(path.as_ref(), self.julia_code())?;
        Ok(())
    }

    /// Runs the fit with the Julia runtime configured through the environment
    ///
    /// See [`JuliaRuntime::from_env`] for the environment variables.
    pub fn optimize(&mut self) -> Result<&FitResults, DisFitError> {
        self.optimize_with(&JuliaRuntime::from_env())
    }

    /// Runs the fit with the given runtime
    ///
    /// The program is written to a temporary directory and executed there. On success
    /// the results replace those of any earlier run; a failed run keeps them.
    pub fn optimize_with<R>(&mut self, runtime: &R) -> Result<&FitResults, DisFitError>
    where
        R: SolverRuntime + ?Sized,
    {
        let workspace = tempfile::Builder::new()
            .prefix("disfit")
            .tempdir()
            .map_err(ExecutionError::Workspace)?;
        let script = workspace.path().join(SCRIPT_NAME);
        let artifact = workspace.path().join(ARTIFACT_NAME);

        std::fs::write(&script, self.julia_code()).map_err(ExecutionError::Workspace)?;
        runtime.run(&script, &artifact)?;

        if !artifact.is_file() {
            return Err(ExecutionError::MissingArtifact(artifact).into());
        }
        let json = std::fs::read_to_string(&artifact).map_err(ExecutionError::Workspace)?;
        let run = parse_results(&json)?;

        log::info!(
            "Fit finished with {} restarts, best restart {}",
            run.results.x.len(),
            run.trace.best_start
        );

        let fit = self.fit.insert(Fit {
            run,
            data: self.data.content.clone(),
        });
        Ok(&fit.run.results)
    }

    /// Writes the results to an xlsx workbook with the sheets `x`, `x_best` and `states`
    pub fn write_results(&self, path: impl AsRef<Path>) -> Result<(), DisFitError> {
        write_workbook(&self.fitted()?.run, path.as_ref())?;
        Ok(())
    }

    /// Plots the fitted trajectories and best-fit parameters to an HTML document
    ///
    /// The document is a single plotly page with one panel per variable. The markers
    /// show the data the fit ran on, even if the data path changed since.
    ///
    /// # Arguments
    ///
    /// * `path` - Output file with an `.html` or `.htm` extension
    /// * `variables` - States to plot; `None` plots every simulated state
    ///
    /// # Errors
    ///
    /// Returns [`DisFitError::InvalidArgument`] if a variable is not a simulated state
    /// or the path has another extension, and [`DisFitError::MissingResults`] before a
    /// successful `optimize`.
    pub fn plot_results(
        &self,
        path: impl AsRef<Path>,
        variables: Option<&[&str]>,
    ) -> Result<(), DisFitError> {
        let fit = self.fitted()?;
        let path = path.as_ref();
        let is_html = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                extension.eq_ignore_ascii_case("html") || extension.eq_ignore_ascii_case("htm")
            });
        if !is_html {
            return Err(DisFitError::invalid(
                "plot_path",
                format!("{} is not an .html file", path.display()),
            ));
        }

        let plot = plot_fit(&fit.run, &fit.data, variables)?;
        std::fs::write(path, plot.to_html())?;
        Ok(())
    }

    /// Exports the results and diagnostics as JSON
    pub fn save_results(&self, path: impl AsRef<Path>) -> Result<(), DisFitError> {
        crate::io::save_results(path, &self.fitted()?.run).map_err(|error| match error {
            IOError::FileNotFound(error) => DisFitError::Io(error),
            IOError::JsonParseError(error) => DisFitError::Json(error),
        })
    }
}

fn check_file(path: &Path, field: &'static str) -> Result<PathBuf, DisFitError> {
    if !path.exists() {
        return Err(DisFitError::invalid(
            field,
            format!("{} does not exist", path.display()),
        ));
    }
    if !path.is_file() {
        return Err(DisFitError::invalid(
            field,
            format!("{} is not a file", path.display()),
        ));
    }
    std::fs::canonicalize(path)
        .map_err(|e| DisFitError::invalid(field, format!("{}: {e}", path.display())))
}

fn load_model(path: &Path) -> Result<Source<SbmlModel>, DisFitError> {
    let absolute = check_file(path, "sbml_path")?;
    let model = read_sbml(&absolute).map_err(|e| {
        DisFitError::invalid(
            "sbml_path",
            format!("{} is not a supported SBML model: {e}", path.display()),
        )
    })?;

    Ok(Source {
        path: path.to_path_buf(),
        absolute,
        content: model,
    })
}

fn load_data(path: &Path) -> Result<Source<TimeSeriesData>, DisFitError> {
    let absolute = check_file(path, "data_path")?;
    let data = read_time_series(&absolute).map_err(|e| {
        DisFitError::invalid(
            "data_path",
            format!("{} is not a valid data file: {e}", path.display()),
        )
    })?;

    Ok(Source {
        path: path.to_path_buf(),
        absolute,
        content: data,
    })
}

/// Ensures the data measures at least one state of the model and warns about the
/// columns that will be ignored
fn check_observables(
    model: &SbmlModel,
    data: &TimeSeriesData,
    field: &'static str,
) -> Result<(), DisFitError> {
    let (observed, ignored): (Vec<&str>, Vec<&str>) = data
        .observable_names()
        .into_iter()
        .partition(|name| model.symbol_kind(name) == Some(SymbolKind::State));

    if observed.is_empty() {
        return Err(DisFitError::invalid(
            field,
            format!(
                "no data column matches a state species of the model (states: {})",
                model.state_ids().join(", ")
            ),
        ));
    }

    for column in ignored {
        log::warn!("Data column '{column}' does not match a state species and is ignored");
    }

    Ok(())
}
