//! DisFit Rust Library
//!
//! This library fits the kinetic parameters of SBML reaction-network models to
//! experimental time-series data, including:
//! - Reading SBML models and CSV/TSV time-series data
//! - Generating a discretised JuMP/Ipopt program for the fit
//! - Running the generated program through an external Julia runtime
//! - Inspecting fit results and writing workbooks and plots

#![warn(unused_imports)]

/// Commonly used types and functionality re-exported for convenience
pub mod prelude {
    pub use crate::codegen::{OptimizerOptions, OptionValue};
    pub use crate::io::{load_config, load_results, save_results};
    pub use crate::problem::{DisFitError, DisFitProblem, Setting};
    pub use crate::runtime::{
        BestFitParameter, ExecutionError, FitResults, FitRun, FitTrace, JuliaRuntime,
        SolverRuntime,
    };
}

/// The fitting problem and its validated configuration
pub mod problem {
    pub use crate::problem::error::*;
    pub use crate::problem::problem::*;
    pub use crate::problem::settings::*;

    /// Error types for problem configuration and execution
    pub mod error;
    #[allow(clippy::module_inception)]
    pub mod problem;
    /// Loosely typed settings from config files and the CLI
    pub mod settings;
}

/// SBML model reading and MathML handling
pub mod sbml {
    pub use crate::sbml::error::SBMLError;
    pub use crate::sbml::model::*;
    pub use crate::sbml::reader::{parse_sbml, read_sbml};

    pub mod error;
    /// MathML expression trees
    pub mod math;
    pub mod model;
    pub mod reader;
}

/// Tabular data handling
pub mod tabular {
    pub use crate::tabular::error::TabularError;
    pub use crate::tabular::reader::*;
    pub use crate::tabular::writer::write_workbook;

    /// DataFrame views of fit results
    mod dataframe;
    pub mod error;
    /// Reading time-series data from delimited files
    pub mod reader;
    /// Writing fit results to spreadsheets
    pub mod writer;
}

/// Generation of the Julia optimisation program
pub mod codegen {
    pub use crate::codegen::julia::JuliaProgram;
    pub use crate::codegen::options::*;

    pub mod julia;
    pub mod options;
}

/// External solver runtime and result artifacts
pub mod runtime {
    pub use crate::runtime::error::ExecutionError;
    pub use crate::runtime::results::*;
    pub use crate::runtime::runner::*;

    pub mod error;
    pub mod results;
    pub mod runner;
}

/// Plotting and visualization functionality
pub mod plotting;

/// Table display of fit results
pub mod info;

/// IO functionality
pub mod io;
