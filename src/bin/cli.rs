//! Command-line interface for DisFit
//!
//! This binary generates, runs and inspects parameter fits of SBML models:
//! - Writing the generated Julia program of a problem
//! - Running the fit and writing the workbook, plot and JSON reports
//! - Showing the settings and model overview of a problem
//!
//! # Usage
//!
//! ```bash
//! # Write the Julia program
//! disfit generate --sbml model.xml --data data.csv --output fit.jl
//!
//! # Fit with five restarts and a custom iteration cap
//! disfit fit --sbml model.xml --data data.csv --n-starts 5 -O max_iter=500 --output-dir results
//!
//! # Use a configuration file
//! disfit inspect --config disfit.json
//! ```
//!
//! The Julia executable is taken from `DISFIT_JULIA`, the project from
//! `DISFIT_JULIA_PROJECT`. Set `RUST_LOG=debug` to see the solver output.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use disfit::{
    codegen::OptimizerOptions,
    io::load_config,
    problem::{DisFitError, DisFitProblem},
};
use indicatif::{ProgressBar, ProgressStyle};

/// Main CLI configuration struct
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Write the generated Julia program
    Generate {
        #[command(flatten)]
        problem: ProblemArgs,

        /// Output file; the program is printed if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the fit and write the reports
    Fit {
        #[command(flatten)]
        problem: ProblemArgs,

        /// Directory for results.xlsx, results.html and results.json
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// States to plot, comma separated (default: all)
        #[arg(long, value_delimiter = ',')]
        variables: Option<Vec<String>>,
    },
    /// Show the settings and model overview of a problem
    Inspect {
        #[command(flatten)]
        problem: ProblemArgs,
    },
}

/// Arguments defining a fitting problem
#[derive(Args)]
struct ProblemArgs {
    /// JSON configuration file; other arguments override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the SBML model
    #[arg(short, long)]
    sbml: Option<PathBuf>,

    /// Path to the CSV or TSV data file
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Simulation steps per data interval
    #[arg(long)]
    t_ratio: Option<i64>,

    /// Fold change bounding the parameter search space
    #[arg(long)]
    fold_change: Option<i64>,

    /// Number of optimisation restarts
    #[arg(long)]
    n_starts: Option<i64>,

    /// Ipopt option as key=value, may be repeated
    #[arg(short = 'O', long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,
}

impl ProblemArgs {
    fn build(&self) -> Result<DisFitProblem, DisFitError> {
        let mut problem = match (&self.config, &self.sbml, &self.data) {
            (Some(config), Some(sbml), Some(data)) => {
                let base = load_config(config)?;
                DisFitProblem::builder(sbml, data)
                    .t_ratio(base.t_ratio())
                    .fold_change(base.fold_change())
                    .n_starts(base.n_starts())
                    .optimizer_options(base.optimizer_options().clone())
                    .build()?
            }
            (Some(config), sbml, data) => {
                let mut problem = load_config(config)?;
                if let Some(sbml) = sbml {
                    problem.set_sbml_path(sbml)?;
                }
                if let Some(data) = data {
                    problem.set_data_path(data)?;
                }
                problem
            }
            (None, Some(sbml), Some(data)) => DisFitProblem::new(sbml, data)?,
            (None, None, _) => return Err(missing_argument("sbml_path", "--sbml")),
            (None, _, None) => return Err(missing_argument("data_path", "--data")),
        };

        if let Some(t_ratio) = self.t_ratio {
            problem.set_t_ratio(t_ratio)?;
        }
        if let Some(fold_change) = self.fold_change {
            problem.set_fold_change(fold_change)?;
        }
        if let Some(n_starts) = self.n_starts {
            problem.set_n_starts(n_starts)?;
        }
        for pair in &self.options {
            let (key, value) = OptimizerOptions::parse_pair(pair).map_err(|message| {
                DisFitError::InvalidArgument {
                    field: "optimizer_options",
                    message,
                }
            })?;
            problem.set_optimizer_option(key, value)?;
        }

        Ok(problem)
    }
}

fn missing_argument(field: &'static str, flag: &str) -> DisFitError {
    DisFitError::InvalidArgument {
        field,
        message: format!("pass {flag} or a --config file"),
    }
}

/// Main entry point for the CLI application
pub fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{} {}", "Error:".bold().red(), error);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), DisFitError> {
    match command {
        Commands::Generate { problem, output } => {
            let problem = problem.build()?;
            match output {
                Some(path) => {
                    problem.write_jl_file(&path)?;
                    println!(
                        "{} {}",
                        "Wrote".bold().green(),
                        path.display().to_string().bold()
                    );
                }
                None => print!("{}", problem.julia_code()),
            }
        }
        Commands::Fit {
            problem,
            output_dir,
            variables,
        } => {
            let mut problem = problem.build()?;
            std::fs::create_dir_all(&output_dir)?;

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} [{elapsed}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.set_message(format!(
                "Fitting {} restart(s) with Julia",
                problem.n_starts()
            ));
            spinner.enable_steady_tick(Duration::from_millis(100));

            let result = problem.optimize().map(|_| ());
            spinner.finish_and_clear();
            result?;

            if let Some(run) = problem.fit_run() {
                println!("{run}");
            }

            let variables: Option<Vec<&str>> = variables
                .as_ref()
                .map(|names| names.iter().map(String::as_str).collect());

            problem.write_results(output_dir.join("results.xlsx"))?;
            problem.plot_results(output_dir.join("results.html"), variables.as_deref())?;
            problem.save_results(output_dir.join("results.json"))?;

            println!(
                "{} {}",
                "Reports written to".bold().green(),
                output_dir.display().to_string().bold()
            );
        }
        Commands::Inspect { problem } => {
            let problem = problem.build()?;
            println!("{problem}");
        }
    }

    Ok(())
}
