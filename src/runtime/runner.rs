//! Solver Runtime Module
//!
//! The generated program is executed by an external Julia installation with JuMP,
//! Ipopt, CSV, DataFrames and JSON available. The [`SolverRuntime`] trait is the seam
//! between the fitting problem and that process, so alternative runtimes (a remote
//! executor, a recorded replay in tests) can be plugged into
//! [`DisFitProblem::optimize_with`](crate::problem::DisFitProblem::optimize_with).

use std::path::{Path, PathBuf};
use std::process::Command;

use super::error::ExecutionError;

/// Environment variable holding the Julia executable
pub const JULIA_ENV: &str = "DISFIT_JULIA";

/// Environment variable holding the Julia project to activate
pub const JULIA_PROJECT_ENV: &str = "DISFIT_JULIA_PROJECT";

/// Number of trailing stderr lines reported when the runtime fails
const STDERR_TAIL_LINES: usize = 20;

/// Executes a generated program
pub trait SolverRuntime {
    /// Runs `script` and blocks until it has finished
    ///
    /// The script receives `artifact` as its only argument and is expected to write
    /// its JSON results there.
    fn run(&self, script: &Path, artifact: &Path) -> Result<(), ExecutionError>;
}

/// Runs generated programs with a local `julia` executable
#[derive(Debug, Clone, PartialEq)]
pub struct JuliaRuntime {
    program: PathBuf,
    project: Option<PathBuf>,
}

impl JuliaRuntime {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            project: None,
        }
    }

    /// Reads the executable from `DISFIT_JULIA` (default `julia`) and the project
    /// from `DISFIT_JULIA_PROJECT`
    pub fn from_env() -> Self {
        let program = std::env::var_os(JULIA_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("julia"));
        let project = std::env::var_os(JULIA_PROJECT_ENV).map(PathBuf::from);

        Self { program, project }
    }

    /// Activates a Julia project (`--project=<dir>`) when running
    pub fn with_project(mut self, project: impl Into<PathBuf>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn project(&self) -> Option<&Path> {
        self.project.as_deref()
    }

    fn command(&self, script: &Path, artifact: &Path) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(project) = &self.project {
            command.arg(format!("--project={}", project.display()));
        }
        command.arg(script).arg(artifact);
        command
    }
}

impl Default for JuliaRuntime {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SolverRuntime for JuliaRuntime {
    fn run(&self, script: &Path, artifact: &Path) -> Result<(), ExecutionError> {
        log::info!(
            "Running {} {}",
            self.program.display(),
            script.display()
        );

        let output = self
            .command(script, artifact)
            .output()
            .map_err(|source| ExecutionError::Launch {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            log::debug!("julia: {line}");
        }

        if !output.status.success() {
            return Err(ExecutionError::NonZeroExit {
                status: output.status,
                stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_LINES),
            });
        }

        log::info!("Solver runtime finished");
        Ok(())
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_arguments() {
        let runtime = JuliaRuntime::new("/opt/julia/bin/julia").with_project("/srv/disfit");
        let command = runtime.command(Path::new("fit.jl"), Path::new("out.json"));

        assert_eq!(command.get_program(), "/opt/julia/bin/julia");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, vec!["--project=/srv/disfit", "fit.jl", "out.json"]);
    }

    #[test]
    fn test_missing_executable() {
        let runtime = JuliaRuntime::new("/nonexistent/disfit-julia");
        let result = runtime.run(Path::new("fit.jl"), Path::new("out.json"));
        assert!(matches!(result, Err(ExecutionError::Launch { .. })));
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
        assert_eq!(tail("", 5), "");
    }
}
