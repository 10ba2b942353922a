#[cfg(test)]
mod test_optimize {
    use std::path::{Path, PathBuf};

    use approx::assert_abs_diff_eq;
    use calamine::{open_workbook, Data, Reader, Xlsx};
    use disfit::prelude::*;

    /// Replays the artifact of a recorded Julia run
    struct RecordedRuntime {
        artifact: PathBuf,
    }

    impl SolverRuntime for RecordedRuntime {
        fn run(&self, script: &Path, artifact: &Path) -> Result<(), ExecutionError> {
            assert!(script.is_file());
            std::fs::copy(&self.artifact, artifact)?;
            Ok(())
        }
    }

    /// Fails like a Julia process that exits with an error
    struct FailingRuntime;

    impl SolverRuntime for FailingRuntime {
        fn run(&self, _script: &Path, _artifact: &Path) -> Result<(), ExecutionError> {
            Err(ExecutionError::MalformedArtifact("solver crashed".to_string()))
        }
    }

    /// Exits successfully without writing results
    struct SilentRuntime;

    impl SolverRuntime for SilentRuntime {
        fn run(&self, _script: &Path, _artifact: &Path) -> Result<(), ExecutionError> {
            Ok(())
        }
    }

    fn fixtures() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data")
    }

    fn problem() -> DisFitProblem {
        DisFitProblem::builder(
            fixtures().join("ensa_model.xml"),
            fixtures().join("ensa_data.csv"),
        )
        .n_starts(2)
        .build()
        .unwrap()
    }

    fn recorded() -> RecordedRuntime {
        RecordedRuntime {
            artifact: fixtures().join("results_artifact.json"),
        }
    }

    fn fitted() -> DisFitProblem {
        let mut problem = problem();
        problem.optimize_with(&recorded()).unwrap();
        problem
    }

    #[test]
    fn test_optimize_results() {
        // ARRANGE
        let mut problem = problem();

        // ACT
        let results = problem.optimize_with(&recorded()).unwrap().clone();

        // ASSERT
        assert_eq!(results.x.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(results.state_names(), vec!["Ensa", "pEnsa"]);
        assert_eq!(
            results.parameter_names(),
            vec!["dephosphorylation_kDpEnsa", "kPhEnsa"]
        );

        assert_abs_diff_eq!(results.x[&1]["kPhEnsa"], 0.423147, epsilon = 1e-6);
        assert_abs_diff_eq!(
            results.x[&2]["dephosphorylation_kDpEnsa"],
            0.287115,
            epsilon = 1e-6
        );

        // Restart 2 has the lower objective
        assert_abs_diff_eq!(results.best("kPhEnsa").unwrap(), 0.422918, epsilon = 1e-6);
        assert_abs_diff_eq!(
            results.best("dephosphorylation_kDpEnsa").unwrap(),
            0.287115,
            epsilon = 1e-6
        );

        let ensa = &results.states[&2]["Ensa"];
        assert_eq!(ensa.len(), 11);
        assert_abs_diff_eq!(ensa[0], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ensa[10], 0.621673, epsilon = 1e-6);
    }

    #[test]
    fn test_optimize_trace() {
        // ACT
        let problem = fitted();
        let trace = problem.trace().unwrap();

        // ASSERT
        assert_eq!(trace.best_start, 2);
        assert_eq!(trace.time.len(), 11);
        assert_abs_diff_eq!(trace.time[10], 5.0, epsilon = 1e-12);
        assert_eq!(trace.status[&1], "LOCALLY_SOLVED");
        assert_abs_diff_eq!(trace.objective[&2], 0.00121, epsilon = 1e-9);
    }

    #[test]
    fn test_failed_optimize_keeps_earlier_results() {
        // ARRANGE
        let mut problem = fitted();
        let before = problem.fit_run().cloned();

        // ACT
        let result = problem.optimize_with(&FailingRuntime);

        // ASSERT
        assert!(matches!(result, Err(DisFitError::Execution(_))));
        assert_eq!(problem.fit_run().cloned(), before);
    }

    #[test]
    fn test_failed_first_optimize_has_no_results() {
        let mut problem = problem();
        let result = problem.optimize_with(&FailingRuntime);

        assert!(result.is_err());
        assert!(problem.results().is_none());
        assert!(matches!(
            problem.write_results(std::env::temp_dir().join("disfit_unused.xlsx")),
            Err(DisFitError::MissingResults)
        ));
    }

    #[test]
    fn test_missing_artifact() {
        let mut problem = problem();
        let result = problem.optimize_with(&SilentRuntime);

        assert!(matches!(
            result,
            Err(DisFitError::Execution(ExecutionError::MissingArtifact(_)))
        ));
        assert!(problem.results().is_none());
    }

    #[test]
    fn test_missing_julia_executable() {
        let mut problem = problem();
        let runtime = JuliaRuntime::new("/does/not/exist/julia");
        let result = problem.optimize_with(&runtime);

        assert!(matches!(
            result,
            Err(DisFitError::Execution(ExecutionError::Launch { .. }))
        ));
        assert!(problem.results().is_none());
    }

    #[test]
    fn test_write_results() {
        // ARRANGE
        let problem = fitted();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");

        // ACT
        problem.write_results(&path).unwrap();

        // ASSERT
        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["x", "x_best", "states"]);

        let x_best = workbook.worksheet_range("x_best").unwrap();
        assert_eq!(x_best.get_size(), (3, 2));
        assert_eq!(
            x_best.get_value((0, 0)),
            Some(&Data::String("parameter".to_string()))
        );
        assert_eq!(
            x_best.get_value((2, 0)),
            Some(&Data::String("kPhEnsa".to_string()))
        );
        match x_best.get_value((2, 1)) {
            Some(Data::Float(value)) => assert_abs_diff_eq!(*value, 0.422918, epsilon = 1e-6),
            other => panic!("Unexpected cell: {other:?}"),
        }

        let x = workbook.worksheet_range("x").unwrap();
        assert_eq!(x.get_size(), (3, 3));

        // Two restarts with eleven time points each, plus the header
        let states = workbook.worksheet_range("states").unwrap();
        assert_eq!(states.get_size(), (23, 4));
    }

    #[test]
    fn test_plot_results() {
        // ARRANGE
        let problem = fitted();
        let dir = tempfile::tempdir().unwrap();
        let all = dir.path().join("all.html");
        let subset = dir.path().join("subset.html");

        // ACT
        problem.plot_results(&all, None).unwrap();
        problem.plot_results(&subset, Some(&["pEnsa"][..])).unwrap();

        // ASSERT
        let all = std::fs::read_to_string(all).unwrap();
        let subset = std::fs::read_to_string(subset).unwrap();
        assert!(all.contains("Ensa (start 1)"));
        assert!(all.contains("pEnsa (data)"));
        assert!(subset.contains("pEnsa (start 2)"));
        assert!(!subset.contains("\"Ensa (start 1)\""));
    }

    #[test]
    fn test_plot_unknown_variable() {
        // ARRANGE
        let problem = fitted();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.html");

        // ACT
        let result = problem.plot_results(&path, Some(&["Gwl"][..]));

        // ASSERT
        assert!(matches!(
            result,
            Err(DisFitError::InvalidArgument { field: "variables", .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_plot_shows_the_data_of_the_fit() {
        // ARRANGE
        let mut problem = fitted();
        problem
            .set_data_path(fixtures().join("ensa_data.tsv"))
            .unwrap();
        assert!(problem.data().observable("Ensa").is_none());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.html");

        // ACT
        problem.plot_results(&path, Some(&["Ensa"][..])).unwrap();

        // ASSERT
        let html = std::fs::read_to_string(path).unwrap();
        assert!(html.contains("Ensa (data)"));
    }

    #[test]
    fn test_plot_requires_html_path() {
        // ARRANGE
        let problem = fitted();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.pdf");

        // ACT
        let result = problem.plot_results(&path, None);

        // ASSERT
        assert!(matches!(
            result,
            Err(DisFitError::InvalidArgument { field: "plot_path", .. })
        ));
        assert!(!path.exists());
        assert!(problem.plot_results(dir.path().join("plot.HTM"), None).is_ok());
    }

    #[test]
    fn test_save_and_load_results() {
        let problem = fitted();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        problem.save_results(&path).unwrap();
        let loaded = load_results(&path).unwrap();

        assert_eq!(Some(&loaded), problem.fit_run());
    }

    /// Runs the generated program with a local Julia installation
    ///
    /// Needs `julia` (or `DISFIT_JULIA`) with JuMP, Ipopt, CSV, DataFrames and JSON.
    #[test]
    #[ignore]
    fn test_optimize_with_julia() {
        // ARRANGE
        let mut problem = problem();
        problem.set_optimizer_option("print_level", 0).unwrap();

        // ACT
        let results = problem.optimize().unwrap();

        // ASSERT
        assert_eq!(results.x.len(), 2);
        assert_abs_diff_eq!(results.best("kPhEnsa").unwrap(), 0.42, epsilon = 0.05);
        assert_abs_diff_eq!(
            results.best("dephosphorylation_kDpEnsa").unwrap(),
            0.29,
            epsilon = 0.05
        );
    }
}
