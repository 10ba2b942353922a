#[cfg(test)]
mod test_problem {
    use std::path::PathBuf;

    use disfit::prelude::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fixtures() -> PathBuf {
        std::fs::canonicalize(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data"))
            .unwrap()
    }

    fn model_path() -> PathBuf {
        fixtures().join("ensa_model.xml")
    }

    fn data_path() -> PathBuf {
        fixtures().join("ensa_data.csv")
    }

    fn problem() -> DisFitProblem {
        DisFitProblem::new(model_path(), data_path()).unwrap()
    }

    fn golden() -> String {
        std::fs::read_to_string(fixtures().join("julia_gold.jl"))
            .unwrap()
            .replace("{{FIXTURES}}", &fixtures().display().to_string())
    }

    #[test]
    fn test_defaults() {
        // ACT
        let problem = problem();

        // ASSERT
        assert_eq!(problem.t_ratio(), 2);
        assert_eq!(problem.fold_change(), 2);
        assert_eq!(problem.n_starts(), 1);
        assert!(problem.optimizer_options().is_empty());
        assert!(problem.results().is_none());
        assert_eq!(problem.sbml_absolute_path(), model_path());
        assert_eq!(problem.model().state_ids(), vec!["Ensa", "pEnsa"]);
    }

    #[test]
    fn test_julia_code_matches_golden_program() {
        // ARRANGE
        let problem = problem();

        // ACT
        let code = problem.julia_code();

        // ASSERT
        assert_eq!(code, golden());
    }

    #[test]
    fn test_write_jl_file() {
        // ARRANGE
        let problem = problem();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.jl");
        std::fs::write(&path, "stale content").unwrap();

        // ACT
        problem.write_jl_file(&path).unwrap();

        // ASSERT
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, problem.julia_code());
    }

    #[test]
    fn test_write_jl_file_into_missing_directory() {
        let problem = problem();
        let result = problem.write_jl_file("/does/not/exist/fit.jl");
        assert!(matches!(result, Err(DisFitError::Io(_))));
    }

    #[test]
    fn test_each_option_adds_one_line() {
        // ARRANGE
        let mut problem = problem();
        let base = problem.julia_code();

        // ACT
        problem.set_optimizer_option("max_iter", 500).unwrap();
        let one = problem.julia_code();
        problem.set_optimizer_option("linear_solver", "mumps").unwrap();
        let two = problem.julia_code();
        problem.set_optimizer_option("max_iter", 1000).unwrap();
        let replaced = problem.julia_code();

        // ASSERT
        assert_eq!(one.lines().count(), base.lines().count() + 1);
        assert_eq!(two.lines().count(), base.lines().count() + 2);
        assert_eq!(replaced.lines().count(), two.lines().count());
        assert!(one.contains("    set_optimizer_attribute(m, \"max_iter\", 500)\n"));
        assert!(two.contains("    set_optimizer_attribute(m, \"linear_solver\", \"mumps\")\n"));
        assert!(replaced.contains("set_optimizer_attribute(m, \"max_iter\", 1000)"));
        assert!(!replaced.contains("set_optimizer_attribute(m, \"max_iter\", 500)"));
    }

    #[test]
    fn test_settings_change_the_program() {
        // ARRANGE
        let mut problem = problem();
        let base = problem.julia_code();

        // ACT & ASSERT
        problem.set_n_starts(3).unwrap();
        let code = problem.julia_code();
        assert_ne!(code, base);
        assert_eq!(code.matches("# Restart ").count(), 3);
        assert!(code.contains("record_start!(results, 3, fit_start(3))"));
        assert!(!code.contains("fit_start(4)"));

        problem.set_t_ratio(5).unwrap();
        let code = problem.julia_code();
        assert!(code.contains("t_ratio = 5 #"));

        problem.set_fold_change(10).unwrap();
        let code = problem.julia_code();
        assert!(code.contains("fc = 10 #"));
    }

    #[test]
    fn test_invalid_values_leave_the_problem_unchanged() {
        // ARRANGE
        let mut problem = problem();
        let before = problem.julia_code();

        // ACT
        let results = [
            problem.set_t_ratio(0),
            problem.set_fold_change(1),
            problem.set_n_starts(0),
            problem.set_sbml_path(fixtures().join("missing.xml")),
            problem.set_data_path(model_path()),
            problem.set("n_starts", &json!(2.0)),
            problem.set("t_ratio", &json!("3")),
            problem.set("optimizer_options", &json!([1, 2])),
            problem.set("unknown", &json!(1)),
        ];

        // ASSERT
        for result in results {
            assert!(matches!(result, Err(DisFitError::InvalidArgument { .. })));
        }
        assert_eq!(problem.julia_code(), before);
    }

    #[test]
    fn test_set_by_name() {
        // ARRANGE
        let mut problem = problem();

        // ACT
        problem.set("n_starts", &json!(4)).unwrap();
        problem
            .set("optimizer_options", &json!({"tol": 1e-6, "print_level": 0}))
            .unwrap();

        // ASSERT
        assert_eq!(problem.get(Setting::NStarts), json!(4));
        assert_eq!(
            problem.get(Setting::OptimizerOptions),
            json!({"tol": 1e-6, "print_level": 0})
        );
        assert!(problem.julia_code().contains(
            "    set_optimizer_attribute(m, \"tol\", 1e-6)\n    set_optimizer_attribute(m, \"print_level\", 0)\n"
        ));
    }

    #[test]
    fn test_builder() {
        // ACT
        let problem = DisFitProblem::builder(model_path(), data_path())
            .t_ratio(4)
            .n_starts(2)
            .optimizer_options(OptimizerOptions::new().with("max_iter", 10).unwrap())
            .build()
            .unwrap();

        // ASSERT
        assert_eq!(problem.t_ratio(), 4);
        assert_eq!(problem.fold_change(), 2);
        assert_eq!(problem.n_starts(), 2);
        assert_eq!(
            problem.optimizer_options().get("max_iter"),
            Some(&OptionValue::Int(10))
        );
    }

    #[test]
    fn test_tab_separated_data() {
        // ARRANGE
        let mut problem = problem();

        // ACT
        problem.set_data_path(fixtures().join("ensa_data.tsv")).unwrap();
        let code = problem.julia_code();

        // ASSERT
        assert!(code.contains("delim = '\\t'"));
        assert!(code.contains("t_exp = Float64.(df[!, \"time\"])"));
        assert!(code.contains("y_pEnsa = Float64.(coalesce.(df[!, \"pEnsa\"], NaN))"));
        assert!(!code.contains("y_Ensa"));
        assert!(!code.contains("Gwl_total"));
    }

    #[test]
    fn test_path_setters_round_trip() {
        // ARRANGE
        let mut problem = problem();
        let tsv = fixtures().join("ensa_data.tsv");

        // ACT
        problem.set_data_path(&tsv).unwrap();
        problem.set_sbml_path(model_path()).unwrap();

        // ASSERT
        assert_eq!(problem.data_path(), tsv);
        assert_eq!(problem.sbml_path(), model_path());
        assert_eq!(problem.get(Setting::DataPath), json!(tsv.display().to_string()));
        assert!(problem.julia_code().contains(&tsv.display().to_string()));
    }

    #[test]
    fn test_directories_are_rejected() {
        // ARRANGE
        let mut problem = problem();
        let before = problem.julia_code();

        // ACT
        let sbml = problem.set_sbml_path(fixtures());
        let data = problem.set_data_path(fixtures());

        // ASSERT
        assert!(matches!(
            sbml,
            Err(DisFitError::InvalidArgument { field: "sbml_path", .. })
        ));
        assert!(matches!(
            data,
            Err(DisFitError::InvalidArgument { field: "data_path", .. })
        ));
        assert_eq!(problem.sbml_path(), model_path());
        assert_eq!(problem.data_path(), data_path());
        assert_eq!(problem.julia_code(), before);

        let constructed = DisFitProblem::new(fixtures(), data_path());
        assert!(matches!(
            constructed,
            Err(DisFitError::InvalidArgument { field: "sbml_path", .. })
        ));
    }

    #[test]
    fn test_load_config() {
        // ACT
        let problem = load_config(fixtures().join("ensa_config.json")).unwrap();

        // ASSERT
        assert_eq!(problem.sbml_absolute_path(), model_path());
        assert_eq!(problem.fold_change(), 3);
        assert!(problem.julia_code().contains("fc = 3 #"));
    }
}
