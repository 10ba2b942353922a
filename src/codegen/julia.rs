//! Julia Code Generation Module
//!
//! Renders the JuMP/Ipopt program that fits the parameters of an [`SbmlModel`] to a
//! [`TimeSeriesData`] set. The ODE system is discretised with implicit Euler on a
//! simulation grid with `t_ratio` steps per data interval, so every data point lies on
//! the grid at index `(k-1)*t_ratio+1`. Each fitted parameter is bounded by
//! `nominal / fc` and `nominal * fc` and started from a random point inside these
//! bounds; restart `i` seeds its generator with `i`.
//!
//! The program takes the path of its JSON result artifact as its only argument.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use itertools::Itertools;
use lazy_static::lazy_static;

use super::options::{julia_string, OptimizerOptions};
use crate::sbml::math::julia_number;
use crate::sbml::{SbmlModel, SymbolKind};
use crate::tabular::TimeSeriesData;

lazy_static! {
    /// Names that SBML identifiers must not shadow in the generated program
    static ref RESERVED: HashSet<&'static str> = [
        // Julia keywords
        "baremodule", "begin", "break", "catch", "const", "continue", "do", "else",
        "elseif", "end", "export", "false", "finally", "for", "function", "global", "if",
        "import", "in", "let", "local", "macro", "module", "quote", "return", "struct",
        "true", "try", "using", "while", "where", "abstract", "mutable", "primitive", "type",
        // Functions and constants used by the program or by rendered math
        "abs", "ceil", "coalesce", "collect", "cos", "exp", "findall", "floor", "isnan",
        "length", "log", "log10", "max", "min", "open", "rand", "range", "sin", "sqrt",
        "string", "sum", "tan", "value", "vcat", "Dict", "Float64", "Inf", "NaN", "Min",
        "Model", "MersenneTwister", "CSV", "DataFrame", "DataFrames", "Ipopt", "JSON",
        "JuMP", "Random", "pi", "time",
        // Variables of the program
        "fc", "t_ratio", "results_path", "data_path", "df", "t_exp", "t_sim", "k_sim",
        "sample_start", "fit_start", "record_start", "rng", "lb", "ub", "m", "k", "i",
        "i_start", "x", "states", "objective", "status", "results", "key", "fit", "io",
    ]
    .into_iter()
    .collect();
}

/// The complete Julia program of a fitting problem
///
/// Rendering is deterministic: identical inputs produce byte-identical programs.
#[derive(Debug, Clone)]
pub struct JuliaProgram<'a> {
    pub model: &'a SbmlModel,
    pub data: &'a TimeSeriesData,
    /// Absolute path of the SBML file, written into the header
    pub sbml_path: &'a Path,
    /// Absolute path of the data file, read by the program
    pub data_path: &'a Path,
    pub t_ratio: i64,
    pub fold_change: i64,
    pub n_starts: i64,
    pub options: &'a OptimizerOptions,
}

impl JuliaProgram<'_> {
    /// Renders the program as a string
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Observables of the data that are state species, in column order
    fn observed_states(&self) -> Vec<&str> {
        self.data
            .observable_names()
            .into_iter()
            .filter(|name| self.model.symbol_kind(name) == Some(SymbolKind::State))
            .collect()
    }

    /// Julia spelling of an SBML identifier
    ///
    /// Identifiers that collide with names of the program get a trailing underscore.
    pub fn julia_name(&self, id: &str) -> String {
        let observed = self
            .observed_states()
            .iter()
            .any(|name| id == format!("y_{name}") || id == format!("k_{name}"));

        if RESERVED.contains(id) || observed {
            format!("{id}_")
        } else {
            id.to_string()
        }
    }

    fn write_header(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Generated by DisFit")?;
        writeln!(f, "# SBML model: {}", self.sbml_path.display())?;
        writeln!(f, "# Data: {}", self.data_path.display())?;
        writeln!(f)?;
        for package in ["CSV", "DataFrames", "Ipopt", "JSON", "JuMP", "Random"] {
            writeln!(f, "using {package}")?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "fc = {} # fold change bounding the parameter search space",
            self.fold_change
        )?;
        writeln!(f, "t_ratio = {} # simulation steps per data interval", self.t_ratio)?;
        writeln!(f)?;
        writeln!(
            f,
            "results_path = isempty(ARGS) ? \"disfit_results.json\" : ARGS[1]"
        )?;
        writeln!(f)
    }

    fn write_data(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Data")?;
        writeln!(
            f,
            "data_path = {}",
            julia_string(&self.data_path.display().to_string())
        )?;
        writeln!(
            f,
            "df = CSV.read(data_path, DataFrame; delim = {})",
            self.data.delimiter.julia_literal()
        )?;
        writeln!(
            f,
            "t_exp = Float64.(df[!, {}])",
            julia_string(&self.data.time_column)
        )?;
        writeln!(
            f,
            "t_sim = vcat([collect(range(t_exp[i], t_exp[i+1], length = t_ratio + 1))[1:end-1] for i in 1:length(t_exp)-1]..., t_exp[end])"
        )?;
        writeln!(f, "k_sim = length(t_sim)")?;
        for name in self.observed_states() {
            writeln!(
                f,
                "y_{name} = Float64.(coalesce.(df[!, {}], NaN))",
                julia_string(name)
            )?;
            writeln!(f, "k_{name} = findall(!isnan, y_{name})")?;
        }
        writeln!(f)
    }

    fn write_constants(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let constants = self.model.constants();
        if !constants.is_empty() {
            writeln!(f, "# Constants")?;
            for (id, value) in constants {
                writeln!(f, "{} = {}", self.julia_name(id), julia_number(value))?;
            }
            writeln!(f)?;
        }
        writeln!(f, "sample_start(rng, lb, ub) = lb + (ub - lb) * rand(rng)")?;
        writeln!(f)
    }

    fn write_fit_function(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function fit_start(i_start)")?;
        writeln!(f, "    rng = MersenneTwister(i_start)")?;
        writeln!(f, "    m = Model(Ipopt.Optimizer)")?;
        for (key, value) in self.options.iter() {
            writeln!(
                f,
                "    set_optimizer_attribute(m, {}, {})",
                julia_string(key),
                value.to_julia()
            )?;
        }
        writeln!(f)?;

        self.write_parameters(f)?;
        self.write_states(f)?;
        self.write_odes(f)?;
        self.write_objective(f)?;

        writeln!(f, "    optimize!(m)")?;
        writeln!(f)?;
        writeln!(f, "    x = Dict(")?;
        for parameter in self.model.fitted_parameters() {
            writeln!(
                f,
                "        {} => value({}),",
                julia_string(&parameter.id),
                self.julia_name(&parameter.id)
            )?;
        }
        writeln!(f, "    )")?;
        writeln!(f, "    states = Dict(")?;
        for species in self.model.states() {
            writeln!(
                f,
                "        {} => value.({}),",
                julia_string(&species.id),
                self.julia_name(&species.id)
            )?;
        }
        writeln!(f, "    )")?;
        writeln!(
            f,
            "    return x, states, objective_value(m), string(termination_status(m))"
        )?;
        writeln!(f, "end")?;
        writeln!(f)
    }

    fn write_parameters(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    # Parameters")?;
        for parameter in self.model.fitted_parameters() {
            if parameter.value == 0.0 {
                log::warn!(
                    "Parameter {} has nominal value 0, its search space is empty",
                    parameter.id
                );
            }

            let nominal = julia_number(parameter.value);
            let (lower, upper) = if parameter.value < 0.0 {
                (format!("{nominal} * fc"), format!("{nominal} / fc"))
            } else {
                (format!("{nominal} / fc"), format!("{nominal} * fc"))
            };
            writeln!(
                f,
                "    @variable(m, {lower} <= {name} <= {upper}, start = sample_start(rng, {lower}, {upper}))",
                name = self.julia_name(&parameter.id)
            )?;
        }
        writeln!(f)
    }

    fn write_states(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    # States")?;
        for species in self.model.states() {
            writeln!(
                f,
                "    @variable(m, {}[k in 1:k_sim] >= 0.0)",
                self.julia_name(&species.id)
            )?;
        }
        for species in self.model.states() {
            writeln!(
                f,
                "    @constraint(m, {}[1] == {})",
                self.julia_name(&species.id),
                julia_number(species.initial_value)
            )?;
        }
        writeln!(f)
    }

    fn write_odes(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolve = |id: &str| match self.model.symbol_kind(id) {
            Some(SymbolKind::State) => format!("{}[k+1]", self.julia_name(id)),
            _ => self.julia_name(id),
        };

        writeln!(f, "    # ODEs (implicit Euler)")?;
        for equation in self.model.equations() {
            let name = self.julia_name(&equation.species);
            writeln!(
                f,
                "    @NLconstraint(m, [k in 1:k_sim-1], {name}[k+1] == {name}[k] + (t_sim[k+1] - t_sim[k]) * ({}))",
                equation.rhs.to_julia(&resolve, "t_sim[k+1]")
            )?;
        }
        writeln!(f)
    }

    fn write_objective(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self
            .observed_states()
            .into_iter()
            .map(|name| {
                format!(
                    "        sum(({}[(k-1)*t_ratio+1] - y_{name}[k])^2 for k in k_{name})",
                    self.julia_name(name)
                )
            })
            .join(" +\n");

        writeln!(f, "    # Objective")?;
        writeln!(f, "    @NLobjective(m, Min,")?;
        writeln!(f, "{body})")?;
        writeln!(f)
    }

    fn write_restarts(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "results = Dict(\"t_sim\" => t_sim, \"x\" => Dict(), \"states\" => Dict(), \"objective\" => Dict(), \"status\" => Dict())"
        )?;
        writeln!(f)?;
        writeln!(f, "function record_start!(results, i_start, fit)")?;
        writeln!(f, "    x, states, objective, status = fit")?;
        writeln!(f, "    key = string(i_start)")?;
        for field in ["x", "states", "objective", "status"] {
            writeln!(f, "    results[\"{field}\"][key] = {field}")?;
        }
        writeln!(f, "end")?;
        writeln!(f)?;

        for i in 1..=self.n_starts {
            writeln!(f, "# Restart {i}")?;
            writeln!(f, "record_start!(results, {i}, fit_start({i}))")?;
            writeln!(f)?;
        }

        writeln!(f, "open(results_path, \"w\") do io")?;
        writeln!(f, "    JSON.print(io, results)")?;
        writeln!(f, "end")
    }
}

impl fmt::Display for JuliaProgram<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_header(f)?;
        self.write_data(f)?;
        self.write_constants(f)?;
        self.write_fit_function(f)?;
        self.write_restarts(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbml::reader::parse_sbml;
    use crate::tabular::{Delimiter, Observable};

    const MODEL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" level="3" version="1">
  <model id="decay">
    <listOfCompartments>
      <compartment id="c" size="1" constant="true"/>
    </listOfCompartments>
    <listOfSpecies>
      <species id="end" compartment="c" initialConcentration="2" hasOnlySubstanceUnits="true" boundaryCondition="false" constant="false"/>
    </listOfSpecies>
    <listOfParameters>
      <parameter id="k" value="-0.25" constant="true"/>
    </listOfParameters>
    <listOfReactions>
      <reaction id="R" reversible="false">
        <listOfReactants>
          <speciesReference species="end" stoichiometry="1"/>
        </listOfReactants>
        <kineticLaw>
          <math xmlns="http://www.w3.org/1998/Math/MathML">
            <apply><times/><ci>k</ci><ci>end</ci><csymbol encoding="text" definitionURL="http://www.sbml.org/sbml/symbols/time">t</csymbol></apply>
          </math>
        </kineticLaw>
      </reaction>
    </listOfReactions>
  </model>
</sbml>"#;

    fn data() -> TimeSeriesData {
        TimeSeriesData {
            delimiter: Delimiter::Tab,
            time_column: "time".to_string(),
            time: vec![0.0, 1.0],
            observables: vec![
                Observable {
                    name: "end".to_string(),
                    values: vec![Some(2.0), Some(1.0)],
                },
                Observable {
                    name: "unused".to_string(),
                    values: vec![Some(0.0), None],
                },
            ],
        }
    }

    fn render(options: &OptimizerOptions, n_starts: i64) -> String {
        let model = parse_sbml(MODEL).unwrap();
        let data = data();
        JuliaProgram {
            model: &model,
            data: &data,
            sbml_path: Path::new("/models/decay.xml"),
            data_path: Path::new("/data/decay.tsv"),
            t_ratio: 3,
            fold_change: 10,
            n_starts,
            options,
        }
        .render()
    }

    #[test]
    fn test_reserved_names_are_renamed() {
        let code = render(&OptimizerOptions::new(), 1);

        assert!(code.contains("@variable(m, end_[k in 1:k_sim] >= 0.0)"));
        assert!(code.contains("\"end\" => value.(end_),"));
        assert!(code.contains("\"k\" => value(k_),"));
        assert!(code.contains("sum((end_[(k-1)*t_ratio+1] - y_end[k])^2 for k in k_end))"));
    }

    #[test]
    fn test_negative_nominal_value_swaps_bounds() {
        let code = render(&OptimizerOptions::new(), 1);
        assert!(code.contains(
            "@variable(m, -0.25 * fc <= k_ <= -0.25 / fc, start = sample_start(rng, -0.25 * fc, -0.25 / fc))"
        ));
    }

    #[test]
    fn test_time_and_delimiter() {
        let code = render(&OptimizerOptions::new(), 1);

        assert!(code.contains("df = CSV.read(data_path, DataFrame; delim = '\\t')"));
        assert!(code.contains("t_exp = Float64.(df[!, \"time\"])"));
        assert!(code.contains("end_[k+1] == end_[k] + (t_sim[k+1] - t_sim[k]) * (-(k_ * end_[k+1] * t_sim[k+1])))"));
        assert!(!code.contains("y_unused"));
    }

    #[test]
    fn test_options_and_restarts() {
        let options = OptimizerOptions::new()
            .with("print_level", 0)
            .unwrap()
            .with("tol", 1e-8)
            .unwrap();
        let code = render(&options, 3);

        assert!(code.contains(
            "    m = Model(Ipopt.Optimizer)\n    set_optimizer_attribute(m, \"print_level\", 0)\n    set_optimizer_attribute(m, \"tol\", 1e-8)\n\n"
        ));
        assert_eq!(code.matches("# Restart ").count(), 3);
        assert!(code.contains("record_start!(results, 3, fit_start(3))"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let options = OptimizerOptions::new();
        assert_eq!(render(&options, 2), render(&options, 2));
    }
}
