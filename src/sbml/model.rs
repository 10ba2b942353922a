//! Reaction network model extracted from an SBML document.
//!
//! The structures in this module hold only what the generated optimisation program
//! needs: compartment sizes, species with their initial values, the parameters to fit,
//! reactions with their kinetic laws and the supported rules. The ordinary differential
//! equations of the state species are derived once when the model is read.

use std::collections::HashMap;

use super::error::SBMLError;
use super::math::{Expr, Lambda};

/// A compartment with a constant size
#[derive(Debug, Clone, PartialEq)]
pub struct Compartment {
    pub id: String,
    pub size: f64,
}

/// A species of the reaction network
#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    pub id: String,
    pub compartment: String,
    /// Initial concentration, or initial amount if `has_only_substance_units` is set
    pub initial_value: f64,
    pub boundary_condition: bool,
    pub has_only_substance_units: bool,
}

/// A model parameter with its nominal value
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: String,
    pub value: f64,
}

/// Participation of a species in a reaction
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesReference {
    pub species: String,
    pub stoichiometry: f64,
}

/// A reaction with its kinetic law
///
/// Local parameters of the kinetic law are already promoted to global parameters
/// named `<reaction>_<parameter>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    pub id: String,
    pub reactants: Vec<SpeciesReference>,
    pub products: Vec<SpeciesReference>,
    pub modifiers: Vec<String>,
    pub rate: Expr,
}

impl Reaction {
    /// Net stoichiometric coefficient of a species (products minus reactants)
    pub fn net_stoichiometry(&self, species: &str) -> f64 {
        let produced: f64 = self
            .products
            .iter()
            .filter(|reference| reference.species == species)
            .map(|reference| reference.stoichiometry)
            .sum();
        let consumed: f64 = self
            .reactants
            .iter()
            .filter(|reference| reference.species == species)
            .map(|reference| reference.stoichiometry)
            .sum();
        produced - consumed
    }
}

/// Supported SBML rules
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Assignment { variable: String, math: Expr },
    Rate { variable: String, math: Expr },
}

impl Rule {
    pub fn variable(&self) -> &str {
        match self {
            Rule::Assignment { variable, .. } | Rule::Rate { variable, .. } => variable,
        }
    }
}

/// Role an identifier plays in the generated program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A species trajectory, one decision variable per time point
    State,
    /// A fitted parameter
    Parameter,
    /// A fixed value (compartment size or boundary species)
    Constant,
}

/// Time derivative of a state species
#[derive(Debug, Clone, PartialEq)]
pub struct StateEquation {
    pub species: String,
    pub rhs: Expr,
}

/// A reaction network read from an SBML document
#[derive(Debug, Clone, PartialEq)]
pub struct SbmlModel {
    pub id: Option<String>,
    pub name: Option<String>,
    pub compartments: Vec<Compartment>,
    pub species: Vec<Species>,
    pub parameters: Vec<Parameter>,
    pub reactions: Vec<Reaction>,
    pub rules: Vec<Rule>,
    pub functions: HashMap<String, Lambda>,
    pub(crate) equations: Vec<StateEquation>,
}

impl SbmlModel {
    /// Species whose trajectories are estimated, in document order
    pub fn states(&self) -> impl Iterator<Item = &Species> {
        self.species
            .iter()
            .filter(|species| !species.boundary_condition && !self.is_assigned(&species.id))
    }

    /// Identifiers of the state species, in document order
    pub fn state_ids(&self) -> Vec<&str> {
        self.states().map(|species| species.id.as_str()).collect()
    }

    /// Parameters estimated by the fit, in document order
    pub fn fitted_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|parameter| !self.is_assigned(&parameter.id))
    }

    /// Fixed values of the model: compartment sizes followed by boundary species
    pub fn constants(&self) -> Vec<(&str, f64)> {
        let compartments = self
            .compartments
            .iter()
            .filter(|compartment| !self.is_assigned(&compartment.id))
            .map(|compartment| (compartment.id.as_str(), compartment.size));
        let boundary_species = self
            .species
            .iter()
            .filter(|species| species.boundary_condition && !self.is_assigned(&species.id))
            .map(|species| (species.id.as_str(), species.initial_value));

        compartments.chain(boundary_species).collect()
    }

    /// Ordinary differential equations of the state species, in state order
    pub fn equations(&self) -> &[StateEquation] {
        &self.equations
    }

    /// Looks up the role of an identifier
    pub fn symbol_kind(&self, id: &str) -> Option<SymbolKind> {
        if self.states().any(|species| species.id == id) {
            Some(SymbolKind::State)
        } else if self.fitted_parameters().any(|parameter| parameter.id == id) {
            Some(SymbolKind::Parameter)
        } else if self.constants().iter().any(|(constant, _)| *constant == id) {
            Some(SymbolKind::Constant)
        } else {
            None
        }
    }

    fn is_assigned(&self, id: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| matches!(rule, Rule::Assignment { variable, .. } if variable == id))
    }

    fn rate_rule(&self, id: &str) -> Option<&Expr> {
        self.rules.iter().find_map(|rule| match rule {
            Rule::Rate { variable, math } if variable == id => Some(math),
            _ => None,
        })
    }

    /// Derives the time derivative of every state species
    ///
    /// Species governed by a rate rule take the rule's expression. All other states sum
    /// the rates of the reactions they take part in, weighted by their net stoichiometry,
    /// and divide by the compartment size unless they are measured in amounts. Function
    /// definitions and assignment rules are inlined.
    ///
    /// # Errors
    ///
    /// Returns an error if an expression references an unknown identifier, calls an
    /// undefined function or contains circular definitions.
    pub(crate) fn derive_equations(&self) -> Result<Vec<StateEquation>, SBMLError> {
        let mut equations = Vec::new();

        for species in self.states() {
            let rhs = match self.rate_rule(&species.id) {
                Some(math) => math.clone(),
                None => self.reaction_balance(species),
            };

            let rhs = self.resolve(&rhs, &format!("equation of {}", species.id))?;
            equations.push(StateEquation {
                species: species.id.clone(),
                rhs,
            });
        }

        Ok(equations)
    }

    fn reaction_balance(&self, species: &Species) -> Expr {
        let mut balance: Option<Expr> = None;

        for reaction in self.reactions.iter() {
            let coefficient = reaction.net_stoichiometry(&species.id);
            if coefficient == 0.0 {
                continue;
            }

            let magnitude = coefficient.abs();
            let term = if magnitude == 1.0 {
                reaction.rate.clone()
            } else {
                Expr::Mul(vec![Expr::Number(magnitude), reaction.rate.clone()])
            };

            balance = Some(match balance {
                None if coefficient < 0.0 => Expr::Neg(Box::new(term)),
                None => term,
                Some(acc) if coefficient < 0.0 => Expr::Sub(Box::new(acc), Box::new(term)),
                Some(Expr::Add(mut terms)) => {
                    terms.push(term);
                    Expr::Add(terms)
                }
                Some(acc) => Expr::Add(vec![acc, term]),
            });
        }

        match balance {
            None => Expr::Number(0.0),
            Some(balance) if species.has_only_substance_units => balance,
            Some(balance) => Expr::Div(
                Box::new(balance),
                Box::new(Expr::Symbol(species.compartment.clone())),
            ),
        }
    }

    /// Inlines function definitions and assignment rules and checks every identifier
    fn resolve(&self, expr: &Expr, context: &str) -> Result<Expr, SBMLError> {
        let assignments: HashMap<&str, Expr> = self
            .rules
            .iter()
            .filter_map(|rule| match rule {
                Rule::Assignment { variable, math } => Some((variable.as_str(), math)),
                Rule::Rate { .. } => None,
            })
            .map(|(variable, math)| Ok((variable, math.inline_functions(&self.functions)?)))
            .collect::<Result<_, SBMLError>>()?;

        let mut resolved = expr.inline_functions(&self.functions)?;

        // A chain of assignment rules without cycles is at most `assignments.len()` deep
        for _ in 0..=assignments.len() {
            let pending = resolved
                .symbols()
                .into_iter()
                .any(|symbol| assignments.contains_key(symbol));
            if !pending {
                break;
            }
            resolved = resolved.replace_symbols(&|symbol| assignments.get(symbol).cloned());
        }

        for symbol in resolved.symbols() {
            if assignments.contains_key(symbol) {
                return Err(SBMLError::CircularDefinition(symbol.to_string()));
            }
            if self.symbol_kind(symbol).is_none() {
                return Err(SBMLError::UnknownIdentifier {
                    identifier: symbol.to_string(),
                    context: context.to_string(),
                });
            }
        }

        Ok(resolved)
    }
}
