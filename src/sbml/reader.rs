//! SBML Reader Module
//!
//! Reads SBML Level 2 and Level 3 core documents into an [`SbmlModel`]. Only the
//! constructs that can be turned into a discretised ODE system are accepted:
//! compartments, species, parameters, reactions with kinetic laws (including local
//! parameters), function definitions, assignment rules and rate rules of species.
//!
//! Models using events, algebraic rules, initial assignments or rate rules of
//! parameters and compartments are rejected with [`SBMLError::Unsupported`].

use std::collections::{HashMap, HashSet};
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use roxmltree::{Document, Node};

use super::error::SBMLError;
use super::math::{elements, parse_lambda, parse_math, Expr};
use super::model::{
    Compartment, Parameter, Reaction, Rule, SbmlModel, Species, SpeciesReference,
};

lazy_static! {
    static ref SID_PATTERN: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Reads an SBML model from a file
///
/// # Arguments
///
/// * `path` - Path to the SBML file
///
/// # Returns
///
/// The parsed model with the ODEs of its state species already derived
pub fn read_sbml(path: impl AsRef<Path>) -> Result<SbmlModel, SBMLError> {
    let xml = std::fs::read_to_string(path.as_ref())?;
    parse_sbml(&xml)
}

/// Parses an SBML model from an XML string
pub fn parse_sbml(xml: &str) -> Result<SbmlModel, SBMLError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();

    if root.tag_name().name() != "sbml" {
        return Err(SBMLError::NotSbml(root.tag_name().name().to_string()));
    }

    let model = child(root, "model").ok_or(SBMLError::MissingModel)?;
    reject_unsupported(model)?;

    let mut declared = HashSet::new();

    let functions = list(model, "listOfFunctionDefinitions", "functionDefinition")
        .map(|node| {
            let id = declare(node, &mut declared)?;
            let math = child(node, "math").ok_or_else(|| missing(node, "math"))?;
            Ok((id, parse_lambda(math)?))
        })
        .collect::<Result<HashMap<_, _>, SBMLError>>()?;

    let compartments = list(model, "listOfCompartments", "compartment")
        .map(|node| read_compartment(node, &mut declared))
        .collect::<Result<Vec<_>, _>>()?;

    let species = list(model, "listOfSpecies", "species")
        .map(|node| read_species(node, &compartments, &mut declared))
        .collect::<Result<Vec<_>, _>>()?;

    let mut parameters = list(model, "listOfParameters", "parameter")
        .map(|node| {
            let id = declare(node, &mut declared)?;
            let value = match node.attribute("value") {
                Some(value) => number(value, &format!("parameter {id}"))?,
                None => {
                    log::warn!("Parameter {id} has no value, using 0.0");
                    0.0
                }
            };
            Ok(Parameter { id, value })
        })
        .collect::<Result<Vec<_>, SBMLError>>()?;

    let rules = list_any(model, "listOfRules")
        .map(|node| read_rule(node, &compartments, &parameters))
        .collect::<Result<Vec<_>, _>>()?;

    let species_ids: HashSet<&str> = species.iter().map(|s| s.id.as_str()).collect();
    let mut reactions = Vec::new();
    for node in list(model, "listOfReactions", "reaction") {
        let (reaction, local_parameters) = read_reaction(node, &species_ids, &mut declared)?;
        for parameter in local_parameters {
            if !declared.insert(parameter.id.clone()) {
                return Err(SBMLError::DuplicateIdentifier(parameter.id));
            }
            parameters.push(parameter);
        }
        reactions.push(reaction);
    }

    let mut model = SbmlModel {
        id: model.attribute("id").map(str::to_string),
        name: model.attribute("name").map(str::to_string),
        compartments,
        species,
        parameters,
        reactions,
        rules,
        functions,
        equations: Vec::new(),
    };

    if model.states().next().is_none() {
        return Err(SBMLError::NoStateSpecies);
    }

    model.equations = model.derive_equations()?;

    log::debug!(
        "Read SBML model with {} states, {} parameters and {} reactions",
        model.equations.len(),
        model.fitted_parameters().count(),
        model.reactions.len()
    );

    Ok(model)
}

fn reject_unsupported(model: Node) -> Result<(), SBMLError> {
    if list(model, "listOfEvents", "event").next().is_some() {
        return Err(SBMLError::Unsupported("events".to_string()));
    }
    if list(model, "listOfInitialAssignments", "initialAssignment")
        .next()
        .is_some()
    {
        return Err(SBMLError::Unsupported("initial assignments".to_string()));
    }
    if list(model, "listOfConstraints", "constraint").next().is_some() {
        log::warn!("SBML constraints are ignored");
    }
    Ok(())
}

fn read_compartment(
    node: Node,
    declared: &mut HashSet<String>,
) -> Result<Compartment, SBMLError> {
    let id = declare(node, declared)?;
    let size = match node.attribute("size").or_else(|| node.attribute("volume")) {
        Some(size) => number(size, &format!("compartment {id}"))?,
        None => 1.0,
    };
    Ok(Compartment { id, size })
}

fn read_species(
    node: Node,
    compartments: &[Compartment],
    declared: &mut HashSet<String>,
) -> Result<Species, SBMLError> {
    let id = declare(node, declared)?;
    let compartment = node
        .attribute("compartment")
        .ok_or_else(|| missing(node, "compartment"))?
        .to_string();
    let size = compartments
        .iter()
        .find(|c| c.id == compartment)
        .map(|c| c.size)
        .ok_or_else(|| SBMLError::UnknownIdentifier {
            identifier: compartment.clone(),
            context: format!("species {id}"),
        })?;

    let has_only_substance_units = flag(node, "hasOnlySubstanceUnits");
    let boundary_condition = flag(node, "boundaryCondition");
    let context = format!("species {id}");

    let initial_value = match (
        node.attribute("initialConcentration"),
        node.attribute("initialAmount"),
    ) {
        (Some(concentration), _) if has_only_substance_units => {
            number(concentration, &context)? * size
        }
        (Some(concentration), _) => number(concentration, &context)?,
        (None, Some(amount)) if has_only_substance_units => number(amount, &context)?,
        (None, Some(amount)) => number(amount, &context)? / size,
        (None, None) => {
            log::warn!("Species {id} has no initial value, using 0.0");
            0.0
        }
    };

    Ok(Species {
        id,
        compartment,
        initial_value,
        boundary_condition,
        has_only_substance_units,
    })
}

fn read_rule(
    node: Node,
    compartments: &[Compartment],
    parameters: &[Parameter],
) -> Result<Rule, SBMLError> {
    let kind = node.tag_name().name();
    if kind == "algebraicRule" {
        return Err(SBMLError::Unsupported("algebraic rules".to_string()));
    }

    let variable = node
        .attribute("variable")
        .ok_or_else(|| missing(node, "variable"))?
        .to_string();
    let math = child(node, "math").ok_or_else(|| missing(node, "math"))?;
    let math = parse_math(math)?;

    match kind {
        "assignmentRule" => Ok(Rule::Assignment { variable, math }),
        "rateRule" => {
            let is_constant_like = compartments.iter().any(|c| c.id == variable)
                || parameters.iter().any(|p| p.id == variable);
            if is_constant_like {
                return Err(SBMLError::Unsupported(format!(
                    "rate rule of non-species '{variable}'"
                )));
            }
            Ok(Rule::Rate { variable, math })
        }
        other => Err(SBMLError::Unsupported(format!("rule <{other}>"))),
    }
}

/// Reads a reaction and returns it with its promoted local parameters
fn read_reaction(
    node: Node,
    species: &HashSet<&str>,
    declared: &mut HashSet<String>,
) -> Result<(Reaction, Vec<Parameter>), SBMLError> {
    let id = declare(node, declared)?;

    if flag(node, "fast") {
        log::warn!("Fast reaction {id} is treated as a regular reaction");
    }

    let references = |list_name: &str| {
        list(node, list_name, "speciesReference")
            .map(|reference| read_reference(reference, &id, species))
            .collect::<Result<Vec<_>, SBMLError>>()
    };
    let reactants = references("listOfReactants")?;
    let products = references("listOfProducts")?;

    let modifiers = list(node, "listOfModifiers", "modifierSpeciesReference")
        .map(|modifier| {
            let name = modifier
                .attribute("species")
                .ok_or_else(|| missing(modifier, "species"))?;
            if !species.contains(name) {
                return Err(SBMLError::UnknownSpecies {
                    reaction: id.clone(),
                    species: name.to_string(),
                });
            }
            Ok(name.to_string())
        })
        .collect::<Result<Vec<_>, _>>()?;

    let law = child(node, "kineticLaw").ok_or_else(|| {
        SBMLError::Unsupported(format!("reaction {id} without kinetic law"))
    })?;
    let math = child(law, "math").ok_or_else(|| missing(law, "math"))?;
    let mut rate = parse_math(math)?;

    // L3 uses listOfLocalParameters, L2 listOfParameters
    let local_nodes = list(law, "listOfLocalParameters", "localParameter")
        .chain(list(law, "listOfParameters", "parameter"));

    let mut local_parameters = Vec::new();
    let mut renames = HashMap::new();
    for local in local_nodes {
        let local_id = identifier(local)?;
        let promoted = format!("{id}_{local_id}");
        let value = match local.attribute("value") {
            Some(value) => number(value, &format!("local parameter {local_id} of {id}"))?,
            None => {
                log::warn!("Local parameter {local_id} of {id} has no value, using 0.0");
                0.0
            }
        };
        renames.insert(local_id, Expr::Symbol(promoted.clone()));
        local_parameters.push(Parameter {
            id: promoted,
            value,
        });
    }

    if !renames.is_empty() {
        rate = rate.replace_symbols(&|symbol| renames.get(symbol).cloned());
    }

    let reaction = Reaction {
        id,
        reactants,
        products,
        modifiers,
        rate,
    };
    Ok((reaction, local_parameters))
}

fn read_reference(
    node: Node,
    reaction: &str,
    species: &HashSet<&str>,
) -> Result<SpeciesReference, SBMLError> {
    let name = node
        .attribute("species")
        .ok_or_else(|| missing(node, "species"))?;
    if !species.contains(name) {
        return Err(SBMLError::UnknownSpecies {
            reaction: reaction.to_string(),
            species: name.to_string(),
        });
    }

    if child(node, "stoichiometryMath").is_some() {
        return Err(SBMLError::Unsupported(format!(
            "stoichiometry math in reaction {reaction}"
        )));
    }

    let stoichiometry = match node.attribute("stoichiometry") {
        Some(value) => number(value, &format!("stoichiometry of {name} in {reaction}"))?,
        None => 1.0,
    };

    Ok(SpeciesReference {
        species: name.to_string(),
        stoichiometry,
    })
}

/// Reads and validates the `id` attribute of an element and records it as declared
fn declare(node: Node, declared: &mut HashSet<String>) -> Result<String, SBMLError> {
    let id = identifier(node)?;
    if !declared.insert(id.clone()) {
        return Err(SBMLError::DuplicateIdentifier(id));
    }
    Ok(id)
}

fn identifier(node: Node) -> Result<String, SBMLError> {
    let id = node.attribute("id").ok_or_else(|| missing(node, "id"))?;
    if !SID_PATTERN.is_match(id) {
        return Err(SBMLError::InvalidIdentifier(id.to_string()));
    }
    Ok(id.to_string())
}

fn number(value: &str, context: &str) -> Result<f64, SBMLError> {
    value.trim().parse().map_err(|_| SBMLError::InvalidNumber {
        value: value.to_string(),
        context: context.to_string(),
    })
}

fn flag(node: Node, attribute: &str) -> bool {
    matches!(node.attribute(attribute), Some("true") | Some("1"))
}

fn missing(node: Node, attribute: &str) -> SBMLError {
    SBMLError::MissingAttribute {
        element: node.tag_name().name().to_string(),
        attribute: attribute.to_string(),
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    elements(node).find(|child| child.tag_name().name() == name)
}

/// Elements named `item` inside the `container` child of `node`
fn list<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    container: &'a str,
    item: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    list_any(node, container).filter(move |child| child.tag_name().name() == item)
}

/// All elements inside the `container` child of `node`
fn list_any<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    container: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    child(node, container).into_iter().flat_map(elements)
}
