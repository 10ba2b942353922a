//! MathML Expression Module
//!
//! Converts the content MathML found in kinetic laws, rules and function definitions
//! into an [`Expr`] tree. The tree can be inlined (function definitions, assignment
//! rules, local parameters) and rendered as a Julia expression for the generated
//! optimisation program.
//!
//! # Supported MathML
//!
//! - Tokens: `ci`, `cn` (real, integer, e-notation, rational), `csymbol` time,
//!   `pi`, `exponentiale`
//! - Operators: `plus`, `minus`, `times`, `divide`, `power`, `exp`, `ln`, `log`
//!   (with `logbase`), `root` (with `degree`), `abs`, `floor`, `ceiling`, `sin`,
//!   `cos`, `tan`
//! - Calls of function definitions through `<apply><ci>f</ci>...</apply>`

use std::collections::HashMap;
use std::convert::Infallible;
use std::f64::consts::{E, PI};
use std::fmt;

use roxmltree::Node;

use super::error::SBMLError;

const TIME_SYMBOL_URL: &str = "http://www.sbml.org/sbml/symbols/time";

/// Maximum nesting of function definition calls before a definition is considered circular
const MAX_INLINE_DEPTH: usize = 64;

/// Elementary functions with a direct Julia counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFunction {
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Floor,
    Ceiling,
    Sin,
    Cos,
    Tan,
}

impl MathFunction {
    /// Name of the function in Julia
    pub fn julia_name(&self) -> &'static str {
        match self {
            MathFunction::Exp => "exp",
            MathFunction::Ln => "log",
            MathFunction::Log10 => "log10",
            MathFunction::Sqrt => "sqrt",
            MathFunction::Abs => "abs",
            MathFunction::Floor => "floor",
            MathFunction::Ceiling => "ceil",
            MathFunction::Sin => "sin",
            MathFunction::Cos => "cos",
            MathFunction::Tan => "tan",
        }
    }
}

/// A mathematical expression parsed from MathML
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Symbol(String),
    /// The model time
    Time,
    Add(Vec<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Vec<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Call(MathFunction, Box<Expr>),
    /// Call of a function definition, removed by [`Expr::inline_functions`]
    Apply(String, Vec<Expr>),
}

/// A function definition: `lambda(params..., body)`
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
}

impl Expr {
    /// Identifiers referenced by the expression, in order of first appearance
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols = Vec::new();
        self.collect_symbols(&mut symbols);
        symbols
    }

    fn collect_symbols<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Symbol(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Number(_) | Expr::Time => {}
            Expr::Add(terms) | Expr::Mul(terms) | Expr::Apply(_, terms) => {
                terms.iter().for_each(|term| term.collect_symbols(out))
            }
            Expr::Sub(a, b) | Expr::Div(a, b) | Expr::Pow(a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
            Expr::Neg(a) | Expr::Call(_, a) => a.collect_symbols(out),
        }
    }

    /// Rebuilds the expression with `f` applied to every direct child
    fn map_children<Failure>(
        &self,
        mut f: impl FnMut(&Expr) -> Result<Expr, Failure>,
    ) -> Result<Expr, Failure> {
        Ok(match self {
            Expr::Number(_) | Expr::Symbol(_) | Expr::Time => self.clone(),
            Expr::Add(terms) => Expr::Add(terms.iter().map(&mut f).collect::<Result<_, _>>()?),
            Expr::Mul(terms) => Expr::Mul(terms.iter().map(&mut f).collect::<Result<_, _>>()?),
            Expr::Sub(a, b) => Expr::Sub(Box::new(f(a)?), Box::new(f(b)?)),
            Expr::Div(a, b) => Expr::Div(Box::new(f(a)?), Box::new(f(b)?)),
            Expr::Pow(a, b) => Expr::Pow(Box::new(f(a)?), Box::new(f(b)?)),
            Expr::Neg(a) => Expr::Neg(Box::new(f(a)?)),
            Expr::Call(function, a) => Expr::Call(*function, Box::new(f(a)?)),
            Expr::Apply(name, args) => Expr::Apply(
                name.clone(),
                args.iter().map(&mut f).collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Replaces every symbol for which `lookup` returns a value
    pub fn replace_symbols(&self, lookup: &dyn Fn(&str) -> Option<Expr>) -> Expr {
        match self {
            Expr::Symbol(name) => lookup(name).unwrap_or_else(|| self.clone()),
            _ => self
                .map_children(|child| Ok::<_, Infallible>(child.replace_symbols(lookup)))
                .unwrap_or_else(|never| match never {}),
        }
    }

    /// Replaces every call of a function definition by its body
    ///
    /// # Errors
    ///
    /// Returns an error if a called function is not defined, is called with the wrong
    /// number of arguments or (directly or indirectly) calls itself.
    pub fn inline_functions(&self, functions: &HashMap<String, Lambda>) -> Result<Expr, SBMLError> {
        self.inline_at_depth(functions, 0)
    }

    fn inline_at_depth(
        &self,
        functions: &HashMap<String, Lambda>,
        depth: usize,
    ) -> Result<Expr, SBMLError> {
        let Expr::Apply(name, args) = self else {
            return self.map_children(|child| child.inline_at_depth(functions, depth));
        };

        let lambda = functions
            .get(name)
            .ok_or_else(|| SBMLError::UnknownIdentifier {
                identifier: name.clone(),
                context: "function call".to_string(),
            })?;

        if lambda.params.len() != args.len() {
            return Err(SBMLError::ArityMismatch {
                name: name.clone(),
                expected: lambda.params.len(),
                found: args.len(),
            });
        }

        if depth >= MAX_INLINE_DEPTH {
            return Err(SBMLError::CircularDefinition(name.clone()));
        }

        let args = args
            .iter()
            .map(|arg| arg.inline_at_depth(functions, depth))
            .collect::<Result<Vec<_>, _>>()?;
        let bindings: HashMap<&str, &Expr> = lambda
            .params
            .iter()
            .map(String::as_str)
            .zip(args.iter())
            .collect();

        lambda
            .body
            .replace_symbols(&|symbol| bindings.get(symbol).map(|arg| (*arg).clone()))
            .inline_at_depth(functions, depth + 1)
    }

    /// Binding strength used to decide where parentheses are needed
    fn precedence(&self) -> u8 {
        match self {
            Expr::Add(_) | Expr::Sub(..) => 1,
            Expr::Mul(_) | Expr::Div(..) => 2,
            Expr::Neg(_) => 3,
            Expr::Number(value) if value.is_sign_negative() => 3,
            Expr::Pow(..) => 4,
            _ => 5,
        }
    }

    /// Renders the expression as Julia source
    ///
    /// # Arguments
    ///
    /// * `resolve` - Maps an identifier to its Julia spelling (e.g. `S[k+1]` for a state)
    /// * `time` - Julia spelling of the model time
    pub fn to_julia(&self, resolve: &dyn Fn(&str) -> String, time: &str) -> String {
        let wrap = |expr: &Expr, min: u8| {
            let rendered = expr.to_julia(resolve, time);
            if expr.precedence() < min {
                format!("({rendered})")
            } else {
                rendered
            }
        };

        match self {
            Expr::Number(value) => julia_number(*value),
            Expr::Symbol(name) => resolve(name),
            Expr::Time => time.to_string(),
            Expr::Add(terms) => terms
                .iter()
                .map(|term| wrap(term, 1))
                .collect::<Vec<_>>()
                .join(" + "),
            Expr::Sub(a, b) => format!("{} - {}", wrap(a, 1), wrap(b, 2)),
            Expr::Mul(terms) => terms
                .iter()
                .map(|term| wrap(term, 2))
                .collect::<Vec<_>>()
                .join(" * "),
            Expr::Div(a, b) => format!("{} / {}", wrap(a, 2), wrap(b, 3)),
            Expr::Neg(a) => format!("-{}", wrap(a, 4)),
            Expr::Pow(a, b) => format!("{} ^ {}", wrap(a, 5), wrap(b, 5)),
            Expr::Call(function, a) => {
                format!("{}({})", function.julia_name(), a.to_julia(resolve, time))
            }
            Expr::Apply(name, args) => format!(
                "{}({})",
                resolve(name),
                args.iter()
                    .map(|arg| arg.to_julia(resolve, time))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_julia(&|name| name.to_string(), "time"))
    }
}

/// Formats a number as a Julia floating point literal
pub fn julia_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{value:?}")
    }
}

/// Parses the expression held by a `<math>` element
pub fn parse_math(math: Node) -> Result<Expr, SBMLError> {
    let node = first_element(math)
        .ok_or_else(|| SBMLError::MalformedMath("empty <math> element".to_string()))?;
    parse_node(node)
}

/// Parses the `<lambda>` held by the `<math>` element of a function definition
pub fn parse_lambda(math: Node) -> Result<Lambda, SBMLError> {
    let mut lambda = first_element(math)
        .ok_or_else(|| SBMLError::MalformedMath("empty <math> element".to_string()))?;
    if lambda.tag_name().name() == "semantics" {
        lambda = first_element(lambda)
            .ok_or_else(|| SBMLError::MalformedMath("empty <semantics> element".to_string()))?;
    }
    if lambda.tag_name().name() != "lambda" {
        return Err(SBMLError::MalformedMath(format!(
            "expected <lambda>, found <{}>",
            lambda.tag_name().name()
        )));
    }

    let mut params = Vec::new();
    let mut body = None;
    for child in elements(lambda) {
        if child.tag_name().name() == "bvar" {
            let ci = first_element(child)
                .filter(|node| node.tag_name().name() == "ci")
                .ok_or_else(|| SBMLError::MalformedMath("<bvar> without <ci>".to_string()))?;
            params.push(text_of(ci));
        } else {
            body = Some(parse_node(child)?);
        }
    }

    let body = body.ok_or_else(|| SBMLError::MalformedMath("<lambda> without body".to_string()))?;
    Ok(Lambda { params, body })
}

fn parse_node(node: Node) -> Result<Expr, SBMLError> {
    match node.tag_name().name() {
        "apply" => parse_apply(node),
        "ci" => Ok(Expr::Symbol(text_of(node))),
        "cn" => parse_cn(node),
        "csymbol" => match node.attribute("definitionURL") {
            Some(TIME_SYMBOL_URL) => Ok(Expr::Time),
            other => Err(SBMLError::UnsupportedMath(format!(
                "csymbol {}",
                other.unwrap_or_default()
            ))),
        },
        "pi" => Ok(Expr::Number(PI)),
        "exponentiale" => Ok(Expr::Number(E)),
        "semantics" => first_element(node)
            .ok_or_else(|| SBMLError::MalformedMath("empty <semantics> element".to_string()))
            .and_then(parse_node),
        other => Err(SBMLError::UnsupportedMath(other.to_string())),
    }
}

fn parse_cn(node: Node) -> Result<Expr, SBMLError> {
    let parts: Vec<&str> = node
        .children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    match (node.attribute("type").unwrap_or("real"), parts.as_slice()) {
        ("real" | "integer" | "double", [value]) => Ok(Expr::Number(parse_number(value)?)),
        ("e-notation", [mantissa, exponent]) => Ok(Expr::Number(
            parse_number(mantissa)? * 10f64.powf(parse_number(exponent)?),
        )),
        ("rational", [numerator, denominator]) => Ok(Expr::Number(
            parse_number(numerator)? / parse_number(denominator)?,
        )),
        ("real" | "integer" | "double" | "e-notation" | "rational", _) => Err(
            SBMLError::MalformedMath(format!("unexpected <cn> content {parts:?}")),
        ),
        (other, _) => Err(SBMLError::UnsupportedMath(format!("cn type=\"{other}\""))),
    }
}

fn parse_apply(node: Node) -> Result<Expr, SBMLError> {
    let mut children = elements(node);
    let operator = children
        .next()
        .ok_or_else(|| SBMLError::MalformedMath("empty <apply> element".to_string()))?;

    let mut logbase = None;
    let mut degree = None;
    let mut args = Vec::new();
    for child in children {
        match child.tag_name().name() {
            qualifier @ ("logbase" | "degree") => {
                let inner = first_element(child).ok_or_else(|| {
                    SBMLError::MalformedMath(format!("empty <{qualifier}> element"))
                })?;
                let value = parse_node(inner)?;
                if qualifier == "logbase" {
                    logbase = Some(value);
                } else {
                    degree = Some(value);
                }
            }
            _ => args.push(parse_node(child)?),
        }
    }

    let op = operator.tag_name().name();
    match op {
        "plus" => Ok(match args.len() {
            0 => Expr::Number(0.0),
            1 => unary(op, args)?,
            _ => Expr::Add(args),
        }),
        "times" => Ok(match args.len() {
            0 => Expr::Number(1.0),
            1 => unary(op, args)?,
            _ => Expr::Mul(args),
        }),
        "minus" => match args.len() {
            1 => Ok(Expr::Neg(Box::new(unary(op, args)?))),
            _ => {
                let (a, b) = binary(op, args)?;
                Ok(Expr::Sub(Box::new(a), Box::new(b)))
            }
        },
        "divide" => {
            let (a, b) = binary(op, args)?;
            Ok(Expr::Div(Box::new(a), Box::new(b)))
        }
        "power" => {
            let (a, b) = binary(op, args)?;
            Ok(Expr::Pow(Box::new(a), Box::new(b)))
        }
        "exp" => call(MathFunction::Exp, op, args),
        "ln" => call(MathFunction::Ln, op, args),
        "abs" => call(MathFunction::Abs, op, args),
        "floor" => call(MathFunction::Floor, op, args),
        "ceiling" => call(MathFunction::Ceiling, op, args),
        "sin" => call(MathFunction::Sin, op, args),
        "cos" => call(MathFunction::Cos, op, args),
        "tan" => call(MathFunction::Tan, op, args),
        "log" => match logbase {
            None => call(MathFunction::Log10, op, args),
            Some(Expr::Number(base)) if base == 10.0 => call(MathFunction::Log10, op, args),
            Some(base) => Ok(Expr::Div(
                Box::new(call(MathFunction::Ln, op, args)?),
                Box::new(Expr::Call(MathFunction::Ln, Box::new(base))),
            )),
        },
        "root" => match degree {
            None => call(MathFunction::Sqrt, op, args),
            Some(Expr::Number(degree)) if degree == 2.0 => call(MathFunction::Sqrt, op, args),
            Some(degree) => Ok(Expr::Pow(
                Box::new(unary(op, args)?),
                Box::new(Expr::Div(Box::new(Expr::Number(1.0)), Box::new(degree))),
            )),
        },
        "ci" => Ok(Expr::Apply(text_of(operator), args)),
        other => Err(SBMLError::UnsupportedMath(other.to_string())),
    }
}

fn call(function: MathFunction, op: &str, args: Vec<Expr>) -> Result<Expr, SBMLError> {
    Ok(Expr::Call(function, Box::new(unary(op, args)?)))
}

fn unary(op: &str, mut args: Vec<Expr>) -> Result<Expr, SBMLError> {
    let found = args.len();
    match (args.pop(), found) {
        (Some(arg), 1) => Ok(arg),
        _ => Err(arity_error(op, 1, found)),
    }
}

fn binary(op: &str, args: Vec<Expr>) -> Result<(Expr, Expr), SBMLError> {
    let found = args.len();
    let mut args = args.into_iter();
    match (args.next(), args.next(), args.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(arity_error(op, 2, found)),
    }
}

fn arity_error(op: &str, expected: usize, found: usize) -> SBMLError {
    SBMLError::MalformedMath(format!(
        "<{op}> expects {expected} argument(s), found {found}"
    ))
}

fn parse_number(value: &str) -> Result<f64, SBMLError> {
    value.trim().parse().map_err(|_| SBMLError::InvalidNumber {
        value: value.to_string(),
        context: "<cn>".to_string(),
    })
}

pub(crate) fn elements<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

pub(crate) fn first_element<'a, 'input>(node: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    elements(node).next()
}

fn text_of(node: Node) -> String {
    node.children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .collect::<String>()
        .trim()
        .to_string()
}
