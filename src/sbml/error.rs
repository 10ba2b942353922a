use thiserror::Error;

/// Errors that can occur while reading an SBML model and converting its math
#[derive(Debug, Error)]
pub enum SBMLError {
    /// Error when reading an SBML file fails
    #[error("Failed to read SBML file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error when the file is not well-formed XML
    #[error("Failed to parse XML: {0}")]
    XmlError(#[from] roxmltree::Error),

    /// Error when the document root is not an `<sbml>` element
    #[error("Not an SBML document: root element is <{0}>")]
    NotSbml(String),

    /// Error when the SBML document doesn't contain a model
    #[error("SBML document does not contain a model")]
    MissingModel,

    /// Error when the model has no species that evolve over time
    #[error("Model has no state species to fit")]
    NoStateSpecies,

    /// Error when a required attribute is missing
    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    /// Error when an identifier is not a valid SBML SId
    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// Error when an identifier is declared twice
    #[error("Identifier '{0}' is declared more than once")]
    DuplicateIdentifier(String),

    /// Error when a numeric attribute or `<cn>` cannot be parsed
    #[error("Invalid number '{value}' in {context}")]
    InvalidNumber { value: String, context: String },

    /// Error when a model uses an SBML construct that cannot be discretised
    #[error("Unsupported SBML construct: {0}")]
    Unsupported(String),

    /// Error when a MathML element has no equivalent in the generated program
    #[error("Unsupported MathML element <{0}>")]
    UnsupportedMath(String),

    /// Error when a MathML tree is structurally invalid
    #[error("Malformed MathML: {0}")]
    MalformedMath(String),

    /// Error when a math expression references an unknown identifier
    #[error("Unknown identifier '{identifier}' in {context}")]
    UnknownIdentifier { identifier: String, context: String },

    /// Error when a function definition is called with the wrong number of arguments
    #[error("Function '{name}' expects {expected} arguments, found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// Error when assignment rules or function definitions refer to themselves
    #[error("Circular definition through '{0}'")]
    CircularDefinition(String),

    /// Error when a reaction references an undeclared species
    #[error("Reaction {reaction} references unknown species '{species}'")]
    UnknownSpecies { reaction: String, species: String },
}
