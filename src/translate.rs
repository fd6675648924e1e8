use crate::options::ConfigurationError;
use crate::parser;

pub mod sql;

/// The type a rendered operand carries during generation. `Identifier` is an
///  untyped field reference, resolved by the database at execution time, and
///  is therefore compatible with everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermType {
    Undefined,
    Identifier,
    Integer,
    Decimal,
    String,
    Date,
    Time,
    DateTime,
    Bool,
}

impl TermType {
    pub fn is_compatible(self, other: TermType) -> bool {
        self == other || self == TermType::Identifier || other == TermType::Identifier
    }

    /// The common type of two compatible operands: the concrete one, or
    ///  `Identifier` when both sides are field references.
    pub fn resolve(self, other: TermType) -> TermType {
        if self == TermType::Identifier {
            other
        } else {
            self
        }
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, TermType::Date | TermType::Time | TermType::DateTime)
    }
}

impl std::fmt::Display for TermType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Undefined => "undefined",
            Self::Identifier => "identifier",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::Bool => "bool",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeError {
    Incompatible { left: TermType, right: TermType },
    /// Operator applied to a type outside its operand class, e.g. `between`
    ///  over strings
    BadOperandClass {
        operator: &'static str,
        term_type: TermType,
    },
    NotFilterable { field: String },
}

impl std::fmt::Display for TypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incompatible { left, right } => {
                write!(f, "Incompatible operand types {left} and {right}")
            }
            Self::BadOperandClass {
                operator,
                term_type,
            } => {
                write!(f, "Operator {operator} cannot be applied to {term_type}")
            }
            Self::NotFilterable { field } => write!(f, "Field {field} not filterable"),
        }
    }
}

impl std::error::Error for TypeError {}

#[derive(Debug, Clone, PartialEq)]
pub enum MacroError {
    Unknown(String),
    MissingArgument(String),
    WrongArgumentType(String),
    UnexpectedArguments(String),
    InvalidDuration(String),
}

impl std::fmt::Display for MacroError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(name) => write!(f, "Unknown macro {name}"),
            Self::MissingArgument(name) => write!(f, "Macro {name} is missing its argument"),
            Self::WrongArgumentType(name) => {
                write!(f, "Macro {name} called with an argument of the wrong type")
            }
            Self::UnexpectedArguments(name) => {
                write!(f, "Macro {name} called with unexpected arguments")
            }
            Self::InvalidDuration(value) => {
                write!(f, "'{value}' is not a valid ISO-8601 duration")
            }
        }
    }
}

impl std::error::Error for MacroError {}

/// A generation-side failure, before it is wrapped with the offending
///  expression text.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    Type(TypeError),
    Macro(MacroError),
    Config(ConfigurationError),
    Sink(std::fmt::Error),
}

impl From<TypeError> for RenderError {
    fn from(value: TypeError) -> Self {
        Self::Type(value)
    }
}

impl From<MacroError> for RenderError {
    fn from(value: MacroError) -> Self {
        Self::Macro(value)
    }
}

impl From<ConfigurationError> for RenderError {
    fn from(value: ConfigurationError) -> Self {
        Self::Config(value)
    }
}

impl From<std::fmt::Error> for RenderError {
    fn from(value: std::fmt::Error) -> Self {
        Self::Sink(value)
    }
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Type(e) => write!(f, "{e}"),
            Self::Macro(e) => write!(f, "{e}"),
            Self::Config(e) => write!(f, "{e}"),
            Self::Sink(_) => write!(f, "Cannot write to the output sink"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Type(e) => Some(e),
            Self::Macro(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Sink(e) => Some(e),
        }
    }
}

/// What [crate::interpreter::CodeGenerator::visit] returns: parse failures
///  wrapped with the source text, everything after parsing wrapped as a
///  generation failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Syntax {
        expression: String,
        cause: parser::Error,
    },
    Generate {
        expression: String,
        cause: RenderError,
    },
}

impl Error {
    pub fn syntax(expression: &str, cause: parser::Error) -> Self {
        Self::Syntax {
            expression: expression.to_string(),
            cause,
        }
    }

    pub fn generate(expression: &str, cause: RenderError) -> Self {
        Self::Generate {
            expression: expression.to_string(),
            cause,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax { expression, cause } => {
                write!(f, "Syntax error in \"{expression}\": {cause}")
            }
            Self::Generate { expression, cause } => {
                write!(f, "Cannot generate code for \"{expression}\": {cause}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Syntax { cause, .. } => Some(cause),
            Self::Generate { cause, .. } => Some(cause),
        }
    }
}
