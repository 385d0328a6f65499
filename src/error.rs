//! Error types for the SIML compiler
//!
//! Provides structured error handling with source locations and the stable
//! error numbers that test suites assert on.

use crate::location::Location;
use std::fmt;
use thiserror::Error;

/// Taxonomy of user visible errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Redefinition,
    UndefinedReference,
    ArgumentBinding,
    TypeMismatch,
    IllegalAssignment,
    UnresolvedConstant,
    Structural,
    Dataflow,
}

/// Error kinds in SIML
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    // Namespaces
    #[error("duplicate attribute '{0}'")]
    DuplicateAttribute(String),
    #[error("undefined attribute '{0}'")]
    UndefinedAttribute(String),
    #[error("attribute '{0}' does not belong to the compiled object")]
    ForeignAttribute(String),
    #[error("'{0}' is not callable")]
    NotCallable(String),

    // Argument lists
    #[error("positional argument after keyword argument in call of '{0}'")]
    PositionalAfterKeyword(String),
    #[error("argument '{1}' of '{0}' has no default value but follows an argument with a default")]
    DefaultBeforePositional(String, String),
    #[error("duplicate argument name '{1}' in definition of '{0}'")]
    DuplicateParameter(String, String),
    #[error("too many arguments for '{0}': expected at most {1}, got {2}")]
    TooManyArguments(String, usize, usize),
    #[error("'{0}' has no argument named '{1}'")]
    UnknownKeyword(String, String),
    #[error("argument '{1}' of '{0}' is given more than once")]
    DuplicateArgument(String, String),
    #[error("missing argument '{1}' in call of '{0}'")]
    MissingArgument(String, String),
    #[error("argument '{1}' of '{0}': expected {2}, got {3}")]
    ArgumentType(String, String, String, String),
    #[error("return value of '{0}': expected {1}, got {2}")]
    ReturnType(String, String, String),

    // Types
    #[error("unsupported operand types for '{0}': {1}")]
    OperandType(String, String),
    #[error("condition must be Bool, got {0}")]
    ConditionType(String),
    #[error("'{0}' is not a class or type")]
    NotAType(String),

    // Roles and known values
    #[error("unknown constant '{0}' can not be used here")]
    UnknownConstant(String),
    #[error("role of '{0}' is still undetermined")]
    UndeterminedRole(String),
    #[error("illegal assignment: {1} value to {0}")]
    IllegalRole(String, String),
    #[error("'{0}' can not be assigned to")]
    NotAssignable(String),
    #[error("time derivative of '{0}' is illegal: only variables can be state variables")]
    InvalidDerivative(String),

    // Structure
    #[error("generated 'if' statement has no 'else' clause")]
    MissingElse,
    #[error("'return' inside an 'if' statement that generates code")]
    ReturnInResidualIf,
    #[error("'return' outside of function")]
    ReturnOutsideFunction,
    #[error("code for '{0}' would be generated outside of a compiled function")]
    CodeOutsideCompile(String),
    #[error("maximum function recursion depth ({0}) exceeded")]
    CallDepthExceeded(usize),
    #[error("maximum submodel nesting depth ({0}) exceeded")]
    NestingDepthExceeded(usize),

    // Dataflow
    #[error("illegal read access in '{0}' to: {1}")]
    IllegalRead(String, String),
    #[error("illegal assignment in '{0}' to: {1}")]
    IllegalTarget(String, String),
    #[error("missing assignment in '{0}' to: {1}")]
    MissingAssignment(String, String),
}

impl ErrorKind {
    /// Stable error number.
    pub fn code(&self) -> u32 {
        match self {
            ErrorKind::DuplicateAttribute(_) => 3800910,
            ErrorKind::UndefinedAttribute(_) => 3250100,
            ErrorKind::ForeignAttribute(_) => 3250200,
            ErrorKind::NotCallable(_) => 3250300,
            ErrorKind::PositionalAfterKeyword(_) => 2140010,
            ErrorKind::DefaultBeforePositional(..) => 3200110,
            ErrorKind::DuplicateParameter(..) => 3200120,
            ErrorKind::TooManyArguments(..) => 3200250,
            ErrorKind::UnknownKeyword(..) => 3200260,
            ErrorKind::DuplicateArgument(..) => 3200270,
            ErrorKind::MissingArgument(..) => 3200280,
            ErrorKind::ArgumentType(..) => 3200310,
            ErrorKind::ReturnType(..) => 3200320,
            ErrorKind::OperandType(..) => 3300100,
            ErrorKind::ConditionType(_) => 3300200,
            ErrorKind::NotAType(_) => 3300300,
            ErrorKind::UnknownConstant(_) => 3190110,
            ErrorKind::UndeterminedRole(_) => 3190120,
            ErrorKind::IllegalRole(..) => 3600100,
            ErrorKind::NotAssignable(_) => 3600200,
            ErrorKind::InvalidDerivative(_) => 3600300,
            ErrorKind::MissingElse => 3700630,
            ErrorKind::ReturnInResidualIf => 3700640,
            ErrorKind::ReturnOutsideFunction => 3700700,
            ErrorKind::CodeOutsideCompile(_) => 3700800,
            ErrorKind::CallDepthExceeded(_) => 3700910,
            ErrorKind::NestingDepthExceeded(_) => 3700920,
            ErrorKind::IllegalRead(..) => 4500100,
            ErrorKind::IllegalTarget(..) => 4500200,
            ErrorKind::MissingAssignment(..) => 4500300,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            ErrorKind::DuplicateAttribute(_) => Category::Redefinition,
            ErrorKind::UndefinedAttribute(_)
            | ErrorKind::ForeignAttribute(_)
            | ErrorKind::NotCallable(_) => Category::UndefinedReference,
            ErrorKind::PositionalAfterKeyword(_)
            | ErrorKind::DefaultBeforePositional(..)
            | ErrorKind::DuplicateParameter(..)
            | ErrorKind::TooManyArguments(..)
            | ErrorKind::UnknownKeyword(..)
            | ErrorKind::DuplicateArgument(..)
            | ErrorKind::MissingArgument(..) => Category::ArgumentBinding,
            ErrorKind::ArgumentType(..)
            | ErrorKind::ReturnType(..)
            | ErrorKind::OperandType(..)
            | ErrorKind::ConditionType(_)
            | ErrorKind::NotAType(_) => Category::TypeMismatch,
            ErrorKind::IllegalRole(..)
            | ErrorKind::NotAssignable(_)
            | ErrorKind::InvalidDerivative(_)
            | ErrorKind::IllegalTarget(..) => Category::IllegalAssignment,
            ErrorKind::UnknownConstant(_) | ErrorKind::UndeterminedRole(_) => {
                Category::UnresolvedConstant
            }
            ErrorKind::MissingElse
            | ErrorKind::ReturnInResidualIf
            | ErrorKind::ReturnOutsideFunction
            | ErrorKind::CodeOutsideCompile(_)
            | ErrorKind::CallDepthExceeded(_)
            | ErrorKind::NestingDepthExceeded(_) => Category::Structural,
            ErrorKind::IllegalRead(..) | ErrorKind::MissingAssignment(..) => Category::Dataflow,
        }
    }
}

/// A SIML error with location information
#[derive(Debug, Clone)]
pub struct SimlError {
    pub kind: ErrorKind,
    pub location: Option<Location>,
    /// Call sites the error propagated through, innermost first.
    pub trace: Vec<Location>,
    pub source_line: Option<(usize, usize, String)>,
}

impl SimlError {
    pub fn new(kind: ErrorKind, location: Option<Location>) -> Self {
        Self {
            kind,
            location,
            trace: Vec::new(),
            source_line: None,
        }
    }

    pub fn code(&self) -> u32 {
        self.kind.code()
    }

    /// Attach `location` unless a more specific one is already known.
    pub fn or_location(mut self, location: &Location) -> Self {
        if self.location.is_none() {
            self.location = Some(location.clone());
        }
        self
    }

    /// Record a call site the error travelled through.
    pub fn called_from(mut self, location: &Location) -> Self {
        self.trace.push(location.clone());
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        if let Some(location) = &self.location {
            let (line, column) = location.line_col(source);
            if let Some(text) = source.lines().nth(line - 1) {
                self.source_line = Some((line, column, text.to_string()));
            }
        }
        self
    }
}

impl From<ErrorKind> for SimlError {
    fn from(kind: ErrorKind) -> Self {
        SimlError::new(kind, None)
    }
}

impl fmt::Display for SimlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.location, &self.source_line) {
            (Some(location), Some((line, column, _))) => write!(
                f,
                "[{} line {}:{}] Error (#{}): {}",
                location.file,
                line,
                column,
                self.code(),
                self.kind
            )?,
            (Some(location), None) => {
                write!(f, "[{}] Error (#{}): {}", location, self.code(), self.kind)?
            }
            (None, _) => write!(f, "Error (#{}): {}", self.code(), self.kind)?,
        }

        if let Some((_, column, text)) = &self.source_line {
            write!(f, "\n  | {}", text)?;
            write!(f, "\n  | {}^", " ".repeat(column.saturating_sub(1)))?;
        }
        for site in &self.trace {
            write!(f, "\n  called from {}", site)?;
        }
        Ok(())
    }
}

impl std::error::Error for SimlError {}

/// Result type for SIML operations
pub type Result<T> = std::result::Result<T, SimlError>;
