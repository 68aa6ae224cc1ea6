//! Error types for RowModel operations.

use std::fmt;

/// The primary error type for all RowModel operations.
#[derive(Debug)]
pub enum Error {
    /// Storage-layer errors, propagated as the driver reported them
    Query(QueryError),
    /// A value could not be converted to the requested type
    Type(TypeError),
    /// Schema errors (missing table or column)
    Schema(SchemaError),
    /// Model configuration errors
    Config(ConfigError),
    /// Validation errors collected before a store
    Validation(ValidationError),
    /// A delete was blocked by a restricting association
    Restricted(RestrictConflict),
    /// A uniqueness lookup matched more than one row
    Ambiguous(AmbiguousError),
    /// Malformed JSON found in a stored attribute
    Decode(DecodeError),
    /// JSON encoding failure
    Serde(String),
    /// Raised by user hooks and object attributes
    Custom(String),
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub table: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Row to update or erase does not exist
    NotFound,
    /// Constraint violation reported by the store
    Constraint,
    /// Transaction misuse (commit without begin, etc.)
    Transaction,
    /// Other storage error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub table: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Table or view not found
    TableNotFound,
    /// Column not found
    ColumnNotFound,
    /// Table already exists
    TableExists,
}

#[derive(Debug)]
pub struct ConfigError {
    pub model: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// A delete that would orphan rows behind a `Restrict` association.
///
/// `path` names the cascade steps from the deleted row down to the
/// association holding the blocking rows; the last element is the
/// restricting association itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictConflict {
    pub model: String,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousError {
    pub table: String,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct DecodeError {
    pub table: String,
    pub attr: String,
    pub message: String,
}

/// Everything that prevents a row from being stored.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// In the order they were reported; model-level entries use field
    /// `__model__`.
    pub errors: Vec<FieldValidationError>,
}

/// One reported problem.
#[derive(Debug, Clone)]
pub struct FieldValidationError {
    /// Column or attribute name
    pub field: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

/// The type of validation problem that was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Reported by an attribute's own validation
    Custom,
    /// Reported by the model-level hook
    Model,
    /// A hook failed while validating; its error was folded in here
    Fault,
}

impl ValidationError {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn add(
        &mut self,
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldValidationError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    /// Record a problem reported by an attribute.
    pub fn add_custom(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.add(field, ValidationErrorKind::Custom, message);
    }

    /// Record a problem reported by the model hook.
    pub fn add_model_error(&mut self, message: impl Into<String>) {
        self.add("__model__", ValidationErrorKind::Model, message);
    }

    /// Record a hook failure as an error entry instead of propagating it.
    pub fn add_fault(&mut self, field: impl Into<String>, err: &Error) {
        self.add(field, ValidationErrorKind::Fault, err.to_string());
    }

    /// Messages in insertion order.
    pub fn messages(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.message.as_str()).collect()
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}

impl Error {
    /// Shorthand for a configuration error about `model`.
    pub fn config(model: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            model: Some(model.into()),
            message: message.into(),
            source: None,
        })
    }

    /// Shorthand for a missing table or view.
    pub fn table_not_found(table: impl Into<String>) -> Self {
        let table = table.into();
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::TableNotFound,
            message: format!("table or view '{}' does not exist", table),
            table,
        })
    }

    /// Is this a blocked delete?
    pub fn is_restricted(&self) -> bool {
        matches!(self, Error::Restricted(_))
    }

    /// The offending association path of a blocked delete.
    pub fn restrict_path(&self) -> Option<&[String]> {
        match self {
            Error::Restricted(r) => Some(&r.path),
            _ => None,
        }
    }

    /// The collected validation errors, if this is a validation failure.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Query(e) => match &e.table {
                Some(table) => write!(f, "Query error on '{}': {}", table, e.message),
                None => write!(f, "Query error: {}", e.message),
            },
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Restricted(e) => write!(f, "Delete restricted: {}", e),
            Error::Ambiguous(e) => write!(
                f,
                "Expected at most one row in '{}', found {}",
                e.table, e.count
            ),
            Error::Decode(e) => write!(
                f,
                "Malformed JSON in '{}.{}': {}",
                e.table, e.attr, e.message
            ),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{}: {}", model, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for RestrictConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.model, self.path.join(" -> "))
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "validation passed")
        } else if self.errors.len() == 1 {
            let err = &self.errors[0];
            write!(f, "validation error on '{}': {}", err.field, err.message)
        } else {
            writeln!(f, "validation errors:")?;
            for err in &self.errors {
                writeln!(f, "  - {}: {}", err.field, err.message)?;
            }
            Ok(())
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<RestrictConflict> for Error {
    fn from(err: RestrictConflict) -> Self {
        Error::Restricted(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for RowModel operations.
pub type Result<T> = std::result::Result<T, Error>;
