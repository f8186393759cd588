//! Fatal error taxonomy.
//!
//! Only [`SchemaError`] aborts a compilation. Recoverable findings are
//! [`crate::diagnostic::Diagnostic`]s and validation failures are plain data
//! ([`crate::validator::Outcome`]).
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaErrorKind {
    #[error("enum must list at least one value")]
    EmptyEnum,
    #[error("enum lists {value} more than once")]
    DuplicateEnumValue { value: Value },
    #[error("{combinator} needs at least 2 branches, found {found}")]
    TooFewBranches { combinator: &'static str, found: usize },
    #[error("array schema has no `items`")]
    MissingItems,
    #[error("required property `{property}` is not declared in `properties`")]
    UnknownRequiredProperty { property: String },
    #[error("reference to undeclared schema `{name}`")]
    UnresolvedReference { name: String },
    #[error("unsupported reference `{reference}` (expected a schema in the same document)")]
    InvalidReference { reference: String },
    #[error("reference cycle with no definition: {}", cycle.join(" -> "))]
    UnguardedCycle { cycle: Vec<String> },
    #[error("expected a schema object, found {found}")]
    NotAnObject { found: String },
}

/// A malformed schema. Carries the entry name and a JSON pointer into that
/// entry once lowering or the builder knows them.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}{kind}", self.prefix())]
pub struct SchemaError {
    pub schema: Option<String>,
    pub location: String,
    pub kind: SchemaErrorKind,
}

impl SchemaError {
    pub fn new(kind: SchemaErrorKind) -> Self {
        Self { schema: None, location: String::new(), kind }
    }

    /// Attach the entry/location unless an inner frame already did.
    pub fn at(mut self, schema: &str, location: &str) -> Self {
        if self.schema.is_none() {
            self.schema = Some(schema.to_string());
            self.location = location.to_string();
        }
        self
    }

    fn prefix(&self) -> String {
        match (&self.schema, self.location.is_empty()) {
            (Some(schema), true) => format!("schema `{schema}`: "),
            (Some(schema), false) => format!("schema `{schema}` at {}: ", self.location),
            (None, _) => String::new(),
        }
    }
}

impl From<SchemaErrorKind> for SchemaError {
    fn from(kind: SchemaErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Failure to turn source text into a [`crate::ir::SchemaDocument`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("at JSON path {path} → {message}")]
    Syntax { path: String, message: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no schema named `{0}` in this registry")]
pub struct UnknownSchema(pub String);
