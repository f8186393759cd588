// Schema node model. Pure data: no compiled state, no validation behavior.
//
// Variants whose invariants matter (enum, union, intersection, object) keep
// their fields private and are only built through checked constructors.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::constraint::arr::ValueKey;
use crate::diagnostic::Diagnostic;
use crate::error::{SchemaError, SchemaErrorKind};

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Primitive(PrimitiveNode),
    Enum(EnumNode),
    Array(ArrayNode),
    Object(ObjectNode),
    Union(UnionNode),
    Intersection(IntersectionNode),
    Negation(NegationNode),
    Reference(ReferenceNode),
    /// Accept-anything fallback: `{}` or an unsupported `type` token.
    Unknown(UnknownNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl PrimitiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Format {
    Uuid,
    Email,
    Uri,
    DateTime,
    Date,
    Int32,
    Int64,
    Other(String),
}

impl Format {
    pub fn parse(token: &str) -> Self {
        match token {
            "uuid" => Self::Uuid,
            "email" => Self::Email,
            "uri" | "url" => Self::Uri,
            "date-time" => Self::DateTime,
            "date" => Self::Date,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Uuid => "uuid",
            Self::Email => "email",
            Self::Uri => "uri",
            Self::DateTime => "date-time",
            Self::Date => "date",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Other(token) => token,
        }
    }
}

/// `exclusiveMinimum` / `exclusiveMaximum`: the OpenAPI 3.0 boolean form or
/// the JSON Schema numeric form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Exclusive {
    Flag(bool),
    Bound(f64),
}

/// Leaf refinements. Only the ones relevant to the node's kind are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<Exclusive>,
    pub exclusive_maximum: Option<Exclusive>,
    pub multiple_of: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveNode {
    pub kind: PrimitiveKind,
    pub format: Option<Format>,
    pub constraints: Constraints,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumNode {
    values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNode {
    pub items: Box<SchemaNode>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum AdditionalProperties {
    #[default]
    Allow,
    Deny,
    Schema(Box<SchemaNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    properties: IndexMap<String, SchemaNode>,
    required: IndexSet<String>,
    min_properties: Option<u64>,
    max_properties: Option<u64>,
    additional: AdditionalProperties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionMode {
    AnyOf,
    OneOf,
}

impl UnionMode {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::AnyOf => "anyOf",
            Self::OneOf => "oneOf",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionNode {
    branches: Vec<SchemaNode>,
    mode: UnionMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionNode {
    branches: Vec<SchemaNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NegationNode {
    pub inner: Box<SchemaNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceNode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnknownNode {
    /// The unrecognized `type` token, if that is why we fell back.
    pub token: Option<String>,
    pub raw: Value,
}

// ————————————————————————————————————————————————————————————————————————————
// CONSTRUCTORS
// ————————————————————————————————————————————————————————————————————————————

impl SchemaNode {
    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::Primitive(PrimitiveNode { kind, format: None, constraints: Constraints::default() })
    }
    pub fn string() -> Self { Self::primitive(PrimitiveKind::String) }
    pub fn number() -> Self { Self::primitive(PrimitiveKind::Number) }
    pub fn integer() -> Self { Self::primitive(PrimitiveKind::Integer) }
    pub fn boolean() -> Self { Self::primitive(PrimitiveKind::Boolean) }
    pub fn null() -> Self { Self::primitive(PrimitiveKind::Null) }

    pub fn any() -> Self {
        Self::Unknown(UnknownNode { token: None, raw: Value::Object(Default::default()) })
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference(ReferenceNode { name: name.into() })
    }

    pub fn array(items: SchemaNode) -> Self {
        Self::Array(ArrayNode::new(items))
    }

    pub fn negation(inner: SchemaNode) -> Self {
        Self::Negation(NegationNode { inner: Box::new(inner) })
    }
}

impl EnumNode {
    pub fn new(values: Vec<Value>) -> Result<Self, SchemaError> {
        if values.is_empty() {
            return Err(SchemaErrorKind::EmptyEnum.into());
        }
        let mut seen = std::collections::BTreeSet::new();
        for value in &values {
            if !seen.insert(ValueKey::of(value)) {
                return Err(SchemaErrorKind::DuplicateEnumValue { value: value.clone() }.into());
            }
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl ArrayNode {
    pub fn new(items: SchemaNode) -> Self {
        Self { items: Box::new(items), min_items: None, max_items: None, unique_items: false }
    }
}

impl ObjectNode {
    pub fn new(
        properties: IndexMap<String, SchemaNode>,
        required: IndexSet<String>,
    ) -> Result<Self, SchemaError> {
        if let Some(missing) = required.iter().find(|name| !properties.contains_key(*name)) {
            return Err(SchemaErrorKind::UnknownRequiredProperty { property: missing.clone() }.into());
        }
        Ok(Self {
            properties,
            required,
            min_properties: None,
            max_properties: None,
            additional: AdditionalProperties::Allow,
        })
    }

    pub fn with_property_count(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_properties = min;
        self.max_properties = max;
        self
    }

    pub fn with_additional(mut self, additional: AdditionalProperties) -> Self {
        self.additional = additional;
        self
    }

    pub fn properties(&self) -> &IndexMap<String, SchemaNode> { &self.properties }
    pub fn required(&self) -> &IndexSet<String> { &self.required }
    pub fn min_properties(&self) -> Option<u64> { self.min_properties }
    pub fn max_properties(&self) -> Option<u64> { self.max_properties }
    pub fn additional(&self) -> &AdditionalProperties { &self.additional }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(name)
    }
}

impl UnionNode {
    pub fn new(branches: Vec<SchemaNode>, mode: UnionMode) -> Result<Self, SchemaError> {
        check_branches(mode.keyword(), &branches)?;
        Ok(Self { branches, mode })
    }

    pub fn branches(&self) -> &[SchemaNode] { &self.branches }
    pub fn mode(&self) -> UnionMode { self.mode }
}

impl IntersectionNode {
    pub fn new(branches: Vec<SchemaNode>) -> Result<Self, SchemaError> {
        check_branches("allOf", &branches)?;
        Ok(Self { branches })
    }

    pub fn branches(&self) -> &[SchemaNode] { &self.branches }
}

fn check_branches(combinator: &'static str, branches: &[SchemaNode]) -> Result<(), SchemaError> {
    if branches.len() < 2 {
        return Err(SchemaErrorKind::TooFewBranches { combinator, found: branches.len() }.into());
    }
    Ok(())
}

// ————————————————————————————————————————————————————————————————————————————
// DOCUMENT
// ————————————————————————————————————————————————————————————————————————————

/// Named schema entries. Owns every node; immutable once built.
#[derive(Debug, Clone, Default)]
pub struct SchemaDocument {
    entries: IndexMap<String, SchemaNode>,
    diagnostics: Vec<Diagnostic>,
}

impl SchemaDocument {
    pub fn from_entries(entries: IndexMap<String, SchemaNode>) -> Self {
        Self { entries, diagnostics: Vec::new() }
    }

    pub(crate) fn with_diagnostics(entries: IndexMap<String, SchemaNode>, diagnostics: Vec<Diagnostic>) -> Self {
        Self { entries, diagnostics }
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Findings recorded while lowering the source.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
