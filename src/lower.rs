//! Source document → [`SchemaDocument`].
//!
//! Each schema object is deserialized one level at a time into [`RawSchema`];
//! children stay as raw JSON until their own turn, so an unsupported
//! fragment can be kept verbatim in an `Unknown` node and a syntax error can
//! be reported with the full path into the document.
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::diagnostic::{DiagnosticKind, Pointer, Sink};
use crate::error::{LoadError, SchemaError, SchemaErrorKind};
use crate::ir::{
    AdditionalProperties, ArrayNode, Constraints, EnumNode, Exclusive, Format, IntersectionNode,
    ObjectNode, PrimitiveKind, PrimitiveNode, SchemaDocument, SchemaNode, UnionMode, UnionNode,
    UnknownNode,
};
use crate::validator::kind_of;

// ————————————————————————————————————————————————————————————————————————————
// RAW FORM
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawSchema {
    #[serde(rename = "$ref")]
    reference: Option<String>,
    #[serde(rename = "enum")]
    enum_values: Option<Vec<Value>>,
    #[serde(rename = "const", deserialize_with = "present")]
    const_value: Option<Value>,
    one_of: Option<Vec<Value>>,
    any_of: Option<Vec<Value>>,
    all_of: Option<Vec<Value>>,
    not: Option<Value>,

    #[serde(rename = "type")]
    ty: Option<TypeToken>,
    format: Option<String>,
    nullable: bool,

    items: Option<Value>,
    min_items: Option<u64>,
    max_items: Option<u64>,
    unique_items: bool,

    properties: Option<IndexMap<String, Value>>,
    required: Option<Required>,
    min_properties: Option<u64>,
    max_properties: Option<u64>,
    additional_properties: Option<Value>,

    min_length: Option<u64>,
    max_length: Option<u64>,
    pattern: Option<String>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    exclusive_minimum: Option<RawExclusive>,
    exclusive_maximum: Option<RawExclusive>,
    multiple_of: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TypeToken {
    One(String),
    Many(Vec<String>),
}

/// Object-level list, or the per-property boolean form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Required {
    Names(Vec<String>),
    // the parent object reads it off the raw property value
    #[allow(dead_code)]
    Flag(bool),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum RawExclusive {
    Flag(bool),
    Bound(f64),
}

impl From<RawExclusive> for Exclusive {
    fn from(raw: RawExclusive) -> Self {
        match raw {
            RawExclusive::Flag(flag) => Exclusive::Flag(flag),
            RawExclusive::Bound(bound) => Exclusive::Bound(bound),
        }
    }
}

/// `const: null` is a constraint, not an absent key.
fn present<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(de).map(Some)
}

/// Structural keywords in lowering precedence order. `items` and
/// `properties` stand for the array and object forms.
const PRECEDENCE: [&str; 10] =
    ["$ref", "enum", "const", "oneOf", "anyOf", "allOf", "not", "items", "properties", "type"];

impl RawSchema {
    fn structural(&self) -> Vec<&'static str> {
        let present = [
            self.reference.is_some(),
            self.enum_values.is_some(),
            self.const_value.is_some(),
            self.one_of.is_some(),
            self.any_of.is_some(),
            self.all_of.is_some(),
            self.not.is_some(),
            self.items.is_some(),
            self.properties.is_some(),
            self.ty.is_some(),
        ];
        PRECEDENCE.iter().zip(present).filter(|(_, p)| *p).map(|(k, _)| *k).collect()
    }

    /// The refinement keywords that apply to `kind`.
    fn constraints(&self, kind: PrimitiveKind) -> Constraints {
        match kind {
            PrimitiveKind::String => Constraints {
                min_length: self.min_length,
                max_length: self.max_length,
                pattern: self.pattern.clone(),
                ..Constraints::default()
            },
            PrimitiveKind::Number | PrimitiveKind::Integer => Constraints {
                minimum: self.minimum,
                maximum: self.maximum,
                exclusive_minimum: self.exclusive_minimum.map(Exclusive::from),
                exclusive_maximum: self.exclusive_maximum.map(Exclusive::from),
                multiple_of: self.multiple_of,
                ..Constraints::default()
            },
            PrimitiveKind::Boolean | PrimitiveKind::Null => Constraints::default(),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DOCUMENT
// ————————————————————————————————————————————————————————————————————————————

impl SchemaDocument {
    pub fn from_json_str(src: &str) -> Result<Self, LoadError> {
        let value: Value = crate::path_de::from_str_with_path(src)?;
        Self::from_value(value)
    }

    /// Accepts an OpenAPI document (`components.schemas`), a JSON Schema
    /// bundle (`$defs` / `definitions`), or a bare name → schema object.
    pub fn from_value(value: Value) -> Result<Self, LoadError> {
        let mut root = match value {
            Value::Object(root) => root,
            other => return Err(not_an_object(&other).into()),
        };

        let (prefix, schemas) = if root.contains_key("openapi") || root.contains_key("components") {
            let schemas = match root.remove("components") {
                Some(Value::Object(mut components)) => components.remove("schemas"),
                Some(other) => return Err(not_an_object(&other).into()),
                None => None,
            };
            ("components/schemas", object_or_empty(schemas)?)
        } else if root.contains_key("$defs") || root.contains_key("definitions") || root.contains_key("$schema") {
            let mut schemas = object_or_empty(root.remove("$defs"))?;
            for (name, schema) in object_or_empty(root.remove("definitions"))? {
                schemas.entry(name).or_insert(schema);
            }
            ("$defs", schemas)
        } else {
            ("", root)
        };

        let mut sink = Sink::default();
        let mut entries = IndexMap::with_capacity(schemas.len());
        for (name, schema) in &schemas {
            let node = Lowerer { entry: name, prefix, sink: &mut sink, pointer: Pointer::default() }.lower(schema)?;
            entries.insert(name.clone(), node);
        }
        tracing::debug!(schemas = entries.len(), found_at = prefix, "document lowered");
        Ok(SchemaDocument::with_diagnostics(entries, sink.into_vec()))
    }
}

fn object_or_empty(value: Option<Value>) -> Result<Map<String, Value>, SchemaError> {
    match value {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(not_an_object(&other)),
    }
}

fn not_an_object(value: &Value) -> SchemaError {
    SchemaErrorKind::NotAnObject { found: kind_of(value).to_string() }.into()
}

/// `#/components/schemas/N`, `#/$defs/N`, `#/definitions/N` or a bare `N`.
pub(crate) fn reference_name(reference: &str) -> Option<String> {
    let unescape = |s: &str| s.replace("~1", "/").replace("~0", "~");
    for prefix in ["#/components/schemas/", "#/$defs/", "#/definitions/"] {
        if let Some(rest) = reference.strip_prefix(prefix) {
            return (!rest.is_empty() && !rest.contains('/')).then(|| unescape(rest));
        }
    }
    if reference.is_empty() || reference.contains(['#', '/']) {
        return None;
    }
    Some(unescape(reference))
}

// ————————————————————————————————————————————————————————————————————————————
// LOWERING
// ————————————————————————————————————————————————————————————————————————————

struct Lowerer<'a> {
    entry: &'a str,
    /// Where the entries sit in the source document, for syntax errors.
    prefix: &'static str,
    sink: &'a mut Sink,
    pointer: Pointer,
}

impl Lowerer<'_> {
    fn lower(&mut self, value: &Value) -> Result<SchemaNode, LoadError> {
        let raw: RawSchema = match value {
            Value::Bool(true) => return Ok(SchemaNode::any()),
            Value::Bool(false) => return Ok(SchemaNode::negation(SchemaNode::any())),
            Value::Object(_) => crate::path_de::from_value_with_path(value, &self.source_path())?,
            other => return Err(self.fail(not_an_object(other))),
        };
        let node = self.structural(&raw, value)?;
        if raw.nullable && !accepts_only_null(&node) {
            let union = UnionNode::new(vec![node, SchemaNode::null()], UnionMode::AnyOf).map_err(|e| self.fail(e))?;
            return Ok(SchemaNode::Union(union));
        }
        Ok(node)
    }

    fn structural(&mut self, raw: &RawSchema, value: &Value) -> Result<SchemaNode, LoadError> {
        let present = raw.structural();
        if let Some(&kept) = present.first().filter(|k| PRECEDENCE[..7].contains(*k)) {
            let ignored: Vec<&'static str> = present[1..]
                .iter()
                .copied()
                .filter(|k| !(*k == "type" && matches!(kept, "enum" | "const")))
                .collect();
            if !ignored.is_empty() {
                self.report(DiagnosticKind::ShadowedKeywords { kept, ignored });
            }
        }

        if let Some(reference) = &raw.reference {
            let name = reference_name(reference).ok_or_else(|| {
                self.fail(SchemaErrorKind::InvalidReference { reference: reference.clone() }.into())
            })?;
            return Ok(SchemaNode::reference(name));
        }
        if let Some(values) = &raw.enum_values {
            return self.enumeration(values.clone());
        }
        if let Some(value) = &raw.const_value {
            return self.enumeration(vec![value.clone()]);
        }
        if let Some(branches) = &raw.one_of {
            return self.union("oneOf", branches, UnionMode::OneOf);
        }
        if let Some(branches) = &raw.any_of {
            return self.union("anyOf", branches, UnionMode::AnyOf);
        }
        if let Some(branches) = &raw.all_of {
            let branches = self.branches("allOf", branches)?;
            return IntersectionNode::new(branches).map(SchemaNode::Intersection).map_err(|e| self.fail(e));
        }
        if let Some(inner) = &raw.not {
            let inner = self.nested("not", |l| l.lower(inner))?;
            return Ok(SchemaNode::negation(inner));
        }

        match &raw.ty {
            Some(TypeToken::One(token)) => self.typed(token, raw, value),
            Some(TypeToken::Many(tokens)) => {
                let mut seen = IndexSet::new();
                let mut branches = Vec::with_capacity(tokens.len());
                for token in tokens {
                    if seen.insert(token.as_str()) {
                        branches.push(self.typed(token, raw, value)?);
                    }
                }
                match branches.len() {
                    0 => Ok(SchemaNode::any()),
                    1 => Ok(branches.remove(0)),
                    _ => UnionNode::new(branches, UnionMode::AnyOf).map(SchemaNode::Union).map_err(|e| self.fail(e)),
                }
            }
            None if raw.items.is_some() => self.typed("array", raw, value),
            None if raw.properties.is_some() || raw.additional_properties.is_some() => {
                self.typed("object", raw, value)
            }
            None => Ok(SchemaNode::Unknown(UnknownNode { token: None, raw: value.clone() })),
        }
    }

    fn typed(&mut self, token: &str, raw: &RawSchema, value: &Value) -> Result<SchemaNode, LoadError> {
        let format = raw.format.as_deref().map(Format::parse);
        let primitive = |kind: PrimitiveKind, format: Option<Format>| -> Result<SchemaNode, LoadError> {
            Ok(SchemaNode::Primitive(PrimitiveNode { kind, format, constraints: raw.constraints(kind) }))
        };
        match token {
            "string" => primitive(PrimitiveKind::String, format),
            "date" => primitive(PrimitiveKind::String, Some(Format::Date)),
            "date-time" => primitive(PrimitiveKind::String, Some(Format::DateTime)),
            "number" | "float" | "double" | "decimal" => primitive(PrimitiveKind::Number, format),
            "integer" => primitive(PrimitiveKind::Integer, format),
            "boolean" => primitive(PrimitiveKind::Boolean, format),
            "null" => primitive(PrimitiveKind::Null, format),
            "array" => self.array(raw),
            "object" => self.object(raw),
            other => Ok(SchemaNode::Unknown(UnknownNode { token: Some(other.to_string()), raw: value.clone() })),
        }
    }

    fn array(&mut self, raw: &RawSchema) -> Result<SchemaNode, LoadError> {
        let Some(items) = &raw.items else {
            return Err(self.fail(SchemaErrorKind::MissingItems.into()));
        };
        let items = self.nested("items", |l| l.lower(items))?;
        Ok(SchemaNode::Array(ArrayNode {
            min_items: raw.min_items,
            max_items: raw.max_items,
            unique_items: raw.unique_items,
            ..ArrayNode::new(items)
        }))
    }

    fn object(&mut self, raw: &RawSchema) -> Result<SchemaNode, LoadError> {
        let mut required: IndexSet<String> = match &raw.required {
            Some(Required::Names(names)) => names.iter().cloned().collect(),
            Some(Required::Flag(_)) | None => IndexSet::new(),
        };

        let mut properties = IndexMap::new();
        if let Some(declared) = &raw.properties {
            self.pointer.push("properties");
            for (name, schema) in declared {
                if schema.get("required") == Some(&Value::Bool(true)) {
                    required.insert(name.clone());
                }
                let node = self.nested(name, |l| l.lower(schema));
                let node = match node {
                    Ok(node) => node,
                    Err(error) => {
                        self.pointer.pop();
                        return Err(error);
                    }
                };
                properties.insert(name.clone(), node);
            }
            self.pointer.pop();
        }

        let additional = match &raw.additional_properties {
            None | Some(Value::Bool(true)) => AdditionalProperties::Allow,
            Some(Value::Bool(false)) => AdditionalProperties::Deny,
            Some(schema) => {
                let node = self.nested("additionalProperties", |l| l.lower(schema))?;
                AdditionalProperties::Schema(Box::new(node))
            }
        };

        let object = ObjectNode::new(properties, required).map_err(|e| self.fail(e))?;
        Ok(SchemaNode::Object(
            object
                .with_property_count(raw.min_properties, raw.max_properties)
                .with_additional(additional),
        ))
    }

    fn enumeration(&mut self, values: Vec<Value>) -> Result<SchemaNode, LoadError> {
        EnumNode::new(values).map(SchemaNode::Enum).map_err(|e| self.fail(e))
    }

    fn union(&mut self, keyword: &str, branches: &[Value], mode: UnionMode) -> Result<SchemaNode, LoadError> {
        let branches = self.branches(keyword, branches)?;
        UnionNode::new(branches, mode).map(SchemaNode::Union).map_err(|e| self.fail(e))
    }

    fn branches(&mut self, keyword: &str, values: &[Value]) -> Result<Vec<SchemaNode>, LoadError> {
        self.pointer.push(keyword);
        let out: Result<Vec<SchemaNode>, LoadError> = values
            .iter()
            .enumerate()
            .map(|(i, value)| self.nested(&i.to_string(), |l| l.lower(value)))
            .collect();
        self.pointer.pop();
        out
    }

    fn nested<T>(&mut self, segment: &str, f: impl FnOnce(&mut Self) -> T) -> T {
        self.pointer.push(segment);
        let out = f(self);
        self.pointer.pop();
        out
    }

    fn report(&mut self, kind: DiagnosticKind) {
        self.sink.record(self.entry, &self.pointer.render(), kind);
    }

    fn fail(&self, error: SchemaError) -> LoadError {
        LoadError::Schema(error.at(self.entry, &self.pointer.render()))
    }

    fn source_path(&self) -> String {
        let entry = self.entry.replace('~', "~0").replace('/', "~1");
        match self.prefix {
            "" => format!("{entry}{}", self.pointer.render()),
            prefix => format!("{prefix}/{entry}{}", self.pointer.render()),
        }
    }
}

fn accepts_only_null(node: &SchemaNode) -> bool {
    matches!(node, SchemaNode::Primitive(PrimitiveNode { kind: PrimitiveKind::Null, .. }))
}
