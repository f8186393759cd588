// Code-generator view of a schema. Field names, kinds and required flags
// only; refinements stay in the validator.

use serde::Serialize;
use serde_json::Value;

use crate::ir::{AdditionalProperties, PrimitiveKind, SchemaNode, UnionMode};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Ty {
    Any,
    Null,
    Bool,
    Integer { format: Option<String> },
    Number { format: Option<String> },
    String { format: Option<String> },
    Enum { values: Vec<Value> },
    List { item: Box<Ty> },
    Object {
        fields: Vec<Field>, // declaration order
        /// Type of undeclared members; `None` when the object is closed.
        additional: Option<Box<Ty>>,
    },
    /// Another top-level schema, by name.
    Named { name: String },
    /// X ∪ null collapsed.
    Nullable { inner: Box<Ty> },
    OneOf { variants: Vec<Ty> },
    AnyOf { variants: Vec<Ty> },
    AllOf { parts: Vec<Ty> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub ty: Ty,
    pub required: bool,
}

impl Ty {
    pub fn of(node: &SchemaNode) -> Self {
        match node {
            SchemaNode::Primitive(p) => {
                let format = p.format.as_ref().map(|f| f.as_str().to_string());
                match p.kind {
                    PrimitiveKind::String => Ty::String { format },
                    PrimitiveKind::Number => Ty::Number { format },
                    PrimitiveKind::Integer => Ty::Integer { format },
                    PrimitiveKind::Boolean => Ty::Bool,
                    PrimitiveKind::Null => Ty::Null,
                }
            }
            SchemaNode::Enum(e) => Ty::Enum { values: e.values().to_vec() },
            SchemaNode::Array(a) => Ty::List { item: Box::new(Ty::of(&a.items)) },
            SchemaNode::Object(o) => {
                let fields = o
                    .properties()
                    .iter()
                    .map(|(name, node)| Field { name: name.clone(), ty: Ty::of(node), required: o.is_required(name) })
                    .collect();
                let additional = match o.additional() {
                    AdditionalProperties::Deny => None,
                    AdditionalProperties::Allow if o.max_properties().is_some() => None,
                    AdditionalProperties::Allow => Some(Box::new(Ty::Any)),
                    AdditionalProperties::Schema(schema) => Some(Box::new(Ty::of(schema))),
                };
                Ty::Object { fields, additional }
            }
            SchemaNode::Union(u) => {
                let variants: Vec<Ty> = u.branches().iter().map(Ty::of).collect();
                // [X, null] in either order
                if let [a, b] = variants.as_slice() {
                    match (a, b) {
                        (Ty::Null, other) | (other, Ty::Null) if *other != Ty::Null => {
                            return Ty::Nullable { inner: Box::new(other.clone()) };
                        }
                        _ => {}
                    }
                }
                match u.mode() {
                    UnionMode::OneOf => Ty::OneOf { variants },
                    UnionMode::AnyOf => Ty::AnyOf { variants },
                }
            }
            SchemaNode::Intersection(i) => Ty::AllOf { parts: i.branches().iter().map(Ty::of).collect() },
            SchemaNode::Reference(r) => Ty::Named { name: r.name.clone() },
            // not expressible as a type
            SchemaNode::Negation(_) | SchemaNode::Unknown(_) => Ty::Any,
        }
    }

    pub fn fields(&self) -> &[Field] {
        match self {
            Ty::Object { fields, .. } => fields,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SchemaDocument;
    use serde_json::json;

    #[test]
    fn object_fields_keep_order_and_required_flags() {
        let doc = SchemaDocument::from_value(json!({
            "User": {
                "type": "object",
                "properties": {
                    "id": { "type": "string", "format": "uuid" },
                    "nickname": { "type": "string", "nullable": true },
                    "team": { "$ref": "#/components/schemas/Team" }
                },
                "required": ["id"],
                "additionalProperties": false
            },
            "Team": { "type": "string" }
        }))
        .unwrap();
        let ty = Ty::of(doc.get("User").unwrap());
        let fields: Vec<(&str, bool)> = ty.fields().iter().map(|f| (f.name.as_str(), f.required)).collect();
        assert_eq!(fields, vec![("id", true), ("nickname", false), ("team", false)]);
        assert_eq!(ty.fields()[0].ty, Ty::String { format: Some("uuid".into()) });
        assert_eq!(ty.fields()[1].ty, Ty::Nullable { inner: Box::new(Ty::String { format: None }) });
        assert_eq!(ty.fields()[2].ty, Ty::Named { name: "Team".into() });
        assert!(matches!(ty, Ty::Object { additional: None, .. }));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let ty = Ty::List { item: Box::new(Ty::Integer { format: Some("int32".into()) }) };
        assert_eq!(
            serde_json::to_value(&ty).unwrap(),
            json!({ "kind": "list", "item": { "kind": "integer", "format": "int32" } })
        );
    }
}
