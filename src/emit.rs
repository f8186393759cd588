//! IR → canonical JSON Schema.
//!
//! One spelling per construct: references as `#/components/schemas/N`,
//! nullable as `anyOf [X, null]`, closed objects as
//! `additionalProperties: false`. Lowering the output again yields the same
//! IR.
use serde_json::{json, Map, Value};

use crate::ir::{AdditionalProperties, Exclusive, SchemaDocument, SchemaNode};

pub fn schema_of(node: &SchemaNode) -> Value {
    match node {
        SchemaNode::Primitive(p) => {
            let mut o = json!({ "type": p.kind.as_str() });
            if let Some(format) = &p.format {
                o["format"] = Value::from(format.as_str());
            }
            let c = &p.constraints;
            if let Some(n) = c.min_length { o["minLength"] = Value::from(n); }
            if let Some(n) = c.max_length { o["maxLength"] = Value::from(n); }
            if let Some(rx) = &c.pattern { o["pattern"] = Value::from(rx.clone()); }
            if let Some(m) = c.minimum { o["minimum"] = Value::from(m); }
            if let Some(m) = c.maximum { o["maximum"] = Value::from(m); }
            if let Some(e) = c.exclusive_minimum { o["exclusiveMinimum"] = exclusive(e); }
            if let Some(e) = c.exclusive_maximum { o["exclusiveMaximum"] = exclusive(e); }
            if let Some(m) = c.multiple_of { o["multipleOf"] = Value::from(m); }
            o
        }
        SchemaNode::Enum(e) => json!({ "enum": e.values() }),
        SchemaNode::Array(a) => {
            let mut o = json!({ "type": "array", "items": schema_of(&a.items) });
            if let Some(n) = a.min_items { o["minItems"] = Value::from(n); }
            if let Some(n) = a.max_items { o["maxItems"] = Value::from(n); }
            if a.unique_items { o["uniqueItems"] = Value::Bool(true); }
            o
        }
        SchemaNode::Object(obj) => {
            let mut map = Map::new();
            map.insert("type".into(), Value::from("object"));
            let props: Map<String, Value> =
                obj.properties().iter().map(|(k, v)| (k.clone(), schema_of(v))).collect();
            map.insert("properties".into(), Value::Object(props));
            if !obj.required().is_empty() {
                map.insert(
                    "required".into(),
                    Value::Array(obj.required().iter().cloned().map(Value::from).collect()),
                );
            }
            if let Some(n) = obj.min_properties() { map.insert("minProperties".into(), Value::from(n)); }
            if let Some(n) = obj.max_properties() { map.insert("maxProperties".into(), Value::from(n)); }
            match obj.additional() {
                AdditionalProperties::Allow => {}
                AdditionalProperties::Deny => {
                    map.insert("additionalProperties".into(), Value::Bool(false));
                }
                AdditionalProperties::Schema(schema) => {
                    map.insert("additionalProperties".into(), schema_of(schema));
                }
            }
            Value::Object(map)
        }
        SchemaNode::Union(u) => {
            let branches: Vec<Value> = u.branches().iter().map(schema_of).collect();
            let mut map = Map::new();
            map.insert(u.mode().keyword().into(), Value::Array(branches));
            Value::Object(map)
        }
        SchemaNode::Intersection(i) => {
            json!({ "allOf": i.branches().iter().map(schema_of).collect::<Vec<_>>() })
        }
        SchemaNode::Negation(n) => json!({ "not": schema_of(&n.inner) }),
        SchemaNode::Reference(r) => {
            let escaped = r.name.replace('~', "~0").replace('/', "~1");
            json!({ "$ref": format!("#/components/schemas/{escaped}") })
        }
        SchemaNode::Unknown(u) => u.raw.clone(),
    }
}

fn exclusive(e: Exclusive) -> Value {
    match e {
        Exclusive::Flag(flag) => Value::Bool(flag),
        Exclusive::Bound(bound) => Value::from(bound),
    }
}

/// `{ "components": { "schemas": { ... } } }`
pub fn document(doc: &SchemaDocument) -> Value {
    let schemas: Map<String, Value> = doc.iter().map(|(name, node)| (name.to_string(), schema_of(node))).collect();
    json!({ "components": { "schemas": schemas } })
}
