//! Composition compiler: IR node → [`Check`].
//!
//! Recursive descent over one entry's node tree. Leaves go through the
//! constraint pipeline; references become slot handles and are never
//! followed here, so compilation terminates for any reference graph.
use indexmap::IndexMap;

use crate::constraint::{arr, num, obj, str as strs, ValueKey};
use crate::diagnostic::{DiagnosticKind, Pointer, Sink};
use crate::error::{SchemaError, SchemaErrorKind};
use crate::ir::{AdditionalProperties, ObjectNode, PrimitiveKind, PrimitiveNode, SchemaNode};
use crate::registry::EntryState;
use crate::validator::{Check, Extra, ObjectCheck};

pub(crate) struct Compiler<'a> {
    entry: &'a str,
    slots: &'a IndexMap<String, EntryState>,
    sink: &'a mut Sink,
    /// Slots referenced from this entry without crossing an array/object boundary.
    unguarded: &'a mut Vec<usize>,
    pointer: Pointer,
}

impl<'a> Compiler<'a> {
    pub fn new(
        entry: &'a str,
        slots: &'a IndexMap<String, EntryState>,
        sink: &'a mut Sink,
        unguarded: &'a mut Vec<usize>,
    ) -> Self {
        Self { entry, slots, sink, unguarded, pointer: Pointer::default() }
    }

    pub fn compile(&mut self, node: &SchemaNode) -> Result<Check, SchemaError> {
        self.node(node, false)
    }

    fn node(&mut self, node: &SchemaNode, guarded: bool) -> Result<Check, SchemaError> {
        match node {
            SchemaNode::Primitive(p) => Ok(self.primitive(p)),
            SchemaNode::Enum(e) => Ok(Check::Enum(
                e.values().iter().map(|v| (ValueKey::of(v), v.clone())).collect(),
            )),
            SchemaNode::Array(a) => {
                let items = self.nested("items", |c| c.node(&a.items, true))?;
                let refinements = arr::pipeline(a.min_items, a.max_items, a.unique_items, &mut self.reporter());
                Ok(Check::Array { items: Box::new(items), refinements })
            }
            SchemaNode::Object(o) => self.object(o),
            SchemaNode::Union(u) => {
                let branches = self.branches(u.mode().keyword(), u.branches(), guarded)?;
                Ok(Check::Union { mode: u.mode(), branches })
            }
            SchemaNode::Intersection(i) => {
                Ok(Check::Intersection(self.branches("allOf", i.branches(), guarded)?))
            }
            SchemaNode::Negation(n) => {
                let inner = self.nested("not", |c| c.node(&n.inner, guarded))?;
                Ok(Check::Negation(Box::new(inner)))
            }
            SchemaNode::Reference(r) => {
                let Some((slot, _, state)) = self.slots.get_full(&r.name) else {
                    return Err(SchemaError::new(SchemaErrorKind::UnresolvedReference { name: r.name.clone() })
                        .at(self.entry, &self.pointer.render()));
                };
                if matches!(state, EntryState::Compiling) {
                    tracing::trace!(schema = self.entry, reference = %r.name, "recursive reference");
                }
                if !guarded {
                    self.unguarded.push(slot);
                }
                Ok(Check::Ref(slot))
            }
            SchemaNode::Unknown(u) => {
                if let Some(token) = &u.token {
                    self.reporter()(DiagnosticKind::UnsupportedTypeToken { token: token.clone() });
                }
                Ok(Check::Any)
            }
        }
    }

    fn primitive(&mut self, p: &PrimitiveNode) -> Check {
        let mut report = self.reporter();
        match p.kind {
            PrimitiveKind::String => Check::String(strs::pipeline(p.format.as_ref(), &p.constraints, &mut report)),
            PrimitiveKind::Number | PrimitiveKind::Integer => Check::Number {
                integer: p.kind == PrimitiveKind::Integer,
                refinements: num::pipeline(p.kind, p.format.as_ref(), &p.constraints, &mut report),
            },
            PrimitiveKind::Boolean | PrimitiveKind::Null => {
                if let Some(format) = &p.format {
                    report(DiagnosticKind::UnknownFormat { kind: p.kind.as_str(), format: format.as_str().to_string() });
                }
                if p.kind == PrimitiveKind::Boolean { Check::Boolean } else { Check::Null }
            }
        }
    }

    fn object(&mut self, o: &ObjectNode) -> Result<Check, SchemaError> {
        let mut properties = IndexMap::with_capacity(o.properties().len());
        self.pointer.push("properties");
        for (name, node) in o.properties() {
            let check = self.nested(name, |c| c.node(node, true));
            let check = match check {
                Ok(check) => check,
                Err(error) => {
                    self.pointer.pop();
                    return Err(error);
                }
            };
            properties.insert(name.clone(), check);
        }
        self.pointer.pop();

        let extra = if obj::is_closed(o) {
            Extra::Reject
        } else {
            match o.additional() {
                AdditionalProperties::Schema(schema) => {
                    Extra::Validate(self.nested("additionalProperties", |c| c.node(schema, true))?)
                }
                AdditionalProperties::Allow | AdditionalProperties::Deny => Extra::Allow,
            }
        };
        let refinements = obj::pipeline(o, &mut self.reporter());

        Ok(Check::Object(Box::new(ObjectCheck {
            properties,
            required: o.required().iter().cloned().collect(),
            extra,
            refinements,
        })))
    }

    fn branches(&mut self, keyword: &str, nodes: &[SchemaNode], guarded: bool) -> Result<Vec<Check>, SchemaError> {
        self.pointer.push(keyword);
        let out: Result<Vec<Check>, SchemaError> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| self.nested(&i.to_string(), |c| c.node(node, guarded)))
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

    fn reporter(&mut self) -> impl FnMut(DiagnosticKind) + '_ {
        let entry = self.entry;
        let location = self.pointer.render();
        let sink = &mut *self.sink;
        move |kind| sink.record(entry, &location, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Constraints, Format};
    use serde_json::json;

    fn compile_one(node: &SchemaNode) -> (Result<Check, SchemaError>, Vec<crate::diagnostic::Diagnostic>, Vec<usize>) {
        let mut slots = IndexMap::new();
        slots.insert("Self".to_string(), EntryState::Compiling);
        slots.insert("Other".to_string(), EntryState::Unresolved);
        let mut sink = Sink::default();
        let mut unguarded = Vec::new();
        let out = Compiler::new("Self", &slots, &mut sink, &mut unguarded).compile(node);
        (out, sink.into_vec(), unguarded)
    }

    #[test]
    fn references_become_slots_without_recursion() {
        let node = SchemaNode::array(SchemaNode::reference("Self"));
        let (check, _, unguarded) = compile_one(&node);
        match check.unwrap() {
            Check::Array { items, .. } => assert!(matches!(*items, Check::Ref(0))),
            other => panic!("unexpected {other:?}"),
        }
        assert!(unguarded.is_empty(), "array items are a guarded position");

        let (check, _, unguarded) = compile_one(&SchemaNode::reference("Other"));
        assert!(matches!(check.unwrap(), Check::Ref(1)));
        assert_eq!(unguarded, vec![1]);
    }

    #[test]
    fn unresolved_reference_is_located() {
        let node = SchemaNode::negation(SchemaNode::reference("Missing"));
        let (check, _, _) = compile_one(&node);
        let err = check.unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::UnresolvedReference { name: "Missing".into() });
        assert_eq!(err.schema.as_deref(), Some("Self"));
        assert_eq!(err.location, "/not");
    }

    #[test]
    fn diagnostics_carry_node_location() {
        let mut props = IndexMap::new();
        props.insert("code".to_string(), SchemaNode::Primitive(PrimitiveNode {
            kind: PrimitiveKind::String,
            format: Some(Format::Other("zip".into())),
            constraints: Constraints { pattern: Some("(".into()), ..Default::default() },
        }));
        let node = SchemaNode::Object(ObjectNode::new(props, Default::default()).unwrap());
        let (check, diags, _) = compile_one(&node);
        assert!(check.is_ok());
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.location == "/properties/code" && d.schema == "Self"));
        assert!(matches!(diags[0].kind, DiagnosticKind::UnknownFormat { .. }));
        assert!(matches!(diags[1].kind, DiagnosticKind::PatternCompile { .. }));
    }

    #[test]
    fn unsupported_type_compiles_to_any() {
        let node = SchemaNode::Unknown(crate::ir::UnknownNode { token: Some("money".into()), raw: json!({"type": "money"}) });
        let (check, diags, _) = compile_one(&node);
        assert!(matches!(check.unwrap(), Check::Any));
        assert_eq!(diags[0].kind, DiagnosticKind::UnsupportedTypeToken { token: "money".into() });
    }
}
