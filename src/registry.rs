//! Reference registry and its two-pass builder.
//!
//! Pass 1 gives every top-level name a slot. Pass 2 compiles each entry;
//! references compile to slot handles, so an entry may refer to itself or to
//! an entry later in the document. The finished registry never changes.
use indexmap::{IndexMap, IndexSet};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;

use crate::compiler::Compiler;
use crate::config::{CompileOptions, UnknownKeys};
use crate::diagnostic::{Diagnostic, DiagnosticKind, Sink};
use crate::error::{SchemaError, SchemaErrorKind, UnknownSchema};
use crate::ir::{SchemaDocument, SchemaNode};
use crate::shape::Ty;
use crate::validator::{Check, Eval, InstancePath, Outcome};

/// Per-entry build state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    Unresolved,
    Compiling,
    Compiled,
}

#[derive(Debug, Clone, Default)]
pub struct RegistryBuilder {
    options: CompileOptions,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.options.max_depth = max_depth;
        self
    }

    pub fn build(&self, document: &SchemaDocument) -> Result<ValidatorRegistry, SchemaError> {
        let mut sink = Sink::default();
        sink.extend(document.diagnostics().iter().cloned());

        // pass 1
        let mut slots: IndexMap<String, EntryState> = document
            .iter()
            .map(|(name, _)| (name.to_string(), EntryState::Unresolved))
            .collect();

        // pass 2
        let mut checks = Vec::with_capacity(document.len());
        let mut edges = Vec::with_capacity(document.len());
        for (slot, (name, node)) in document.iter().enumerate() {
            slots[slot] = EntryState::Compiling;
            let mut unguarded = Vec::new();
            let check = Compiler::new(name, &slots, &mut sink, &mut unguarded)
                .compile(node)
                .map_err(|error| error.at(name, ""))?;
            slots[slot] = EntryState::Compiled;
            tracing::debug!(schema = name, slot, "compiled");
            checks.push(check);
            edges.push(unguarded);
        }

        check_cycles(document, &edges, &mut sink)?;

        let registry = ValidatorRegistry {
            names: slots.into_keys().collect(),
            checks,
            shapes: document.iter().map(|(_, node)| Ty::of(node)).collect(),
            diagnostics: sink.into_vec(),
            options: self.options.clone(),
        };
        tracing::info!(
            schemas = registry.len(),
            diagnostics = registry.diagnostics.len(),
            "validator registry built"
        );
        Ok(registry)
    }
}

/// Compile with default options.
pub fn compile(document: &SchemaDocument) -> Result<ValidatorRegistry, SchemaError> {
    RegistryBuilder::new().build(document)
}

// ————————————————————————————————————————————————————————————————————————————
// CYCLE ANALYSIS
// ————————————————————————————————————————————————————————————————————————————

/// A cycle of entries that are nothing but references defines no value and
/// is fatal. Any other cycle free of array/object boundaries compiles and
/// is only bounded by the depth budget, so it is reported.
fn check_cycles(document: &SchemaDocument, edges: &[Vec<usize>], sink: &mut Sink) -> Result<(), SchemaError> {
    let names: Vec<&str> = document.iter().map(|(name, _)| name).collect();
    let is_alias = |slot: usize| {
        document.get(names[slot]).is_some_and(|node| matches!(node, SchemaNode::Reference(_)))
    };

    let mut cyclic: Vec<Vec<usize>> = strongly_connected(edges)
        .into_iter()
        .filter(|c| c.len() > 1 || edges[c[0]].contains(&c[0]))
        .map(|mut c| {
            c.sort_unstable();
            c
        })
        .collect();
    cyclic.sort_unstable_by_key(|c| c[0]);

    for component in cyclic {
        let start = component[0];
        if component.iter().all(|&slot| is_alias(slot)) {
            // every alias has exactly one outgoing edge
            let mut cycle = vec![names[start].to_string()];
            let mut current = edges[start][0];
            while current != start && cycle.len() <= component.len() {
                cycle.push(names[current].to_string());
                current = edges[current][0];
            }
            cycle.push(names[start].to_string());
            return Err(SchemaError::new(SchemaErrorKind::UnguardedCycle { cycle }).at(names[start], ""));
        }
        let mut cycle: Vec<String> = component.iter().map(|&slot| names[slot].to_string()).collect();
        cycle.push(names[start].to_string());
        sink.record(names[start], "", DiagnosticKind::UnguardedRecursion { cycle });
    }
    Ok(())
}

/// Strongly connected components, slots in each unordered.
fn strongly_connected(edges: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut graph: DiGraph<(), ()> = DiGraph::with_capacity(edges.len(), edges.iter().map(Vec::len).sum());
    let nodes: Vec<NodeIndex> = (0..edges.len()).map(|_| graph.add_node(())).collect();
    for (from, targets) in edges.iter().enumerate() {
        for &to in targets {
            graph.add_edge(nodes[from], nodes[to], ());
        }
    }
    tarjan_scc(&graph)
        .into_iter()
        .map(|component| component.into_iter().map(NodeIndex::index).collect())
        .collect()
}

// ————————————————————————————————————————————————————————————————————————————
// REGISTRY
// ————————————————————————————————————————————————————————————————————————————

/// Compiled validators for one document, by name. Immutable, `Send + Sync`.
#[derive(Debug)]
pub struct ValidatorRegistry {
    names: IndexSet<String>,
    checks: Vec<Check>,
    shapes: Vec<Ty>,
    diagnostics: Vec<Diagnostic>,
    options: CompileOptions,
}

impl ValidatorRegistry {
    pub fn get(&self, name: &str) -> Result<Validator<'_>, UnknownSchema> {
        self.names
            .get_index_of(name)
            .map(|slot| Validator { registry: self, slot })
            .ok_or_else(|| UnknownSchema(name.to_string()))
    }

    /// Document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = Validator<'_>> {
        (0..self.checks.len()).map(|slot| Validator { registry: self, slot })
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn shape(&self, name: &str) -> Result<&Ty, UnknownSchema> {
        self.names
            .get_index_of(name)
            .map(|slot| &self.shapes[slot])
            .ok_or_else(|| UnknownSchema(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Validator<'r> {
    registry: &'r ValidatorRegistry,
    slot: usize,
}

impl<'r> Validator<'r> {
    pub fn name(&self) -> &'r str {
        self.registry.names[self.slot].as_str()
    }

    pub fn validate(&self, value: &Value) -> Outcome {
        let options = &self.registry.options;
        let eval = Eval {
            slots: &self.registry.checks,
            max_depth: options.max_depth,
            strip_unknown: options.unknown_keys == UnknownKeys::Strip,
        };
        match eval.run(&self.registry.checks[self.slot], value, &mut InstancePath::root(), 0) {
            Ok(value) => Outcome::Accepted(value),
            Err(issues) => Outcome::Rejected(issues),
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        self.validate(value).is_accepted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_DEPTH;
    use crate::validator::Reason;
    use serde_json::json;

    fn registry(doc: Value) -> ValidatorRegistry {
        compile(&SchemaDocument::from_value(doc).unwrap()).unwrap()
    }

    fn reasons(outcome: &Outcome) -> Vec<Reason> {
        outcome.issues().iter().map(|i| i.reason.clone()).collect()
    }

    #[test]
    fn self_referential_tree_validates_to_any_depth_within_budget() {
        let reg = registry(json!({
            "Node": {
                "type": "object",
                "properties": {
                    "value": { "type": "integer" },
                    "children": { "type": "array", "items": { "$ref": "#/components/schemas/Node" } }
                },
                "required": ["value"]
            }
        }));
        let node = reg.get("Node").unwrap();
        let tree = json!({
            "value": 1,
            "children": [
                { "value": 2, "children": [{ "value": 3, "children": [] }] },
                { "value": 4 }
            ]
        });
        assert_eq!(node.validate(&tree), Outcome::Accepted(tree.clone()));

        let bad = json!({ "value": 1, "children": [{ "children": [{ "value": "x" }] }] });
        let issues = node.validate(&bad).into_result().unwrap_err();
        let rendered: Vec<String> = issues.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec![
            "$.children[0].children[0].value: expected integer, found string",
            "$.children[0]: missing required property `value`",
        ]);
    }

    #[test]
    fn alias_cycles_are_fatal() {
        let doc = SchemaDocument::from_value(json!({ "A": { "$ref": "#/components/schemas/A" } })).unwrap();
        let err = compile(&doc).unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::UnguardedCycle { cycle: vec!["A".into(), "A".into()] });

        let doc = SchemaDocument::from_value(json!({
            "Ok": { "type": "string" },
            "B": { "$ref": "A" },
            "A": { "$ref": "B" },
        }))
        .unwrap();
        let err = compile(&doc).unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::UnguardedCycle { cycle: vec!["B".into(), "A".into(), "B".into()] });
        assert_eq!(err.schema.as_deref(), Some("B"));
    }

    #[test]
    fn composition_cycle_compiles_with_diagnostic_and_hits_depth_budget() {
        let doc = SchemaDocument::from_value(json!({
            "Loop": { "anyOf": [{ "type": "string" }, { "$ref": "Loop" }] }
        }))
        .unwrap();
        let reg = RegistryBuilder::new().max_depth(16).build(&doc).unwrap();
        assert!(matches!(
            &reg.diagnostics()[0].kind,
            DiagnosticKind::UnguardedRecursion { cycle } if cycle == &["Loop", "Loop"]
        ));

        let lp = reg.get("Loop").unwrap();
        assert!(lp.accepts(&json!("x")));
        let out = lp.validate(&json!(5));
        assert!(out.depth_exceeded());
        assert_eq!(reasons(&out), vec![Reason::DepthExceeded { limit: 16 }]);
    }

    #[test]
    fn intersection_self_recursion_stops_at_first_depth_overrun() {
        let doc = SchemaDocument::from_value(json!({
            "X": { "allOf": [{ "$ref": "X" }, { "$ref": "X" }] }
        }))
        .unwrap();
        let reg = compile(&doc).unwrap();
        assert!(matches!(
            &reg.diagnostics()[0].kind,
            DiagnosticKind::UnguardedRecursion { cycle } if cycle == &["X", "X"]
        ));

        let out = reg.get("X").unwrap().validate(&json!(1));
        assert_eq!(reasons(&out), vec![Reason::DepthExceeded { limit: DEFAULT_MAX_DEPTH }]);
    }

    #[test]
    fn fanned_out_self_recursion_reports_one_depth_issue() {
        let doc = SchemaDocument::from_value(json!({
            "Both": { "allOf": [{ "$ref": "Both" }, { "$ref": "Both" }, { "$ref": "Both" }] },
            "Pick": { "oneOf": [{ "$ref": "Pick" }, { "$ref": "Pick" }] },
            "Never": { "not": { "allOf": [{ "$ref": "Never" }, { "$ref": "Never" }] } }
        }))
        .unwrap();
        let reg = RegistryBuilder::new().max_depth(64).build(&doc).unwrap();
        assert_eq!(reg.diagnostics().len(), 3);

        for name in ["Both", "Pick", "Never"] {
            let out = reg.get(name).unwrap().validate(&json!({ "a": [1, 2] }));
            assert!(out.depth_exceeded(), "{name}");
            assert_eq!(reasons(&out), vec![Reason::DepthExceeded { limit: 64 }], "{name}");
        }
    }

    #[test]
    fn negated_self_recursion_is_bounded() {
        let doc = SchemaDocument::from_value(json!({
            "Odd": { "not": { "$ref": "Odd" } }
        }))
        .unwrap();
        let reg = RegistryBuilder::new().max_depth(16).build(&doc).unwrap();
        assert!(matches!(&reg.diagnostics()[0].kind, DiagnosticKind::UnguardedRecursion { .. }));
        let out = reg.get("Odd").unwrap().validate(&json!(null));
        assert_eq!(reasons(&out), vec![Reason::DepthExceeded { limit: 16 }]);
    }

    #[test]
    fn deep_data_is_rejected_not_overflowed() {
        let reg = RegistryBuilder::new()
            .max_depth(8)
            .build(&SchemaDocument::from_value(json!({
                "Nest": { "type": "array", "items": { "$ref": "Nest" } }
            })).unwrap())
            .unwrap();
        let mut value = json!([]);
        for _ in 0..20 {
            value = json!([value]);
        }
        assert!(reg.get("Nest").unwrap().validate(&value).depth_exceeded());
        assert!(reg.get("Nest").unwrap().accepts(&json!([[[]]])));
    }

    #[test]
    fn unresolved_reference_names_the_entry() {
        let doc = SchemaDocument::from_value(json!({
            "User": { "type": "object", "properties": { "team": { "$ref": "#/components/schemas/Team" } } }
        }))
        .unwrap();
        let err = compile(&doc).unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::UnresolvedReference { name: "Team".into() });
        assert_eq!(err.schema.as_deref(), Some("User"));
        assert_eq!(err.location, "/properties/team");
    }

    #[test]
    fn unknown_names_are_an_error_not_a_panic() {
        let reg = registry(json!({ "A": { "type": "string" } }));
        assert_eq!(reg.get("B").unwrap_err(), UnknownSchema("B".into()));
        assert!(reg.shape("B").is_err());
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["A"]);
    }

    #[test]
    fn compilation_is_idempotent() {
        let doc = SchemaDocument::from_value(json!({
            "User": {
                "type": "object",
                "properties": { "name": { "type": "string", "minLength": 3 }, "age": { "type": "integer" } },
                "required": ["name"]
            }
        }))
        .unwrap();
        let a = compile(&doc).unwrap();
        let b = compile(&doc).unwrap();
        for value in [json!({"name": "Ann"}), json!({"name": "Al"}), json!({"age": 3}), json!([])] {
            assert_eq!(a.get("User").unwrap().validate(&value), b.get("User").unwrap().validate(&value));
        }
        assert_eq!(a.diagnostics(), b.diagnostics());
    }

    #[test]
    fn registry_is_shared_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ValidatorRegistry>();

        let reg = registry(json!({
            "Item": { "type": "object", "properties": { "id": { "type": "integer", "minimum": 0 } }, "required": ["id"] }
        }));
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4i64)
                .map(|t| {
                    let reg = &reg;
                    scope.spawn(move || {
                        (0..200i64)
                            .filter(|i| reg.get("Item").unwrap().accepts(&json!({ "id": i - t * 50 })))
                            .count()
                    })
                })
                .collect();
            let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(counts, vec![200, 150, 100, 50]);
        });
    }

    #[test]
    fn malformed_pattern_degrades_to_remaining_constraints() {
        let reg = registry(json!({ "Code": { "type": "string", "pattern": "[unclosed", "maxLength": 4 } }));
        assert!(matches!(reg.diagnostics()[0].kind, DiagnosticKind::PatternCompile { .. }));
        let code = reg.get("Code").unwrap();
        assert!(code.accepts(&json!("[un")));
        assert!(!code.accepts(&json!("toolong")));
    }

    #[test]
    fn intersection_requires_both_branches() {
        let reg = registry(json!({
            "Both": { "allOf": [
                { "type": "object", "properties": { "a": { "type": "string" } }, "required": ["a"] },
                { "type": "object", "properties": { "b": { "type": "integer" } }, "required": ["b"] }
            ] }
        }));
        let both = reg.get("Both").unwrap();
        assert!(both.accepts(&json!({ "a": "x", "b": 1 })));
        assert_eq!(
            reasons(&both.validate(&json!({ "a": "x" }))),
            vec![Reason::MissingProperty { property: "b".into() }]
        );
    }

    #[test]
    fn one_of_is_exclusive_any_of_is_not() {
        let reg = registry(json!({
            "One": { "oneOf": [{ "type": "number" }, { "type": "integer" }] },
            "Any": { "anyOf": [{ "type": "number" }, { "type": "integer" }] },
        }));
        assert!(reg.get("One").unwrap().accepts(&json!(1.5)));
        assert_eq!(
            reasons(&reg.get("One").unwrap().validate(&json!(2))),
            vec![Reason::MultipleBranchesMatched { matched: vec![0, 1] }]
        );
        assert!(reg.get("Any").unwrap().accepts(&json!(2)));
        assert!(matches!(
            reasons(&reg.get("One").unwrap().validate(&json!("x")))[0],
            Reason::NoBranchMatched { mode: "oneOf", .. }
        ));
    }

    #[test]
    fn enums_and_string_bounds() {
        let reg = registry(json!({
            "Status": { "type": "string", "enum": ["active", "inactive"] },
            "Name": { "type": "string", "minLength": 3, "maxLength": 50 },
        }));
        let status = reg.get("Status").unwrap();
        assert!(status.accepts(&json!("active")));
        let out = status.validate(&json!("invalid"));
        assert_eq!(out.issues()[0].to_string(), r#"$: expected one of ["active", "inactive"]"#);

        let name = reg.get("Name").unwrap();
        assert_eq!(reasons(&name.validate(&json!("ab"))), vec![Reason::TooShort { min: 3, actual: 2 }]);
        assert!(name.accepts(&json!("abc")));
        assert!(name.accepts(&json!("a".repeat(50))));
        assert_eq!(
            reasons(&name.validate(&json!("a".repeat(51)))),
            vec![Reason::TooLong { max: 50, actual: 51 }]
        );
    }

    #[test]
    fn unique_items_compare_values() {
        let reg = registry(json!({
            "Set": { "type": "array", "items": {}, "uniqueItems": true }
        }));
        let set = reg.get("Set").unwrap();
        assert!(set.accepts(&json!([{ "a": 1 }, { "a": 2 }])));
        assert_eq!(
            reasons(&set.validate(&json!([{ "a": 1, "b": 2 }, { "b": 2, "a": 1 }]))),
            vec![Reason::DuplicateItems { first: 0, second: 1 }]
        );
    }

    #[test]
    fn strip_mode_drops_undeclared_keys() {
        let doc = SchemaDocument::from_value(json!({
            "User": {
                "type": "object",
                "properties": { "name": { "type": "string" } },
                "maxProperties": 1,
                "additionalProperties": true
            },
            "Open": { "type": "object", "properties": { "name": { "type": "string" } } }
        }))
        .unwrap();
        let options = CompileOptions { unknown_keys: UnknownKeys::Strip, ..Default::default() };
        let reg = RegistryBuilder::new().options(options).build(&doc).unwrap();
        let open = reg.get("Open").unwrap();
        assert_eq!(
            open.validate(&json!({ "name": "a", "extra": 1 })),
            Outcome::Accepted(json!({ "name": "a" }))
        );

        // maxProperties closes the object even in strip mode
        let user = reg.get("User").unwrap();
        assert!(!user.accepts(&json!({ "name": "a", "extra": 1 })));

        let passthrough = compile(&doc).unwrap();
        assert_eq!(
            passthrough.get("Open").unwrap().validate(&json!({ "name": "a", "extra": 1 })),
            Outcome::Accepted(json!({ "name": "a", "extra": 1 }))
        );
    }

    #[test]
    fn additional_properties_schema_validates_unknown_keys() {
        let reg = registry(json!({
            "Scores": { "type": "object", "additionalProperties": { "type": "integer" }, "maxProperties": 2 },
            "Closed": { "type": "object", "properties": { "a": { "type": "string" } }, "additionalProperties": false },
        }));
        let scores = reg.get("Scores").unwrap();
        assert!(scores.accepts(&json!({ "x": 1, "y": 2 })));
        assert!(!scores.accepts(&json!({ "x": 1, "y": 2, "z": 3 })));
        let out = scores.validate(&json!({ "x": "one" }));
        assert_eq!(out.issues()[0].path.to_string(), "$.x");

        let out = reg.get("Closed").unwrap().validate(&json!({ "a": "x", "b": 1 }));
        assert_eq!(reasons(&out), vec![Reason::UnknownProperty { property: "b".into() }]);
        assert_eq!(out.issues()[0].path.to_string(), "$.b");
    }

    #[test]
    fn present_null_property_is_present() {
        let reg = registry(json!({
            "Item": {
                "type": "object",
                "properties": { "note": { "type": "string", "nullable": true } },
                "required": ["note"]
            }
        }));
        let item = reg.get("Item").unwrap();
        assert!(item.accepts(&json!({ "note": null })));
        assert_eq!(
            reasons(&item.validate(&json!({}))),
            vec![Reason::MissingProperty { property: "note".into() }]
        );
    }

    #[test]
    fn negated_schema() {
        let reg = registry(json!({ "NotString": { "not": { "type": "string" } } }));
        let v = reg.get("NotString").unwrap();
        assert!(v.accepts(&json!(1)));
        assert_eq!(reasons(&v.validate(&json!("s"))), vec![Reason::NegatedSchemaMatched]);
    }

    #[test]
    fn strongly_connected_components_group_cycles() {
        let edges = vec![vec![1], vec![2], vec![0], vec![3], vec![]];
        let mut comps: Vec<Vec<usize>> = strongly_connected(&edges)
            .into_iter()
            .map(|mut c| {
                c.sort_unstable();
                c
            })
            .collect();
        comps.sort();
        assert_eq!(comps, vec![vec![0, 1, 2], vec![3], vec![4]]);
    }
}
