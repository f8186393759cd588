//! Compiled validators and their results.
//!
//! A compiled schema is a [`Check`] tree. References inside it are slot
//! indices into the owning registry and are only followed while validating,
//! against concrete data, with a depth budget.
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::constraint::arr::{self, ArrRefinement, ValueKey};
use crate::constraint::num::{self, NumRefinement};
use crate::constraint::obj::{self, ObjRefinement};
use crate::constraint::str::StrRefinement;
use crate::ir::UnionMode;

// ————————————————————————————————————————————————————————————————————————————
// COMPILED FORM
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub(crate) enum Check {
    Any,
    String(Vec<StrRefinement>),
    Number { integer: bool, refinements: Vec<NumRefinement> },
    Boolean,
    Null,
    Enum(Vec<(ValueKey, Value)>),
    Array { items: Box<Check>, refinements: Vec<ArrRefinement> },
    Object(Box<ObjectCheck>),
    Union { mode: UnionMode, branches: Vec<Check> },
    Intersection(Vec<Check>),
    Negation(Box<Check>),
    Ref(usize),
}

#[derive(Debug, Clone)]
pub(crate) struct ObjectCheck {
    pub properties: IndexMap<String, Check>,
    pub required: Vec<String>,
    pub extra: Extra,
    pub refinements: Vec<ObjRefinement>,
}

/// What happens to keys not declared in `properties`.
#[derive(Debug, Clone)]
pub(crate) enum Extra {
    Allow,
    Reject,
    Validate(Check),
}

// ————————————————————————————————————————————————————————————————————————————
// RESULTS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Location inside the validated value, rendered as `$.children[0].name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstancePath(Vec<Segment>);

impl InstancePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    fn pop(&mut self) {
        self.0.pop();
    }
}

impl std::fmt::Display for InstancePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("$")?;
        for segment in &self.0 {
            match segment {
                Segment::Index(i) => write!(f, "[{i}]")?,
                Segment::Key(k) if is_identifier(k) => write!(f, ".{k}")?,
                Segment::Key(k) => write!(f, "[{}]", Value::from(k.as_str()))?,
            }
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Serialize for InstancePath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Reason {
    Type { expected: &'static str, found: &'static str },
    NotInEnum { allowed: Vec<Value> },
    Format { format: String },
    TooShort { min: u64, actual: u64 },
    TooLong { max: u64, actual: u64 },
    PatternMismatch { pattern: String },
    BelowMinimum { bound: f64, exclusive: bool },
    AboveMaximum { bound: f64, exclusive: bool },
    NotMultipleOf { multiple_of: f64 },
    OutOfFormatRange { format: &'static str },
    TooFewItems { min: u64, actual: u64 },
    TooManyItems { max: u64, actual: u64 },
    DuplicateItems { first: usize, second: usize },
    TooFewProperties { min: u64, actual: u64 },
    TooManyProperties { max: u64, actual: u64 },
    MissingProperty { property: String },
    UnknownProperty { property: String },
    NoBranchMatched { mode: &'static str, failures: Vec<Vec<Issue>> },
    MultipleBranchesMatched { matched: Vec<usize> },
    NegatedSchemaMatched,
    DepthExceeded { limit: usize },
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Type { expected, found } => write!(f, "expected {expected}, found {found}"),
            Self::NotInEnum { allowed } => {
                let allowed: Vec<String> = allowed.iter().map(Value::to_string).collect();
                write!(f, "expected one of [{}]", allowed.join(", "))
            }
            Self::Format { format } => write!(f, "not a valid {format}"),
            Self::TooShort { min, actual } => write!(f, "must be at least {min} characters, found {actual}"),
            Self::TooLong { max, actual } => write!(f, "must be at most {max} characters, found {actual}"),
            Self::PatternMismatch { pattern } => write!(f, "does not match pattern `{pattern}`"),
            Self::BelowMinimum { bound, exclusive: true } => write!(f, "must be greater than {bound}"),
            Self::BelowMinimum { bound, exclusive: false } => write!(f, "must be greater than or equal to {bound}"),
            Self::AboveMaximum { bound, exclusive: true } => write!(f, "must be less than {bound}"),
            Self::AboveMaximum { bound, exclusive: false } => write!(f, "must be less than or equal to {bound}"),
            Self::NotMultipleOf { multiple_of } => write!(f, "must be a multiple of {multiple_of}"),
            Self::OutOfFormatRange { format } => write!(f, "out of range for {format}"),
            Self::TooFewItems { min, actual } => write!(f, "must have at least {min} items, found {actual}"),
            Self::TooManyItems { max, actual } => write!(f, "must have at most {max} items, found {actual}"),
            Self::DuplicateItems { first, second } => write!(f, "items {first} and {second} are equal; items must be unique"),
            Self::TooFewProperties { min, actual } => write!(f, "must have at least {min} properties, found {actual}"),
            Self::TooManyProperties { max, actual } => write!(f, "must have at most {max} properties, found {actual}"),
            Self::MissingProperty { property } => write!(f, "missing required property `{property}`"),
            Self::UnknownProperty { property } => write!(f, "property `{property}` is not allowed"),
            Self::NoBranchMatched { mode, failures } => write!(f, "no {mode} branch matched ({} tried)", failures.len()),
            Self::MultipleBranchesMatched { matched } => {
                let matched: Vec<String> = matched.iter().map(usize::to_string).collect();
                write!(f, "matched more than one oneOf branch ({})", matched.join(", "))
            }
            Self::NegatedSchemaMatched => f.write_str("must not match the negated schema"),
            Self::DepthExceeded { limit } => write!(f, "exceeds the maximum validation depth of {limit}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub path: InstancePath,
    pub reason: Reason,
}

impl Issue {
    pub fn is_depth_exceeded(&self) -> bool {
        matches!(self.reason, Reason::DepthExceeded { .. })
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

impl Serialize for Issue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Repr<'a> {
            path: &'a InstancePath,
            #[serde(flatten)]
            reason: &'a Reason,
            message: String,
        }
        Repr { path: &self.path, reason: &self.reason, message: self.reason.to_string() }.serialize(serializer)
    }
}

#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted(Value),
    Rejected(Vec<Issue>),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn issues(&self) -> &[Issue] {
        match self {
            Self::Accepted(_) => &[],
            Self::Rejected(issues) => issues,
        }
    }

    /// Rejected because the data nests deeper than the configured budget.
    pub fn depth_exceeded(&self) -> bool {
        self.issues().iter().any(Issue::is_depth_exceeded)
    }

    pub fn into_result(self) -> Result<Value, Vec<Issue>> {
        match self {
            Self::Accepted(value) => Ok(value),
            Self::Rejected(issues) => Err(issues),
        }
    }

    /// Structured body for a request-validation error response.
    pub fn report(&self) -> Value {
        match self {
            Self::Accepted(_) => serde_json::json!({ "valid": true }),
            Self::Rejected(issues) => serde_json::json!({
                "valid": false,
                "errors": issues,
            }),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// EVALUATION
// ————————————————————————————————————————————————————————————————————————————

type Checked = Result<Value, Vec<Issue>>;

pub(crate) struct Eval<'r> {
    pub slots: &'r [Check],
    pub max_depth: usize,
    pub strip_unknown: bool,
}

impl Eval<'_> {
    pub fn run(&self, check: &Check, value: &Value, path: &mut InstancePath, depth: usize) -> Checked {
        if depth > self.max_depth {
            return reject(path, Reason::DepthExceeded { limit: self.max_depth });
        }
        match check {
            Check::Any => Ok(value.clone()),
            Check::String(refinements) => match value {
                Value::String(s) => leaf(value, path, crate::constraint::str::apply(refinements, s)),
                other => reject(path, Reason::Type { expected: "string", found: kind_of(other) }),
            },
            Check::Number { integer, refinements } => match value.as_f64() {
                Some(x) if !integer || is_integer(value) => leaf(value, path, num::apply(refinements, x)),
                _ => reject(path, Reason::Type {
                    expected: if *integer { "integer" } else { "number" },
                    found: kind_of(value),
                }),
            },
            Check::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                other => reject(path, Reason::Type { expected: "boolean", found: kind_of(other) }),
            },
            Check::Null => match value {
                Value::Null => Ok(Value::Null),
                other => reject(path, Reason::Type { expected: "null", found: kind_of(other) }),
            },
            Check::Enum(allowed) => {
                let key = ValueKey::of(value);
                if allowed.iter().any(|(k, _)| *k == key) {
                    Ok(value.clone())
                } else {
                    reject(path, Reason::NotInEnum { allowed: allowed.iter().map(|(_, v)| v.clone()).collect() })
                }
            }
            Check::Array { items, refinements } => self.array(items, refinements, value, path, depth),
            Check::Object(object) => self.object(object, value, path, depth),
            Check::Union { mode: UnionMode::AnyOf, branches } => self.any_of(branches, value, path, depth),
            Check::Union { mode: UnionMode::OneOf, branches } => self.one_of(branches, value, path, depth),
            Check::Intersection(branches) => self.all_of(branches, value, path, depth),
            Check::Negation(inner) => match self.run(inner, value, path, depth) {
                Ok(_) => reject(path, Reason::NegatedSchemaMatched),
                Err(issues) if has_depth_exceeded(&issues) => Err(issues),
                Err(_) => Ok(value.clone()),
            },
            Check::Ref(slot) => self.run(&self.slots[*slot], value, path, depth + 1),
        }
    }

    fn array(&self, items: &Check, refinements: &[ArrRefinement], value: &Value, path: &mut InstancePath, depth: usize) -> Checked {
        let Value::Array(xs) = value else {
            return reject(path, Reason::Type { expected: "array", found: kind_of(value) });
        };
        let mut issues = Vec::new();
        let mut out = Vec::with_capacity(xs.len());
        for (i, x) in xs.iter().enumerate() {
            path.push(Segment::Index(i));
            match self.run(items, x, path, depth + 1) {
                Ok(v) => out.push(v),
                Err(mut e) => issues.append(&mut e),
            }
            path.pop();
        }
        push_reasons(&mut issues, path, arr::apply(refinements, xs));
        if issues.is_empty() { Ok(Value::Array(out)) } else { Err(issues) }
    }

    fn object(&self, check: &ObjectCheck, value: &Value, path: &mut InstancePath, depth: usize) -> Checked {
        let Value::Object(map) = value else {
            return reject(path, Reason::Type { expected: "object", found: kind_of(value) });
        };
        let mut issues = Vec::new();
        let mut out = Map::new();
        let mut kept = 0usize;

        for (key, member) in map {
            path.push(Segment::Key(key.clone()));
            let member_check = match check.properties.get(key) {
                Some(declared) => Some(declared),
                None => match &check.extra {
                    Extra::Allow if self.strip_unknown => None,
                    Extra::Allow => {
                        kept += 1;
                        out.insert(key.clone(), member.clone());
                        None
                    }
                    Extra::Reject => {
                        issues.push(Issue { path: path.clone(), reason: Reason::UnknownProperty { property: key.clone() } });
                        None
                    }
                    Extra::Validate(extra) => Some(extra),
                },
            };
            if let Some(member_check) = member_check {
                kept += 1;
                match self.run(member_check, member, path, depth + 1) {
                    Ok(v) => {
                        out.insert(key.clone(), v);
                    }
                    Err(mut e) => issues.append(&mut e),
                }
            }
            path.pop();
        }

        for name in &check.required {
            if !map.contains_key(name) {
                issues.push(Issue { path: path.clone(), reason: Reason::MissingProperty { property: name.clone() } });
            }
        }
        push_reasons(&mut issues, path, obj::apply(&check.refinements, kept));

        if issues.is_empty() { Ok(Value::Object(out)) } else { Err(issues) }
    }

    fn any_of(&self, branches: &[Check], value: &Value, path: &mut InstancePath, depth: usize) -> Checked {
        let mut failures = Vec::with_capacity(branches.len());
        for branch in branches {
            match self.run(branch, value, path, depth) {
                Ok(v) => return Ok(v),
                Err(issues) if has_depth_exceeded(&issues) => return Err(issues),
                Err(issues) => failures.push(issues),
            }
        }
        reject(path, Reason::NoBranchMatched { mode: "anyOf", failures })
    }

    fn one_of(&self, branches: &[Check], value: &Value, path: &mut InstancePath, depth: usize) -> Checked {
        let mut matched = Vec::new();
        let mut failures = Vec::new();
        for (i, branch) in branches.iter().enumerate() {
            match self.run(branch, value, path, depth) {
                Ok(v) => matched.push((i, v)),
                Err(issues) if has_depth_exceeded(&issues) => return Err(issues),
                Err(issues) => failures.push(issues),
            }
        }
        match matched.len() {
            0 => reject(path, Reason::NoBranchMatched { mode: "oneOf", failures }),
            1 => Ok(matched.remove(0).1),
            _ => reject(path, Reason::MultipleBranchesMatched { matched: matched.into_iter().map(|(i, _)| i).collect() }),
        }
    }

    fn all_of(&self, branches: &[Check], value: &Value, path: &mut InstancePath, depth: usize) -> Checked {
        let mut issues = Vec::new();
        let mut outputs = Vec::with_capacity(branches.len());
        for branch in branches {
            match self.run(branch, value, path, depth) {
                Ok(v) => outputs.push(v),
                Err(e) if has_depth_exceeded(&e) => return Err(e),
                Err(mut e) => issues.append(&mut e),
            }
        }
        if issues.is_empty() { Ok(merge_outputs(outputs)) } else { Err(issues) }
    }
}

/// Every branch's normalized view of the same input: objects merge key-wise
/// (a stripping branch must not drop keys another branch declares).
fn merge_outputs(outputs: Vec<Value>) -> Value {
    let mut outputs = outputs.into_iter();
    let Some(first) = outputs.next() else { return Value::Null };
    let Value::Object(mut merged) = first else { return first };
    for output in outputs {
        if let Value::Object(map) = output {
            for (k, v) in map {
                merged.entry(k).or_insert(v);
            }
        }
    }
    Value::Object(merged)
}

fn has_depth_exceeded(issues: &[Issue]) -> bool {
    issues.iter().any(Issue::is_depth_exceeded)
}

fn reject(path: &InstancePath, reason: Reason) -> Checked {
    Err(vec![Issue { path: path.clone(), reason }])
}

fn leaf(value: &Value, path: &InstancePath, reasons: Vec<Reason>) -> Checked {
    if reasons.is_empty() {
        Ok(value.clone())
    } else {
        Err(reasons.into_iter().map(|reason| Issue { path: path.clone(), reason }).collect())
    }
}

fn push_reasons(issues: &mut Vec<Issue>, path: &InstancePath, reasons: Vec<Reason>) {
    issues.extend(reasons.into_iter().map(|reason| Issue { path: path.clone(), reason }));
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0),
        _ => false,
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(check: &Check, value: &Value) -> Checked {
        Eval { slots: &[], max_depth: 16, strip_unknown: false }.run(check, value, &mut InstancePath::root(), 0)
    }

    #[test]
    fn paths_render_keys_and_indices() {
        let mut p = InstancePath::root();
        assert_eq!(p.to_string(), "$");
        p.push(Segment::Key("children".into()));
        p.push(Segment::Index(0));
        p.push(Segment::Key("first name".into()));
        assert_eq!(p.to_string(), r#"$.children[0]["first name"]"#);
    }

    #[test]
    fn integer_check_accepts_integral_floats() {
        let check = Check::Number { integer: true, refinements: vec![] };
        assert!(eval(&check, &json!(3)).is_ok());
        assert!(eval(&check, &json!(3.0)).is_ok());
        let err = eval(&check, &json!(3.5)).unwrap_err();
        assert_eq!(err[0].reason, Reason::Type { expected: "integer", found: "number" });
        assert!(eval(&check, &json!("3")).is_err());
    }

    #[test]
    fn negation_consults_inner_result() {
        let check = Check::Negation(Box::new(Check::String(vec![])));
        assert!(eval(&check, &json!(42)).is_ok());
        assert_eq!(eval(&check, &json!("x")).unwrap_err()[0].reason, Reason::NegatedSchemaMatched);
    }

    #[test]
    fn negation_does_not_turn_depth_exhaustion_into_acceptance() {
        // slot 0 refers to itself without consuming data
        let slots = vec![Check::Ref(0)];
        let negated = Check::Negation(Box::new(Check::Ref(0)));
        let out = Eval { slots: &slots, max_depth: 8, strip_unknown: false }
            .run(&negated, &json!(1), &mut InstancePath::root(), 0);
        let issues = out.unwrap_err();
        assert!(issues.iter().all(Issue::is_depth_exceeded));
    }

    #[test]
    fn issues_serialize_flat_with_message() {
        let issue = Issue {
            path: InstancePath(vec![Segment::Key("name".into())]),
            reason: Reason::TooShort { min: 3, actual: 2 },
        };
        let v = serde_json::to_value(&issue).unwrap();
        assert_eq!(v, json!({
            "path": "$.name",
            "code": "too_short",
            "min": 3,
            "actual": 2,
            "message": "must be at least 3 characters, found 2",
        }));
    }

    #[test]
    fn enum_rejection_lists_allowed_set() {
        let allowed = [json!("active"), json!("inactive")];
        let check = Check::Enum(allowed.iter().map(|v| (ValueKey::of(v), v.clone())).collect());
        let issues = eval(&check, &json!("invalid")).unwrap_err();
        assert_eq!(issues[0].reason.to_string(), r#"expected one of ["active", "inactive"]"#);
    }

    #[test]
    fn intersection_merges_object_outputs() {
        let merged = merge_outputs(vec![json!({"a": 1}), json!({"b": 2, "a": 1})]);
        assert_eq!(merged, json!({"a": 1, "b": 2}));
        assert_eq!(merge_outputs(vec![json!("x"), json!("x")]), json!("x"));
    }
}
