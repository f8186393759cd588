use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde_json::Value;

use crate::diagnostic::DiagnosticKind;
use crate::validator::Reason;

/// Canonical, totally ordered image of a JSON value.
///
/// Two values are deep-equal iff their keys are equal: numbers compare by
/// numeric value (`1 == 1.0`) and object key order is irrelevant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Number(OrderedFloat<f64>),
    String(String),
    Array(Vec<ValueKey>),
    Object(BTreeMap<String, ValueKey>),
}

impl ValueKey {
    pub fn of(v: &Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            // integers beyond 2^53 collapse onto their nearest f64
            Value::Number(n) => Self::Number(OrderedFloat(n.as_f64().unwrap_or(f64::NAN))),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(xs) => Self::Array(xs.iter().map(Self::of).collect()),
            Value::Object(m) => Self::Object(m.iter().map(|(k, v)| (k.clone(), Self::of(v))).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrRefinement {
    MinItems(u64),
    MaxItems(u64),
    UniqueItems,
}

pub fn pipeline(
    min_items: Option<u64>,
    max_items: Option<u64>,
    unique_items: bool,
    report: &mut impl FnMut(DiagnosticKind),
) -> Vec<ArrRefinement> {
    super::check_bounds(
        min_items.map(|n| (n, "minItems")),
        max_items.map(|n| (n, "maxItems")),
        report,
    );
    let mut out = Vec::new();
    if let Some(n) = min_items {
        out.push(ArrRefinement::MinItems(n));
    }
    if let Some(n) = max_items {
        out.push(ArrRefinement::MaxItems(n));
    }
    if unique_items {
        out.push(ArrRefinement::UniqueItems);
    }
    out
}

pub fn apply(refinements: &[ArrRefinement], items: &[Value]) -> Vec<Reason> {
    let actual = items.len() as u64;
    let mut reasons = Vec::new();
    for refinement in refinements {
        match refinement {
            ArrRefinement::MinItems(min) if actual < *min => {
                reasons.push(Reason::TooFewItems { min: *min, actual });
            }
            ArrRefinement::MaxItems(max) if actual > *max => {
                reasons.push(Reason::TooManyItems { max: *max, actual });
            }
            ArrRefinement::UniqueItems => {
                if let Some((first, second)) = first_duplicate(items) {
                    reasons.push(Reason::DuplicateItems { first, second });
                }
            }
            _ => {}
        }
    }
    reasons
}

/// Indices of the first pair of deep-equal elements.
fn first_duplicate(items: &[Value]) -> Option<(usize, usize)> {
    let mut seen: BTreeMap<ValueKey, usize> = BTreeMap::new();
    for (i, item) in items.iter().enumerate() {
        let key = ValueKey::of(item);
        if let Some(&first) = seen.get(&key) {
            return Some((first, i));
        }
        seen.insert(key, i);
    }
    None
}
