use crate::diagnostic::DiagnosticKind;
use crate::ir::{AdditionalProperties, ObjectNode};
use crate::validator::Reason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjRefinement {
    MinProperties(u64),
    MaxProperties(u64),
}

pub fn pipeline(node: &ObjectNode, report: &mut impl FnMut(DiagnosticKind)) -> Vec<ObjRefinement> {
    super::check_bounds(
        node.min_properties().map(|n| (n, "minProperties")),
        node.max_properties().map(|n| (n, "maxProperties")),
        report,
    );
    let mut out = Vec::new();
    if let Some(n) = node.min_properties() {
        out.push(ObjRefinement::MinProperties(n));
    }
    if let Some(n) = node.max_properties() {
        out.push(ObjRefinement::MaxProperties(n));
    }
    out
}

/// Closed objects reject undeclared keys: `additionalProperties: false`, or
/// `maxProperties` set while additional keys are otherwise allowed.
pub fn is_closed(node: &ObjectNode) -> bool {
    match node.additional() {
        AdditionalProperties::Deny => true,
        AdditionalProperties::Allow => node.max_properties().is_some(),
        AdditionalProperties::Schema(_) => false,
    }
}

pub fn apply(refinements: &[ObjRefinement], count: usize) -> Vec<Reason> {
    let actual = count as u64;
    let mut reasons = Vec::new();
    for refinement in refinements {
        match *refinement {
            ObjRefinement::MinProperties(min) if actual < min => {
                reasons.push(Reason::TooFewProperties { min, actual });
            }
            ObjRefinement::MaxProperties(max) if actual > max => {
                reasons.push(Reason::TooManyProperties { max, actual });
            }
            _ => {}
        }
    }
    reasons
}
