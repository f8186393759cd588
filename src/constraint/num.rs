use crate::diagnostic::DiagnosticKind;
use crate::ir::{Constraints, Exclusive, Format, PrimitiveKind};
use crate::validator::Reason;

/// Relative tolerance for `multipleOf`, scaled by the operands' magnitude.
const MULTIPLE_OF_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum NumRefinement {
    FormatRange { format: &'static str, min: f64, max: f64 },
    Lower { bound: f64, exclusive: bool },
    Upper { bound: f64, exclusive: bool },
    MultipleOf(f64),
}

/// Build numeric refinements for a `number` or `integer` node.
pub fn pipeline(
    kind: PrimitiveKind,
    format: Option<&Format>,
    c: &Constraints,
    report: &mut impl FnMut(DiagnosticKind),
) -> Vec<NumRefinement> {
    let mut out = Vec::new();

    match format {
        None => {}
        Some(Format::Int32) => out.push(NumRefinement::FormatRange {
            format: "int32",
            min: i32::MIN as f64,
            max: i32::MAX as f64,
        }),
        Some(Format::Int64) => out.push(NumRefinement::FormatRange {
            format: "int64",
            min: i64::MIN as f64,
            max: i64::MAX as f64,
        }),
        Some(Format::Other(token)) if matches!(token.as_str(), "float" | "double") => {}
        Some(other) => report(DiagnosticKind::UnknownFormat {
            kind: kind.as_str(),
            format: other.as_str().to_string(),
        }),
    }

    let lower = resolve_bound(c.minimum, c.exclusive_minimum);
    let upper = resolve_bound(c.maximum, c.exclusive_maximum);
    if let (Some((lo, lo_ex)), Some((hi, hi_ex))) = (lower, upper) {
        if lo > hi || (lo == hi && (lo_ex || hi_ex)) {
            report(DiagnosticKind::UnsatisfiableBounds {
                lower: if lo_ex { "exclusiveMinimum" } else { "minimum" },
                upper: if hi_ex { "exclusiveMaximum" } else { "maximum" },
            });
        }
    }
    if let Some((bound, exclusive)) = lower {
        out.push(NumRefinement::Lower { bound, exclusive });
    }
    if let Some((bound, exclusive)) = upper {
        out.push(NumRefinement::Upper { bound, exclusive });
    }

    if let Some(m) = c.multiple_of {
        if m.is_finite() && m > 0.0 {
            out.push(NumRefinement::MultipleOf(m));
        } else {
            report(DiagnosticKind::InvalidConstraint {
                keyword: "multipleOf",
                message: format!("must be a positive number, found {m}"),
            });
        }
    }

    out
}

/// Combine an inclusive bound with its exclusive companion.
///
/// A numeric exclusive bound stands on its own and wins over the inclusive
/// one; `true` turns the inclusive bound exclusive; `false` is a no-op.
fn resolve_bound(inclusive: Option<f64>, exclusive: Option<Exclusive>) -> Option<(f64, bool)> {
    match exclusive {
        Some(Exclusive::Bound(x)) => Some((x, true)),
        Some(Exclusive::Flag(true)) => inclusive.map(|b| (b, true)),
        Some(Exclusive::Flag(false)) | None => inclusive.map(|b| (b, false)),
    }
}

pub fn is_multiple_of(x: f64, m: f64) -> bool {
    let r = (x % m).abs();
    let tolerance = MULTIPLE_OF_EPSILON * x.abs().max(m).max(1.0);
    r <= tolerance || (m - r).abs() <= tolerance
}

pub fn apply(refinements: &[NumRefinement], x: f64) -> Vec<Reason> {
    let mut reasons = Vec::new();
    for refinement in refinements {
        match *refinement {
            NumRefinement::FormatRange { format, min, max } => {
                if x < min || x > max {
                    reasons.push(Reason::OutOfFormatRange { format });
                }
            }
            NumRefinement::Lower { bound, exclusive } => {
                let ok = if exclusive { x > bound } else { x >= bound };
                if !ok {
                    reasons.push(Reason::BelowMinimum { bound, exclusive });
                }
            }
            NumRefinement::Upper { bound, exclusive } => {
                let ok = if exclusive { x < bound } else { x <= bound };
                if !ok {
                    reasons.push(Reason::AboveMaximum { bound, exclusive });
                }
            }
            NumRefinement::MultipleOf(m) => {
                if !is_multiple_of(x, m) {
                    reasons.push(Reason::NotMultipleOf { multiple_of: m });
                }
            }
        }
    }
    reasons
}
