//! Constraint pipeline.
//!
//! Pure functions that turn the declarative bounds of one IR node into an
//! ordered list of refinements, and apply that list to a value that already
//! passed the base kind check.
//!
//! Fixed order per kind:
//! - string: format → minLength → maxLength → pattern
//! - number/integer: format range → lower bound → upper bound → multipleOf
//! - array: minItems → maxItems → uniqueItems
//! - object: minProperties → maxProperties
//!
//! A malformed constraint never fails the pipeline: it is reported through the
//! caller's diagnostic callback and left out of the list.
pub mod str;
pub mod num;
pub mod arr;
pub mod obj;

use crate::diagnostic::DiagnosticKind;

pub use arr::ValueKey;

/// Report an inverted pair of bounds. Still compiles; nothing can match.
pub(crate) fn check_bounds<T: PartialOrd>(
    lower: Option<(T, &'static str)>,
    upper: Option<(T, &'static str)>,
    report: &mut impl FnMut(DiagnosticKind),
) {
    if let (Some((lo, lower)), Some((hi, upper))) = (lower, upper) {
        if lo > hi {
            report(DiagnosticKind::UnsatisfiableBounds { lower, upper });
        }
    }
}
