use once_cell::sync::Lazy;
use regex::Regex;

use crate::diagnostic::DiagnosticKind;
use crate::ir::{Constraints, Format};
use crate::validator::Reason;

#[derive(Debug, Clone)]
pub enum StrRefinement {
    Format(StrFormat),
    MinLength(u64),
    MaxLength(u64),
    Pattern(Regex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrFormat {
    Uuid,
    Email,
    Uri,
    DateTime,
    Date,
}

impl StrFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Email => "email",
            Self::Uri => "uri",
            Self::DateTime => "date-time",
            Self::Date => "date",
        }
    }

    pub fn accepts(&self, s: &str) -> bool {
        match self {
            Self::Uuid => UUID.is_match(s),
            Self::Email => EMAIL.is_match(s),
            Self::Uri => URI.is_match(s),
            Self::DateTime => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
            Self::Date => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() && s.len() == 10,
        }
    }
}

// ------- Format acceptors -------

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("static uuid regex")
});

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)+$")
        .expect("static email regex")
});

// scheme ":" then a non-empty remainder without whitespace
static URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:[^\s]+$").expect("static uri regex")
});

/// OpenAPI annotation formats that carry no validation semantics.
const ANNOTATION_FORMATS: &[&str] = &["password", "byte", "binary"];

/// Build the string refinements for one node.
pub fn pipeline(
    format: Option<&Format>,
    c: &Constraints,
    report: &mut impl FnMut(DiagnosticKind),
) -> Vec<StrRefinement> {
    let mut out = Vec::new();

    if let Some(format) = format {
        match string_format(format) {
            Some(f) => out.push(StrRefinement::Format(f)),
            None if ANNOTATION_FORMATS.contains(&format.as_str()) => {}
            None => report(DiagnosticKind::UnknownFormat { kind: "string", format: format.as_str().to_string() }),
        }
    }

    super::check_bounds(
        c.min_length.map(|n| (n, "minLength")),
        c.max_length.map(|n| (n, "maxLength")),
        report,
    );
    if let Some(n) = c.min_length {
        out.push(StrRefinement::MinLength(n));
    }
    if let Some(n) = c.max_length {
        out.push(StrRefinement::MaxLength(n));
    }

    if let Some(pattern) = &c.pattern {
        match Regex::new(pattern) {
            Ok(rx) => out.push(StrRefinement::Pattern(rx)),
            Err(error) => report(DiagnosticKind::PatternCompile {
                pattern: pattern.clone(),
                message: first_line(&error.to_string()),
            }),
        }
    }

    out
}

fn string_format(format: &Format) -> Option<StrFormat> {
    match format {
        Format::Uuid => Some(StrFormat::Uuid),
        Format::Email => Some(StrFormat::Email),
        Format::Uri => Some(StrFormat::Uri),
        Format::DateTime => Some(StrFormat::DateTime),
        Format::Date => Some(StrFormat::Date),
        Format::Int32 | Format::Int64 | Format::Other(_) => None,
    }
}

// regex errors are multi-line with a caret diagram; keep the summary
fn first_line(message: &str) -> String {
    message
        .lines()
        .rev()
        .find(|line| line.starts_with("error:"))
        .unwrap_or_else(|| message.lines().next().unwrap_or(message))
        .trim()
        .to_string()
}

/// Apply refinements in order; every failing refinement contributes a reason.
pub fn apply(refinements: &[StrRefinement], s: &str) -> Vec<Reason> {
    let mut reasons = Vec::new();
    let mut chars: Option<u64> = None;
    let mut len = || *chars.get_or_insert_with(|| s.chars().count() as u64);

    for refinement in refinements {
        match refinement {
            StrRefinement::Format(f) => {
                if !f.accepts(s) {
                    reasons.push(Reason::Format { format: f.as_str().to_string() });
                }
            }
            StrRefinement::MinLength(min) => {
                let actual = len();
                if actual < *min {
                    reasons.push(Reason::TooShort { min: *min, actual });
                }
            }
            StrRefinement::MaxLength(max) => {
                let actual = len();
                if actual > *max {
                    reasons.push(Reason::TooLong { max: *max, actual });
                }
            }
            StrRefinement::Pattern(rx) => {
                if !rx.is_match(s) {
                    reasons.push(Reason::PatternMismatch { pattern: rx.as_str().to_string() });
                }
            }
        }
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(format: Option<&str>, c: Constraints) -> (Vec<StrRefinement>, Vec<DiagnosticKind>) {
        let mut diags = Vec::new();
        let format = format.map(Format::parse);
        let refs = pipeline(format.as_ref(), &c, &mut |d| diags.push(d));
        (refs, diags)
    }

    #[test]
    fn length_bounds_count_characters() {
        let c = Constraints { min_length: Some(3), max_length: Some(5), ..Default::default() };
        let (refs, diags) = build(None, c);
        assert!(diags.is_empty());
        assert_eq!(apply(&refs, "ab"), vec![Reason::TooShort { min: 3, actual: 2 }]);
        assert!(apply(&refs, "abcd").is_empty());
        assert_eq!(apply(&refs, "abcdef"), vec![Reason::TooLong { max: 5, actual: 6 }]);
        // four scalar values, more than five bytes
        assert!(apply(&refs, "ñäöü").is_empty());
    }

    #[test]
    fn refinements_keep_fixed_order() {
        let c = Constraints {
            min_length: Some(1),
            max_length: Some(2),
            pattern: Some("^x".into()),
            ..Default::default()
        };
        let (refs, _) = build(Some("email"), c);
        let order: Vec<&str> = refs.iter().map(|r| match r {
            StrRefinement::Format(_) => "format",
            StrRefinement::MinLength(_) => "minLength",
            StrRefinement::MaxLength(_) => "maxLength",
            StrRefinement::Pattern(_) => "pattern",
        }).collect();
        assert_eq!(order, ["format", "minLength", "maxLength", "pattern"]);
    }

    #[test]
    fn invalid_pattern_is_dropped_with_diagnostic() {
        let c = Constraints { pattern: Some("[invalid-regex".into()), ..Default::default() };
        let (refs, diags) = build(None, c);
        assert!(refs.is_empty());
        assert!(matches!(&diags[..], [DiagnosticKind::PatternCompile { pattern, .. }] if pattern == "[invalid-regex"));
        assert!(apply(&refs, "any string").is_empty());
    }

    #[test]
    fn pattern_is_a_search_not_a_full_match() {
        let c = Constraints { pattern: Some("[0-9]{3}".into()), ..Default::default() };
        let (refs, _) = build(None, c);
        assert!(apply(&refs, "abc123def").is_empty());
        assert_eq!(apply(&refs, "12").len(), 1);
    }

    #[test]
    fn known_formats() {
        assert!(StrFormat::Uuid.accepts("123e4567-e89b-12d3-a456-426614174000"));
        assert!(!StrFormat::Uuid.accepts("123e4567e89b12d3a456426614174000"));

        assert!(StrFormat::Email.accepts("jane.doe@example.com"));
        assert!(!StrFormat::Email.accepts("jane.doe@"));
        assert!(!StrFormat::Email.accepts("not an email"));

        assert!(StrFormat::Uri.accepts("https://example.com/a?b=c"));
        assert!(StrFormat::Uri.accepts("mailto:jane@example.com"));
        assert!(!StrFormat::Uri.accepts("example.com"));
        assert!(!StrFormat::Uri.accepts("https://exa mple.com"));

        assert!(StrFormat::DateTime.accepts("2024-02-29T12:30:00Z"));
        assert!(StrFormat::DateTime.accepts("2024-02-29T12:30:00.123+02:00"));
        assert!(!StrFormat::DateTime.accepts("2024-02-29"));

        assert!(StrFormat::Date.accepts("2024-02-29"));
        assert!(!StrFormat::Date.accepts("2023-02-29"));
        assert!(!StrFormat::Date.accepts("2024-2-9"));
    }

    #[test]
    fn unknown_formats_fall_back_to_plain_string() {
        let (refs, diags) = build(Some("hostname"), Constraints::default());
        assert!(refs.is_empty());
        assert_eq!(diags, vec![DiagnosticKind::UnknownFormat { kind: "string", format: "hostname".into() }]);

        let (refs, diags) = build(Some("password"), Constraints::default());
        assert!(refs.is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn inverted_lengths_are_reported() {
        let c = Constraints { min_length: Some(5), max_length: Some(3), ..Default::default() };
        let (refs, diags) = build(None, c);
        assert_eq!(refs.len(), 2);
        assert_eq!(diags, vec![DiagnosticKind::UnsatisfiableBounds { lower: "minLength", upper: "maxLength" }]);
    }
}
