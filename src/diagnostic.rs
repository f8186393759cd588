//! Non-fatal findings recorded while lowering and compiling.
//!
//! Every diagnostic is also emitted as a `tracing` warning at the moment it is
//! recorded, so a binary with a subscriber installed sees them as they happen;
//! library callers read them back from the registry.
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DiagnosticKind {
    #[error("invalid pattern `{pattern}` ignored: {message}")]
    PatternCompile { pattern: String, message: String },
    #[error("unsupported type `{token}`; accepting any JSON value")]
    UnsupportedTypeToken { token: String },
    #[error("unknown {kind} format `{format}`; not enforced")]
    UnknownFormat { kind: &'static str, format: String },
    #[error("`{keyword}` ignored: {message}")]
    InvalidConstraint { keyword: &'static str, message: String },
    #[error("`{lower}` is greater than `{upper}`; no value can satisfy both")]
    UnsatisfiableBounds { lower: &'static str, upper: &'static str },
    #[error("`{kept}` takes precedence; ignored {}", ignored.join(", "))]
    ShadowedKeywords { kept: &'static str, ignored: Vec<&'static str> },
    #[error("recursion without an array/object boundary: {}; validation is bounded by max depth", cycle.join(" -> "))]
    UnguardedRecursion { cycle: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub schema: String,
    pub location: String,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.location.is_empty() {
            write!(f, "{}: {}", self.schema, self.kind)
        } else {
            write!(f, "{} at {}: {}", self.schema, self.location, self.kind)
        }
    }
}

/// Collects diagnostics for one document.
#[derive(Debug, Default)]
pub(crate) struct Sink {
    items: Vec<Diagnostic>,
}

impl Sink {
    pub fn record(&mut self, schema: &str, location: &str, kind: DiagnosticKind) {
        let diagnostic = Diagnostic {
            schema: schema.to_string(),
            location: location.to_string(),
            kind,
        };
        tracing::warn!(schema = %diagnostic.schema, location = %diagnostic.location, "{}", diagnostic.kind);
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(items);
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SCHEMA LOCATIONS
// ————————————————————————————————————————————————————————————————————————————

/// JSON pointer into a schema entry, built up while descending.
#[derive(Debug, Clone, Default)]
pub(crate) struct Pointer(Vec<String>);

impl Pointer {
    pub fn push(&mut self, segment: impl Into<String>) {
        self.0.push(segment.into());
    }

    pub fn pop(&mut self) {
        self.0.pop();
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.0 {
            out.push('/');
            out.push_str(&segment.replace('~', "~0").replace('/', "~1"));
        }
        out
    }
}
