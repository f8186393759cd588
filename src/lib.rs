//! Compile OpenAPI / JSON-Schema style data descriptions into runtime
//! validators.
//!
//! ```no_run
//! use json_sieve::{compile, SchemaDocument};
//! use serde_json::json;
//!
//! let doc = SchemaDocument::from_json_str(r#"{
//!     "Name": { "type": "string", "minLength": 3 }
//! }"#)?;
//! let registry = compile(&doc)?;
//! assert!(!registry.get("Name")?.accepts(&json!("ab")));
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
pub mod config;
pub mod constraint;
pub mod diagnostic;
pub mod emit;
pub mod error;
pub mod ir;
pub mod registry;
pub mod shape;
pub mod suite;
pub mod validator;

mod compiler;
mod lower;
mod path_de;

pub use config::{CompileOptions, UnknownKeys, DEFAULT_MAX_DEPTH};
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use error::{LoadError, SchemaError, SchemaErrorKind, UnknownSchema};
pub use ir::{SchemaDocument, SchemaNode};
pub use registry::{compile, RegistryBuilder, Validator, ValidatorRegistry};
pub use validator::{InstancePath, Issue, Outcome, Reason};
