//! Compilation options.
//!
//! Loaded from a JSON file (`--config`) and/or overridden by CLI flags:
//!
//! ```json
//! { "maxDepth": 64, "unknownKeys": "strip" }
//! ```
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

pub const DEFAULT_MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CompileOptions {
    /// Nesting budget for one `validate` call: array elements, object members
    /// and reference hops each cost one level.
    pub max_depth: usize,
    pub unknown_keys: UnknownKeys,
}

/// Treatment of undeclared keys on objects that allow them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKeys {
    /// Keep them in the accepted value.
    #[default]
    Passthrough,
    /// Drop them from the accepted value.
    Strip,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH, unknown_keys: UnknownKeys::default() }
    }
}

impl CompileOptions {
    pub fn from_json_str(src: &str) -> Result<Self, LoadError> {
        crate::path_de::from_str_with_path(src)
    }
}
