//! Fixture-driven test harness.
//!
//! A suite file bundles a schema document with instance cases:
//!
//! ```json
//! {
//!   "schemas": { "Name": { "type": "string", "minLength": 3 } },
//!   "cases": [
//!     { "name": "too short", "schema": "Name", "value": "ab", "valid": false }
//!   ]
//! }
//! ```
//!
//! `output` on a case asserts the normalized value of an accepted instance.
use serde::Deserialize;
use serde_json::Value;

use crate::config::CompileOptions;
use crate::diagnostic::Diagnostic;
use crate::error::LoadError;
use crate::ir::SchemaDocument;
use crate::registry::RegistryBuilder;
use crate::validator::Outcome;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Suite {
    #[serde(default)]
    pub description: Option<String>,
    /// Any document form [`SchemaDocument::from_value`] accepts.
    pub schemas: Value,
    #[serde(default)]
    pub options: CompileOptions,
    pub cases: Vec<Case>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Case {
    pub name: String,
    pub schema: String,
    pub value: Value,
    pub valid: bool,
    #[serde(default)]
    pub output: Option<Value>,
}

#[derive(Debug)]
pub struct CaseResult {
    pub name: String,
    pub outcome: Option<Outcome>,
    /// Why the case failed; `None` when it passed.
    pub failure: Option<String>,
}

impl CaseResult {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug)]
pub struct SuiteReport {
    pub diagnostics: Vec<Diagnostic>,
    pub results: Vec<CaseResult>,
}

impl SuiteReport {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(CaseResult::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results.iter().filter(|r| !r.passed())
    }
}

impl Suite {
    pub fn from_json_str(src: &str) -> Result<Self, LoadError> {
        crate::path_de::from_str_with_path(src)
    }

    pub fn run(&self) -> Result<SuiteReport, LoadError> {
        self.run_filtered(|_| true)
    }

    /// Run only the cases whose name passes `filter`.
    pub fn run_filtered(&self, filter: impl Fn(&str) -> bool) -> Result<SuiteReport, LoadError> {
        let document = SchemaDocument::from_value(self.schemas.clone())?;
        let registry = RegistryBuilder::new().options(self.options.clone()).build(&document)?;

        let results = self
            .cases
            .iter()
            .filter(|case| filter(&case.name))
            .map(|case| {
                let validator = match registry.get(&case.schema) {
                    Ok(validator) => validator,
                    Err(error) => {
                        return CaseResult { name: case.name.clone(), outcome: None, failure: Some(error.to_string()) };
                    }
                };
                let outcome = validator.validate(&case.value);
                let failure = match (&outcome, case.valid) {
                    (Outcome::Accepted(_), false) => Some("accepted, expected rejection".to_string()),
                    (Outcome::Rejected(issues), true) => {
                        let issues: Vec<String> = issues.iter().map(ToString::to_string).collect();
                        Some(format!("rejected, expected acceptance: {}", issues.join("; ")))
                    }
                    (Outcome::Accepted(value), true) => match &case.output {
                        Some(expected) if expected != value => Some(format!("accepted as {value}, expected {expected}")),
                        _ => None,
                    },
                    (Outcome::Rejected(_), false) => None,
                };
                CaseResult { name: case.name.clone(), outcome: Some(outcome), failure }
            })
            .collect();

        Ok(SuiteReport { diagnostics: registry.diagnostics().to_vec(), results })
    }
}
