//! Validated description of one snippet to execute.

use serde::Serialize;

const DEFAULT_NAME: &str = "unnamed";

/// Reasons a [`FunctionSpec`] cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    /// The language identifier was blank.
    #[error("Language must not be empty")]
    EmptyLanguage,

    /// The timeout was zero.
    #[error("Timeout must be at least 1 second")]
    ZeroTimeout,
}

/// A snippet to execute: language, source, and time budget.
///
/// Immutable once built. The language is kept as a normalized identifier so
/// that languages the registry doesn't know can still be expressed and
/// rejected at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionSpec {
    language: String,
    code: String,
    timeout_secs: u64,
    name: String,
}

impl FunctionSpec {
    /// Builds a spec, normalizing the language to lowercase.
    pub fn new(
        language: impl AsRef<str>,
        code: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, SpecError> {
        let language = language.as_ref().trim().to_lowercase();
        if language.is_empty() {
            return Err(SpecError::EmptyLanguage);
        }
        if timeout_secs == 0 {
            return Err(SpecError::ZeroTimeout);
        }

        Ok(Self {
            language,
            code: code.into(),
            timeout_secs,
            name: DEFAULT_NAME.to_string(),
        })
    }

    /// Sets the diagnostic name used in logs and metrics.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.name = name;
        }
        self
    }

    /// Lowercased language id.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Source code, as given.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Requested wall-clock budget in seconds.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }
}
