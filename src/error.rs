//! Per-invocation error taxonomy.
//!
//! Every variant names the language and the phase it came from so it can be
//! logged and classified without parsing messages. None of these escape
//! [`Engine::execute`](crate::Engine::execute); they become failure results.

use std::fmt;

use crate::sandbox::BackendError;

/// Phase of an invocation an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Looking up or building the image.
    Build,
    /// Writing the workspace.
    Stage,
    /// Creating and starting the sandbox.
    Launch,
    /// Waiting for the sandbox and collecting output.
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Stage => write!(f, "stage"),
            Self::Launch => write!(f, "launch"),
            Self::Run => write!(f, "run"),
        }
    }
}

/// Fixed message reported for timed-out executions.
pub const TIMEOUT_MESSAGE: &str = "execution timed out";

/// Errors that end an invocation before a normal classification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    /// No runtime is registered for the language.
    #[error("Unsupported language: {language}")]
    UnsupportedLanguage { language: String },

    /// The image could not be built after all attempts.
    #[error("Failed to build image {image} for {language} after {attempts} attempts: {message}")]
    ImageBuild {
        language: String,
        image: String,
        attempts: u32,
        message: String,
    },

    /// The workspace could not be written.
    #[error("Failed to stage workspace for {language}: {message}")]
    Staging { language: String, message: String },

    /// Neither isolation strategy could start the sandbox.
    #[error("Container execution failed: could not launch {language} sandbox (network-disabled: {primary}; host-network: {fallback})")]
    Launch {
        language: String,
        primary: String,
        fallback: String,
    },

    /// The sandbox exceeded its budget and was killed.
    #[error("execution timed out")]
    Timeout {
        language: String,
        timeout_secs: u64,
        /// Output captured before the kill; never reported to callers.
        partial_output: String,
    },

    /// A backend call failed while the sandbox was running.
    #[error("Container execution failed during {phase}: {source}")]
    Backend {
        language: String,
        phase: Phase,
        #[source]
        source: BackendError,
    },
}

impl ExecutionError {
    /// Creates an `UnsupportedLanguage` error.
    pub fn unsupported_language(language: impl Into<String>) -> Self {
        Self::UnsupportedLanguage {
            language: language.into(),
        }
    }

    /// Creates a `Staging` error.
    pub fn staging(language: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Staging {
            language: language.into(),
            message: err.to_string(),
        }
    }

    /// Creates a `Backend` error.
    pub fn backend(language: impl Into<String>, phase: Phase, source: BackendError) -> Self {
        Self::Backend {
            language: language.into(),
            phase,
            source,
        }
    }

    /// The language the failing invocation asked for.
    pub fn language(&self) -> &str {
        match self {
            Self::UnsupportedLanguage { language }
            | Self::ImageBuild { language, .. }
            | Self::Staging { language, .. }
            | Self::Launch { language, .. }
            | Self::Timeout { language, .. }
            | Self::Backend { language, .. } => language,
        }
    }

    /// The phase the error was raised in.
    pub fn phase(&self) -> Phase {
        match self {
            Self::UnsupportedLanguage { .. } | Self::ImageBuild { .. } => Phase::Build,
            Self::Staging { .. } => Phase::Stage,
            Self::Launch { .. } => Phase::Launch,
            Self::Timeout { .. } => Phase::Run,
            Self::Backend { phase, .. } => *phase,
        }
    }

    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if no runtime exists for the language.
    pub fn is_unsupported_language(&self) -> bool {
        matches!(self, Self::UnsupportedLanguage { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_language_error() {
        let err = ExecutionError::unsupported_language("ruby");
        assert!(err.is_unsupported_language());
        assert_eq!(err.phase(), Phase::Build);
        assert_eq!(err.language(), "ruby");
        assert_eq!(err.to_string(), "Unsupported language: ruby");
    }

    #[test]
    fn test_timeout_message_is_fixed() {
        let err = ExecutionError::Timeout {
            language: "python".to_string(),
            timeout_secs: 2,
            partial_output: "half a line".to_string(),
        };
        assert!(err.is_timeout());
        assert_eq!(err.phase(), Phase::Run);
        assert_eq!(err.to_string(), TIMEOUT_MESSAGE);
    }

    #[test]
    fn test_image_build_error() {
        let err = ExecutionError::ImageBuild {
            language: "python".to_string(),
            image: "funcbox-python:latest".to_string(),
            attempts: 3,
            message: "network unreachable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to build image funcbox-python:latest for python after 3 attempts: network unreachable"
        );
    }

    #[test]
    fn test_launch_error_carries_both_causes() {
        let err = ExecutionError::Launch {
            language: "javascript".to_string(),
            primary: "bad network".to_string(),
            fallback: "no host".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("bad network"));
        assert!(msg.contains("no host"));
        assert_eq!(err.phase(), Phase::Launch);
    }

    #[test]
    fn test_backend_error_keeps_phase() {
        let err = ExecutionError::backend(
            "python",
            Phase::Run,
            BackendError::container_failed("logs unavailable"),
        );
        assert_eq!(err.phase(), Phase::Run);
        assert!(!err.is_timeout());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_staging_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = ExecutionError::staging("python", &io);
        assert_eq!(err.phase(), Phase::Stage);
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Build.to_string(), "build");
        assert_eq!(Phase::Launch.to_string(), "launch");
    }
}
