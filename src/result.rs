//! Classified results of single invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ExecutionError, TIMEOUT_MESSAGE};

/// Whether an invocation succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The program exited with code 0.
    Success,
    /// The program failed, timed out, or never ran.
    Failure,
}

impl Outcome {
    /// Lowercase label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of one invocation.
///
/// Exactly one of `output` and `error` is set: `output` on success, `error`
/// on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Success or failure.
    pub outcome: Outcome,
    /// Trimmed program output, set on success.
    pub output: Option<String>,
    /// Failure description, set on failure. May be empty.
    pub error: Option<String>,
    /// Wall-clock time of the whole invocation.
    pub duration_seconds: f64,
    /// When the invocation was requested.
    pub started_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Classifies a sandbox that ran to completion.
    ///
    /// Exit code 0 is a success carrying the output. Anything else is a
    /// failure whose error is the output, even when that is empty.
    pub fn classify(
        exit_code: i64,
        output: String,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        if exit_code == 0 {
            return Self {
                outcome: Outcome::Success,
                output: Some(output),
                error: None,
                duration_seconds: duration.as_secs_f64(),
                started_at,
            };
        }

        Self::failure(output, started_at, duration)
    }

    /// Converts an error that ended the invocation early.
    pub fn from_error(err: &ExecutionError, started_at: DateTime<Utc>, duration: Duration) -> Self {
        let message = if err.is_timeout() {
            TIMEOUT_MESSAGE.to_string()
        } else {
            err.to_string()
        };
        Self::failure(message, started_at, duration)
    }

    fn failure(error: String, started_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            outcome: Outcome::Failure,
            output: None,
            error: Some(error),
            duration_seconds: duration.as_secs_f64(),
            started_at,
        }
    }

    /// Returns true if the invocation succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_zero_exit_is_success() {
        let result = ExecutionResult::classify(0, "4".to_string(), at(), Duration::from_millis(250));
        assert!(result.is_success());
        assert_eq!(result.output.as_deref(), Some("4"));
        assert!(result.error.is_none());
        assert!((result.duration_seconds - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_output_success() {
        let result = ExecutionResult::classify(0, String::new(), at(), Duration::ZERO);
        assert!(result.is_success());
        assert_eq!(result.output.as_deref(), Some(""));
    }

    #[test]
    fn test_nonzero_exit_is_failure() {
        let result = ExecutionResult::classify(
            1,
            "Traceback (most recent call last):\nException: boom".to_string(),
            at(),
            Duration::from_secs(1),
        );
        assert_eq!(result.outcome, Outcome::Failure);
        assert!(result.output.is_none());
        assert!(result.error.unwrap().contains("Exception: boom"));
    }

    #[test]
    fn test_silent_failure_has_empty_error() {
        let result = ExecutionResult::classify(137, String::new(), at(), Duration::ZERO);
        assert_eq!(result.outcome, Outcome::Failure);
        assert!(result.output.is_none());
        assert_eq!(result.error.as_deref(), Some(""));
    }

    #[test]
    fn test_timeout_uses_fixed_message() {
        let err = ExecutionError::Timeout {
            language: "python".to_string(),
            timeout_secs: 2,
            partial_output: "partial".to_string(),
        };
        let result = ExecutionResult::from_error(&err, at(), Duration::from_secs(2));
        assert_eq!(result.error.as_deref(), Some("execution timed out"));
        assert!(result.output.is_none());
    }

    #[test]
    fn test_unsupported_language_message() {
        let err = ExecutionError::unsupported_language("ruby");
        let result = ExecutionResult::from_error(&err, at(), Duration::ZERO);
        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("Unsupported language: ruby"));
    }

    #[test]
    fn test_serializes_with_lowercase_outcome() {
        let result = ExecutionResult::classify(0, "ok".to_string(), at(), Duration::ZERO);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "success");
        assert_eq!(json["output"], "ok");
        assert!(json["error"].is_null());
        assert!(json["started_at"].is_string());
        assert!(json["duration_seconds"].is_number());
    }
}
