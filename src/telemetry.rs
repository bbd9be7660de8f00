//! Execution metrics.
//!
//! Every finished invocation produces one [`ExecutionSample`]. The default
//! sink records it through the `metrics` facade, so whichever recorder the
//! host process installs (Prometheus, statsd, none) receives it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

use crate::result::Outcome;

/// Counter of finished executions, labelled by language and status.
pub const EXECUTIONS_TOTAL: &str = "funcbox_executions_total";

/// Histogram of execution durations in seconds.
pub const EXECUTION_DURATION_SECONDS: &str = "funcbox_execution_duration_seconds";

/// One finished invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSample {
    /// Language label.
    pub language: String,
    /// Diagnostic name of the function.
    pub function_name: String,
    /// Success or failure.
    pub outcome: Outcome,
    /// Same duration reported in the result.
    pub duration: Duration,
}

/// Receives execution samples.
pub trait MetricsSink: Send + Sync {
    /// Records one finished invocation.
    fn record(&self, sample: &ExecutionSample);
}

/// Records samples through the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeMetrics;

impl MetricsSink for FacadeMetrics {
    fn record(&self, sample: &ExecutionSample) {
        metrics::counter!(
            EXECUTIONS_TOTAL,
            "language" => sample.language.clone(),
            "status" => sample.outcome.as_str()
        )
        .increment(1);

        metrics::histogram!(
            EXECUTION_DURATION_SECONDS,
            "language" => sample.language.clone(),
            "function_name" => sample.function_name.clone(),
            "status" => sample.outcome.as_str()
        )
        .record(sample.duration.as_secs_f64());
    }
}

/// Keeps samples in memory.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    samples: Mutex<Vec<ExecutionSample>>,
}

impl RecordingMetrics {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples recorded so far, oldest first.
    pub fn samples(&self) -> Vec<ExecutionSample> {
        self.samples
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl MetricsSink for RecordingMetrics {
    fn record(&self, sample: &ExecutionSample) {
        self.samples
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(sample.clone());
    }
}

/// Hands `sample` to `sink`, swallowing a panicking sink.
pub(crate) fn emit(sink: &dyn MetricsSink, sample: &ExecutionSample) {
    if catch_unwind(AssertUnwindSafe(|| sink.record(sample))).is_err() {
        warn!(
            language = %sample.language,
            name = %sample.function_name,
            "Metrics sink panicked; sample dropped"
        );
    }
}
