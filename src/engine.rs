//! The execution engine: one call per snippet, one sandbox per call.
//!
//! `execute` walks `Requested -> ImageReady -> Staged -> Launching -> Running
//! -> {Completed | TimedOut | LaunchFailed} -> Cleaned` and always produces
//! an [`ExecutionResult`]. Calls share nothing but the image cache, so an
//! `Arc<Engine>` can serve any number of concurrent executions.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, LimitsConfig};
use crate::error::ExecutionError;
use crate::images::{ImageRegistry, SandboxImage};
use crate::language::LanguageRegistry;
use crate::result::ExecutionResult;
use crate::sandbox::{launch, supervise, teardown, Limits, RunOutput, SandboxBackend};
use crate::spec::FunctionSpec;
use crate::telemetry::{self, ExecutionSample, FacadeMetrics, MetricsSink};
use crate::workspace::Workspace;

/// Reasons an engine cannot be constructed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The isolation backend did not answer.
    #[error("Sandbox backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// The configuration could not be turned into limits or runtimes.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl EngineError {
    /// Returns true if the backend could not be reached.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }

    fn invalid_config(err: &anyhow::Error) -> Self {
        Self::InvalidConfig {
            message: format!("{err:#}"),
        }
    }
}

/// Runs function specs in sandboxes.
pub struct Engine {
    backend: Arc<dyn SandboxBackend>,
    languages: Arc<LanguageRegistry>,
    images: ImageRegistry,
    limits: Limits,
    timeouts: LimitsConfig,
    workspace_root: Option<PathBuf>,
    metrics: Arc<dyn MetricsSink>,
}

impl Engine {
    /// Builds an engine over `backend`, failing if the backend is unreachable.
    pub async fn connect(
        config: &Config,
        backend: Arc<dyn SandboxBackend>,
    ) -> Result<Self, EngineError> {
        let limits = config
            .limits
            .to_limits()
            .map_err(|e| EngineError::invalid_config(&e))?;
        let languages = Arc::new(
            LanguageRegistry::from_config(config).map_err(|e| EngineError::invalid_config(&e))?,
        );
        let workspace_root = config
            .workspace
            .root_dir()
            .map_err(|e| EngineError::invalid_config(&e))?;

        backend
            .ping()
            .await
            .map_err(|e| EngineError::BackendUnavailable {
                message: e.to_string(),
            })?;
        debug!(languages = ?languages.languages(), "Sandbox backend reachable");

        Ok(Self {
            images: ImageRegistry::new(Arc::clone(&backend), Arc::clone(&languages), &config.build),
            backend,
            languages,
            limits,
            timeouts: config.limits.clone(),
            workspace_root,
            metrics: Arc::new(FacadeMetrics),
        })
    }

    /// Replaces the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Ensures images for `languages` (all registered languages if empty).
    pub async fn warm(
        &self,
        languages: &[String],
    ) -> Vec<(String, Result<SandboxImage, ExecutionError>)> {
        let languages: Vec<String> = if languages.is_empty() {
            self.languages.languages().into_iter().map(str::to_string).collect()
        } else {
            languages.iter().map(|l| l.to_lowercase()).collect()
        };
        self.images.warm(&languages).await
    }

    /// Executes one snippet. Never fails: every error becomes a failure result.
    pub async fn execute(&self, spec: &FunctionSpec) -> ExecutionResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let language = spec.language();
        let name = spec.name();
        debug!(language, name, "Execution requested");

        let outcome = self.run(spec).await;
        let duration = clock.elapsed();
        let result = match outcome {
            Ok(run) => ExecutionResult::classify(run.exit_code, run.output, started_at, duration),
            Err(err) => {
                if let ExecutionError::Timeout { partial_output, .. } = &err {
                    warn!(language, name, "{}", err);
                    debug!(language, name, partial_output = %partial_output, "Output before kill");
                } else {
                    warn!(language, name, phase = %err.phase(), "Execution failed: {}", err);
                }
                ExecutionResult::from_error(&err, started_at, duration)
            }
        };

        info!(
            language,
            name,
            outcome = %result.outcome,
            duration_seconds = result.duration_seconds,
            "Execution finished"
        );
        telemetry::emit(
            self.metrics.as_ref(),
            &ExecutionSample {
                language: language.to_string(),
                function_name: name.to_string(),
                outcome: result.outcome,
                duration,
            },
        );
        result
    }

    async fn run(&self, spec: &FunctionSpec) -> Result<RunOutput, ExecutionError> {
        let language = spec.language();
        let name = spec.name();

        let runtime = self
            .languages
            .get(language)
            .ok_or_else(|| ExecutionError::unsupported_language(language))?;
        let image = self.images.ensure(language).await?;
        debug!(language, name, image = %image.tag, "Image ready");

        let workspace = Workspace::stage(self.workspace_root.as_deref(), runtime, spec)
            .map_err(|e| ExecutionError::staging(language, &e))?;
        debug!(language, name, path = %workspace.path().display(), "Workspace staged");

        let timeout_secs = self.timeouts.clamp_timeout(spec.timeout_secs());
        if timeout_secs != spec.timeout_secs() {
            warn!(
                language,
                name,
                requested = spec.timeout_secs(),
                timeout_secs,
                "Timeout clamped to configured maximum"
            );
        }

        let mut handle = match launch(&self.backend, &image, runtime, &workspace, self.limits).await
        {
            Ok(handle) => handle,
            Err(err) => {
                teardown(None, workspace).await;
                debug!(language, name, "Cleaned up after failed launch");
                return Err(err);
            }
        };

        let outcome = supervise(&mut handle, timeout_secs).await;
        debug!(language, name, container = %handle.id(), state = ?handle.state(), "Sandbox finished");
        teardown(Some(handle), workspace).await;
        debug!(language, name, "Cleaned up");
        outcome
    }
}
