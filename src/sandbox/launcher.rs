use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    container_name, BackendError, ContainerGuard, ContainerSpec, IsolationStrategy, Limits,
    SandboxBackend, MANAGED_BY_LABEL,
};
use crate::error::ExecutionError;
use crate::images::SandboxImage;
use crate::language::Runtime;
use crate::workspace::Workspace;

/// Lifecycle of one sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxState {
    /// A create/start attempt is in progress.
    Launching,
    /// Started and not yet finished.
    Running,
    /// Exited on its own.
    Completed,
    /// Killed after exceeding its timeout.
    TimedOut,
    /// No isolation strategy could start it.
    LaunchFailed,
}

/// A started sandbox, owned by a single invocation.
///
/// Dropping a handle without [`teardown`](super::teardown) still schedules
/// the container's removal.
pub struct SandboxHandle {
    guard: ContainerGuard,
    language: String,
    strategy: IsolationStrategy,
    state: SandboxState,
}

impl SandboxHandle {
    /// Backend container id.
    pub fn id(&self) -> &str {
        self.guard.id()
    }

    /// Language the sandbox runs.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// The isolation strategy that successfully started the sandbox.
    pub fn strategy(&self) -> IsolationStrategy {
        self.strategy
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SandboxState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SandboxState) {
        debug!(container = %self.id(), from = ?self.state, to = ?state, "Sandbox state change");
        self.state = state;
    }

    pub(crate) fn backend(&self) -> Arc<dyn SandboxBackend> {
        self.guard.backend()
    }

    pub(crate) fn into_guard(self) -> ContainerGuard {
        self.guard
    }
}

/// Starts a sandbox for `runtime` with `workspace` mounted read-only.
///
/// Tries network-disabled isolation first and host networking once as a
/// fallback. Containers from failed attempts are removed before moving on,
/// so an error leaves nothing allocated.
pub async fn launch(
    backend: &Arc<dyn SandboxBackend>,
    image: &SandboxImage,
    runtime: &Runtime,
    workspace: &Workspace,
    limits: Limits,
) -> Result<SandboxHandle, ExecutionError> {
    let language = runtime.language.as_str();
    let mut failures = Vec::with_capacity(IsolationStrategy::ORDER.len());

    for strategy in IsolationStrategy::ORDER {
        let spec = ContainerSpec {
            name: container_name(language),
            image: image.tag.clone(),
            cmd: runtime.command.clone(),
            workspace: workspace.path().to_path_buf(),
            limits,
            strategy,
            env: runtime.env.clone(),
            labels: HashMap::from([
                (MANAGED_BY_LABEL.0.to_string(), MANAGED_BY_LABEL.1.to_string()),
                ("funcbox.language".to_string(), language.to_string()),
            ]),
        };
        debug!(container = %spec.name, %strategy, state = ?SandboxState::Launching, "Launching sandbox");

        match try_start(backend, &spec).await {
            Ok(guard) => {
                info!(container = %guard.id(), language, %strategy, "Sandbox running");
                return Ok(SandboxHandle {
                    guard,
                    language: language.to_string(),
                    strategy,
                    state: SandboxState::Running,
                });
            }
            Err(e) => {
                warn!(container = %spec.name, language, %strategy, "Sandbox failed to start: {}", e);
                failures.push(e.to_string());
            }
        }
    }

    debug!(language, state = ?SandboxState::LaunchFailed, "All isolation strategies failed");
    let mut failures = failures.into_iter();
    Err(ExecutionError::Launch {
        language: language.to_string(),
        primary: failures.next().unwrap_or_default(),
        fallback: failures.next().unwrap_or_default(),
    })
}

async fn try_start(
    backend: &Arc<dyn SandboxBackend>,
    spec: &ContainerSpec,
) -> Result<ContainerGuard, BackendError> {
    let id = backend.create(spec).await?;
    let guard = ContainerGuard::new(Arc::clone(backend), id);

    if let Err(e) = backend.start(guard.id()).await {
        let id = guard.disarm();
        if let Err(cleanup) = backend.remove(&id).await {
            warn!(container = %id, "Cleanup warning: failed to remove unstarted container: {}", cleanup);
        }
        return Err(e);
    }
    Ok(guard)
}
