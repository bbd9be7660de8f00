use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{budget, SandboxBackend, SandboxHandle, SandboxState};
use crate::error::{ExecutionError, Phase};
use crate::workspace::Workspace;

/// How long to spend collecting output from a killed sandbox.
const PARTIAL_LOGS_BUDGET: Duration = Duration::from_millis(250);

/// Most bytes of a killed sandbox's output kept for diagnostics.
const PARTIAL_OUTPUT_LIMIT: usize = 2048;

/// Output of a sandbox that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Combined stdout/stderr, trimmed.
    pub output: String,
    /// Exit status reported by the backend.
    pub exit_code: i64,
}

/// Waits for the sandbox within `timeout_secs`, killing it on expiry.
///
/// On timeout the error carries whatever output was captured before the kill.
/// Teardown is the caller's job; see [`teardown`].
pub async fn supervise(
    handle: &mut SandboxHandle,
    timeout_secs: u64,
) -> Result<RunOutput, ExecutionError> {
    let backend = handle.backend();
    let id = handle.id().to_string();
    let language = handle.language().to_string();

    match tokio::time::timeout(budget(timeout_secs), backend.wait(&id)).await {
        Ok(Ok(exit_code)) => {
            handle.set_state(SandboxState::Completed);
            let output = backend
                .logs(&id)
                .await
                .map_err(|e| ExecutionError::backend(&language, Phase::Run, e))?;
            debug!(container = %id, exit_code, "Sandbox exited");
            Ok(RunOutput {
                output: output.trim().to_string(),
                exit_code,
            })
        }
        Ok(Err(e)) => Err(ExecutionError::backend(&language, Phase::Run, e)),
        Err(_) => {
            handle.set_state(SandboxState::TimedOut);
            warn!(container = %id, language = %language, timeout_secs, "Execution timed out, killing sandbox");
            if let Err(e) = backend.kill(&id).await {
                warn!(container = %id, "Failed to kill sandbox: {}", e);
            }
            let partial_logs = tokio::time::timeout(PARTIAL_LOGS_BUDGET, backend.logs(&id)).await;
            let partial_output = match partial_logs {
                Ok(Ok(output)) => truncate_output(output.trim(), PARTIAL_OUTPUT_LIMIT),
                Ok(Err(e)) => {
                    debug!(container = %id, "No partial output: {}", e);
                    String::new()
                }
                Err(_) => {
                    debug!(container = %id, "Gave up collecting partial output");
                    String::new()
                }
            };
            Err(ExecutionError::Timeout {
                language,
                timeout_secs,
                partial_output,
            })
        }
    }
}

/// Keeps at most `limit` bytes of `output`, cut on a char boundary.
fn truncate_output(output: &str, limit: usize) -> String {
    if output.len() <= limit {
        return output.to_string();
    }
    let mut end = limit;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &output[..end])
}

/// Removes the sandbox (if any) and the workspace.
///
/// Failures are logged as cleanup warnings and never returned.
pub async fn teardown(handle: Option<SandboxHandle>, workspace: Workspace) {
    if let Some(handle) = handle {
        let backend = handle.backend();
        let id = handle.into_guard().disarm();
        match backend.remove(&id).await {
            Ok(()) => debug!(container = %id, "Removed sandbox"),
            Err(e) if e.is_no_such_container() => debug!(container = %id, "Sandbox already gone"),
            Err(e) => warn!(container = %id, "Cleanup warning: failed to remove sandbox: {}", e),
        }
    }

    let path = workspace.path().to_path_buf();
    match workspace.close() {
        Ok(()) => debug!(path = %path.display(), "Removed workspace"),
        Err(e) => warn!(path = %path.display(), "Cleanup warning: failed to remove workspace: {}", e),
    }
}

/// Removes a container when dropped unless disarmed.
///
/// Covers the paths explicit teardown can't: a failed launch step, a panic,
/// or the invocation's future being dropped mid-flight.
pub struct ContainerGuard {
    backend: Arc<dyn SandboxBackend>,
    id: Option<String>,
}

impl ContainerGuard {
    /// Takes ownership of container `id`.
    pub fn new(backend: Arc<dyn SandboxBackend>, id: String) -> Self {
        Self {
            backend,
            id: Some(id),
        }
    }

    /// The guarded container id, empty once disarmed.
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    pub(crate) fn backend(&self) -> Arc<dyn SandboxBackend> {
        Arc::clone(&self.backend)
    }

    /// Takes responsibility for the container away from the guard.
    pub fn disarm(mut self) -> String {
        self.id.take().unwrap_or_default()
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(container = %id, "Scheduling removal of abandoned sandbox");
                let backend = Arc::clone(&self.backend);
                runtime.spawn(async move {
                    if let Err(e) = backend.remove(&id).await {
                        warn!(container = %id, "Cleanup warning: failed to remove abandoned sandbox: {}", e);
                    }
                });
            }
            Err(_) => warn!(container = %id, "Cleanup warning: no runtime to remove abandoned sandbox"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::SandboxImage;
    use crate::language::Runtime;
    use crate::sandbox::{launch, FakeBackend, FakeBehavior, Limits};
    use crate::spec::FunctionSpec;
    use tempfile::TempDir;

    const IMAGE: &str = "funcbox-python:latest";

    async fn start(
        fake: &Arc<FakeBackend>,
        code: &str,
    ) -> (TempDir, Workspace, SandboxHandle) {
        let backend: Arc<dyn SandboxBackend> = fake.clone();
        let root = TempDir::new().unwrap();
        let spec = FunctionSpec::new("python", code, 5).unwrap();
        let ws = Workspace::stage(Some(root.path()), &Runtime::python(), &spec).unwrap();
        let image = SandboxImage {
            language: "python".to_string(),
            tag: IMAGE.to_string(),
            built: false,
        };
        let handle = launch(&backend, &image, &Runtime::python(), &ws, Limits::default())
            .await
            .unwrap();
        (root, ws, handle)
    }

    #[tokio::test]
    async fn test_completed_output_is_trimmed() {
        let fake = Arc::new(
            FakeBackend::new()
                .with_image(IMAGE)
                .on_code("print", FakeBehavior::success("\n  hi \n")),
        );
        let (_root, ws, mut handle) = start(&fake, "print('hi')").await;

        let run = supervise(&mut handle, 5).await.unwrap();
        assert_eq!(run.output, "hi");
        assert_eq!(run.exit_code, 0);
        assert_eq!(handle.state(), SandboxState::Completed);

        teardown(Some(handle), ws).await;
        assert_eq!(fake.live_containers(), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let fake = Arc::new(
            FakeBackend::new()
                .with_image(IMAGE)
                .on_code("raise", FakeBehavior::failure(1, "Exception: boom\n")),
        );
        let (_root, ws, mut handle) = start(&fake, "raise Exception('boom')").await;

        let run = supervise(&mut handle, 5).await.unwrap();
        assert_eq!(run.exit_code, 1);
        assert_eq!(run.output, "Exception: boom");
        teardown(Some(handle), ws).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_kills_sandbox() {
        let fake = Arc::new(FakeBackend::new().with_image(IMAGE).on_code(
            "while True",
            FakeBehavior::Hang {
                partial: "tick\n".to_string(),
            },
        ));
        let (_root, ws, mut handle) = start(&fake, "while True: pass").await;
        let id = handle.id().to_string();

        let err = supervise(&mut handle, 2).await.unwrap_err();
        let ExecutionError::Timeout {
            timeout_secs,
            partial_output,
            ..
        } = err
        else {
            panic!("expected timeout");
        };
        assert_eq!(timeout_secs, 2);
        assert_eq!(partial_output, "tick");
        assert_eq!(handle.state(), SandboxState::TimedOut);
        assert_eq!(fake.killed(), vec![id]);

        teardown(Some(handle), ws).await;
        assert_eq!(fake.live_containers(), 0);
    }

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output("short", 16), "short");
        assert_eq!(truncate_output("abcdef", 3), "abc...");
        // Never splits a multi-byte char
        assert_eq!(truncate_output("ééé", 3), "é...");
    }

    #[tokio::test]
    async fn test_teardown_removes_workspace_even_if_sandbox_removal_fails() {
        let fake = Arc::new(FakeBackend::new().with_image(IMAGE).fail_remove());
        let (_root, ws, mut handle) = start(&fake, "print('x')").await;
        let path = ws.path().to_path_buf();

        supervise(&mut handle, 5).await.unwrap();
        teardown(Some(handle), ws).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_disarmed_guard_does_nothing() {
        let fake = Arc::new(FakeBackend::new().with_image(IMAGE));
        let (_root, _ws, handle) = start(&fake, "print('x')").await;

        let id = handle.into_guard().disarm();
        tokio::task::yield_now().await;
        assert!(!id.is_empty());
        assert_eq!(fake.live_containers(), 1);
    }
}
