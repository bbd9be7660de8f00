//! Sandbox backend for isolated snippet execution.
//!
//! The isolation backend is an injected capability: the engine only ever
//! talks to a [`SandboxBackend`], never to a process-wide client. Docker is
//! the production implementation, [`FakeBackend`] a scriptable stand-in.

mod docker;
mod error;
mod fake;
mod launcher;
mod network;
mod supervisor;

pub use docker::DockerBackend;
pub use error::BackendError;
pub use fake::{FakeBackend, FakeBehavior};
pub use launcher::{launch, SandboxHandle, SandboxState};
pub use network::IsolationStrategy;
pub use supervisor::{supervise, teardown, ContainerGuard, RunOutput};

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Path the workspace is bind-mounted at inside every sandbox.
pub const MOUNT_TARGET: &str = "/app";

/// Label attached to every container this crate creates.
pub const MANAGED_BY_LABEL: (&str, &str) = ("managed-by", "funcbox");

/// Resource ceilings applied to a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Memory ceiling in bytes. Swap is capped at the same value.
    pub memory_bytes: i64,
    /// CPU ceiling in billionths of a core.
    pub nano_cpus: i64,
    /// Maximum number of processes inside the sandbox.
    pub pids: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            memory_bytes: 128 * 1024 * 1024,
            nano_cpus: 1_000_000_000,
            pids: 64,
        }
    }
}

/// Everything a backend needs to create one sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Container name, unique per invocation.
    pub name: String,
    /// Image reference to instantiate.
    pub image: String,
    /// Command run inside the container.
    pub cmd: Vec<String>,
    /// Host directory mounted read-only at [`MOUNT_TARGET`].
    pub workspace: PathBuf,
    /// Resource ceilings.
    pub limits: Limits,
    /// Network isolation for this attempt.
    pub strategy: IsolationStrategy,
    /// Extra environment, `KEY=value`.
    pub env: Vec<String>,
    /// Container labels.
    pub labels: HashMap<String, String>,
}

/// Operations the engine needs from an isolation backend.
///
/// All calls are independent; implementations must be safe to share across
/// concurrently running invocations.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<(), BackendError>;

    /// Returns the backend's version string.
    async fn version(&self) -> Result<String, BackendError>;

    /// Returns whether the tagged image exists locally.
    async fn image_exists(&self, image: &str) -> Result<bool, BackendError>;

    /// Builds `image` from a tar-packed build context.
    async fn build_image(&self, image: &str, context: Bytes) -> Result<(), BackendError>;

    /// Creates a container and returns its id.
    async fn create(&self, spec: &ContainerSpec) -> Result<String, BackendError>;

    /// Starts a created container.
    async fn start(&self, id: &str) -> Result<(), BackendError>;

    /// Waits for the container to stop and returns its exit code.
    async fn wait(&self, id: &str) -> Result<i64, BackendError>;

    /// Returns the combined stdout/stderr captured so far.
    async fn logs(&self, id: &str) -> Result<String, BackendError>;

    /// Sends SIGKILL to the container.
    async fn kill(&self, id: &str) -> Result<(), BackendError>;

    /// Force-removes the container.
    async fn remove(&self, id: &str) -> Result<(), BackendError>;
}

/// Creates a unique container name for one invocation of `language`.
pub fn container_name(language: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("funcbox-{language}-{}", &id[..8])
}

/// Converts whole seconds into a `Duration`, treating 0 as 1.
pub(crate) fn budget(timeout_secs: u64) -> Duration {
    Duration::from_secs(timeout_secs.max(1))
}
