//! In-memory sandbox backend for tests and dry runs.
//!
//! Behaves like a tiny container daemon: images must exist (or be built)
//! before containers can be created, containers read their entry file from
//! the bind-mounted workspace, and hanging containers only stop when killed.
//! Every call is recorded so tests can assert on cleanup and fallback.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

use super::{BackendError, ContainerSpec, IsolationStrategy, SandboxBackend, MOUNT_TARGET};

/// Exit code reported for a container stopped by SIGKILL.
const KILLED_EXIT_CODE: i64 = 137;

/// What a fake container does once started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Prints its entry file's contents and exits 0.
    Echo,
    /// Prints `output` and exits with `code`.
    Exit {
        /// Exit code reported by `wait`.
        code: i64,
        /// Combined output reported by `logs`.
        output: String,
    },
    /// Prints `partial` and never exits on its own.
    Hang {
        /// Output available before the kill.
        partial: String,
    },
}

impl FakeBehavior {
    /// Shorthand for a successful run printing `output`.
    pub fn success(output: impl Into<String>) -> Self {
        Self::Exit {
            code: 0,
            output: output.into(),
        }
    }

    /// Shorthand for a failed run printing `output`.
    pub fn failure(code: i64, output: impl Into<String>) -> Self {
        Self::Exit {
            code,
            output: output.into(),
        }
    }
}

struct FakeContainer {
    behavior: FakeBehavior,
    entry: String,
    stop: Arc<Notify>,
}

#[derive(Default)]
struct FakeState {
    images: HashSet<String>,
    build_failures: HashMap<String, u32>,
    builds: HashMap<String, u32>,
    containers: HashMap<String, FakeContainer>,
    created: Vec<ContainerSpec>,
    killed: Vec<String>,
}

/// A scriptable [`SandboxBackend`] that never touches Docker.
pub struct FakeBackend {
    state: Mutex<FakeState>,
    rules: Vec<(String, FakeBehavior)>,
    default_behavior: FakeBehavior,
    failing_strategies: HashSet<IsolationStrategy>,
    reachable: bool,
    fail_remove: bool,
    build_delay: Duration,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    /// Creates a reachable backend with no images that echoes entry files.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            rules: Vec::new(),
            default_behavior: FakeBehavior::Echo,
            failing_strategies: HashSet::new(),
            reachable: true,
            fail_remove: false,
            build_delay: Duration::ZERO,
        }
    }

    /// Marks an image as already present.
    #[must_use]
    pub fn with_image(self, image: &str) -> Self {
        self.lock().images.insert(image.to_string());
        self
    }

    /// Containers whose entry file contains `pattern` behave as `behavior`.
    ///
    /// Rules are checked in insertion order; the first match wins.
    #[must_use]
    pub fn on_code(mut self, pattern: &str, behavior: FakeBehavior) -> Self {
        self.rules.push((pattern.to_string(), behavior));
        self
    }

    /// Behavior of containers that match no rule.
    #[must_use]
    pub fn with_default_behavior(mut self, behavior: FakeBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    /// Starting a container with `strategy` fails.
    #[must_use]
    pub fn fail_strategy(mut self, strategy: IsolationStrategy) -> Self {
        self.failing_strategies.insert(strategy);
        self
    }

    /// The next `times` builds of `image` fail.
    #[must_use]
    pub fn fail_builds(self, image: &str, times: u32) -> Self {
        self.lock().build_failures.insert(image.to_string(), times);
        self
    }

    /// Each build takes `delay` before completing.
    #[must_use]
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = delay;
        self
    }

    /// Every call reports the backend as unreachable.
    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Container removal always fails.
    #[must_use]
    pub fn fail_remove(mut self) -> Self {
        self.fail_remove = true;
        self
    }

    /// Number of builds attempted for `image`.
    pub fn build_count(&self, image: &str) -> u32 {
        self.lock().builds.get(image).copied().unwrap_or(0)
    }

    /// Specs of every container creation attempt, in order.
    pub fn created(&self) -> Vec<ContainerSpec> {
        self.lock().created.clone()
    }

    /// Number of containers created and not yet removed.
    pub fn live_containers(&self) -> usize {
        self.lock().containers.len()
    }

    /// Ids of containers that received a kill.
    pub fn killed(&self) -> Vec<String> {
        self.lock().killed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        // A panicking test thread must not wedge the others
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_reachable(&self) -> Result<(), BackendError> {
        if self.reachable {
            Ok(())
        } else {
            Err(BackendError::unavailable("fake backend is unreachable"))
        }
    }

    fn resolve_behavior(&self, entry: &str) -> FakeBehavior {
        self.rules
            .iter()
            .find(|(pattern, _)| entry.contains(pattern.as_str()))
            .map_or_else(|| self.default_behavior.clone(), |(_, b)| b.clone())
    }
}

/// Finds the entry file a container command points at inside the mount.
fn entry_path(spec: &ContainerSpec) -> Option<PathBuf> {
    let prefix = format!("{MOUNT_TARGET}/");
    spec.cmd
        .iter()
        .rev()
        .find_map(|arg| arg.strip_prefix(&prefix))
        .map(|rel| spec.workspace.join(rel))
}

fn read_entry(path: Option<&Path>) -> String {
    path.and_then(|p| std::fs::read_to_string(p).ok())
        .unwrap_or_default()
}

#[async_trait]
impl SandboxBackend for FakeBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        self.check_reachable()
    }

    async fn version(&self) -> Result<String, BackendError> {
        self.check_reachable()?;
        Ok("fake".to_string())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, BackendError> {
        self.check_reachable()?;
        Ok(self.lock().images.contains(image))
    }

    async fn build_image(&self, image: &str, context: Bytes) -> Result<(), BackendError> {
        self.check_reachable()?;
        *self.lock().builds.entry(image.to_string()).or_default() += 1;

        if !self.build_delay.is_zero() {
            tokio::time::sleep(self.build_delay).await;
        }

        let mut state = self.lock();
        if let Some(remaining) = state.build_failures.get_mut(image) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::build_failed(image, "scripted build failure"));
            }
        }
        if context.is_empty() {
            return Err(BackendError::build_failed(image, "empty build context"));
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, BackendError> {
        self.check_reachable()?;
        let entry = read_entry(entry_path(spec).as_deref());
        let behavior = self.resolve_behavior(&entry);

        let mut state = self.lock();
        state.created.push(spec.clone());
        if !state.images.contains(&spec.image) {
            return Err(BackendError::image_not_found(&spec.image));
        }
        if !spec.workspace.is_dir() {
            return Err(BackendError::container_failed(format!(
                "bind source path does not exist: {}",
                spec.workspace.display()
            )));
        }

        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                behavior,
                entry,
                stop: Arc::new(Notify::new()),
            },
        );
        Ok(spec.name.clone())
    }

    async fn start(&self, id: &str) -> Result<(), BackendError> {
        self.check_reachable()?;
        let state = self.lock();
        if !state.containers.contains_key(id) {
            return Err(BackendError::no_such_container(id));
        }
        let strategy = state
            .created
            .iter()
            .rev()
            .find(|spec| spec.name == id)
            .map(|spec| spec.strategy);
        match strategy {
            Some(s) if self.failing_strategies.contains(&s) => Err(
                BackendError::container_failed(format!("network mode {} is not supported", s.network_mode())),
            ),
            _ => Ok(()),
        }
    }

    async fn wait(&self, id: &str) -> Result<i64, BackendError> {
        self.check_reachable()?;
        let (behavior, stop) = {
            let state = self.lock();
            let container = state
                .containers
                .get(id)
                .ok_or_else(|| BackendError::no_such_container(id))?;
            (container.behavior.clone(), Arc::clone(&container.stop))
        };

        match behavior {
            FakeBehavior::Echo => Ok(0),
            FakeBehavior::Exit { code, .. } => Ok(code),
            FakeBehavior::Hang { .. } => {
                stop.notified().await;
                Ok(KILLED_EXIT_CODE)
            }
        }
    }

    async fn logs(&self, id: &str) -> Result<String, BackendError> {
        self.check_reachable()?;
        let state = self.lock();
        let container = state
            .containers
            .get(id)
            .ok_or_else(|| BackendError::no_such_container(id))?;
        Ok(match &container.behavior {
            FakeBehavior::Echo => container.entry.clone(),
            FakeBehavior::Exit { output, .. } => output.clone(),
            FakeBehavior::Hang { partial } => partial.clone(),
        })
    }

    async fn kill(&self, id: &str) -> Result<(), BackendError> {
        self.check_reachable()?;
        let mut state = self.lock();
        let stop = state
            .containers
            .get(id)
            .map(|c| Arc::clone(&c.stop))
            .ok_or_else(|| BackendError::no_such_container(id))?;
        state.killed.push(id.to_string());
        stop.notify_one();
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), BackendError> {
        self.check_reachable()?;
        if self.fail_remove {
            return Err(BackendError::container_failed(format!(
                "removal of {id} is already in progress"
            )));
        }
        let mut state = self.lock();
        match state.containers.remove(id) {
            Some(container) => {
                // Removal is forced, so a hanging container stops too
                container.stop.notify_one();
                Ok(())
            }
            None => Err(BackendError::no_such_container(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{container_name, Limits};
    use tempfile::tempdir;

    fn spec_for(dir: &Path, strategy: IsolationStrategy) -> ContainerSpec {
        ContainerSpec {
            name: container_name("python"),
            image: "img:latest".to_string(),
            cmd: vec!["python".to_string(), "/app/function.py".to_string()],
            workspace: dir.to_path_buf(),
            limits: Limits::default(),
            strategy,
            env: Vec::new(),
            labels: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_echo_reads_entry_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("function.py"), "print('hi')").unwrap();
        let backend = FakeBackend::new().with_image("img:latest");

        let id = backend
            .create(&spec_for(dir.path(), IsolationStrategy::NetworkDisabled))
            .await
            .unwrap();
        backend.start(&id).await.unwrap();
        assert_eq!(backend.wait(&id).await.unwrap(), 0);
        assert_eq!(backend.logs(&id).await.unwrap(), "print('hi')");
        backend.remove(&id).await.unwrap();
        assert_eq!(backend.live_containers(), 0);
    }

    #[tokio::test]
    async fn test_create_requires_image() {
        let dir = tempdir().unwrap();
        let backend = FakeBackend::new();
        let result = backend
            .create(&spec_for(dir.path(), IsolationStrategy::NetworkDisabled))
            .await;
        assert!(matches!(result, Err(BackendError::ImageNotFound { .. })));
        assert_eq!(backend.live_containers(), 0);
    }

    #[tokio::test]
    async fn test_hang_stops_on_kill() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("function.py"), "while True: pass").unwrap();
        let backend = Arc::new(
            FakeBackend::new()
                .with_image("img:latest")
                .on_code("while True", FakeBehavior::Hang { partial: String::new() }),
        );
        let id = backend
            .create(&spec_for(dir.path(), IsolationStrategy::NetworkDisabled))
            .await
            .unwrap();

        let waiter = {
            let backend = Arc::clone(&backend);
            let id = id.clone();
            tokio::spawn(async move { backend.wait(&id).await })
        };
        backend.kill(&id).await.unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), KILLED_EXIT_CODE);
        assert_eq!(backend.killed(), vec![id]);
    }

    #[tokio::test]
    async fn test_failing_strategy_fails_start() {
        let dir = tempdir().unwrap();
        let backend = FakeBackend::new()
            .with_image("img:latest")
            .fail_strategy(IsolationStrategy::NetworkDisabled);
        let id = backend
            .create(&spec_for(dir.path(), IsolationStrategy::NetworkDisabled))
            .await
            .unwrap();
        assert!(backend.start(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_build_failures() {
        let backend = FakeBackend::new().fail_builds("img:latest", 1);
        let context = Bytes::from_static(b"context");
        assert!(backend
            .build_image("img:latest", context.clone())
            .await
            .is_err());
        backend.build_image("img:latest", context).await.unwrap();
        assert_eq!(backend.build_count("img:latest"), 2);
        assert!(backend.image_exists("img:latest").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable() {
        let backend = FakeBackend::new().unreachable();
        assert!(backend.ping().await.unwrap_err().is_unavailable());
    }

    #[test]
    fn test_fake_backend_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FakeBackend>();
    }
}
