use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, KillContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::BuildImageOptions;
use bollard::service::HostConfig;
use bollard::Docker;
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{BackendError, ContainerSpec, SandboxBackend, MOUNT_TARGET};

/// Docker-backed sandbox using the local daemon.
#[derive(Clone)]
pub struct DockerBackend {
    docker: Docker,
}

impl DockerBackend {
    /// Connects to the local Docker daemon using its default socket.
    ///
    /// Connecting does not contact the daemon; call [`SandboxBackend::ping`]
    /// to verify it is reachable.
    pub fn connect() -> Result<Self, BackendError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            BackendError::unavailable(format!("Failed to connect to Docker: {e}"))
        })?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl SandboxBackend for DockerBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        self.docker.ping().await.map_err(|e| {
            BackendError::unavailable(format!("Cannot ping Docker daemon: {e}"))
        })?;
        Ok(())
    }

    async fn version(&self) -> Result<String, BackendError> {
        let version = self
            .docker
            .version()
            .await
            .map_err(|e| BackendError::unavailable(e.to_string()))?;
        Ok(version.version.unwrap_or_else(|| "unknown".to_string()))
    }

    async fn image_exists(&self, image: &str) -> Result<bool, BackendError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(map_error(image, e)),
        }
    }

    async fn build_image(&self, image: &str, context: Bytes) -> Result<(), BackendError> {
        info!(image, "Building image");

        let build_options = BuildImageOptions {
            t: image.to_string(),
            networkmode: "host".to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(build_options, None, Some(context));

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(output) => {
                    if let Some(error) = output.error {
                        return Err(BackendError::build_failed(image, error));
                    }
                    if let Some(message) = output.error_detail.and_then(|d| d.message) {
                        return Err(BackendError::build_failed(image, message));
                    }
                    if let Some(text) = output.stream {
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            debug!(image, "{}", trimmed);
                        }
                    }
                }
                Err(e) => return Err(BackendError::build_failed(image, e.to_string())),
            }
        }

        info!(image, "Image built");
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, BackendError> {
        let config = build_container_config(spec)?;
        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| map_error(&spec.name, e))?;

        for warning in &response.warnings {
            warn!(container = %spec.name, "{}", warning);
        }
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<(), BackendError> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(|e| map_error(id, e))
    }

    async fn wait(&self, id: &str) -> Result<i64, BackendError> {
        let mut stream = self.docker.wait_container(
            id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(map_error(id, e)),
            None => Err(BackendError::container_failed(format!(
                "Wait stream for {id} ended without a status"
            ))),
        }
    }

    async fn logs(&self, id: &str) -> Result<String, BackendError> {
        let mut stream = self.docker.logs(
            id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: false,
                ..Default::default()
            }),
        );

        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message } | LogOutput::StdErr { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => return Err(map_error(id, e)),
            }
        }
        Ok(output)
    }

    async fn kill(&self, id: &str) -> Result<(), BackendError> {
        self.docker
            .kill_container(id, Some(KillContainerOptions { signal: "SIGKILL" }))
            .await
            .map_err(|e| map_error(id, e))
    }

    async fn remove(&self, id: &str) -> Result<(), BackendError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| map_error(id, e))
    }
}

/// Translates a container spec into the daemon's create payload.
fn build_container_config(spec: &ContainerSpec) -> Result<ContainerConfig<String>, BackendError> {
    let workspace = spec.workspace.to_str().ok_or_else(|| {
        BackendError::container_failed(format!(
            "Workspace path is not valid UTF-8: {}",
            spec.workspace.display()
        ))
    })?;

    let mut tmpfs = HashMap::new();
    tmpfs.insert("/tmp".to_string(), "rw,noexec,nosuid,size=16m".to_string());

    Ok(ContainerConfig {
        image: Some(spec.image.clone()),
        cmd: Some(spec.cmd.clone()),
        env: Some(spec.env.clone()),
        working_dir: Some(MOUNT_TARGET.to_string()),
        labels: Some(spec.labels.clone()),
        network_disabled: Some(spec.strategy.disables_network()),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        host_config: Some(HostConfig {
            binds: Some(vec![format!("{workspace}:{MOUNT_TARGET}:ro")]),
            memory: Some(spec.limits.memory_bytes),
            memory_swap: Some(spec.limits.memory_bytes),
            nano_cpus: Some(spec.limits.nano_cpus),
            pids_limit: Some(spec.limits.pids),
            network_mode: Some(spec.strategy.network_mode().to_string()),
            readonly_rootfs: Some(true),
            tmpfs: Some(tmpfs),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn map_error(subject: &str, err: DockerError) -> BackendError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404,
            message,
        } => {
            if message.contains("image") {
                BackendError::image_not_found(subject)
            } else {
                BackendError::no_such_container(subject)
            }
        }
        DockerError::IOError { err } => BackendError::unavailable(err.to_string()),
        other => BackendError::container_failed(format!("{subject}: {other}")),
    }
}
