//! CLI command implementations.
//!
//! Each submodule implements one funcbox subcommand, keeping formatting and
//! decision logic in plain functions so it can be tested without Docker.

use anyhow::{Context, Result};
use std::sync::Arc;

use funcbox::{Config, DockerBackend, Engine};

pub mod doctor;
pub mod languages;
pub mod run;
pub mod warm;

/// Connects an engine to the local Docker daemon.
pub async fn connect(config: &Config) -> Result<Engine> {
    let backend = DockerBackend::connect().context("Failed to connect to Docker. Is Docker running?")?;
    Engine::connect(config, Arc::new(backend))
        .await
        .context("Cannot ping Docker daemon. Is Docker running?")
}
