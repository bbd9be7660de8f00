//! Run untrusted code snippets in disposable sandboxes.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use funcbox::{Config, DockerBackend, Engine, FunctionSpec};
//!
//! let engine = Engine::connect(&Config::default(), Arc::new(DockerBackend::connect()?)).await?;
//! let spec = FunctionSpec::new("python", "print(2 + 2)", 5)?;
//! let result = engine.execute(&spec).await;
//! assert_eq!(result.output.as_deref(), Some("4"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod images;
pub mod language;
pub mod result;
pub mod sandbox;
pub mod spec;
pub mod telemetry;
mod templates;
pub mod workspace;

pub use config::Config;
pub use engine::{Engine, EngineError};
pub use error::{ExecutionError, Phase, TIMEOUT_MESSAGE};
pub use images::SandboxImage;
pub use language::{LanguageRegistry, Runtime};
pub use result::{ExecutionResult, Outcome};
pub use sandbox::{DockerBackend, FakeBackend, IsolationStrategy, SandboxBackend};
pub use spec::{FunctionSpec, SpecError};
pub use telemetry::{MetricsSink, RecordingMetrics};
