//! Per-language sandbox images, built on demand.
//!
//! Each language has one cache slot guarded by an async mutex. The first
//! caller checks for the image and builds it if needed; concurrent callers
//! queue on the slot and observe the cached outcome, so at most one build per
//! language is ever in flight. A build that fails after all attempts is
//! cached too: the language stays unusable for the life of the registry.

use bytes::Bytes;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tar::{Builder, Header};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use crate::config::BuildConfig;
use crate::error::ExecutionError;
use crate::language::{BuildContext, LanguageRegistry, Runtime};
use crate::sandbox::SandboxBackend;

/// A usable image for one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxImage {
    /// Language the image serves.
    pub language: String,
    /// Image reference passed to the backend.
    pub tag: String,
    /// True if this registry built the image, false if it already existed.
    pub built: bool,
}

#[derive(Default)]
enum Slot {
    #[default]
    Unknown,
    Ready(SandboxImage),
    Failed(ExecutionError),
}

/// Process-wide cache of sandbox images.
pub struct ImageRegistry {
    backend: Arc<dyn SandboxBackend>,
    languages: Arc<LanguageRegistry>,
    retries: u32,
    backoff: Duration,
    slots: Mutex<HashMap<String, Arc<AsyncMutex<Slot>>>>,
}

impl ImageRegistry {
    /// Creates an empty cache; nothing is built until first use.
    pub fn new(
        backend: Arc<dyn SandboxBackend>,
        languages: Arc<LanguageRegistry>,
        build: &BuildConfig,
    ) -> Self {
        Self {
            backend,
            languages,
            retries: build.retries.max(1),
            backoff: build.backoff(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the image for `language`, building it if absent.
    pub async fn ensure(&self, language: &str) -> Result<SandboxImage, ExecutionError> {
        let runtime = self
            .languages
            .get(language)
            .ok_or_else(|| ExecutionError::unsupported_language(language))?;

        let slot = self.slot(language);
        let mut guard = slot.lock().await;
        match &*guard {
            Slot::Ready(image) => return Ok(image.clone()),
            Slot::Failed(err) => return Err(err.clone()),
            Slot::Unknown => {}
        }

        let result = self.prepare(runtime).await;
        *guard = match &result {
            Ok(image) => Slot::Ready(image.clone()),
            Err(err) => Slot::Failed(err.clone()),
        };
        result
    }

    /// Ensures several languages concurrently, in the given order.
    pub async fn warm(
        &self,
        languages: &[String],
    ) -> Vec<(String, Result<SandboxImage, ExecutionError>)> {
        let results = join_all(languages.iter().map(|language| self.ensure(language))).await;
        languages.iter().cloned().zip(results).collect()
    }

    fn slot(&self, language: &str) -> Arc<AsyncMutex<Slot>> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(slots.entry(language.to_string()).or_default())
    }

    async fn prepare(&self, runtime: &Runtime) -> Result<SandboxImage, ExecutionError> {
        let language = runtime.language.as_str();
        let image = runtime.image.as_str();

        match self.backend.image_exists(image).await {
            Ok(true) => {
                info!(language, image, "Image already present");
                return Ok(SandboxImage {
                    language: language.to_string(),
                    tag: image.to_string(),
                    built: false,
                });
            }
            Ok(false) => {}
            Err(e) => warn!(language, image, "Could not check for image: {}", e),
        }

        let mut last_error = String::new();
        for attempt in 1..=self.retries {
            info!(language, image, "Building image, attempt {}/{}", attempt, self.retries);
            match self.build_once(runtime).await {
                Ok(()) => {
                    info!(language, image, "Successfully built image");
                    return Ok(SandboxImage {
                        language: language.to_string(),
                        tag: image.to_string(),
                        built: true,
                    });
                }
                Err(message) => {
                    error!(language, image, "Failed to build image: {}", message);
                    last_error = message;
                    if attempt < self.retries {
                        info!("Retrying in {} seconds...", self.backoff.as_secs());
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        Err(ExecutionError::ImageBuild {
            language: language.to_string(),
            image: image.to_string(),
            attempts: self.retries,
            message: last_error,
        })
    }

    async fn build_once(&self, runtime: &Runtime) -> Result<(), String> {
        let context = pack_context(runtime).map_err(|e| format!("Invalid build context: {e}"))?;
        self.backend
            .build_image(&runtime.image, context)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Packs a runtime's build context into a tarball.
///
/// Files listed in `context_defaults` are added when the context lacks them.
pub fn pack_context(runtime: &Runtime) -> io::Result<Bytes> {
    let mut tar_buf = Vec::new();
    {
        let mut tar = Builder::new(&mut tar_buf);
        let mut present = HashSet::new();

        match &runtime.context {
            BuildContext::Directory(dir) => {
                if !dir.join("Dockerfile").is_file() {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("No Dockerfile in {}", dir.display()),
                    ));
                }
                tar.append_dir_all(".", dir)?;
                for (name, _) in &runtime.context_defaults {
                    if dir.join(name).exists() {
                        present.insert(name.as_str());
                    }
                }
            }
            BuildContext::Embedded(dockerfile) => {
                append_file(&mut tar, "Dockerfile", dockerfile)?;
            }
        }

        for (name, content) in &runtime.context_defaults {
            if !present.contains(name.as_str()) {
                append_file(&mut tar, name, content)?;
            }
        }
        tar.finish()?;
    }
    Ok(Bytes::from(tar_buf))
}

fn append_file<W: io::Write>(tar: &mut Builder<W>, name: &str, content: &str) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    tar.append_data(&mut header, name, content.as_bytes())
}
