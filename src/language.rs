//! Language registry: which runtimes exist and how to run them.
//!
//! Two runtimes are built in (`python`, `javascript`). `[languages.<id>]`
//! tables in `funcbox.toml` override their fields or register new ones.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{expand_path, Config, LanguageConfig};
use crate::sandbox::MOUNT_TARGET;
use crate::templates;

/// Where an image's build context comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildContext {
    /// A directory on disk containing a Dockerfile.
    Directory(PathBuf),
    /// A Dockerfile compiled into the binary.
    Embedded(&'static str),
}

/// Everything needed to build an image for, stage, and run one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runtime {
    /// Language identifier, lowercase.
    pub language: String,
    /// Image tag sandboxes are created from.
    pub image: String,
    /// File the submitted code is written to.
    pub entry_file: String,
    /// Extra files staged next to the entry file, `(name, content)`.
    pub support_files: Vec<(String, String)>,
    /// Command run inside the sandbox.
    pub command: Vec<String>,
    /// Image build context.
    pub context: BuildContext,
    /// Files added to the build context when it lacks them.
    pub context_defaults: Vec<(String, String)>,
    /// Extra environment, `KEY=value`.
    pub env: Vec<String>,
}

impl Runtime {
    /// The python runtime: `function.py` run by `python`.
    pub fn python() -> Self {
        Self {
            language: "python".to_string(),
            image: "funcbox-python:latest".to_string(),
            entry_file: "function.py".to_string(),
            support_files: vec![(
                "requirements.txt".to_string(),
                "# Function dependencies\n".to_string(),
            )],
            command: entry_command("python", "function.py"),
            context: BuildContext::Embedded(templates::PYTHON_DOCKERFILE),
            context_defaults: vec![(
                "requirements.txt".to_string(),
                "# Auto-generated requirements file\n".to_string(),
            )],
            env: vec!["PYTHONDONTWRITEBYTECODE=1".to_string()],
        }
    }

    /// The javascript runtime: `function.js` run by `node`.
    pub fn javascript() -> Self {
        Self {
            language: "javascript".to_string(),
            image: "funcbox-javascript:latest".to_string(),
            entry_file: "function.js".to_string(),
            support_files: Vec::new(),
            command: entry_command("node", "function.js"),
            context: BuildContext::Embedded(templates::JAVASCRIPT_DOCKERFILE),
            context_defaults: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Apply a config table on top of this runtime.
    fn apply(&mut self, overrides: &LanguageConfig) -> Result<()> {
        if let Some(image) = &overrides.image {
            self.image.clone_from(image);
        }
        if let Some(entry_file) = &overrides.entry_file {
            validate_file_name(entry_file)?;
            self.entry_file.clone_from(entry_file);
            if overrides.command.is_none() {
                // Keep the interpreter, point it at the renamed entry file
                if let Some(program) = self.command.first().cloned() {
                    self.command = entry_command(&program, entry_file);
                }
            }
        }
        if let Some(command) = &overrides.command {
            self.command = parse_command(command)?;
        }
        if let Some(context) = &overrides.context {
            self.context = BuildContext::Directory(PathBuf::from(expand_path(context)?));
        }
        Ok(())
    }

    /// Build a runtime for a language with no built-in definition.
    fn custom(language: &str, config: &LanguageConfig) -> Result<Self> {
        let image = config
            .image
            .clone()
            .with_context(|| format!("Language '{language}' needs an image"))?;
        let entry_file = config
            .entry_file
            .clone()
            .with_context(|| format!("Language '{language}' needs an entry_file"))?;
        let command = config
            .command
            .as_deref()
            .with_context(|| format!("Language '{language}' needs a command"))?;
        let context = config
            .context
            .as_deref()
            .with_context(|| format!("Language '{language}' needs a build context"))?;
        validate_file_name(&entry_file)?;

        Ok(Self {
            language: language.to_string(),
            image,
            entry_file,
            support_files: Vec::new(),
            command: parse_command(command)?,
            context: BuildContext::Directory(PathBuf::from(expand_path(context)?)),
            context_defaults: Vec::new(),
            env: Vec::new(),
        })
    }
}

/// Maps language identifiers to runtimes.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    runtimes: BTreeMap<String, Runtime>,
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LanguageRegistry {
    /// Registry containing only the built-in runtimes.
    pub fn builtin() -> Self {
        let mut registry = Self {
            runtimes: BTreeMap::new(),
        };
        registry.register(Runtime::python());
        registry.register(Runtime::javascript());
        registry
    }

    /// Built-in runtimes with the config's `[languages]` tables applied.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::builtin();
        for (language, overrides) in &config.languages {
            let language = language.to_lowercase();
            let runtime = match registry.runtimes.get(&language) {
                Some(existing) => {
                    let mut runtime = existing.clone();
                    runtime.apply(overrides).with_context(|| {
                        format!("Invalid configuration for language '{language}'")
                    })?;
                    runtime
                }
                None => Runtime::custom(&language, overrides)?,
            };
            registry.register(runtime);
        }
        Ok(registry)
    }

    /// Adds or replaces a runtime.
    pub fn register(&mut self, runtime: Runtime) {
        self.runtimes.insert(runtime.language.clone(), runtime);
    }

    /// Looks up a runtime by lowercase language id.
    pub fn get(&self, language: &str) -> Option<&Runtime> {
        self.runtimes.get(language)
    }

    /// Registered language ids, sorted.
    pub fn languages(&self) -> Vec<&str> {
        self.runtimes.keys().map(String::as_str).collect()
    }

    /// All registered runtimes, ordered by language id.
    pub fn runtimes(&self) -> impl Iterator<Item = &Runtime> {
        self.runtimes.values()
    }
}

fn entry_command(program: &str, entry_file: &str) -> Vec<String> {
    vec![program.to_string(), format!("{MOUNT_TARGET}/{entry_file}")]
}

fn parse_command(command: &str) -> Result<Vec<String>> {
    let argv = shell_words::split(command)
        .with_context(|| format!("Invalid command: {command}"))?;
    if argv.is_empty() {
        anyhow::bail!("Command must not be empty");
    }
    Ok(argv)
}

/// Entry files live directly in the workspace root.
fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        anyhow::bail!("Invalid entry file name: '{name}'");
    }
    Ok(())
}
