use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use funcbox::{Config, ExecutionError, ExecutionResult, FunctionSpec, LanguageRegistry};

/// Arguments of `funcbox run`.
#[derive(Debug)]
pub struct RunArgs {
    pub language: String,
    pub code: Option<String>,
    pub file: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub name: Option<String>,
    pub json: bool,
}

/// Executes one snippet and prints its result. Returns whether it succeeded.
pub async fn run(config: &Config, args: RunArgs) -> Result<bool> {
    let code = read_source(args.code, args.file.as_ref())?;
    let timeout = resolve_timeout(config, args.timeout);
    let mut spec = FunctionSpec::new(&args.language, code, timeout)?;
    if let Some(name) = args.name {
        spec = spec.with_name(name);
    }

    // Unknown languages are reported without touching Docker
    let registry = LanguageRegistry::from_config(config)?;
    let result = if registry.get(spec.language()).is_some() {
        let engine = super::connect(config).await?;
        engine.execute(&spec).await
    } else {
        let err = ExecutionError::unsupported_language(spec.language());
        ExecutionResult::from_error(&err, chrono::Utc::now(), std::time::Duration::ZERO)
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize result")?
        );
    } else {
        print_result(&result);
    }
    Ok(result.is_success())
}

/// An explicit `--timeout` is passed through; the configured default is clamped.
fn resolve_timeout(config: &Config, requested: Option<u64>) -> u64 {
    requested.unwrap_or_else(|| config.limits.clamp_timeout(config.limits.default_timeout_secs))
}

fn read_source(code: Option<String>, file: Option<&PathBuf>) -> Result<String> {
    match (code, file) {
        (Some(code), _) => Ok(code),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file: {}", path.display())),
        (None, None) => anyhow::bail!("Either --code or --file is required"),
    }
}

fn print_result(result: &ExecutionResult) {
    if let Some(output) = &result.output {
        if !output.is_empty() {
            println!("{output}");
        }
        eprintln!(
            "{} {}",
            "✓".green(),
            format!("completed in {:.2}s", result.duration_seconds).dimmed()
        );
    } else {
        eprintln!(
            "{} {}",
            "✗".red(),
            result.error.as_deref().unwrap_or_default()
        );
        eprintln!(
            "  {}",
            format!("failed after {:.2}s", result.duration_seconds).dimmed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_source_prefers_inline_code() {
        let code = read_source(Some("print(1)".to_string()), None).unwrap();
        assert_eq!(code, "print(1)");
    }

    #[test]
    fn test_read_source_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snippet.py");
        std::fs::write(&path, "print(2)").unwrap();
        assert_eq!(read_source(None, Some(&path)).unwrap(), "print(2)");
    }

    #[test]
    fn test_read_source_missing_file() {
        let path = PathBuf::from("/nonexistent/snippet.py");
        let err = read_source(None, Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to read source file"));
    }

    #[test]
    fn test_resolve_timeout_clamps_configured_default() {
        let mut config = Config::default();
        config.limits.default_timeout_secs = 0;
        assert_eq!(resolve_timeout(&config, None), 1);

        config.limits.default_timeout_secs = 500;
        config.limits.max_timeout_secs = 60;
        assert_eq!(resolve_timeout(&config, None), 60);
    }

    #[test]
    fn test_resolve_timeout_keeps_explicit_value() {
        let config = Config::default();
        assert_eq!(resolve_timeout(&config, Some(0)), 0);
        assert_eq!(resolve_timeout(&config, Some(7)), 7);
    }

    #[test]
    fn test_read_source_requires_something() {
        assert!(read_source(None, None).is_err());
    }
}
