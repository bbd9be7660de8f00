use anyhow::Result;
use colored::Colorize;

use funcbox::{Config, DockerBackend, LanguageRegistry, SandboxBackend};

/// What `funcbox doctor` found.
#[derive(Debug)]
pub struct Report {
    /// Daemon version, or why it could not be reached.
    pub version: Result<String, String>,
    /// `(language, image, present?)` for every registered language.
    pub images: Vec<(String, String, Result<bool, String>)>,
}

impl Report {
    pub fn healthy(&self) -> bool {
        self.version.is_ok()
    }
}

pub async fn run(config: &Config) -> Result<()> {
    let registry = LanguageRegistry::from_config(config)?;
    let report = match DockerBackend::connect() {
        Ok(backend) => collect(&backend, &registry).await,
        Err(e) => Report {
            version: Err(e.to_string()),
            images: Vec::new(),
        },
    };

    print_report(&report);
    if !report.healthy() {
        anyhow::bail!("Docker is not available");
    }
    Ok(())
}

/// Pings the backend and checks every registered language's image.
pub async fn collect(backend: &dyn SandboxBackend, registry: &LanguageRegistry) -> Report {
    if let Err(e) = backend.ping().await {
        return Report {
            version: Err(e.to_string()),
            images: Vec::new(),
        };
    }
    let version = backend.version().await.map_err(|e| e.to_string());

    let mut images = Vec::new();
    for runtime in registry.runtimes() {
        let present = backend
            .image_exists(&runtime.image)
            .await
            .map_err(|e| e.to_string());
        images.push((runtime.language.clone(), runtime.image.clone(), present));
    }
    Report { version, images }
}

fn print_report(report: &Report) {
    println!("\n{}", "━".repeat(50).dimmed());
    println!("{}", "   funcbox doctor".yellow().bold());
    println!("{}", "━".repeat(50).dimmed());

    match &report.version {
        Ok(version) => println!("  Docker:     {} {}", "available".green().bold(), version.cyan()),
        Err(e) => println!("  Docker:     {} ({})", "unavailable".red().bold(), e),
    }

    for (language, image, present) in &report.images {
        let status = match present {
            Ok(true) => "present".green(),
            Ok(false) => "missing (built on first use)".yellow(),
            Err(e) => format!("unknown: {e}").red(),
        };
        println!("  {:<11} {} {}", format!("{language}:"), image.cyan(), status);
    }

    println!("{}", "━".repeat(50).dimmed());
}
