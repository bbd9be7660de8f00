use anyhow::Result;
use colored::Colorize;

use funcbox::{Config, ExecutionError, SandboxImage};

/// Ensures sandbox images exist, building the missing ones.
pub async fn run(config: &Config, languages: &[String]) -> Result<()> {
    let engine = super::connect(config).await?;
    let results = engine.warm(languages).await;

    for (language, result) in &results {
        println!("{}", describe(language, result));
    }

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        anyhow::bail!("{failed} image(s) could not be prepared");
    }
    Ok(())
}

fn describe(language: &str, result: &Result<SandboxImage, ExecutionError>) -> String {
    match result {
        Ok(image) => {
            let how = if image.built { "built" } else { "present" };
            format!(
                "  {} {:<12} {} {}",
                "✓".green(),
                language,
                image.tag.cyan(),
                format!("({how})").dimmed()
            )
        }
        Err(e) => format!("  {} {:<12} {}", "✗".red(), language, e),
    }
}
