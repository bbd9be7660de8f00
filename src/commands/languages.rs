use anyhow::Result;
use colored::Colorize;

use funcbox::{Config, LanguageRegistry, Runtime};

pub fn run(config: &Config) -> Result<()> {
    let registry = LanguageRegistry::from_config(config)?;
    for runtime in registry.runtimes() {
        println!("{}", describe(runtime));
    }
    Ok(())
}

fn describe(runtime: &Runtime) -> String {
    format!(
        "{:<12} {} {} {}",
        runtime.language.bold(),
        runtime.image.cyan(),
        runtime.entry_file,
        shell_words::join(&runtime.command).dimmed()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_python() {
        colored::control::set_override(false);
        let line = describe(&Runtime::python());
        assert!(line.starts_with("python"));
        assert!(line.contains("funcbox-python:latest"));
        assert!(line.contains("function.py"));
        assert!(line.ends_with("python /app/function.py"));
    }
}
