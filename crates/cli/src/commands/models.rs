//! `ragline models`: list the model registry.

use std::path::Path;

use ragline_config::ModelRegistry;

pub fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let registry = config.registry()?;
    print!("{}", render(&registry));
    Ok(())
}

fn render(registry: &ModelRegistry) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "  {:<2}{:<28}{:<12}{:>10}  {}\n",
        "", "ID", "BACKEND", "CONTEXT", "NAME"
    ));
    for model in registry.list() {
        let marker = if model.id == registry.default_id() { "*" } else { "" };
        out.push_str(&format!(
            "  {:<2}{:<28}{:<12}{:>10}  {}\n",
            marker,
            model.id,
            model.backend,
            model.context_window,
            model.display_name()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::GenerationConfig;

    #[test]
    fn marks_default_model() {
        let registry = ModelRegistry::new(
            vec![
                GenerationConfig::new("a", "ollama", 8192),
                GenerationConfig::new("b", "gemini", 1_048_576),
            ],
            "b",
        )
        .unwrap();

        let table = render(&registry);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].trim_start().starts_with('a'));
        assert!(lines[2].trim_start().starts_with("* b"));
        assert!(lines[2].contains("1048576"));
    }
}
