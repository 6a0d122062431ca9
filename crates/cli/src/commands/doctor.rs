//! `ragline doctor`: diagnose config, documents, and credentials.

use std::path::Path;

use ragline_config::AppConfig;
use ragline_engine::DocumentStore;

pub fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Ragline Doctor");
    println!("==============\n");

    let mut issues = 0;

    if config_path.exists() {
        println!("  ok   Config file found: {}", config_path.display());
    } else {
        println!(
            "  warn No config file at {}, using defaults (run `ragline init`)",
            config_path.display()
        );
        issues += 1;
    }

    let config = match AppConfig::load(config_path) {
        Ok(config) => {
            println!("  ok   Config valid, {} model(s), default '{}'", config.models.len(), config.default_model);
            config
        }
        Err(e) => {
            println!("  FAIL Config invalid: {e}");
            println!("\n  1 blocking issue found.");
            return Ok(());
        }
    };

    match DocumentStore::load(&config.documents_path) {
        Ok(store) => println!(
            "  ok   {} document(s) loaded from {}",
            store.len(),
            config.documents_path.display()
        ),
        Err(e) => {
            println!("  FAIL {e}");
            issues += 1;
        }
    }

    let dispatcher = ragline_providers::build_from_config(&config);
    let report = dispatcher.credential_report();
    issues += missing_credentials(&config, &report);
    for (backend, ready) in &report {
        let status = if *ready { "ok  " } else { "warn" };
        let detail = if *ready { "credentials present" } else { "no API key" };
        println!("  {status} Backend {backend:<10} {detail}");
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

/// Models whose backend cannot be dispatched to.
fn missing_credentials(config: &AppConfig, report: &[(String, bool)]) -> usize {
    config
        .models
        .iter()
        .filter(|model| {
            !report
                .iter()
                .any(|(backend, ready)| *backend == model.backend && *ready)
        })
        .inspect(|model| {
            println!(
                "  warn Model '{}' cannot run: backend '{}' is unavailable",
                model.id, model.backend
            );
        })
        .count()
}
