//! `ragline serve`: start the HTTP gateway.

use std::path::Path;

use tracing::info;

pub async fn run(config_path: &Path, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        info!(port, "Port overridden from the command line");
        config.gateway.port = port;
    }

    println!("Ragline Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Documents: {}", config.documents_path.display());
    println!("   Default model: {}", config.default_model);

    ragline_gateway::start(config).await?;

    Ok(())
}
