pub mod doctor;
pub mod init;
pub mod models;
pub mod query;
pub mod serve;

use std::path::Path;

use ragline_config::AppConfig;
use tracing::debug;

/// Load the config file, or defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load(path).map_err(|e| format!("Failed to load config: {e}"))?;
    debug!(
        path = %path.display(),
        models = config.models.len(),
        default_model = %config.default_model,
        "Config loaded"
    );
    Ok(config)
}
