//! `ragline init`: print a default configuration.

use ragline_config::AppConfig;

pub fn run() {
    println!("# Ragline configuration. Save as {}", ragline_config::DEFAULT_CONFIG_FILE);
    println!("# API keys may also come from OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY.");
    println!();
    print!("{}", AppConfig::default_toml());
}
