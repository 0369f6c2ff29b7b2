//! `todoclaw onboard`: write a starter config file.

use std::path::{Path, PathBuf};
use todoclaw_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("TodoClaw First-Time Setup");
    println!("=========================\n");

    let config_path = write_default_config(&AppConfig::config_dir())?;

    println!("\nNext steps:");
    println!("  1. Set an API key: export OPENAI_API_KEY=sk-...");
    println!("     (or add api_key to {})", config_path.display());
    println!("  2. Point upstream.base_url at your todo service");
    println!("  3. Check the setup: todoclaw doctor");
    println!("  4. Start the gateway: todoclaw gateway");

    Ok(())
}

/// Create `config_dir` and a default `config.toml` in it, leaving an existing
/// file untouched.
fn write_default_config(config_dir: &Path) -> std::io::Result<PathBuf> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    }

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        println!("  Config file exists: {}", config_path.display());
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created {}", config_path.display());
    }
    Ok(config_path)
}
