//! `todoclaw gateway`: Start the HTTP chat endpoint.

use todoclaw_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    if !config.has_api_key() {
        return Err("No API key configured. Run `todoclaw doctor` for details.".into());
    }

    println!("TodoClaw Gateway");
    println!("   Listening:    {}:{}", config.gateway.host, config.gateway.port);
    println!("   Todo service: {}", config.upstream.base_url);
    println!("   Model:        {} ({})", config.default_model, config.default_provider);
    println!("   CORS origins: {}", config.gateway.allowed_origins.join(", "));

    todoclaw_gateway::start(config).await?;

    Ok(())
}
