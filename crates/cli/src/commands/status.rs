//! `ridgeline status` — Show configuration status.

use ridgeline_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("Ridgeline Status");
    println!("================");
    println!("  Config dir:  {}", AppConfig::config_dir().display());
    println!("  Model:       {}", config.backend.model);
    println!("  API URL:     {}", config.backend.api_url);
    println!("  Temperature: {}", config.backend.temperature);
    println!("  Database:    {}", config.storage.database);
    println!("  Gateway:     {}:{}", config.gateway.host, config.gateway.port);
    println!("  Batch max:   {}", config.dispatch.max_batch);
    println!("  Chunk width: {}", config.dispatch.chunk_width);
    println!("  Org:         {} ({})", config.org.company_name, config.org.org_id);
    println!(
        "  API key:     {}",
        if config.has_api_key() { "set" } else { "missing" }
    );

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file — run `ridgeline onboard` first");
    }

    Ok(())
}
