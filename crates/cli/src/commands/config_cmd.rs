//! `coralclaw config` — show the effective configuration.

use coralclaw_config::AppConfig;

use crate::SessionArgs;

pub fn show(args: &SessionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(args)?;

    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    let mut shown = config.clone();
    for provider in shown.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("***".into());
        }
    }
    println!("{}", toml::to_string_pretty(&shown)?);

    match config.active_provider() {
        Ok(active) => {
            println!("# Active provider: {} ({})", active.name, active.base_url);
            println!("# Model:           {}", active.model);
            println!(
                "# API key:         {}",
                if active.api_key.is_empty() { "missing" } else { "set" }
            );
        }
        Err(e) => println!("# Active provider: {e}"),
    }

    match config.mcp_servers() {
        Ok(servers) if servers.is_empty() => println!("# MCP servers:     none"),
        Ok(servers) => {
            let names: Vec<_> = servers.keys().map(String::as_str).collect();
            println!("# MCP servers:     {}", names.join(", "));
        }
        Err(e) => println!("# MCP servers:     {e}"),
    }

    Ok(())
}
