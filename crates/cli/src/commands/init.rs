//! `coralclaw init` — first-time setup.

use coralclaw_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();

    println!("CoralClaw — First-Time Setup");
    println!("============================\n");

    let created = AppConfig::write_defaults(&config_dir)?;
    if created.is_empty() {
        println!("  Everything already exists in {}", config_dir.display());
        println!("  Edit the files there or delete them and re-run init.\n");
        return Ok(());
    }

    for path in &created {
        println!("  ✅ Created {}", path.display());
    }

    println!("\n  Next steps:");
    println!("   1. Put your API key in {}", config_dir.join("env").display());
    println!("   2. Add MCP servers to {}", config_dir.join("mcp_servers.json").display());
    println!("   3. Run: coralclaw\n");

    Ok(())
}
