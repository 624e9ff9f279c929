pub mod chat;
pub mod config_cmd;
pub mod init;
pub mod slash;

use coralclaw_config::AppConfig;

use crate::SessionArgs;

/// Load the config file and layer command-line overrides on top.
pub fn load_config(args: &SessionArgs) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    apply_args(&mut config, args);
    Ok(config)
}

fn apply_args(config: &mut AppConfig, args: &SessionArgs) {
    if let Some(provider) = &args.provider {
        config.default_provider = provider.clone();
    }
    if let Some(model) = &args.model {
        config.set_model(model.clone());
    }
    if args.sandbox {
        config.sandbox.enabled = true;
    }
}
