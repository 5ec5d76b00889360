//! `botlink plugins`: dry-run the plugin loader.

use std::sync::Arc;

use {
    botlink_config::BotConfig,
    botlink_plugins::{LoadContext, PluginRegistry, PluginState, bundled},
};

pub fn handle_plugins(config: &BotConfig, json: bool) -> anyhow::Result<()> {
    let ctx = LoadContext::new(Arc::new(config.clone()));
    let registry = PluginRegistry::new(bundled::catalog(), ctx);
    let (handles, report) = registry.load_all();

    if json {
        let entries: Vec<serde_json::Value> = handles
            .iter()
            .map(|h| {
                let (state, error) = match &h.state {
                    PluginState::FailedToLoad { error } => ("failed", Some(error.as_str())),
                    PluginState::Disabled => ("disabled", None),
                    PluginState::Active | PluginState::Loaded => ("loaded", None),
                    PluginState::Discovered => ("discovered", None),
                };
                serde_json::json!({
                    "name": h.name,
                    "entrypoint": h.entrypoint,
                    "core": h.core,
                    "description": h.description,
                    "state": state,
                    "error": error,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Plugins dir: {}", registry.dir().display());
    println!("{report}");
    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}
