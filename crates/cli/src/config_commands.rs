use {anyhow::Result, botlink_config::BotConfig, clap::Subcommand, std::path::Path};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML, with secrets redacted.
    Show,
    /// Print which config file would be loaded.
    Path,
}

pub fn handle_config(
    config: &BotConfig,
    explicit: Option<&Path>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", render_redacted(config)?);
            Ok(())
        },
        ConfigAction::Path => {
            match explicit
                .map(Path::to_path_buf)
                .or_else(botlink_config::find_config_file)
            {
                Some(path) => println!("{}", path.display()),
                None => eprintln!("No config file found; using defaults."),
            }
            Ok(())
        },
    }
}

fn render_redacted(config: &BotConfig) -> Result<String> {
    let mut value = toml::Value::try_from(config)?;
    if let Some(token) = value
        .get_mut("gateway")
        .and_then(|g| g.get_mut("access_token"))
    {
        *token = toml::Value::String("<redacted>".into());
    }
    Ok(toml::to_string_pretty(&value)?)
}
