//! `botlink switch`: operator view of the switch store.

use {
    botlink_config::BotConfig,
    botlink_switches::{Scope, SwitchState, SwitchStore},
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum SwitchAction {
    /// List modules that have a switch file.
    List {
        /// Only modules enabled in this group.
        #[arg(long)]
        group: Option<String>,
    },
    /// Show one module's switches.
    Show { module: String },
    /// Flip a module for a group, or for private chats when no group is given.
    Toggle {
        module: String,
        #[arg(long)]
        group: Option<String>,
    },
}

pub async fn handle_switch(config: &BotConfig, action: SwitchAction) -> anyhow::Result<()> {
    let store = SwitchStore::new(&config.storage.data_dir);

    match action {
        SwitchAction::List { group } => {
            let modules = match &group {
                Some(group) => store.enabled_modules(group).await?,
                None => store.modules().await?,
            };
            if modules.is_empty() {
                println!("No modules found.");
            }
            for module in modules {
                println!("{module}");
            }
        },
        SwitchAction::Show { module } => {
            let state = store.load(&module).await?;
            println!("{}", describe(&module, &state));
        },
        SwitchAction::Toggle { module, group } => {
            let scope = match &group {
                Some(group) => Scope::Group(group),
                None => Scope::Private,
            };
            let enabled = store.toggle(&module, scope).await?;
            let word = if enabled { "enabled" } else { "disabled" };
            println!("{module} {word} for {scope}");
        },
    }

    Ok(())
}

fn describe(module: &str, state: &SwitchState) -> String {
    let groups = state.enabled_groups();
    let groups = if groups.is_empty() {
        "none".to_string()
    } else {
        groups.join(", ")
    };
    let private = if state.private { "on" } else { "off" };
    format!("{module}\n  private: {private}\n  groups:  {groups}")
}
