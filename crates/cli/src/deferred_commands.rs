//! `botlink deferred`: persisted deferred actions.

use {
    botlink_config::BotConfig,
    botlink_scheduler::{DeferredAction, DeferredStore, FileStore},
    chrono::{DateTime, Utc},
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum DeferredCommand {
    /// List pending records, soonest first.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Drop a record so it is not recovered on the next connection.
    Remove { id: String },
}

pub async fn handle_deferred(config: &BotConfig, action: DeferredCommand) -> anyhow::Result<()> {
    let store = FileStore::in_data_dir(&config.storage.data_dir);

    match action {
        DeferredCommand::List { json } => {
            let actions = store.load_all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&actions)?);
                return Ok(());
            }
            if actions.is_empty() {
                println!("No deferred actions in {}.", store.path().display());
                return Ok(());
            }
            let now = Utc::now();
            for action in &actions {
                println!("{}", describe(action, now));
            }
        },
        DeferredCommand::Remove { id } => {
            if store.remove(&id).await? {
                println!("Removed {id}.");
            } else {
                println!("No deferred action named {id}.");
            }
        },
    }

    Ok(())
}

fn describe(action: &DeferredAction, now: DateTime<Utc>) -> String {
    let deadline = i64::try_from(action.deadline_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis);
    let Some(deadline) = deadline else {
        return format!("{}  {}  (invalid deadline)", action.id, action.command.action);
    };
    let remaining = (deadline - now).num_seconds();
    let due = if remaining > 0 {
        format!("in {remaining}s")
    } else {
        "overdue".to_string()
    };
    format!(
        "{}  {}  {}  ({due})",
        action.id,
        action.command.action,
        deadline.format("%Y-%m-%d %H:%M:%S UTC")
    )
}
