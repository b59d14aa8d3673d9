use std::path::PathBuf;

use anyhow::Result;
use chrono::Local;

use crate::{
    daemon::storage::{
        entities::AppHistoryEntity,
        history_storage::{HistoryStorage, HistoryStore},
    },
    utils::{
        clock::DefaultClock,
        percentage::{count_percentage, Percentage},
    },
};

#[derive(Debug, clap::Args)]
pub struct HistoryCommand {
    #[arg(short, long, help = "Show at most this many apps")]
    limit: Option<usize>,
    #[arg(short = 'p', long = "percentage", help = "Filter apps to have at least specified share of launches", default_value_t = Percentage::new_opt(0.).unwrap())]
    min_percentage: Percentage,
    #[arg(long, help = "Show the activity used for the latest launch")]
    activities: bool,
}

/// Command to process `history` command. Prints apps ordered by how often they were launched.
pub async fn process_history_command(dir: PathBuf, command: HistoryCommand) -> Result<()> {
    let storage = HistoryStorage::new(dir, Box::new(DefaultClock))?;
    let history = storage.get_history().await?;

    for line in format_history(&history, &command) {
        println!("{line}");
    }
    Ok(())
}

fn format_history(history: &[AppHistoryEntity], command: &HistoryCommand) -> Vec<String> {
    let total = history.iter().map(|v| v.launch_count).sum::<u64>();

    history
        .iter()
        .map(|entry| (entry, count_percentage(entry.launch_count, total)))
        .filter(|(_, share)| *share >= command.min_percentage)
        .take(command.limit.unwrap_or(usize::MAX))
        .map(|(entry, share)| {
            let last_launched = entry.last_launched.with_timezone(&Local);
            let mut line = format!(
                "{}\t{}%\t{}\t{}",
                entry.launch_count,
                *share as i32,
                last_launched.format("%x %H:%M"),
                entry.package_name
            );
            if command.activities {
                line.push('\t');
                line.push_str(&entry.process_name);
            }
            line
        })
        .collect()
}
