pub mod history;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use history::{process_history_command, HistoryCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{args::ServeArgs, start_daemon},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, DAEMON_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "apptrack", version, long_about = None)]
#[command(about = "Tracks which apps you launch by watching the activity manager log", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Watch the log in the current console and record every app launch")]
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },
    #[command(about = "Display recorded app launches")]
    History {
        #[arg(
            long,
            help = "Application directory. By default tries to read from $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
        #[command(flatten)]
        command: HistoryCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    match args.commands {
        Commands::Serve { args } => {
            let app_dir = application_dir(args.dir.clone())?;
            enable_logging(DAEMON_PREFIX, &app_dir, args.log, args.log_console)?;
            start_daemon(app_dir, args.into()).await
        }
        Commands::History { dir, command } => {
            let app_dir = application_dir(dir)?;
            let logging_level = if args.log {
                Some(LevelFilter::TRACE)
            } else {
                None
            };
            enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;
            process_history_command(app_dir, command).await
        }
    }
}

fn application_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            Ok(dir)
        }
        None => create_application_default_path(),
    }
}
