use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use clap::Args;
use tracing::level_filters::LevelFilter;

use super::{
    detection::flags::{FlagRules, FLAG_ACTIVITY_NEW_TASK, FLAG_ACTIVITY_NO_USER_ACTION},
    source::command::{LogCommand, DEFAULT_DUMP_ARG, DEFAULT_LOG_ARGS, DEFAULT_LOG_COMMAND},
    SourceConfig,
};

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    pub dir: Option<PathBuf>,
    #[arg(long, help = "Read the log from a file instead of spawning the log reader")]
    pub file: Option<PathBuf>,
    #[arg(long, requires = "file", help = "Keep waiting for new lines at the end of the file")]
    pub follow: bool,
    #[arg(
        long,
        requires = "file",
        help = "Treat every line of the file as new instead of skipping the existing ones. The file is read once"
    )]
    pub replay: bool,
    #[arg(long, conflicts_with = "file", default_value = DEFAULT_LOG_COMMAND, help = "Log reader program")]
    pub command: String,
    #[arg(
        long = "arg",
        allow_hyphen_values = true,
        help = "Argument passed to the log reader. Can be repeated. Defaults to \"ActivityManager:I *:S\""
    )]
    pub command_args: Vec<String>,
    #[arg(long, default_value = DEFAULT_DUMP_ARG, allow_hyphen_values = true, help = "Argument appended to the reader arguments that makes it print existing lines and exit")]
    pub dump_arg: String,
    #[arg(long, default_value_t = 60, help = "Seconds to wait before reading the log again after it ended")]
    pub restart_delay: u64,
    #[arg(long, help = "Exit when the log ends instead of restarting")]
    pub no_restart: bool,
    #[arg(long, default_value_t = 10, help = "Number of apps written into the widget snapshot")]
    pub widget_size: usize,
    #[arg(long, value_parser = parse_hex_mask, default_value = "0x10000000", help = "Flags a user launch must have")]
    pub required_flags: u32,
    #[arg(long, value_parser = parse_hex_mask, default_value = "0x00040000", help = "Flags a user launch must not have")]
    pub forbidden_flags: u32,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}

/// Everything the daemon needs besides the application directory.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub source: SourceConfig,
    pub rules: FlagRules,
    /// [None] disables restarts.
    pub restart_delay: Option<Duration>,
    pub widget_size: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::Command(LogCommand::default()),
            rules: FlagRules {
                required: FLAG_ACTIVITY_NEW_TASK,
                forbidden: FLAG_ACTIVITY_NO_USER_ACTION,
            },
            restart_delay: Some(Duration::from_secs(60)),
            widget_size: 10,
        }
    }
}

impl From<ServeArgs> for DaemonConfig {
    fn from(args: ServeArgs) -> Self {
        let source = match args.file {
            Some(path) => SourceConfig::File {
                path,
                follow: args.follow,
                replay: args.replay,
            },
            None => SourceConfig::Command(LogCommand {
                program: args.command,
                args: if args.command_args.is_empty() {
                    DEFAULT_LOG_ARGS.iter().map(|v| v.to_string()).collect()
                } else {
                    args.command_args
                },
                dump_arg: args.dump_arg,
            }),
        };
        Self {
            source,
            rules: FlagRules {
                required: args.required_flags,
                forbidden: args.forbidden_flags,
            },
            restart_delay: (!args.no_restart).then(|| Duration::from_secs(args.restart_delay)),
            widget_size: args.widget_size,
        }
    }
}

fn parse_hex_mask(value: &str) -> Result<u32> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u32::from_str_radix(digits, 16).map_err(|e| anyhow!("Can't parse {value} as a hex mask: {e}"))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestArgs {
        #[command(flatten)]
        serve: ServeArgs,
    }

    #[test]
    fn test_default_args_match_default_config() {
        let args = TestArgs::parse_from(["apptrack"]);
        let config = DaemonConfig::from(args.serve);
        let default = DaemonConfig::default();
        assert_eq!(config.rules, default.rules);
        assert_eq!(config.restart_delay, default.restart_delay);
        assert_eq!(config.widget_size, default.widget_size);
        match config.source {
            SourceConfig::Command(command) => assert_eq!(command, LogCommand::default()),
            other => panic!("Unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_file_args() {
        let args = TestArgs::parse_from([
            "apptrack",
            "--file",
            "/tmp/log",
            "--follow",
            "--no-restart",
            "--forbidden-flags",
            "0x100",
        ]);
        let config = DaemonConfig::from(args.serve);
        assert_eq!(config.restart_delay, None);
        assert_eq!(config.rules.forbidden, 0x100);
        match config.source {
            SourceConfig::File {
                path,
                follow,
                replay,
            } => {
                assert_eq!(path, PathBuf::from("/tmp/log"));
                assert!(follow);
                assert!(!replay);
            }
            other => panic!("Unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_custom_command_args() {
        let args = TestArgs::parse_from([
            "apptrack",
            "--command",
            "adb",
            "--arg",
            "logcat",
            "--arg",
            "-v",
            "--arg",
            "brief",
        ]);
        let config = DaemonConfig::from(args.serve);
        match config.source {
            SourceConfig::Command(command) => {
                assert_eq!(command.program, "adb");
                assert_eq!(command.args, vec!["logcat", "-v", "brief"]);
            }
            other => panic!("Unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_parse_hex_mask() {
        assert_eq!(parse_hex_mask("0x10000000").unwrap(), 0x1000_0000);
        assert_eq!(parse_hex_mask("40000").unwrap(), 0x0004_0000);
        assert!(parse_hex_mask("0xzz").is_err());
    }
}
