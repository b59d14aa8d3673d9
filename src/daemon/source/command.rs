use std::process::Stdio;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, ChildStdout, Command},
};
use tracing::{debug, info};

use super::LineSource;

pub const DEFAULT_LOG_COMMAND: &str = "logcat";
/// Only activity manager messages of level info and above, everything else silenced.
pub const DEFAULT_LOG_ARGS: [&str; 2] = ["ActivityManager:I", "*:S"];
/// Makes the reader print the current buffer and exit instead of following it.
pub const DEFAULT_DUMP_ARG: &str = "-d";

/// Describes the log reader process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCommand {
    pub program: String,
    pub args: Vec<String>,
    pub dump_arg: String,
}

impl LogCommand {
    /// Arguments of the dump run. The dump argument goes last so it reaches the log reader
    /// even when `program` is a wrapper, as in `adb logcat ... -d`.
    fn dump_args(&self) -> impl Iterator<Item = &str> {
        self.args
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.dump_arg.as_str()))
    }
}

impl Default for LogCommand {
    fn default() -> Self {
        Self {
            program: DEFAULT_LOG_COMMAND.into(),
            args: DEFAULT_LOG_ARGS.iter().map(|v| v.to_string()).collect(),
            dump_arg: DEFAULT_DUMP_ARG.into(),
        }
    }
}

/// Reads lines from the stdout of a log reader process. The follow process is spawned lazily on
/// the first read and killed when the source is dropped.
pub struct CommandLineSource {
    command: LogCommand,
    child: Option<(Child, BufReader<ChildStdout>)>,
    buffer: Vec<u8>,
}

impl CommandLineSource {
    pub fn new(command: LogCommand) -> Self {
        Self {
            command,
            child: None,
            buffer: Vec::new(),
        }
    }

    fn spawn_follow(&self) -> Result<(Child, BufReader<ChildStdout>)> {
        info!("Spawning {} {:?}", self.command.program, self.command.args);
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Log reader has no stdout"))?;
        Ok((child, BufReader::new(stdout)))
    }
}

#[async_trait]
impl LineSource for CommandLineSource {
    async fn count_existing_lines(&mut self) -> Result<u64> {
        let output = Command::new(&self.command.program)
            .args(self.command.dump_args())
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() {
            return Err(anyhow!("Log dump exited with {}", output.status));
        }
        let stdout = output.stdout;
        let mut lines = stdout.iter().filter(|v| **v == b'\n').count() as u64;
        if stdout.last().is_some_and(|v| *v != b'\n') {
            lines += 1;
        }
        Ok(lines)
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        if self.child.is_none() {
            self.child = Some(self.spawn_follow()?);
        }
        let Some((_, reader)) = self.child.as_mut() else {
            return Ok(None);
        };

        self.buffer.clear();
        if reader.read_until(b'\n', &mut self.buffer).await? == 0 {
            if let Some((mut child, _)) = self.child.take() {
                let status = child.wait().await?;
                debug!("Log reader exited with {status}");
            }
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buffer);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use anyhow::Result;

    use super::*;

    fn shell(script: &str) -> LogCommand {
        LogCommand {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            dump_arg: "-d".into(),
        }
    }

    #[tokio::test]
    async fn test_command_source_reads_stdout() -> Result<()> {
        let mut source = CommandLineSource::new(shell("printf 'a\\nb\\n'"));
        assert_eq!(source.next_line().await?.as_deref(), Some("a"));
        assert_eq!(source.next_line().await?.as_deref(), Some("b"));
        assert_eq!(source.next_line().await?, None);
        Ok(())
    }

    #[test]
    fn test_dump_arg_goes_after_reader_args() {
        let command = LogCommand {
            program: "adb".into(),
            args: vec!["logcat".into(), "ActivityManager:I".into(), "*:S".into()],
            dump_arg: "-d".into(),
        };
        assert_eq!(
            command.dump_args().collect::<Vec<_>>(),
            vec!["logcat", "ActivityManager:I", "*:S", "-d"]
        );
    }

    #[tokio::test]
    async fn test_command_source_counts_dump() -> Result<()> {
        // `sh -c script -d` passes `-d` to the script as `$0`.
        let mut source = CommandLineSource::new(LogCommand {
            program: "sh".into(),
            args: vec!["-c".into(), "[ \"$0\" = -d ] && printf 'a\\nb\\nc'".into()],
            dump_arg: "-d".into(),
        });
        assert_eq!(source.count_existing_lines().await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_command_source_missing_program() {
        let mut source = CommandLineSource::new(LogCommand {
            program: "definitely-not-a-log-reader".into(),
            ..Default::default()
        });
        assert!(source.count_existing_lines().await.is_err());
        assert!(source.next_line().await.is_err());
    }
}
