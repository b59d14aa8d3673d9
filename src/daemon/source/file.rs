use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};
use tracing::{debug, info};

use crate::utils::clock::Clock;

use super::LineSource;

/// Reads a log file from the start. With `follow` the source keeps polling for appended lines
/// instead of ending at EOF, like `tail -F`.
pub struct FileLineSource {
    path: PathBuf,
    follow: bool,
    poll_interval: Duration,
    clock: Box<dyn Clock>,
    reader: Option<BufReader<File>>,
    offset: u64,
    partial: Vec<u8>,
}

impl FileLineSource {
    pub fn new(path: PathBuf, follow: bool, poll_interval: Duration, clock: Box<dyn Clock>) -> Self {
        Self {
            path,
            follow,
            poll_interval,
            clock,
            reader: None,
            offset: 0,
            partial: Vec::new(),
        }
    }

    /// Returns false while a followed file doesn't exist yet.
    async fn ensure_open(&mut self) -> Result<bool> {
        if self.reader.is_none() {
            match File::open(&self.path).await {
                Ok(file) => {
                    debug!("Opened {:?}", self.path);
                    self.reader = Some(BufReader::new(file));
                    self.offset = 0;
                }
                Err(e) if e.kind() == ErrorKind::NotFound && self.follow => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }
}

/// Detects a file that was truncated or replaced under us. The next read starts over from the
/// beginning of the new content.
async fn was_truncated(path: &Path, offset: u64) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.len() < offset,
        Err(_) => false,
    }
}

#[async_trait]
impl LineSource for FileLineSource {
    async fn count_existing_lines(&mut self) -> Result<u64> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);
        let mut buffer = Vec::new();
        let mut lines = 0;
        while reader.read_until(b'\n', &mut buffer).await? > 0 {
            lines += 1;
            buffer.clear();
        }
        Ok(lines)
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if self.ensure_open().await? {
                let Some(reader) = self.reader.as_mut() else {
                    continue;
                };
                let read = reader.read_until(b'\n', &mut self.partial).await?;
                self.offset += read as u64;

                let complete = self.partial.last() == Some(&b'\n');
                if complete || (read == 0 && !self.follow && !self.partial.is_empty()) {
                    let line = String::from_utf8_lossy(&self.partial)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    self.partial.clear();
                    return Ok(Some(line));
                }
                if read > 0 {
                    continue;
                }
                if !self.follow {
                    return Ok(None);
                }
                if was_truncated(&self.path, self.offset).await {
                    info!("{:?} was truncated, reading from the start", self.path);
                    self.reader = None;
                    self.partial.clear();
                    continue;
                }
            }
            self.clock.sleep(self.poll_interval).await;
        }
    }
}
