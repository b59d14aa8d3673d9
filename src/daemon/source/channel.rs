use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::LineSource;

/// Source fed through a channel. The stream ends once every sender is dropped.
///
/// The sender is expected to replay the pre-existing lines first, the same way a log reader
/// prints its buffer before following new output.
pub struct ChannelLineSource {
    existing_lines: u64,
    receiver: mpsc::Receiver<String>,
}

impl ChannelLineSource {
    pub fn new(existing_lines: u64, buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (sender, receiver) = mpsc::channel(buffer);
        (
            sender,
            Self {
                existing_lines,
                receiver,
            },
        )
    }
}

#[async_trait]
impl LineSource for ChannelLineSource {
    async fn count_existing_lines(&mut self) -> Result<u64> {
        Ok(self.existing_lines)
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.receiver.recv().await)
    }
}
