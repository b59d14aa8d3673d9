//! Abstracts where log lines come from. The detector only needs two things from a source: how
//! many lines already exist, and the next line of the live stream.

pub mod channel;
pub mod command;
pub mod file;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait LineSource: Send {
    /// One-shot count of the lines currently in the log. Must not consume the live stream.
    async fn count_existing_lines(&mut self) -> Result<u64>;

    /// Next line of the live stream, waiting for it if necessary. [None] means the stream has
    /// ended.
    async fn next_line(&mut self) -> Result<Option<String>>;
}

#[async_trait]
impl<T: LineSource + ?Sized> LineSource for Box<T> {
    async fn count_existing_lines(&mut self) -> Result<u64> {
        (**self).count_existing_lines().await
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        (**self).next_line().await
    }
}
