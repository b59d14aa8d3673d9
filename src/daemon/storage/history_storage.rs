use std::{io::ErrorKind, path::PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use tokio::{fs::File, io::AsyncWriteExt, sync::Mutex};
use tracing::{debug, warn};

use crate::utils::clock::Clock;

use super::entities::{sort_by_usage, AppHistoryEntity};

pub const HISTORY_FILE_NAME: &str = "history";
const LOCK_FILE_NAME: &str = "history.lock";

/// Keyed launch counter.
///
/// Implementations own their synchronization: `record_launch` may be called concurrently by
/// several detectors and by readers of the history, and every increment must be kept.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Adds one launch of `package_name`, started through `process_name`.
    async fn record_launch(&self, package_name: &str, process_name: &str) -> Result<()>;

    /// Returns every known app, most used first.
    async fn get_history(&self) -> Result<Vec<AppHistoryEntity>>;
}

/// The main realization of [HistoryStore]. Entries are kept as JSON lines in a single file.
/// Writers inside the process are serialized by a mutex, other processes by a lock on a
/// separate lock file. The history file itself is only ever replaced as a whole.
pub struct HistoryStorage {
    path: PathBuf,
    lock_path: PathBuf,
    write_lock: Mutex<()>,
    clock: Box<dyn Clock>,
}

impl HistoryStorage {
    pub fn new(dir: PathBuf, clock: Box<dyn Clock>) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            path: dir.join(HISTORY_FILE_NAME),
            lock_path: dir.join(LOCK_FILE_NAME),
            write_lock: Mutex::new(()),
            clock,
        })
    }

    async fn open_lock_file(&self) -> Result<File> {
        Ok(File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .await?)
    }

    async fn read_entities(&self) -> Result<Vec<AppHistoryEntity>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(parse_entities(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e.into()),
        }
    }

    /// Must be called with the lock file held.
    async fn record_locked(&self, package_name: &str, process_name: &str) -> Result<()> {
        let mut entities = self.read_entities().await?;

        let now = self.clock.time();
        match entities
            .iter_mut()
            .find(|v| &*v.package_name == package_name)
        {
            Some(entity) => entity.record_launch(process_name.into(), now),
            None => entities.push(AppHistoryEntity::first_launch(
                package_name.into(),
                process_name.into(),
                now,
            )),
        }
        sort_by_usage(&mut entities);

        let mut buffer = Vec::<u8>::new();
        for entity in &entities {
            serde_json::to_writer(&mut buffer, entity)?;
            buffer.push(b'\n');
        }

        // A failed write leaves the previous history in place.
        let temporary = self.path.with_extension("tmp");
        let mut file = File::create(&temporary).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        file.sync_data().await?;
        drop(file);
        tokio::fs::rename(&temporary, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for HistoryStorage {
    async fn record_launch(&self, package_name: &str, process_name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let lock = self.open_lock_file().await?;
        // Semi-safe acquire-release for a file
        lock.lock_exclusive()?;
        let result = self.record_locked(package_name, process_name).await;
        lock.unlock_async().await?;
        debug!("Recorded launch of {package_name}");
        result
    }

    async fn get_history(&self) -> Result<Vec<AppHistoryEntity>> {
        let lock = self.open_lock_file().await?;
        lock.lock_shared()?;
        let read = self.read_entities().await;
        lock.unlock_async().await?;

        let mut entities = read?;
        sort_by_usage(&mut entities);
        Ok(entities)
    }
}

fn parse_entities(content: &str) -> Vec<AppHistoryEntity> {
    content
        .lines()
        .filter(|v| !v.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<AppHistoryEntity>(line) {
            Ok(v) => Some(v),
            Err(e) => {
                // ignore illegal values. Might happen after shutdowns
                warn!("Found illegal history entry {line}: {e}");
                None
            }
        })
        .collect()
}
