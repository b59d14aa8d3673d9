use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::storage::history_storage::HistoryStore;

pub const WIDGET_FILE_NAME: &str = "widget.json";

/// Redraws whatever presents the history to the user. Refreshing twice in a row is harmless.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WidgetRefresher: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

/// Writes the most launched apps into a JSON file that a widget or a status bar can display.
pub struct SnapshotRefresher<H> {
    history: Arc<H>,
    path: PathBuf,
    size: usize,
}

impl<H: HistoryStore> SnapshotRefresher<H> {
    pub fn new(history: Arc<H>, dir: PathBuf, size: usize) -> Self {
        Self {
            history,
            path: dir.join(WIDGET_FILE_NAME),
            size,
        }
    }
}

#[async_trait]
impl<H: HistoryStore> WidgetRefresher for SnapshotRefresher<H> {
    async fn refresh(&self) -> Result<()> {
        let mut entries = self.history.get_history().await?;
        entries.truncate(self.size);

        // Written next to the target and renamed, so readers never see a half written file.
        let temporary = self.path.with_extension("json.tmp");
        tokio::fs::write(&temporary, serde_json::to_vec_pretty(&entries)?).await?;
        tokio::fs::rename(&temporary, &self.path).await?;
        debug!("Refreshed widget snapshot with {} apps", entries.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use crate::daemon::storage::{
        entities::AppHistoryEntity, history_storage::MockHistoryStore,
    };

    use super::*;

    #[tokio::test]
    async fn test_snapshot_keeps_top_entries() -> Result<()> {
        let moment = Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 0).unwrap();
        let mut history = MockHistoryStore::new();
        history.expect_get_history().times(2).returning(move || {
            Ok(vec![
                AppHistoryEntity::first_launch("com.a".into(), ".A".into(), moment),
                AppHistoryEntity::first_launch("com.b".into(), ".B".into(), moment),
                AppHistoryEntity::first_launch("com.c".into(), ".C".into(), moment),
            ])
        });

        let dir = tempdir()?;
        let refresher = SnapshotRefresher::new(Arc::new(history), dir.path().to_owned(), 2);
        refresher.refresh().await?;
        refresher.refresh().await?;

        let content = std::fs::read(dir.path().join(WIDGET_FILE_NAME))?;
        let entries: Vec<AppHistoryEntity> = serde_json::from_slice(&content)?;
        assert_eq!(entries.len(), 2);
        assert_eq!(&*entries[0].package_name, "com.a");
        Ok(())
    }
}
