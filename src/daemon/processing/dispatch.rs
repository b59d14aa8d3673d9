use std::sync::Arc;

use anyhow::Result;

use crate::daemon::{
    detection::LaunchSignal, storage::history_storage::HistoryStore, widget::WidgetRefresher,
};

use super::module::EventProcessor;

/// Bridges [ProcessingModule](super::ProcessingModule) with the history and the widgets.
/// Every recorded launch changes the ranking, so widgets are refreshed after it as well.
pub struct LaunchDispatcher<H, W> {
    history: Arc<H>,
    widgets: W,
}

impl<H: HistoryStore, W: WidgetRefresher> LaunchDispatcher<H, W> {
    pub fn new(history: Arc<H>, widgets: W) -> Self {
        Self { history, widgets }
    }
}

impl<H: HistoryStore, W: WidgetRefresher> EventProcessor for LaunchDispatcher<H, W> {
    async fn process_next(&mut self, message: LaunchSignal) -> Result<()> {
        if let LaunchSignal::Launch(event) = message {
            self.history
                .record_launch(&event.package_name, &event.process_name)
                .await?;
        }
        self.widgets.refresh().await
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}
