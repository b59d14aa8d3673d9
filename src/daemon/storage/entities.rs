use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Usage of a single app as stored on disk.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct AppHistoryEntity {
    /// For example `com.android.browser`
    pub package_name: Arc<str>,
    /// Activity used for the latest launch, for example `com.android.browser.BrowserActivity`
    pub process_name: Arc<str>,
    pub launch_count: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_launched: DateTime<Utc>,
}

impl AppHistoryEntity {
    pub fn first_launch(package_name: Arc<str>, process_name: Arc<str>, moment: DateTime<Utc>) -> Self {
        Self {
            package_name,
            process_name,
            launch_count: 1,
            last_launched: moment,
        }
    }

    /// Registers one more launch. The activity is replaced, since apps can move their main
    /// activity between versions.
    pub fn record_launch(&mut self, process_name: Arc<str>, moment: DateTime<Utc>) {
        self.launch_count += 1;
        self.process_name = process_name;
        self.last_launched = self.last_launched.max(moment);
    }
}

/// Most launched first, ties broken by the most recent launch.
pub fn sort_by_usage(entities: &mut [AppHistoryEntity]) {
    entities.sort_by(|a, b| {
        b.launch_count
            .cmp(&a.launch_count)
            .then(b.last_launched.cmp(&a.last_launched))
            .then(a.package_name.cmp(&b.package_name))
    });
}
