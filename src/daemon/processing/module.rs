use anyhow::Result;

use crate::daemon::detection::LaunchSignal;

/// Represents an event processor. This should realistically be able to abstract over different
/// options: local history, remote server syncing.
pub trait EventProcessor {
    fn process_next(&mut self, message: LaunchSignal) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
