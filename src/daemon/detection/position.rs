use tracing::{info, warn};

use crate::daemon::source::LineSource;

/// Counts lines that were already in the log before this run. Lines up to this position are
/// history and must not be reported again after a restart.
///
/// A failed scan is not fatal. It's treated as an empty log, which at worst reports a few old
/// launches a second time.
pub async fn count_existing_lines<S: LineSource + ?Sized>(source: &mut S) -> u64 {
    match source.count_existing_lines().await {
        Ok(lines) => {
            info!("Found {lines} existing log lines");
            lines
        }
        Err(e) => {
            warn!("Couldn't count existing log lines, assuming none: {e:?}");
            0
        }
    }
}
