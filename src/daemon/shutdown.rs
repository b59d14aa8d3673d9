use tokio::select;
use tokio_util::sync::CancellationToken;

/// Detects signals sent to the process. Returns early if the daemon is shutting down for another
/// reason, so that it doesn't wait for a signal that will never come.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
