use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::daemon::source::LineSource;

use super::{
    flags::FlagRules,
    matcher::{extract_component, extract_flags},
    position::count_existing_lines,
    LaunchSignal,
};

const STARTING_ACTIVITY_MARKER: &str = "Starting activity";
const MAIN_ACTION_MARKER: &str = "=android.intent.action.MAIN";
/// Launches with extras can't be attributed to an app icon, e.g. the dialer started by a call.
const HAS_EXTRAS_MARKER: &str = "(has extras)";
const HOME_CATEGORY_MARKER: &str = "android.intent.category.HOME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Stop was requested through the shutdown token.
    Cancelled,
    /// The log source disappeared. The host decides whether to start over.
    StreamEnded,
    /// Reading the stream or delivering a signal failed.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    Initializing,
    Running,
    Stopped(StopReason),
}

/// Decides what a single log line means. Pure, so it's safe to replay any line sequence.
pub fn classify_line(line: &str, rules: &FlagRules) -> Option<LaunchSignal> {
    if !line.contains(STARTING_ACTIVITY_MARKER)
        || !line.contains(MAIN_ACTION_MARKER)
        || line.contains(HAS_EXTRAS_MARKER)
    {
        return None;
    }
    debug!("Launch candidate {line}");

    if line.contains(HOME_CATEGORY_MARKER) {
        return Some(LaunchSignal::HomeResumed);
    }

    // Unknown flags are never treated as a user launch.
    let flags = extract_flags(line)?;
    if !rules.accepts(flags) {
        debug!("Rejected flags 0x{flags:08x}");
        return None;
    }

    let component = extract_component(line)?;
    Some(LaunchSignal::Launch(component.into()))
}

/// Number of lines consumed in the current run. Positions up to `existing` belong to the log
/// history from before the run started.
#[derive(Debug, Clone, Copy)]
struct StreamCursor {
    existing: u64,
    position: u64,
}

impl StreamCursor {
    fn new(existing: u64) -> Self {
        Self {
            existing,
            position: 0,
        }
    }

    /// Moves past the next line. Returns true if that line is new.
    fn advance(&mut self) -> bool {
        self.position += 1;
        self.position > self.existing
    }
}

#[derive(Debug, Default)]
struct RunStats {
    lines_read: u64,
    lines_skipped: u64,
    launches: u64,
    home_resumes: u64,
}

/// Control surface of a running [LaunchDetector].
#[derive(Clone)]
pub struct DetectorHandle {
    shutdown: CancellationToken,
    status: watch::Receiver<EngineStatus>,
}

impl DetectorHandle {
    /// The detector stops before processing the next line.
    pub fn request_stop(&self) {
        self.shutdown.cancel();
    }

    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// Waits until the detector stops and returns why.
    pub async fn stopped(&mut self) -> StopReason {
        let status = self
            .status
            .wait_for(|v| matches!(v, EngineStatus::Stopped(_)))
            .await;
        match status.as_deref() {
            Ok(EngineStatus::Stopped(reason)) => reason.clone(),
            // The detector was dropped without running to completion.
            _ => StopReason::Error("detector dropped".into()),
        }
    }
}

/// Reads a log stream and sends a [LaunchSignal] for every line that is a user launch or a
/// return to the home screen.
///
/// Lines are processed strictly in order. The detector only waits on the count of existing
/// lines, the next line read and a full downstream channel. The shutdown token interrupts each.
pub struct LaunchDetector<S> {
    source: S,
    next: mpsc::Sender<LaunchSignal>,
    shutdown: CancellationToken,
    rules: FlagRules,
    status: watch::Sender<EngineStatus>,
}

impl<S: LineSource> LaunchDetector<S> {
    pub fn new(
        source: S,
        next: mpsc::Sender<LaunchSignal>,
        shutdown: CancellationToken,
        rules: FlagRules,
    ) -> Self {
        let (status, _) = watch::channel(EngineStatus::Initializing);
        Self {
            source,
            next,
            shutdown,
            rules,
            status,
        }
    }

    pub fn handle(&self) -> DetectorHandle {
        DetectorHandle {
            shutdown: self.shutdown.clone(),
            status: self.status.subscribe(),
        }
    }

    /// Executes a single run of the detector. The source is dropped before the status turns
    /// to [EngineStatus::Stopped], so any reader process is gone by then.
    pub async fn run(self) -> StopReason {
        let Self {
            mut source,
            next,
            shutdown,
            rules,
            status,
        } = self;

        let mut stats = RunStats::default();
        let reason = 'run: {
            // The dump may hang, e.g. while the reader waits for a device.
            let existing = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break 'run StopReason::Cancelled,
                existing = count_existing_lines(&mut source) => existing,
            };
            let mut cursor = StreamCursor::new(existing);
            status.send_replace(EngineStatus::Running);
            info!("Launch detector running");

            loop {
                let line = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break StopReason::Cancelled,
                    line = source.next_line() => line,
                };
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break StopReason::StreamEnded,
                    Err(e) => break StopReason::Error(format!("{e:#}")),
                };
                if shutdown.is_cancelled() {
                    break StopReason::Cancelled;
                }

                stats.lines_read += 1;
                if !cursor.advance() {
                    stats.lines_skipped += 1;
                    continue;
                }

                let Some(signal) = classify_line(&line, &rules) else {
                    continue;
                };
                match &signal {
                    LaunchSignal::Launch(event) => {
                        stats.launches += 1;
                        info!(
                            "Detected launch of {}/{}",
                            event.package_name, event.process_name
                        );
                    }
                    LaunchSignal::HomeResumed => {
                        stats.home_resumes += 1;
                        info!("Detected home screen");
                    }
                }

                let span = info_span!("Sending launch signal", line = cursor.position);
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break StopReason::Cancelled,
                    sent = next.send(signal).instrument(span) => {
                        if sent.is_err() {
                            warn!("Launch signal receiver is gone");
                            break StopReason::Error("downstream closed".into());
                        }
                    }
                }
            }
        };

        drop(source);
        info!(
            "Launch detector stopped: {reason:?}, read {} lines, skipped {}, {} launches, {} home resumes",
            stats.lines_read, stats.lines_skipped, stats.launches, stats.home_resumes
        );
        status.send_replace(EngineStatus::Stopped(reason.clone()));
        reason
    }
}
