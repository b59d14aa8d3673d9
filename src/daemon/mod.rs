use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use args::DaemonConfig;
use detection::{
    engine::{LaunchDetector, StopReason},
    flags::FlagRules,
    LaunchSignal,
};
use processing::{dispatch::LaunchDispatcher, ProcessingModule};
use source::{command::CommandLineSource, command::LogCommand, file::FileLineSource, LineSource};
use storage::history_storage::{HistoryStorage, HistoryStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use widget::{SnapshotRefresher, WidgetRefresher};

use crate::utils::clock::{Clock, DefaultClock};

pub mod args;
pub mod detection;
pub mod processing;
pub mod shutdown;
pub mod source;
pub mod storage;
pub mod widget;

const FILE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Where the detector reads the log from.
#[derive(Debug, Clone)]
pub enum SourceConfig {
    Command(LogCommand),
    File {
        path: PathBuf,
        follow: bool,
        replay: bool,
    },
}

impl SourceConfig {
    /// A replayed file reports all of its lines on every run, so it must only be read once.
    fn is_replay(&self) -> bool {
        matches!(self, SourceConfig::File { replay: true, .. })
    }

    fn create_source(&self) -> Box<dyn LineSource> {
        match self {
            SourceConfig::Command(command) => Box::new(CommandLineSource::new(command.clone())),
            SourceConfig::File {
                path,
                follow,
                replay,
            } => {
                let source = FileLineSource::new(
                    path.clone(),
                    *follow,
                    FILE_POLL_INTERVAL,
                    Box::new(DefaultClock),
                );
                if *replay {
                    Box::new(ReplaySource(source))
                } else {
                    Box::new(source)
                }
            }
        }
    }
}

/// Pretends the log had no history, so every line of it is reported.
struct ReplaySource<S>(S);

#[async_trait::async_trait]
impl<S: LineSource> LineSource for ReplaySource<S> {
    async fn count_existing_lines(&mut self) -> Result<u64> {
        Ok(0)
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        self.0.next_line().await
    }
}

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf, config: DaemonConfig) -> Result<()> {
    let (sender, receiver) = mpsc::channel::<LaunchSignal>(10);

    let shutdown_token = CancellationToken::new();

    let history = Arc::new(HistoryStorage::new(dir.clone(), Box::new(DefaultClock))?);
    let widgets = SnapshotRefresher::new(history.clone(), dir, config.widget_size);
    let processor = create_processor(receiver, history, widgets);

    let supervisor = LaunchSupervisor {
        source: config.source.clone(),
        rules: config.rules,
        restart_delay: config.restart_delay,
        next: sender,
        shutdown: shutdown_token.clone(),
        clock: Box::new(DefaultClock),
    };

    let (_, supervision_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        async {
            let result = supervisor.run(|source| source.create_source()).await;
            shutdown_token.cancel();
            result
        },
        processor.run(),
    );

    if let Err(supervision_result) = &supervision_result {
        error!("Detection module got an error {:?}", supervision_result);
    }

    if let Err(processing_result) = &processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    supervision_result.and(processing_result)
}

fn create_processor<H: HistoryStore, W: WidgetRefresher>(
    receiver: mpsc::Receiver<LaunchSignal>,
    history: Arc<H>,
    widgets: W,
) -> ProcessingModule<LaunchDispatcher<H, W>> {
    ProcessingModule::new(receiver, LaunchDispatcher::new(history, widgets))
}

/// Host side of the detector. Every run starts from a fresh source and a fresh count of the
/// existing lines. A run that ended on its own is started again after `restart_delay`, unless
/// the source is a replayed file.
struct LaunchSupervisor {
    source: SourceConfig,
    rules: FlagRules,
    restart_delay: Option<Duration>,
    next: mpsc::Sender<LaunchSignal>,
    shutdown: CancellationToken,
    clock: Box<dyn Clock>,
}

impl LaunchSupervisor {
    /// Runs detectors until shutdown, or until a run ends while restarts are disabled. The
    /// signal sender is dropped on return, which lets the processing module finish.
    async fn run<F>(self, create_source: F) -> Result<()>
    where
        F: Fn(&SourceConfig) -> Box<dyn LineSource>,
    {
        let mut run = 0u64;
        loop {
            run += 1;
            info!("Starting detector run {run}");
            let detector = LaunchDetector::new(
                create_source(&self.source),
                self.next.clone(),
                self.shutdown.clone(),
                self.rules,
            );

            match detector.run().await {
                StopReason::Cancelled => return Ok(()),
                StopReason::StreamEnded => warn!("Log stream ended"),
                StopReason::Error(e) => error!("Detector failed: {e}"),
            }

            if self.source.is_replay() {
                info!("Replayed log was read once, stopping");
                return Ok(());
            }
            let Some(delay) = self.restart_delay else {
                info!("Restarts are disabled, stopping");
                return Ok(());
            };
            info!("Restarting detector in {delay:?}");
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = self.clock.sleep(delay) => (),
            }
        }
    }
}

#[cfg(test)]
mod daemon_tests {
    use std::{
        io::Write,
        path::Path,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use anyhow::{anyhow, Result};
    use tempfile::tempdir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            args::DaemonConfig,
            create_processor,
            detection::{flags::FlagRules, LaunchSignal},
            source::channel::ChannelLineSource,
            storage::{
                entities::AppHistoryEntity,
                history_storage::{HistoryStorage, HistoryStore, HISTORY_FILE_NAME},
            },
            widget::{SnapshotRefresher, WIDGET_FILE_NAME},
            LaunchSupervisor, SourceConfig,
        },
        utils::{clock::DefaultClock, logging::TEST_LOGGING},
    };

    use super::start_daemon;

    fn launch_line(component: &str) -> String {
        format!(
            "I/ActivityManager(  59): Starting activity: Intent {{ act=android.intent.action.MAIN \
             cat=[android.intent.category.LAUNCHER] flg=0x10200000 cmp={component} }}"
        )
    }

    /// Reads the history file without taking the file lock, the daemon in the same task might
    /// hold it. Half written entries are skipped.
    fn read_history(app_dir: &Path) -> Vec<AppHistoryEntity> {
        std::fs::read_to_string(app_dir.join(HISTORY_FILE_NAME))
            .unwrap_or_default()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Lines that were in the log before the start are ignored, new ones end up in the history.
    #[tokio::test]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let log_path = dir.path().join("activity.log");
        {
            let mut log = std::fs::File::create(&log_path)?;
            writeln!(log, "{}", launch_line("com.old/.Main"))?;
            writeln!(log, "I/ActivityManager(  59): Displayed activity com.old/.Main: 300 ms")?;
        }

        let config = DaemonConfig {
            source: SourceConfig::File {
                path: log_path.clone(),
                follow: true,
                replay: false,
            },
            restart_delay: None,
            ..Default::default()
        };
        let app_dir = dir.path().join("app");

        let check = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let mut log = std::fs::OpenOptions::new().append(true).open(&log_path)?;
            writeln!(log, "{}", launch_line("com.example.app/.MainActivity"))?;
            writeln!(log, "{}", launch_line("com.example.app/.MainActivity"))?;
            writeln!(log, "{}", launch_line("com.other/.Main"))?;

            let mut recorded = vec![];
            for _ in 0..100 {
                recorded = read_history(&app_dir);
                if recorded.iter().map(|v| v.launch_count).sum::<u64>() == 3 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            anyhow::Ok(recorded)
        };

        let recorded = tokio::select! {
            result = start_daemon(app_dir.clone(), config) => {
                result?;
                return Err(anyhow!("Daemon stopped before the log was processed"));
            }
            recorded = check => recorded?,
        };

        assert_eq!(recorded.len(), 2);
        assert_eq!(&*recorded[0].package_name, "com.example.app");
        assert_eq!(recorded[0].launch_count, 2);
        assert_eq!(&*recorded[1].package_name, "com.other");
        assert!(app_dir.join(WIDGET_FILE_NAME).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_daemon_exits_when_log_ends_without_restart() -> Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("activity.log");
        std::fs::write(&log_path, launch_line("com.example.app/.Main") + "\n")?;

        let config = DaemonConfig {
            source: SourceConfig::File {
                path: log_path,
                follow: false,
                replay: true,
            },
            restart_delay: None,
            ..Default::default()
        };
        let app_dir = dir.path().join("app");
        tokio::time::timeout(Duration::from_secs(5), start_daemon(app_dir.clone(), config))
            .await??;

        let history = HistoryStorage::new(app_dir, Box::new(DefaultClock))?;
        let recorded = history.get_history().await?;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].launch_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_supervisor_restarts_ended_runs() -> Result<()> {
        let (sender, mut receiver) = mpsc::channel::<LaunchSignal>(10);
        let shutdown = CancellationToken::new();
        let supervisor = LaunchSupervisor {
            source: SourceConfig::File {
                path: "unused".into(),
                follow: false,
                replay: false,
            },
            rules: FlagRules::default(),
            restart_delay: Some(Duration::from_millis(1)),
            next: sender,
            shutdown: shutdown.clone(),
            clock: Box::new(DefaultClock),
        };

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let cancel_after = shutdown.clone();
        let result = supervisor
            .run(move |_| {
                let run = counter.fetch_add(1, Ordering::SeqCst);
                let (lines, source) = ChannelLineSource::new(0, 2);
                if run < 2 {
                    lines
                        .try_send(launch_line("com.example.app/.Main"))
                        .expect("channel has room");
                } else {
                    cancel_after.cancel();
                }
                Box::new(source)
            })
            .await;

        result?;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        let mut launches = 0;
        while let Some(signal) = receiver.recv().await {
            assert!(matches!(signal, LaunchSignal::Launch(_)));
            launches += 1;
        }
        assert_eq!(launches, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_replayed_file_is_read_once() -> Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("activity.log");
        std::fs::write(&log_path, launch_line("com.example.app/.Main") + "\n")?;

        let config = DaemonConfig {
            source: SourceConfig::File {
                path: log_path,
                follow: false,
                replay: true,
            },
            restart_delay: Some(Duration::from_millis(10)),
            ..Default::default()
        };
        let app_dir = dir.path().join("app");
        tokio::time::timeout(Duration::from_secs(5), start_daemon(app_dir.clone(), config))
            .await??;

        let recorded = read_history(&app_dir);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].launch_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_processor_refreshes_widget_for_home() -> Result<()> {
        let dir = tempdir()?;
        let history = Arc::new(HistoryStorage::new(
            dir.path().to_owned(),
            Box::new(DefaultClock),
        )?);
        let widgets = SnapshotRefresher::new(history.clone(), dir.path().to_owned(), 5);
        let (sender, receiver) = mpsc::channel(4);
        sender.send(LaunchSignal::HomeResumed).await?;
        drop(sender);

        create_processor(receiver, history.clone(), widgets).run().await?;
        assert!(history.get_history().await?.is_empty());
        assert!(dir.path().join(WIDGET_FILE_NAME).exists());
        Ok(())
    }
}
