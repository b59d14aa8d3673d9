use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

use super::detection::LaunchSignal;

pub mod dispatch;
pub mod module;

/// Receives launch signals from the detector and hands them to a processor one at a time, in
/// the order they were detected.
///
/// A failed signal is reported and skipped. It never stops the module, so one broken write
/// can't stall the detector behind a full channel.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<LaunchSignal>,
    processor: Processor,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<LaunchSignal>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    /// Runs until every sender is dropped.
    pub async fn run(mut self) -> Result<()> {
        while let Some(signal) = self.receiver.recv().await {
            debug!("Processing signal {:?}", signal);
            match self.processor.process_next(signal.clone()).await {
                Ok(_) => {
                    info!("Processed signal {:?}", signal)
                }
                Err(e) => {
                    error!("Error processing signal {:?}: {e:?}", signal)
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
