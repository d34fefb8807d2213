use super::{ButtonInput, EdgeDetector};
use crate::error::{ButtonError, PisnapError, Result};
use crate::events::{ButtonEventSender, ButtonId};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Input-polling task: samples both lines on a fixed period and forwards
/// press edges into the event channel
pub struct ButtonPoller {
    input: Box<dyn ButtonInput>,
    sender: ButtonEventSender,
    interval: Duration,
    detector: EdgeDetector,
}

impl ButtonPoller {
    pub fn new(input: Box<dyn ButtonInput>, sender: ButtonEventSender, interval: Duration) -> Self {
        Self {
            input,
            sender,
            interval,
            detector: EdgeDetector::new(),
        }
    }

    /// Poll until cancelled. Read errors are tolerated until too many occur in a row.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!("Button poller started ({:?} period)", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_errors = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            for id in ButtonId::ALL {
                let level = match self.input.poll_button(id) {
                    Ok(level) => {
                        consecutive_errors = 0;
                        level
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            error!("Too many consecutive button read errors: {}", e);
                            return Err(ButtonError::DeviceRead {
                                details: format!(
                                    "{} consecutive failures, last: {}",
                                    consecutive_errors, e
                                ),
                            }
                            .into());
                        }
                        warn!(
                            "Error reading button {:?} (attempt {}): {}",
                            id, consecutive_errors, e
                        );
                        continue;
                    }
                };

                if let Some(event) = self.detector.update(id, level) {
                    debug!("Button {} pressed", event);
                    tokio::select! {
                        sent = self.sender.send(event) => sent.map_err(PisnapError::from)?,
                        _ = cancel.cancelled() => {
                            debug!("Dropping button {} queued during shutdown", event);
                            break;
                        }
                    }
                }
            }
        }

        info!("Button poller stopped");
        Ok(())
    }
}
