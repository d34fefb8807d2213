use super::{PisnapOrchestrator, ShutdownReason};
use crate::error::Result;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

impl PisnapOrchestrator {
    /// Block until shutdown is requested, then stop everything
    pub async fn run(&mut self) -> Result<i32> {
        info!("PiSnap is running");

        let running = self.status.running().clone();
        let (reason_sender, mut reason_receiver) = oneshot::channel();
        tokio::spawn(listen_for_signals(reason_sender, running.clone()));

        running.cancelled().await;
        let reason = reason_receiver
            .try_recv()
            .unwrap_or(ShutdownReason::Requested);
        info!("Shutdown initiated: {:?}", reason);

        let exit_code = self.shutdown().await?;
        info!("PiSnap shutdown complete");
        Ok(exit_code)
    }
}

/// The first SIGINT/SIGTERM clears the running flag. Later ones arrive while
/// cleanup is under way and are only logged.
async fn listen_for_signals(
    reason_sender: oneshot::Sender<ShutdownReason>,
    running: CancellationToken,
) {
    let mut terminate = TerminateSignal::new();
    let mut reason_sender = Some(reason_sender);

    loop {
        let name = tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => "SIGINT",
                Err(e) => {
                    error!("Failed to listen for SIGINT: {}", e);
                    return;
                }
            },
            _ = terminate.recv() => "SIGTERM",
        };

        match reason_sender.take() {
            Some(sender) => {
                info!("Received {} signal", name);
                let _ = sender.send(ShutdownReason::Signal(name.to_string()));
                running.cancel();
            }
            None => warn!("Received {} during shutdown, ignoring", name),
        }
    }
}

#[cfg(unix)]
struct TerminateSignal(Option<tokio::signal::unix::Signal>);

#[cfg(unix)]
impl TerminateSignal {
    fn new() -> Self {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(signal) => Self(Some(signal)),
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                Self(None)
            }
        }
    }

    async fn recv(&mut self) {
        match &mut self.0 {
            Some(signal) => {
                if signal.recv().await.is_none() {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(not(unix))]
struct TerminateSignal;

#[cfg(not(unix))]
impl TerminateSignal {
    fn new() -> Self {
        Self
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}
