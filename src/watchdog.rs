use crate::config::PisnapConfig;
use crate::error::{PisnapError, Result};
use crate::recovery::{RecoveryAction, RecoveryConfig, RecoveryManager};
use crate::state_machine::CaptureStateMachine;
use crate::status::SharedStatus;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CAPTURE_COMPONENT: &str = "capture";

/// Builds a fresh capture task from scratch: opens the devices, registers
/// the camera with a new exposure controller and wires the event receiver.
#[async_trait]
pub trait MachineFactory: Send + Sync {
    async fn build(&self, status: Arc<SharedStatus>) -> Result<CaptureStateMachine>;
}

/// Liveness check on the capture task's heartbeat
#[derive(Debug, Clone, Copy)]
pub struct ActivityWatchdog {
    timeout: Duration,
    check_interval: Duration,
}

impl ActivityWatchdog {
    pub fn new(timeout: Duration, check_interval: Duration) -> Self {
        Self {
            timeout,
            check_interval,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Heartbeat age if it is past the timeout
    pub fn check(&self, status: &SharedStatus) -> Option<Duration> {
        let age = status.last_activity_age();
        (age > self.timeout).then_some(age)
    }
}

enum WatchOutcome {
    Stalled(Duration),
    Finished(Result<()>),
    ShutdownRequested,
}

/// Runs the capture task under the watchdog, restarting it with back-off
/// whenever it stalls or dies
pub struct CaptureSupervisor {
    factory: Arc<dyn MachineFactory>,
    status: Arc<SharedStatus>,
    watchdog: ActivityWatchdog,
    recovery: RecoveryManager,
    stop_timeout: Duration,
}

impl CaptureSupervisor {
    pub fn new(
        factory: Arc<dyn MachineFactory>,
        status: Arc<SharedStatus>,
        watchdog: ActivityWatchdog,
        recovery: RecoveryConfig,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            status,
            watchdog,
            recovery: RecoveryManager::with_config(recovery),
            stop_timeout,
        }
    }

    pub fn from_config(
        config: &PisnapConfig,
        factory: Arc<dyn MachineFactory>,
        status: Arc<SharedStatus>,
    ) -> Self {
        Self::new(
            factory,
            status,
            ActivityWatchdog::new(config.timing.watchdog_timeout(), config.timing.watchdog_check()),
            RecoveryConfig::from(&config.system),
            Duration::from_millis(config.system.shutdown_timeout_ms),
        )
    }

    /// Supervise until shutdown is requested. Fails when the restart budget
    /// runs out or the last capture task would not stop in time.
    pub async fn run(mut self) -> Result<()> {
        let shutdown = self.status.running().clone();
        info!(
            "Capture supervisor started (watchdog timeout {:?}, check every {:?})",
            self.watchdog.timeout(),
            self.watchdog.check_interval()
        );

        while !shutdown.is_cancelled() {
            let machine = match self.factory.build(Arc::clone(&self.status)).await {
                Ok(machine) => machine,
                Err(e) => {
                    error!("Failed to build capture task: {}", e);
                    self.back_off(e, &shutdown).await?;
                    continue;
                }
            };

            let task_cancel = shutdown.child_token();
            self.status.touch();
            let started = Instant::now();
            let machine = Arc::new(Mutex::new(machine));
            let mut task = tokio::spawn(Self::drive(Arc::clone(&machine), task_cancel.clone()));

            let outcome = self.watch(&mut task, started, &shutdown).await;
            let stopped = match &outcome {
                WatchOutcome::ShutdownRequested | WatchOutcome::Stalled(_) => {
                    self.stop_task(task, task_cancel).await
                }
                WatchOutcome::Finished(_) => Ok(()),
            };
            self.ensure_released(&machine).await;

            let failure = match outcome {
                WatchOutcome::ShutdownRequested => return stopped,
                WatchOutcome::Stalled(elapsed) => {
                    warn!(
                        "Capture task stalled: no activity for {:?}, restarting",
                        elapsed
                    );
                    if let Err(e) = stopped {
                        warn!("{}", e);
                    }
                    PisnapError::WatchdogTimeout { elapsed }
                }
                WatchOutcome::Finished(Ok(())) if shutdown.is_cancelled() => break,
                WatchOutcome::Finished(Ok(())) => {
                    PisnapError::component(CAPTURE_COMPONENT, "capture task exited unexpectedly")
                }
                WatchOutcome::Finished(Err(e)) => {
                    error!("Capture task failed: {}", e);
                    e
                }
            };

            let restarts = self.status.record_restart();
            debug!("Capture task restart #{}", restarts);
            self.back_off(failure, &shutdown).await?;
        }

        info!("Capture supervisor stopped");
        Ok(())
    }

    async fn drive(
        machine: Arc<Mutex<CaptureStateMachine>>,
        cancel: CancellationToken,
    ) -> Result<()> {
        machine.lock().await.run_until_cancelled(cancel).await
    }

    async fn watch(
        &mut self,
        task: &mut JoinHandle<Result<()>>,
        started: Instant,
        shutdown: &CancellationToken,
    ) -> WatchOutcome {
        let mut ticker = tokio::time::interval(self.watchdog.check_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut proven_healthy = false;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return WatchOutcome::ShutdownRequested,
                joined = &mut *task => {
                    let result = joined.unwrap_or_else(|e| {
                        Err(PisnapError::component(CAPTURE_COMPONENT, format!("task panicked: {}", e)))
                    });
                    return WatchOutcome::Finished(result);
                }
                _ = ticker.tick() => {}
            }

            if let Some(elapsed) = self.watchdog.check(&self.status) {
                return WatchOutcome::Stalled(elapsed);
            }

            if !proven_healthy && started.elapsed() >= self.watchdog.timeout() {
                proven_healthy = true;
                self.recovery.reset_retry_count(CAPTURE_COMPONENT);
            }
        }
    }

    /// Cancel the task and wait for it to hand the hardware back, aborting it
    /// if it does not finish in time
    async fn stop_task(
        &self,
        mut task: JoinHandle<Result<()>>,
        cancel: CancellationToken,
    ) -> Result<()> {
        cancel.cancel();
        match tokio::time::timeout(self.stop_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => {
                debug!("Capture task stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                warn!("Capture task ended with error: {}", e);
                Ok(())
            }
            Ok(Err(e)) => Err(PisnapError::component(
                CAPTURE_COMPONENT,
                format!("task panicked: {}", e),
            )),
            Err(_) => {
                task.abort();
                // Wait for the aborted future to drop so the machine is unlocked
                let _ = task.await;
                Err(PisnapError::component(
                    CAPTURE_COMPONENT,
                    format!("task did not stop within {:?}, aborted", self.stop_timeout),
                ))
            }
        }
    }

    /// Release the hardware of a finished task. A no-op when the task shut
    /// down cleanly, the only release path when it was aborted or panicked.
    async fn ensure_released(&self, machine: &Mutex<CaptureStateMachine>) {
        let release = async {
            let mut machine = machine.lock().await;
            if !machine.is_released() {
                warn!("Capture task ended without releasing its hardware, releasing now");
                machine.shutdown().await;
            }
        };
        if tokio::time::timeout(self.stop_timeout, release).await.is_err() {
            error!(
                "Capture hardware not released within {:?}",
                self.stop_timeout
            );
        }
    }

    async fn back_off(&mut self, error: PisnapError, shutdown: &CancellationToken) -> Result<()> {
        match self.recovery.handle_error(CAPTURE_COMPONENT, &error) {
            RecoveryAction::RetryAfterDelay(delay) => {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
                Ok(())
            }
            RecoveryAction::Shutdown => {
                error!("Giving up on the capture task, shutting down");
                self.status.request_shutdown();
                Err(PisnapError::recovery_failed(
                    CAPTURE_COMPONENT,
                    self.recovery.get_retry_count(CAPTURE_COMPONENT),
                ))
            }
        }
    }
}
