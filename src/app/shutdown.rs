use super::orchestrator::{CAPTURE, INPUT};
use super::{ComponentState, PisnapOrchestrator};
use crate::error::{PisnapError, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

impl PisnapOrchestrator {
    /// Stop the capture task first so the hardware is released, then the
    /// input task. Returns the process exit code.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");
        self.status.request_shutdown();

        let limit = Duration::from_millis(self.config.system.shutdown_timeout_ms);
        // The supervisor spends up to one limit stopping the capture task and
        // another releasing its hardware after an abort
        let capture_limit = limit * 3;
        let mut exit_code = 0;

        if let Err(e) = self.stop_component(CAPTURE, capture_limit).await {
            error!("Error stopping capture: {}", e);
            exit_code = 1;
        }

        if let Err(e) = self.stop_component(INPUT, limit).await {
            error!("Error stopping input: {}", e);
            exit_code = 1;
        }

        self.event_sender.take();
        info!("Final status: {}", self.status.snapshot());
        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component(&mut self, component: &str, limit: Duration) -> Result<()> {
        let task = match component {
            CAPTURE => self.capture_task.take(),
            INPUT => self.input_task.take(),
            _ => None,
        };
        let Some(mut task) = task else {
            return Ok(());
        };

        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(limit, &mut task).await {
            Ok(Ok(Ok(()))) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component ended with error: {}", component, e);
                Err(e)
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(PisnapError::component(
                    component,
                    format!("task panicked: {}", e),
                ))
            }
            Err(_) => {
                task.abort();
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component stop timeout", component);
                Err(PisnapError::System {
                    message: format!("{} component stop timeout", component),
                })
            }
        }
    }
}
