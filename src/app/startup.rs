use super::orchestrator::{CAPTURE, INPUT};
use super::{ComponentState, PisnapOrchestrator};
use crate::buttons::ButtonPoller;
use crate::error::{PisnapError, Result};
use crate::watchdog::CaptureSupervisor;
use std::sync::Arc;
use tracing::{info, warn};

impl PisnapOrchestrator {
    /// Register components before anything runs
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing PiSnap components");

        self.set_component_state(CAPTURE, ComponentState::Stopped)
            .await;
        if self.button_input.is_some() {
            self.set_component_state(INPUT, ComponentState::Stopped)
                .await;
        }

        info!("All components initialized successfully");
        Ok(())
    }

    /// Spawn the input-polling task and the supervised capture task
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting PiSnap");
        let running = self.status.running().clone();

        if let Some(input) = self.button_input.take() {
            self.set_component_state(INPUT, ComponentState::Starting)
                .await;
            let sender = self.event_sender.clone().ok_or_else(|| {
                PisnapError::system("Button event sender already released")
            })?;
            let poller = ButtonPoller::new(input, sender, self.config.timing.button_poll());
            self.input_task = Some(tokio::spawn(poller.run(running.clone())));
            self.set_component_state(INPUT, ComponentState::Running)
                .await;
            info!("Button input started");
        } else {
            warn!("No button input available, the appliance will stay in OFF");
        }

        self.set_component_state(CAPTURE, ComponentState::Starting)
            .await;
        let supervisor = CaptureSupervisor::from_config(
            &self.config,
            Arc::clone(&self.factory),
            Arc::clone(&self.status),
        );
        self.capture_task = Some(tokio::spawn(supervisor.run()));
        self.set_component_state(CAPTURE, ComponentState::Running)
            .await;
        info!("Capture task started under watchdog");

        info!("PiSnap started successfully");
        Ok(())
    }
}
