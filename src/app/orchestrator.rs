use super::hardware::{open_button_input, HardwareFactory};
use super::types::ComponentState;
use crate::buttons::ButtonInput;
use crate::config::PisnapConfig;
use crate::error::Result;
use crate::events::{event_channel, ButtonEventSender};
use crate::status::SharedStatus;
use crate::watchdog::MachineFactory;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub(super) const CAPTURE: &str = "capture";
pub(super) const INPUT: &str = "input";

/// Top-level supervisor: owns the running flag, the input-polling task and
/// the watchdog-supervised capture task
pub struct PisnapOrchestrator {
    pub(super) config: PisnapConfig,
    pub(super) status: Arc<SharedStatus>,
    pub(super) factory: Arc<dyn MachineFactory>,
    pub(super) event_sender: Option<ButtonEventSender>,
    pub(super) button_input: Option<Box<dyn ButtonInput>>,

    pub(super) input_task: Option<JoinHandle<Result<()>>>,
    pub(super) capture_task: Option<JoinHandle<Result<()>>>,

    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
}

impl PisnapOrchestrator {
    /// Wire the real devices described by `config`
    pub fn new(config: PisnapConfig) -> Result<Self> {
        config.validate()?;

        let status = Arc::new(SharedStatus::new(CancellationToken::new()));
        let (sender, receiver) = event_channel(config.system.event_channel_capacity);
        let factory = Arc::new(HardwareFactory::new(config.clone(), receiver));
        let button_input = open_button_input(&config.display, status.running());

        Ok(Self::with_components(
            config,
            status,
            sender,
            factory,
            button_input,
        ))
    }

    /// Assemble from prepared parts. `sender` must feed the receiver the
    /// factory hands to its state machines.
    pub fn with_components(
        config: PisnapConfig,
        status: Arc<SharedStatus>,
        sender: ButtonEventSender,
        factory: Arc<dyn MachineFactory>,
        button_input: Option<Box<dyn ButtonInput>>,
    ) -> Self {
        Self {
            config,
            status,
            factory,
            event_sender: Some(sender),
            button_input,
            input_task: None,
            capture_task: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn status(&self) -> Arc<SharedStatus> {
        Arc::clone(&self.status)
    }

    pub fn config(&self) -> &PisnapConfig {
        &self.config
    }

    /// Record a lifecycle change, logging only actual transitions
    pub(super) async fn set_component_state(&self, component: &str, state: ComponentState) {
        let previous = self
            .component_states
            .lock()
            .await
            .insert(component.to_string(), state.clone());
        match previous {
            Some(previous) if previous == state => {}
            Some(previous) => debug!("{}: {:?} -> {:?}", component, previous, state),
            None => debug!("{}: registered as {:?}", component, state),
        }
    }

    pub async fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().await.get(component).cloned()
    }

    pub async fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.lock().await.clone()
    }
}
