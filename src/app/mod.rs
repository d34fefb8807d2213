mod hardware;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod types;


pub use hardware::{open_button_input, HardwareFactory};
pub use orchestrator::PisnapOrchestrator;
pub use types::{ComponentState, ShutdownReason};
