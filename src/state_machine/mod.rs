//! The three-state capture loop: OFF, IDLE (live preview) and CAPTURING.

mod machine;
#[cfg(test)]
mod tests;
mod types;

pub use machine::CaptureStateMachine;
pub use types::{AppState, MachineSettings, TickAction, TickOutcome};
