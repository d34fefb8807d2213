mod controller;
mod mode;
#[cfg(test)]
mod tests;

pub use controller::{CameraHandle, ExposureController, CORRECTION_DEADBAND_STOPS, MIDDLE_GRAY};
pub use mode::{AePriority, ExposureMode};
