mod builder;
mod port;
mod simulated;

pub use builder::SimulatedCameraBuilder;
pub use port::{CameraMetadata, CameraMode, CameraPort, ControlRequest};
pub use simulated::SimulatedCamera;
