pub mod app;
pub mod buttons;
pub mod camera;
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod exposure;
pub mod frame;
pub mod overlay;
pub mod recovery;
pub mod sensor;
pub mod session;
pub mod state_machine;
pub mod status;
pub mod storage;
pub mod testing;
pub mod watchdog;

pub use app::{ComponentState, HardwareFactory, PisnapOrchestrator, ShutdownReason};
pub use buttons::{ButtonInput, ButtonLevel, ButtonPoller, EdgeDetector, KeyboardButtons};
pub use camera::{
    CameraMetadata, CameraMode, CameraPort, ControlRequest, SimulatedCamera, SimulatedCameraBuilder,
};
pub use config::{CaptureMode, CliOverrides, PisnapConfig};
pub use display::{DisplayConverter, DisplayPort, FramebufferDisplay, HeadlessDisplay};
pub use error::{
    ButtonError, CameraError, DisplayError, EventChannelError, PersistenceError, PisnapError,
    Result,
};
pub use events::{event_channel, ButtonEvent, ButtonEventReceiver, ButtonEventSender, ButtonId};
pub use exposure::{AePriority, CameraHandle, ExposureController, ExposureMode};
pub use frame::{CaptureKind, EncodedFormat, EncodedFrame, Frame, LuminanceSource, PreviewFrame, RawFrame};
pub use overlay::OverlayRenderer;
pub use recovery::{RecoveryAction, RecoveryConfig, RecoveryManager};
pub use sensor::{SensorModel, SensorProfile};
pub use session::{CaptureSession, SessionClock};
pub use state_machine::{AppState, CaptureStateMachine, MachineSettings, TickAction, TickOutcome};
pub use status::{SharedStatus, StatusSnapshot};
pub use storage::{FrameSink, RawFileWriter, RawFormat};
pub use watchdog::{ActivityWatchdog, CaptureSupervisor, MachineFactory};
