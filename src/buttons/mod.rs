mod detector;
#[cfg(all(target_os = "linux", feature = "display"))]
mod evdev_input;
mod keyboard;
mod poller;

use crate::error::ButtonError;
use crate::events::ButtonId;

pub use detector::EdgeDetector;
#[cfg(all(target_os = "linux", feature = "display"))]
pub use evdev_input::EvdevButtons;
pub use keyboard::KeyboardButtons;
pub use poller::ButtonPoller;

/// Electrical level of a button line. Buttons are active-low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonLevel {
    /// Released
    High,
    /// Pressed
    Low,
}

/// The two button lines, owned by the input-polling task
pub trait ButtonInput: Send {
    fn poll_button(&mut self, id: ButtonId) -> Result<ButtonLevel, ButtonError>;
}
