use super::ButtonLevel;
use crate::events::{ButtonEvent, ButtonId};

/// Falling-edge detection per button. A held button yields one event, and a
/// line that is already low at the first sample yields none.
#[derive(Debug, Clone, Default)]
pub struct EdgeDetector {
    /// `None` until the line has been sampled once
    previous: [Option<ButtonLevel>; 2],
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample and report a press if the line just went low
    pub fn update(&mut self, id: ButtonId, level: ButtonLevel) -> Option<ButtonEvent> {
        let slot = match id {
            ButtonId::A => 0,
            ButtonId::B => 1,
        };
        let previous = self.previous[slot].replace(level);
        (previous == Some(ButtonLevel::High) && level == ButtonLevel::Low).then(|| id.into())
    }
}
