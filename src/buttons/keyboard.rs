use super::{ButtonInput, ButtonLevel};
use crate::error::ButtonError;
use crate::events::ButtonId;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polls a key is reported held before it is released
const PRESS_HOLD_POLLS: usize = 2;

/// Bench stand-in for the button lines: `a` and `b` on the terminal become
/// momentary presses, `q` or Esc requests shutdown
pub struct KeyboardButtons {
    pending: [VecDeque<ButtonLevel>; 2],
    shutdown: Option<CancellationToken>,
}

impl KeyboardButtons {
    pub fn new(shutdown: Option<CancellationToken>) -> Result<Self, ButtonError> {
        enable_raw_mode().map_err(|e| ButtonError::DeviceOpen {
            device: "terminal".to_string(),
            details: e.to_string(),
        })?;
        info!("Keyboard buttons active - press 'a' or 'b', 'q' to quit");

        Ok(Self {
            pending: [VecDeque::new(), VecDeque::new()],
            shutdown,
        })
    }

    fn slot(id: ButtonId) -> usize {
        match id {
            ButtonId::A => 0,
            ButtonId::B => 1,
        }
    }

    /// Queue a press: the line reads low for a few polls, then high again,
    /// so back-to-back presses still produce distinct edges
    fn press(&mut self, id: ButtonId) {
        let queue = &mut self.pending[Self::slot(id)];
        queue.extend(std::iter::repeat(ButtonLevel::Low).take(PRESS_HOLD_POLLS));
        queue.push_back(ButtonLevel::High);
    }

    fn drain_terminal(&mut self) -> Result<(), ButtonError> {
        while event::poll(Duration::ZERO).map_err(|e| ButtonError::DeviceRead {
            details: e.to_string(),
        })? {
            let event = event::read().map_err(|e| ButtonError::DeviceRead {
                details: e.to_string(),
            })?;

            let Event::Key(key_event) = event else {
                continue;
            };
            if key_event.kind != KeyEventKind::Press {
                continue;
            }

            match key_event.code {
                KeyCode::Char('a') | KeyCode::Char('A') => self.press(ButtonId::A),
                KeyCode::Char('b') | KeyCode::Char('B') => self.press(ButtonId::B),
                KeyCode::Char('q') | KeyCode::Esc => {
                    info!("Quit key pressed - requesting shutdown");
                    if let Some(token) = &self.shutdown {
                        token.cancel();
                    }
                }
                other => debug!("Key pressed: {:?}", other),
            }
        }
        Ok(())
    }
}

impl ButtonInput for KeyboardButtons {
    fn poll_button(&mut self, id: ButtonId) -> Result<ButtonLevel, ButtonError> {
        self.drain_terminal()?;
        Ok(self.pending[Self::slot(id)]
            .pop_front()
            .unwrap_or(ButtonLevel::High))
    }
}

impl Drop for KeyboardButtons {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to disable raw mode: {}", e);
        }
    }
}
