use crate::error::EventChannelError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Identifies one of the two physical buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonId {
    A,
    B,
}

impl ButtonId {
    pub const ALL: [ButtonId; 2] = [ButtonId::A, ButtonId::B];
}

/// A debounced press edge. Produced once per physical press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonEvent {
    A,
    B,
}

impl From<ButtonId> for ButtonEvent {
    fn from(id: ButtonId) -> Self {
        match id {
            ButtonId::A => ButtonEvent::A,
            ButtonId::B => ButtonEvent::B,
        }
    }
}

impl fmt::Display for ButtonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonEvent::A => write!(f, "A"),
            ButtonEvent::B => write!(f, "B"),
        }
    }
}

/// Create a bounded FIFO between the input poller and the state machine
pub fn event_channel(capacity: usize) -> (ButtonEventSender, ButtonEventReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        ButtonEventSender { sender },
        ButtonEventReceiver {
            receiver: Arc::new(Mutex::new(receiver)),
        },
    )
}

/// Producer half, owned by the input-polling task
#[derive(Debug, Clone)]
pub struct ButtonEventSender {
    sender: mpsc::Sender<ButtonEvent>,
}

impl ButtonEventSender {
    /// Enqueue an event, waiting for capacity rather than dropping it
    pub async fn send(&self, event: ButtonEvent) -> Result<(), EventChannelError> {
        trace!("Enqueueing button event {}", event);
        self.sender
            .send(event)
            .await
            .map_err(|_| EventChannelError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consumer half. Cloning shares the same queue, so a restarted capture task
/// picks up exactly where the previous one stopped.
#[derive(Debug, Clone)]
pub struct ButtonEventReceiver {
    receiver: Arc<Mutex<mpsc::Receiver<ButtonEvent>>>,
}

impl ButtonEventReceiver {
    /// Take at most one pending event without blocking
    pub fn try_next(&self) -> Result<Option<ButtonEvent>, EventChannelError> {
        match self.receiver.lock().try_recv() {
            Ok(event) => {
                debug!("Dequeued button event {}", event);
                Ok(Some(event))
            }
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(EventChannelError::ChannelClosed),
        }
    }
}
