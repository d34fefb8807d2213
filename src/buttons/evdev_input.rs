use super::{ButtonInput, ButtonLevel};
use crate::config::DisplayConfig;
use crate::error::ButtonError;
use crate::events::ButtonId;
use evdev::{Device, Key};
use tracing::{debug, info};

/// Buttons exposed by a gpio-keys input device
pub struct EvdevButtons {
    device: Device,
    device_path: String,
    key_a: Key,
    key_b: Key,
}

impl EvdevButtons {
    pub fn open(config: &DisplayConfig) -> Result<Self, ButtonError> {
        let device_path = config.button_device.clone();
        let device = Device::open(&device_path).map_err(|e| ButtonError::DeviceOpen {
            device: device_path.clone(),
            details: e.to_string(),
        })?;

        let key_a = Key::new(config.button_a_key);
        let key_b = Key::new(config.button_b_key);

        let supported = device
            .supported_keys()
            .map(|keys| keys.contains(key_a) && keys.contains(key_b))
            .unwrap_or(false);
        if !supported {
            return Err(ButtonError::DeviceOpen {
                device: device_path,
                details: format!(
                    "device does not report keys {} and {}",
                    config.button_a_key, config.button_b_key
                ),
            });
        }

        info!(
            "Button device opened successfully: {} ({})",
            device_path,
            device.name().unwrap_or("Unknown")
        );
        debug!("Button keys: A={:?} B={:?}", key_a, key_b);

        Ok(Self {
            device,
            device_path,
            key_a,
            key_b,
        })
    }
}

impl ButtonInput for EvdevButtons {
    fn poll_button(&mut self, id: ButtonId) -> Result<ButtonLevel, ButtonError> {
        let key = match id {
            ButtonId::A => self.key_a,
            ButtonId::B => self.key_b,
        };
        let state = self
            .device
            .get_key_state()
            .map_err(|e| ButtonError::DeviceRead {
                details: format!("{}: {}", self.device_path, e),
            })?;

        // A held key reads as a low line
        Ok(if state.contains(key) {
            ButtonLevel::Low
        } else {
            ButtonLevel::High
        })
    }
}
