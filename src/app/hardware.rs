use crate::buttons::{ButtonInput, KeyboardButtons};
use crate::camera::{CameraPort, SimulatedCameraBuilder};
use crate::config::{ButtonBackend, CameraBackend, DisplayBackend, DisplayConfig, PisnapConfig};
use crate::display::{DisplayPort, FramebufferDisplay, HeadlessDisplay};
use crate::error::Result;
use crate::events::ButtonEventReceiver;
use crate::exposure::ExposureController;
use crate::overlay::OverlayRenderer;
use crate::state_machine::{CaptureStateMachine, MachineSettings};
use crate::status::SharedStatus;
use crate::storage::RawFileWriter;
use crate::watchdog::MachineFactory;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Opens the configured camera and display for every capture task the
/// supervisor starts
pub struct HardwareFactory {
    config: PisnapConfig,
    events: ButtonEventReceiver,
}

impl HardwareFactory {
    pub fn new(config: PisnapConfig, events: ButtonEventReceiver) -> Self {
        Self { config, events }
    }

    fn open_camera(&self) -> Result<Box<dyn CameraPort>> {
        match self.config.camera.backend {
            CameraBackend::Simulated => {
                let camera = SimulatedCameraBuilder::new()
                    .config(self.config.camera.clone())
                    .build()?;
                Ok(Box::new(camera))
            }
        }
    }

    /// A panel that fails to open degrades to the headless display
    fn open_display(&self) -> Box<dyn DisplayPort> {
        let display = &self.config.display;
        match display.backend {
            DisplayBackend::Framebuffer => match FramebufferDisplay::new(display.clone()) {
                Ok(panel) => Box::new(panel),
                Err(e) => {
                    warn!("Display unavailable, continuing headless: {}", e);
                    Box::new(HeadlessDisplay::new(display.resolution))
                }
            },
            DisplayBackend::Headless => Box::new(HeadlessDisplay::new(display.resolution)),
        }
    }
}

#[async_trait]
impl MachineFactory for HardwareFactory {
    async fn build(&self, status: Arc<SharedStatus>) -> Result<CaptureStateMachine> {
        let camera = self.open_camera()?;
        let display = self.open_display();
        let camera_config = &self.config.camera;

        let mut exposure = ExposureController::new(camera_config.exposure_mode)
            .with_settle_delay(Duration::from_millis(camera_config.settle_ms));
        exposure.register(camera.index(), camera_config.sensor_model.profile());

        let renderer = OverlayRenderer::with_font_file(
            display.resolution(),
            Path::new(&self.config.capture.font_path),
            self.config.capture.font_size,
        );
        let sink = Arc::new(RawFileWriter::new(self.config.capture.raw_format));

        Ok(CaptureStateMachine::new(
            camera,
            display,
            sink,
            exposure,
            self.events.clone(),
            status,
            MachineSettings::from_config(&self.config),
        )
        .with_renderer(renderer))
    }
}

/// Open the configured button backend. Failures leave the appliance running
/// without buttons.
pub fn open_button_input(
    display: &DisplayConfig,
    shutdown: &CancellationToken,
) -> Option<Box<dyn ButtonInput>> {
    match display.buttons {
        ButtonBackend::Evdev => open_evdev_buttons(display),
        ButtonBackend::Keyboard => match KeyboardButtons::new(Some(shutdown.clone())) {
            Ok(keyboard) => Some(Box::new(keyboard)),
            Err(e) => {
                warn!("Keyboard input unavailable: {}", e);
                None
            }
        },
        ButtonBackend::None => {
            info!("Button input disabled");
            None
        }
    }
}

#[cfg(all(target_os = "linux", feature = "display"))]
fn open_evdev_buttons(display: &DisplayConfig) -> Option<Box<dyn ButtonInput>> {
    match crate::buttons::EvdevButtons::open(display) {
        Ok(buttons) => Some(Box::new(buttons)),
        Err(e) => {
            warn!("Button device unavailable, continuing without buttons: {}", e);
            None
        }
    }
}

#[cfg(not(all(target_os = "linux", feature = "display")))]
fn open_evdev_buttons(_display: &DisplayConfig) -> Option<Box<dyn ButtonInput>> {
    warn!("evdev buttons not supported in this build, continuing without buttons");
    None
}
