//! Recording test doubles for the hardware ports.
//!
//! Every mock comes with a probe that shares its state, so a test can hand
//! the mock to the state machine and still inspect or script it afterwards.

use crate::buttons::{ButtonInput, ButtonLevel};
use crate::camera::{CameraMetadata, CameraMode, CameraPort, ControlRequest};
use crate::display::DisplayPort;
use crate::error::{self, ButtonError, CameraError, DisplayError, PersistenceError, PisnapError};
use crate::events::{ButtonEventReceiver, ButtonId};
use crate::exposure::{ExposureController, ExposureMode};
use crate::frame::{CaptureKind, EncodedFormat, EncodedFrame, Frame, PreviewFrame, RawFrame};
use crate::sensor::SensorModel;
use crate::state_machine::{CaptureStateMachine, MachineSettings};
use crate::status::SharedStatus;
use crate::storage::FrameSink;
use crate::watchdog::MachineFactory;
use async_trait::async_trait;
use image::RgbImage;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Scriptable camera state and call log
#[derive(Debug, Clone)]
pub struct MockCameraState {
    pub mode: Option<CameraMode>,
    pub mode_switches: Vec<CameraMode>,
    pub control_writes: Vec<ControlRequest>,
    pub captures: Vec<CaptureKind>,
    pub recordings: Vec<PathBuf>,
    pub recording: bool,
    pub stop_recording_calls: u32,
    pub releases: u32,
    /// Number of upcoming mode switches that fail
    pub fail_mode_switches: u32,
    /// Number of upcoming captures that fail
    pub fail_captures: u32,
    /// Number of upcoming control writes that fail
    pub fail_control_writes: u32,
    pub fail_recording: bool,
    /// Captures never complete while set
    pub hang_captures: bool,
    /// Number of upcoming releases that never complete
    pub hang_releases: u32,
    /// Number of upcoming mode switches that never complete
    pub hang_mode_switches: u32,
    pub preview_level: u8,
    pub raw_level: u16,
    pub preview_size: (u32, u32),
    pub raw_size: (u32, u32),
    /// Overrides what `metadata()` reports
    pub reported: Option<CameraMetadata>,
    pub gain: f64,
    pub exposure_us: u32,
    pub ae_enabled: bool,
}

impl Default for MockCameraState {
    fn default() -> Self {
        Self {
            mode: None,
            mode_switches: Vec::new(),
            control_writes: Vec::new(),
            captures: Vec::new(),
            recordings: Vec::new(),
            recording: false,
            stop_recording_calls: 0,
            releases: 0,
            fail_mode_switches: 0,
            fail_captures: 0,
            fail_control_writes: 0,
            fail_recording: false,
            hang_captures: false,
            hang_releases: 0,
            hang_mode_switches: 0,
            preview_level: 46,
            raw_level: 737,
            preview_size: (8, 8),
            raw_size: (8, 8),
            reported: None,
            gain: 1.0,
            exposure_us: 10_000,
            ae_enabled: false,
        }
    }
}

/// Camera double that records every call
pub struct MockCamera {
    index: u32,
    shared: Arc<Mutex<MockCameraState>>,
}

/// Test-side view of a [`MockCamera`]
#[derive(Clone)]
pub struct MockCameraProbe {
    shared: Arc<Mutex<MockCameraState>>,
}

impl MockCamera {
    pub fn new(index: u32) -> (Self, MockCameraProbe) {
        let shared = Arc::new(Mutex::new(MockCameraState::default()));
        (
            Self {
                index,
                shared: Arc::clone(&shared),
            },
            MockCameraProbe { shared },
        )
    }
}

impl MockCameraProbe {
    pub fn state(&self) -> MutexGuard<'_, MockCameraState> {
        self.shared.lock()
    }

    pub fn mode(&self) -> Option<CameraMode> {
        self.shared.lock().mode
    }

    pub fn mode_switches(&self) -> Vec<CameraMode> {
        self.shared.lock().mode_switches.clone()
    }

    pub fn control_writes(&self) -> Vec<ControlRequest> {
        self.shared.lock().control_writes.clone()
    }

    pub fn captures(&self) -> Vec<CaptureKind> {
        self.shared.lock().captures.clone()
    }

    pub fn releases(&self) -> u32 {
        self.shared.lock().releases
    }

    pub fn is_recording(&self) -> bool {
        self.shared.lock().recording
    }

    pub fn fail_next_mode_switches(&self, count: u32) {
        self.shared.lock().fail_mode_switches = count;
    }

    pub fn fail_next_captures(&self, count: u32) {
        self.shared.lock().fail_captures = count;
    }

    pub fn fail_next_control_writes(&self, count: u32) {
        self.shared.lock().fail_control_writes = count;
    }

    pub fn set_hang(&self, hang: bool) {
        self.shared.lock().hang_captures = hang;
    }

    pub fn hang_next_releases(&self, count: u32) {
        self.shared.lock().hang_releases = count;
    }

    pub fn hang_next_mode_switches(&self, count: u32) {
        self.shared.lock().hang_mode_switches = count;
    }

    pub fn set_levels(&self, preview_level: u8, raw_level: u16) {
        let mut state = self.shared.lock();
        state.preview_level = preview_level;
        state.raw_level = raw_level;
    }

    /// Gain from the most recent write that carried one
    pub fn last_written_gain(&self) -> Option<f64> {
        self.shared
            .lock()
            .control_writes
            .iter()
            .rev()
            .find_map(|write| write.gain)
    }
}

fn take_failure(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl CameraPort for MockCamera {
    fn index(&self) -> u32 {
        self.index
    }

    async fn configure_mode(&mut self, mode: CameraMode) -> Result<(), CameraError> {
        let hang = take_failure(&mut self.shared.lock().hang_mode_switches);
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.shared.lock();
        if take_failure(&mut state.fail_mode_switches) {
            return Err(CameraError::ModeSwitch {
                index: self.index,
                mode,
                details: "scripted failure".to_string(),
            });
        }
        state.mode = Some(mode);
        state.mode_switches.push(mode);
        Ok(())
    }

    async fn set_controls(&mut self, controls: &ControlRequest) -> Result<(), CameraError> {
        let mut state = self.shared.lock();
        state.control_writes.push(controls.clone());
        if take_failure(&mut state.fail_control_writes) {
            return Err(CameraError::ControlWrite {
                index: self.index,
                details: "scripted failure".to_string(),
            });
        }
        if let Some(gain) = controls.gain {
            state.gain = gain;
        }
        if let Some(exposure_us) = controls.exposure_us {
            state.exposure_us = exposure_us;
        }
        if let Some(enabled) = controls.ae_enable {
            state.ae_enabled = enabled;
        }
        Ok(())
    }

    async fn capture_frame(&mut self, kind: CaptureKind) -> Result<Frame, CameraError> {
        let hang = {
            let mut state = self.shared.lock();
            state.captures.push(kind);
            state.hang_captures
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.shared.lock();
        if take_failure(&mut state.fail_captures) {
            return Err(CameraError::FrameAcquisition {
                index: self.index,
                details: "scripted failure".to_string(),
            });
        }

        let frame = match kind {
            CaptureKind::Preview => {
                let (width, height) = state.preview_size;
                let rgb = vec![state.preview_level; (width * height * 3) as usize];
                PreviewFrame::new(width, height, rgb).map(Frame::Preview)
            }
            CaptureKind::RawStill => {
                let (width, height) = state.raw_size;
                let samples = vec![state.raw_level; (width * height) as usize];
                RawFrame::new(width, height, samples).map(Frame::Raw)
            }
            CaptureKind::EncodedStill => Some(Frame::Encoded(EncodedFrame {
                format: EncodedFormat::Jpeg,
                data: vec![0xFF, 0xD8, 0xFF, 0xD9],
                timestamp: SystemTime::now(),
            })),
        };

        frame.ok_or_else(|| CameraError::FrameAcquisition {
            index: self.index,
            details: "bad mock geometry".to_string(),
        })
    }

    async fn metadata(&mut self) -> Result<CameraMetadata, CameraError> {
        let state = self.shared.lock();
        Ok(state.reported.unwrap_or(CameraMetadata {
            gain: state.gain,
            exposure_us: state.exposure_us,
            ae_enabled: state.ae_enabled,
        }))
    }

    async fn start_recording(&mut self, path: &Path) -> Result<(), CameraError> {
        let mut state = self.shared.lock();
        if state.fail_recording {
            return Err(CameraError::Recording {
                index: self.index,
                details: "scripted failure".to_string(),
            });
        }
        state.recording = true;
        state.recordings.push(path.to_path_buf());
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<(), CameraError> {
        let mut state = self.shared.lock();
        state.recording = false;
        state.stop_recording_calls += 1;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.shared.lock().recording
    }

    async fn release(&mut self) -> Result<(), CameraError> {
        let hang = take_failure(&mut self.shared.lock().hang_releases);
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.shared.lock();
        state.releases += 1;
        state.recording = false;
        state.mode = None;
        Ok(())
    }
}

/// One recorded display call
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayCall {
    Backlight(bool),
    Clear,
    Render { width: u32, height: u32 },
    Release,
}

/// Display double that records every call
pub struct MockDisplay {
    resolution: (u32, u32),
    calls: Arc<Mutex<Vec<DisplayCall>>>,
}

#[derive(Clone)]
pub struct MockDisplayProbe {
    calls: Arc<Mutex<Vec<DisplayCall>>>,
}

impl MockDisplay {
    pub fn new(resolution: (u32, u32)) -> (Self, MockDisplayProbe) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                resolution,
                calls: Arc::clone(&calls),
            },
            MockDisplayProbe { calls },
        )
    }
}

impl MockDisplayProbe {
    pub fn calls(&self) -> Vec<DisplayCall> {
        self.calls.lock().clone()
    }

    pub fn renders(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, DisplayCall::Render { .. }))
            .count()
    }

    /// Most recent backlight state, if ever set
    pub fn backlight(&self) -> Option<bool> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            DisplayCall::Backlight(on) => Some(*on),
            _ => None,
        })
    }

    pub fn releases(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| **call == DisplayCall::Release)
            .count()
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl DisplayPort for MockDisplay {
    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    async fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError> {
        self.calls.lock().push(DisplayCall::Backlight(on));
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), DisplayError> {
        self.calls.lock().push(DisplayCall::Clear);
        Ok(())
    }

    async fn render_image(&mut self, image: &RgbImage) -> Result<(), DisplayError> {
        self.calls.lock().push(DisplayCall::Render {
            width: image.width(),
            height: image.height(),
        });
        Ok(())
    }

    async fn release(&mut self) -> Result<(), DisplayError> {
        self.calls.lock().push(DisplayCall::Release);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemorySinkState {
    saved: Vec<(PathBuf, CaptureKind)>,
    fail_saves: u32,
}

/// Frame sink that keeps paths in memory instead of writing files
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<(PathBuf, CaptureKind)> {
        self.state.lock().saved.clone()
    }

    pub fn saved_count(&self) -> usize {
        self.state.lock().saved.len()
    }

    pub fn fail_next_saves(&self, count: u32) {
        self.state.lock().fail_saves = count;
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    fn extension(&self, frame: &Frame) -> Result<&'static str, PersistenceError> {
        match frame {
            Frame::Raw(_) => Ok("npy"),
            Frame::Encoded(encoded) => Ok(encoded.format.extension()),
            Frame::Preview(_) => Err(PersistenceError::UnsupportedFrame { format: "preview" }),
        }
    }

    async fn save(&self, path: &Path, frame: &Frame) -> Result<(), PersistenceError> {
        let mut state = self.state.lock();
        if take_failure(&mut state.fail_saves) {
            return Err(PersistenceError::Write {
                path: path.display().to_string(),
                details: "scripted failure".to_string(),
            });
        }
        state.saved.push((path.to_path_buf(), frame.kind()));
        Ok(())
    }
}

/// Button lines driven by the test
pub struct MockButtons {
    levels: Arc<Mutex<HashMap<ButtonId, ButtonLevel>>>,
    fail_reads: Arc<Mutex<u32>>,
}

#[derive(Clone)]
pub struct MockButtonsProbe {
    levels: Arc<Mutex<HashMap<ButtonId, ButtonLevel>>>,
    fail_reads: Arc<Mutex<u32>>,
}

impl MockButtons {
    pub fn new() -> (Self, MockButtonsProbe) {
        let levels = Arc::new(Mutex::new(HashMap::new()));
        let fail_reads = Arc::new(Mutex::new(0));
        (
            Self {
                levels: Arc::clone(&levels),
                fail_reads: Arc::clone(&fail_reads),
            },
            MockButtonsProbe { levels, fail_reads },
        )
    }
}

impl MockButtonsProbe {
    pub fn press(&self, id: ButtonId) {
        self.levels.lock().insert(id, ButtonLevel::Low);
    }

    pub fn release(&self, id: ButtonId) {
        self.levels.lock().insert(id, ButtonLevel::High);
    }

    pub fn fail_next_reads(&self, count: u32) {
        *self.fail_reads.lock() = count;
    }
}

impl ButtonInput for MockButtons {
    fn poll_button(&mut self, id: ButtonId) -> Result<ButtonLevel, ButtonError> {
        if take_failure(&mut self.fail_reads.lock()) {
            return Err(ButtonError::DeviceRead {
                details: "scripted failure".to_string(),
            });
        }
        Ok(self
            .levels
            .lock()
            .get(&id)
            .copied()
            .unwrap_or(ButtonLevel::High))
    }
}

#[derive(Default)]
struct MockFactoryState {
    cameras: Vec<MockCameraProbe>,
    displays: Vec<MockDisplayProbe>,
    fail_builds: u32,
    hang_builds: u32,
    hang_release_builds: u32,
}

/// Hands out capture tasks backed by a fresh mock camera and display on
/// every build, keeping the probes for inspection
pub struct MockMachineFactory {
    settings: MachineSettings,
    events: ButtonEventReceiver,
    sink: MemorySink,
    sensor: SensorModel,
    exposure_mode: ExposureMode,
    settle_delay: Duration,
    state: Mutex<MockFactoryState>,
}

impl MockMachineFactory {
    pub fn new(settings: MachineSettings, events: ButtonEventReceiver, sink: MemorySink) -> Self {
        Self {
            settings,
            events,
            sink,
            sensor: SensorModel::PivarietyGsMono,
            exposure_mode: ExposureMode::Auto,
            settle_delay: Duration::ZERO,
            state: Mutex::new(MockFactoryState::default()),
        }
    }

    pub fn with_sensor(mut self, sensor: SensorModel, exposure_mode: ExposureMode) -> Self {
        self.sensor = sensor;
        self.exposure_mode = exposure_mode;
        self
    }

    /// Settle delay of every exposure controller handed out
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn builds(&self) -> usize {
        self.state.lock().cameras.len()
    }

    pub fn camera(&self, build: usize) -> Option<MockCameraProbe> {
        self.state.lock().cameras.get(build).cloned()
    }

    pub fn display(&self, build: usize) -> Option<MockDisplayProbe> {
        self.state.lock().displays.get(build).cloned()
    }

    /// The next `count` builds fail as if the camera could not be opened
    pub fn fail_next_builds(&self, count: u32) {
        self.state.lock().fail_builds = count;
    }

    /// The next `count` builds get a camera whose captures never complete
    pub fn hang_next_builds(&self, count: u32) {
        self.state.lock().hang_builds = count;
    }

    /// The next `count` builds get a camera whose first release never completes
    pub fn hang_release_next_builds(&self, count: u32) {
        self.state.lock().hang_release_builds = count;
    }
}

#[async_trait]
impl MachineFactory for MockMachineFactory {
    async fn build(&self, status: Arc<SharedStatus>) -> error::Result<CaptureStateMachine> {
        let (camera, display) = {
            let mut state = self.state.lock();
            if take_failure(&mut state.fail_builds) {
                return Err(PisnapError::from(CameraError::DeviceInit {
                    index: 0,
                    details: "scripted failure".to_string(),
                }));
            }

            let (camera, camera_probe) = MockCamera::new(0);
            camera_probe.set_hang(take_failure(&mut state.hang_builds));
            if take_failure(&mut state.hang_release_builds) {
                camera_probe.hang_next_releases(1);
            }
            let (display, display_probe) = MockDisplay::new((32, 32));
            state.cameras.push(camera_probe);
            state.displays.push(display_probe);
            (camera, display)
        };

        let mut exposure =
            ExposureController::new(self.exposure_mode).with_settle_delay(self.settle_delay);
        exposure.register(0, self.sensor.profile());

        Ok(CaptureStateMachine::new(
            Box::new(camera),
            Box::new(display),
            Arc::new(self.sink.clone()),
            exposure,
            self.events.clone(),
            status,
            self.settings.clone(),
        ))
    }
}
