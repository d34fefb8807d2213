use super::*;
use crate::camera::CameraMode;
use crate::config::CaptureMode;
use crate::events::{event_channel, ButtonEvent, ButtonEventSender};
use crate::exposure::{ExposureController, ExposureMode};
use crate::frame::CaptureKind;
use crate::sensor::SensorModel;
use crate::session::SessionClock;
use crate::status::SharedStatus;
use crate::testing::{DisplayCall, MemorySink, MockCamera, MockCameraProbe, MockDisplay, MockDisplayProbe};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Harness {
    machine: CaptureStateMachine,
    camera: MockCameraProbe,
    display: MockDisplayProbe,
    sink: MemorySink,
    sender: ButtonEventSender,
    status: Arc<SharedStatus>,
    root: TempDir,
}

impl Harness {
    async fn press(&mut self, event: ButtonEvent) -> TickOutcome {
        self.sender.send(event).await.unwrap();
        self.machine.tick().await
    }

    fn session_dirs(&self) -> usize {
        std::fs::read_dir(self.root.path()).unwrap().count()
    }
}

fn settings(root: &TempDir, capture_mode: CaptureMode) -> MachineSettings {
    MachineSettings {
        capture_mode,
        capture_root: root.path().to_path_buf(),
        clock: SessionClock::Local,
        requested_gain: None,
        requested_exposure_us: None,
        preview_tick: Duration::from_millis(5),
        capture_tick: Duration::from_millis(1),
        off_tick: Duration::from_millis(10),
    }
}

async fn harness_with(model: SensorModel, mode: ExposureMode, capture_mode: CaptureMode) -> Harness {
    let root = TempDir::new().unwrap();
    let (camera, camera_probe) = MockCamera::new(0);
    let (display, display_probe) = MockDisplay::new((32, 32));
    let sink = MemorySink::new();
    let (sender, receiver) = event_channel(16);
    let status = Arc::new(SharedStatus::new(CancellationToken::new()));

    let mut exposure = ExposureController::new(mode);
    exposure.register(0, model.profile());

    let mut machine = CaptureStateMachine::new(
        Box::new(camera),
        Box::new(display),
        Arc::new(sink.clone()),
        exposure,
        receiver,
        Arc::clone(&status),
        settings(&root, capture_mode),
    );
    machine.start().await.unwrap();

    Harness {
        machine,
        camera: camera_probe,
        display: display_probe,
        sink,
        sender,
        status,
        root,
    }
}

async fn harness(capture_mode: CaptureMode) -> Harness {
    harness_with(SensorModel::PivarietyGsMono, ExposureMode::Auto, capture_mode).await
}

#[tokio::test]
async fn test_start_enters_off() {
    let h = harness(CaptureMode::Raw).await;

    assert_eq!(h.machine.state(), AppState::Off);
    assert_eq!(h.status.state(), AppState::Off);
    assert_eq!(h.display.backlight(), Some(false));
    assert_eq!(h.camera.mode(), Some(CameraMode::Preview));
    // Exposure configured once on startup
    assert_eq!(h.camera.control_writes().len(), 1);
}

#[tokio::test]
async fn test_off_button_a_starts_capturing() {
    let mut h = harness(CaptureMode::Raw).await;

    let outcome = h.press(ButtonEvent::A).await;
    assert_eq!(
        outcome.action,
        TickAction::Transition {
            from: AppState::Off,
            to: AppState::Capturing
        }
    );
    assert_eq!(outcome.event, Some(ButtonEvent::A));
    assert_eq!(outcome.next_delay, Duration::from_millis(1));

    let session = h.machine.session().unwrap();
    assert_eq!(session.frames_saved(), 0);
    assert!(session.directory().is_dir());
    assert_eq!(h.camera.mode(), Some(CameraMode::Still));
    assert_eq!(h.status.state(), AppState::Capturing);
    // The transition tick does no capture work
    assert!(h.camera.captures().is_empty());
}

#[tokio::test]
async fn test_capturing_button_a_is_ignored() {
    let mut h = harness(CaptureMode::Raw).await;
    h.press(ButtonEvent::A).await;
    let directory = h.machine.session().unwrap().directory().to_path_buf();

    let outcome = h.press(ButtonEvent::A).await;
    assert_eq!(outcome.action, TickAction::Saved { count: 1 });
    assert_eq!(h.machine.state(), AppState::Capturing);
    assert_eq!(h.machine.session().unwrap().directory(), directory);
    assert_eq!(h.session_dirs(), 1);
}

#[tokio::test]
async fn test_capturing_button_b_returns_to_idle() {
    let mut h = harness(CaptureMode::Raw).await;
    h.press(ButtonEvent::A).await;
    h.machine.tick().await;
    let switches_before = h.camera.mode_switches().len();

    let outcome = h.press(ButtonEvent::B).await;
    assert_eq!(
        outcome.action,
        TickAction::Transition {
            from: AppState::Capturing,
            to: AppState::Idle
        }
    );
    assert!(h.machine.session().is_none());
    assert_eq!(
        h.camera.mode_switches()[switches_before..],
        [CameraMode::Preview]
    );

    // Next tick is a preview, nothing more is saved
    assert_eq!(h.machine.tick().await.action, TickAction::Previewed);
    assert_eq!(h.sink.saved_count(), 1);
}

#[tokio::test]
async fn test_queued_events_drain_one_per_tick() {
    let mut h = harness(CaptureMode::Raw).await;
    for event in [ButtonEvent::A, ButtonEvent::B, ButtonEvent::A] {
        h.sender.send(event).await.unwrap();
    }

    let mut states = Vec::new();
    for _ in 0..3 {
        h.machine.tick().await;
        states.push(h.machine.state());
    }
    assert_eq!(
        states,
        vec![AppState::Capturing, AppState::Idle, AppState::Capturing]
    );
    // Every entry into CAPTURING opened its own directory
    assert_eq!(h.session_dirs(), 2);
    assert!(h.camera.captures().is_empty());
}

#[tokio::test]
async fn test_button_b_toggles_preview() {
    let mut h = harness(CaptureMode::Raw).await;

    h.press(ButtonEvent::B).await;
    assert_eq!(h.machine.state(), AppState::Idle);
    assert_eq!(h.display.backlight(), Some(true));

    assert_eq!(h.machine.tick().await.action, TickAction::Previewed);
    assert!(h.display.renders() >= 1);

    h.press(ButtonEvent::B).await;
    assert_eq!(h.machine.state(), AppState::Off);
    assert_eq!(h.display.backlight(), Some(false));
    assert_eq!(h.display.calls().last(), Some(&DisplayCall::Clear));

    let captures = h.camera.captures().len();
    assert_eq!(h.machine.tick().await.action, TickAction::Standby);
    assert_eq!(h.camera.captures().len(), captures);
}

#[tokio::test]
async fn test_capture_session_end_to_end() {
    let mut h = harness(CaptureMode::Raw).await;
    h.press(ButtonEvent::A).await;

    for expected in 1..=5 {
        assert_eq!(
            h.machine.tick().await.action,
            TickAction::Saved { count: expected }
        );
    }

    let directory = h.machine.session().unwrap().directory().to_path_buf();
    let saved = h.sink.saved();
    assert_eq!(saved.len(), 5);
    let mut names: Vec<_> = saved.iter().map(|(path, _)| path.clone()).collect();
    assert!(names.iter().all(|path| path.parent() == Some(directory.as_path())));
    assert!(saved.iter().all(|(_, kind)| *kind == CaptureKind::RawStill));
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 5);
    assert_eq!(h.status.frames_saved(), 5);

    h.press(ButtonEvent::B).await;
    assert_eq!(h.machine.state(), AppState::Idle);
    assert!(h.machine.session().is_none());
}

#[tokio::test]
async fn test_capture_miss_keeps_counter() {
    let mut h = harness(CaptureMode::Raw).await;
    h.press(ButtonEvent::A).await;
    h.camera.fail_next_captures(1);

    assert_eq!(h.machine.tick().await.action, TickAction::CaptureMissed);
    assert_eq!(h.machine.session().unwrap().frames_saved(), 0);
    // The counter overlay is still drawn
    assert_eq!(
        h.display.calls().last(),
        Some(&DisplayCall::Render {
            width: 32,
            height: 32
        })
    );

    assert_eq!(h.machine.tick().await.action, TickAction::Saved { count: 1 });
}

#[tokio::test]
async fn test_failed_save_not_counted() {
    let mut h = harness(CaptureMode::Raw).await;
    h.press(ButtonEvent::A).await;
    h.sink.fail_next_saves(1);

    assert_eq!(h.machine.tick().await.action, TickAction::SaveFailed);
    assert_eq!(h.machine.session().unwrap().frames_saved(), 0);
    assert_eq!(h.status.frames_saved(), 0);
    assert_eq!(h.machine.tick().await.action, TickAction::Saved { count: 1 });
}

#[tokio::test]
async fn test_mode_switch_failure_keeps_state() {
    let mut h = harness(CaptureMode::Raw).await;
    h.camera.fail_next_mode_switches(1);

    let outcome = h.press(ButtonEvent::A).await;
    assert_eq!(outcome.action, TickAction::Standby);
    assert_eq!(h.machine.state(), AppState::Off);
    assert!(h.machine.session().is_none());
    // The half-open session directory is gone
    assert_eq!(h.session_dirs(), 0);

    h.press(ButtonEvent::A).await;
    assert_eq!(h.machine.state(), AppState::Capturing);
    assert_eq!(h.session_dirs(), 1);
}

#[tokio::test]
async fn test_failed_preview_switch_stays_capturing() {
    let mut h = harness(CaptureMode::Raw).await;
    h.press(ButtonEvent::A).await;
    h.camera.fail_next_mode_switches(1);

    let outcome = h.press(ButtonEvent::B).await;
    assert_eq!(outcome.action, TickAction::Saved { count: 1 });
    assert_eq!(h.machine.state(), AppState::Capturing);
    assert!(h.machine.session().is_some());
}

#[tokio::test]
async fn test_jpeg_capture_saves_encoded_frames() {
    let mut h = harness(CaptureMode::Jpeg).await;
    h.press(ButtonEvent::A).await;
    h.machine.tick().await;

    let saved = h.sink.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].1, CaptureKind::EncodedStill);
    assert_eq!(saved[0].0.extension().unwrap(), "jpg");
}

#[tokio::test]
async fn test_video_mode_records_for_session() {
    let mut h = harness(CaptureMode::Video).await;
    h.press(ButtonEvent::A).await;

    assert!(h.camera.is_recording());
    let recording = h.camera.state().recordings[0].clone();
    assert_eq!(
        recording.parent(),
        Some(h.machine.session().unwrap().directory())
    );

    assert_eq!(h.machine.tick().await.action, TickAction::Recording);
    assert!(h.camera.captures().is_empty());

    h.press(ButtonEvent::B).await;
    assert_eq!(h.machine.state(), AppState::Idle);
    assert!(!h.camera.is_recording());
}

#[tokio::test]
async fn test_video_mode_recording_failure_aborts_entry() {
    let mut h = harness(CaptureMode::Video).await;
    h.camera.state().fail_recording = true;

    h.press(ButtonEvent::A).await;
    assert_eq!(h.machine.state(), AppState::Off);
    assert_eq!(h.session_dirs(), 0);
}

#[tokio::test]
async fn test_dark_raw_frames_raise_gain() {
    let mut h = harness(CaptureMode::Raw).await;
    h.camera.set_levels(46, 100);
    h.press(ButtonEvent::A).await;

    h.machine.tick().await;
    let gain = h.camera.last_written_gain().unwrap();
    assert!(gain > 1.0);
    assert_eq!(h.machine.exposure().handle(0).unwrap().last_gain, gain);
}

#[tokio::test]
async fn test_hardware_ae_sensor_skips_correction() {
    let mut h = harness_with(SensorModel::Imx519, ExposureMode::Auto, CaptureMode::Raw).await;
    h.camera.set_levels(10, 100);
    let writes = h.camera.control_writes().len();

    h.press(ButtonEvent::B).await;
    h.machine.tick().await;
    h.press(ButtonEvent::A).await;
    h.machine.tick().await;

    assert_eq!(h.camera.control_writes().len(), writes);
}

#[tokio::test]
async fn test_closed_event_channel_is_tolerated() {
    let mut h = harness(CaptureMode::Raw).await;
    h.press(ButtonEvent::B).await;

    let Harness {
        mut machine,
        sender,
        ..
    } = h;
    drop(sender);

    assert_eq!(machine.tick().await.action, TickAction::Previewed);
    assert_eq!(machine.tick().await.action, TickAction::Previewed);
}

#[tokio::test]
async fn test_shutdown_releases_once() {
    let mut h = harness(CaptureMode::Video).await;
    h.press(ButtonEvent::A).await;

    h.machine.shutdown().await;
    h.machine.shutdown().await;

    assert!(h.machine.is_released());
    assert_eq!(h.machine.state(), AppState::Off);
    assert_eq!(h.camera.releases(), 1);
    assert_eq!(h.display.releases(), 1);
    assert!(!h.camera.is_recording());
    assert_eq!(h.display.backlight(), Some(false));

    assert_eq!(h.machine.tick().await.action, TickAction::Released);
}

#[tokio::test]
async fn test_shutdown_removes_session_of_interrupted_entry() {
    let mut h = harness(CaptureMode::Raw).await;
    h.camera.hang_next_mode_switches(1);
    h.sender.send(ButtonEvent::A).await.unwrap();

    // The still-mode switch never returns, the tick is dropped midway
    let interrupted = tokio::time::timeout(Duration::from_millis(50), h.machine.tick()).await;
    assert!(interrupted.is_err());
    assert_eq!(h.session_dirs(), 1);

    h.machine.shutdown().await;
    assert_eq!(h.session_dirs(), 0);
    assert!(h.machine.session().is_none());
    assert_eq!(h.machine.state(), AppState::Off);
    assert_eq!(h.camera.releases(), 1);
}

#[tokio::test]
async fn test_shutdown_resumes_after_interrupted_release() {
    let mut h = harness(CaptureMode::Raw).await;
    h.camera.hang_next_releases(1);

    let interrupted = tokio::time::timeout(Duration::from_millis(50), h.machine.shutdown()).await;
    assert!(interrupted.is_err());
    assert!(!h.machine.is_released());
    assert_eq!(h.camera.releases(), 0);

    h.machine.shutdown().await;
    h.machine.shutdown().await;
    assert!(h.machine.is_released());
    assert_eq!(h.camera.releases(), 1);
    assert_eq!(h.display.releases(), 1);
}

#[tokio::test]
async fn test_run_stops_on_cancel() {
    let h = harness(CaptureMode::Raw).await;
    let cancel = CancellationToken::new();
    let camera = h.camera.clone();
    let display = h.display.clone();
    let status = Arc::clone(&h.status);

    let task = tokio::spawn(h.machine.run(cancel.clone()));
    h.sender.send(ButtonEvent::B).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(status.state(), AppState::Idle);

    cancel.cancel();
    task.await.unwrap().unwrap();
    assert_eq!(camera.releases(), 1);
    assert_eq!(display.releases(), 1);
    assert_eq!(status.state(), AppState::Off);
}
