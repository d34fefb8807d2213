use pisnap::config::PisnapConfig;
use pisnap::{
    event_channel, AppState, ButtonEvent, ButtonEventSender, CaptureMode, CaptureStateMachine,
    ExposureController, ExposureMode, HeadlessDisplay, MachineSettings, RawFileWriter, RawFormat,
    SensorModel, SessionClock, SharedStatus, SimulatedCameraBuilder, TickAction,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Appliance {
    machine: CaptureStateMachine,
    sender: ButtonEventSender,
    root: TempDir,
}

async fn appliance(model: SensorModel, scene: f64, format: RawFormat) -> Appliance {
    let root = TempDir::new().unwrap();

    let mut camera_config = PisnapConfig::default().camera;
    camera_config.sensor_model = model;
    camera_config.scene_luminance = scene;
    camera_config.preview_resolution = (24, 24);
    let camera = SimulatedCameraBuilder::new()
        .config(camera_config)
        .raw_resolution(16, 8)
        .build()
        .unwrap();

    let mut exposure = ExposureController::new(ExposureMode::Auto);
    exposure.register(0, model.profile());

    let (sender, receiver) = event_channel(16);
    let settings = MachineSettings {
        capture_mode: CaptureMode::Raw,
        capture_root: root.path().to_path_buf(),
        clock: SessionClock::from_name(Some("UTC")),
        requested_gain: None,
        requested_exposure_us: None,
        preview_tick: Duration::from_millis(5),
        capture_tick: Duration::from_millis(1),
        off_tick: Duration::from_millis(5),
    };

    let mut machine = CaptureStateMachine::new(
        Box::new(camera),
        Box::new(HeadlessDisplay::new((48, 48))),
        Arc::new(RawFileWriter::new(format)),
        exposure,
        receiver,
        Arc::new(SharedStatus::new(CancellationToken::new())),
        settings,
    );
    machine.start().await.unwrap();

    Appliance {
        machine,
        sender,
        root,
    }
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn raw_session_writes_npy_files() {
    let mut app = appliance(SensorModel::PivarietyGsMono, 0.18, RawFormat::Npy).await;

    app.sender.send(ButtonEvent::A).await.unwrap();
    app.machine.tick().await;
    assert_eq!(app.machine.state(), AppState::Capturing);
    let directory = app.machine.session().unwrap().directory().to_path_buf();

    for expected in 1..=5 {
        assert_eq!(
            app.machine.tick().await.action,
            TickAction::Saved { count: expected }
        );
    }

    let files = files_in(&directory);
    assert_eq!(files.len(), 5);
    for file in &files {
        assert_eq!(file.extension().unwrap(), "npy");
        let bytes = std::fs::read(file).unwrap();
        assert_eq!(&bytes[..6], b"\x93NUMPY");
        // 64-byte aligned header, then 16x8 little-endian u16 samples
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(bytes.len(), 10 + header_len + 16 * 8 * 2);
    }

    app.sender.send(ButtonEvent::B).await.unwrap();
    app.machine.tick().await;
    assert_eq!(app.machine.state(), AppState::Idle);
    assert!(app.machine.session().is_none());
    assert_eq!(files_in(&directory).len(), 5);
}

#[tokio::test]
async fn each_session_gets_its_own_directory() {
    let mut app = appliance(SensorModel::PivarietyGsMono, 0.18, RawFormat::Npy).await;

    let mut directories = Vec::new();
    for _ in 0..3 {
        app.sender.send(ButtonEvent::A).await.unwrap();
        app.machine.tick().await;
        directories.push(app.machine.session().unwrap().directory().to_path_buf());
        app.machine.tick().await;

        app.sender.send(ButtonEvent::B).await.unwrap();
        app.machine.tick().await;
    }

    directories.sort();
    directories.dedup();
    assert_eq!(directories.len(), 3);
    assert_eq!(files_in(app.root.path()).len(), 3);
}

#[tokio::test]
async fn tiff_output_when_unpacking() {
    let mut app = appliance(SensorModel::Imx519, 0.18, RawFormat::Tiff).await;

    app.sender.send(ButtonEvent::A).await.unwrap();
    app.machine.tick().await;
    app.machine.tick().await;

    let directory = app.machine.session().unwrap().directory().to_path_buf();
    let files = files_in(&directory);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].extension().unwrap(), "tiff");
    let bytes = std::fs::read(&files[0]).unwrap();
    assert!(bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*"));
}

#[tokio::test]
async fn dark_scene_converges_on_sensor_without_hardware_ae() {
    let mut app = appliance(SensorModel::PivarietyGsMono, 0.02, RawFormat::Npy).await;

    app.sender.send(ButtonEvent::A).await.unwrap();
    app.machine.tick().await;
    for _ in 0..4 {
        app.machine.tick().await;
    }

    // 0.02 of white needs about 9x gain to reach middle gray
    let gain = app.machine.exposure().handle(0).unwrap().last_gain;
    assert!((gain - 9.0).abs() < 0.5, "gain settled at {}", gain);
}

#[tokio::test]
async fn preview_shows_on_display_in_idle() {
    let mut app = appliance(SensorModel::Imx519, 0.1, RawFormat::Npy).await;

    app.sender.send(ButtonEvent::B).await.unwrap();
    app.machine.tick().await;
    assert_eq!(app.machine.state(), AppState::Idle);

    for _ in 0..3 {
        assert_eq!(app.machine.tick().await.action, TickAction::Previewed);
    }
    // Nothing is written outside CAPTURING
    assert!(files_in(app.root.path()).is_empty());
}
