use super::*;
use crate::camera::{CameraMetadata, ControlRequest};
use crate::frame::RawFrame;
use crate::sensor::SensorModel;
use crate::testing::MockCamera;

fn raw_frame(level: u16) -> RawFrame {
    RawFrame::new(4, 4, vec![level; 16]).unwrap()
}

fn controller_for(model: SensorModel, mode: ExposureMode) -> ExposureController {
    let mut controller = ExposureController::new(mode);
    controller.register(0, model.profile());
    controller
}

#[test]
fn test_smart_correction_gate() {
    use ExposureMode::*;

    // Sensor without hardware AE: everything but manual
    let mono = |mode| controller_for(SensorModel::PivarietyGsMono, mode);
    assert!(mono(Auto).should_use_smart_correction(0));
    assert!(mono(GainPriority).should_use_smart_correction(0));
    assert!(mono(SmartAuto).should_use_smart_correction(0));
    assert!(!mono(Manual).should_use_smart_correction(0));

    // Sensor with hardware AE: only the smart modes
    let color = |mode| controller_for(SensorModel::Imx519, mode);
    assert!(!color(Auto).should_use_smart_correction(0));
    assert!(!color(EtimePriority).should_use_smart_correction(0));
    assert!(!color(Manual).should_use_smart_correction(0));
    assert!(color(SmartAutoAction).should_use_smart_correction(0));
    assert!(color(SmartAutoLowNoise).should_use_smart_correction(0));

    // Unknown camera
    assert!(!mono(Auto).should_use_smart_correction(7));
}

#[test]
fn test_suggest_correction_sign() {
    let controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::Auto);

    assert_eq!(controller.suggest_correction(0, false, &raw_frame(0)), 0.0);

    let dark = controller.suggest_correction(0, false, &raw_frame(100));
    assert!(dark > 0.0);

    let bright = controller.suggest_correction(0, false, &raw_frame(3000));
    assert!(bright < 0.0);

    // Target is 18% of 4095, so a frame at a quarter of the target is two stops under
    let quarter = (0.18 * 4095.0 / 4.0) as u16;
    let stops = controller.suggest_correction(0, false, &raw_frame(quarter));
    assert!((stops - 2.0).abs() < 0.01);
}

#[test]
fn test_suggest_correction_uses_preview_white_level() {
    let controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::Auto);
    let preview = crate::frame::PreviewFrame::new(2, 2, vec![46; 12]).unwrap();
    let stops = controller.suggest_correction(0, true, &preview);
    assert!(stops.abs() < 0.01);
}

#[tokio::test]
async fn test_apply_zero_is_idempotent() {
    let mut controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::Auto);
    let (mut camera, probe) = MockCamera::new(0);

    assert!(controller.apply_correction(&mut camera, 1.0).await.unwrap());
    let gain = controller.handle(0).unwrap().last_gain;
    assert_eq!(gain, 2.0);

    let writes = probe.control_writes().len();
    assert!(!controller.apply_correction(&mut camera, 0.0).await.unwrap());
    assert_eq!(controller.handle(0).unwrap().last_gain, gain);
    assert_eq!(probe.control_writes().len(), writes);
}

#[tokio::test]
async fn test_apply_correction_stays_in_bounds() {
    let mut controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::Auto);
    let (mut camera, probe) = MockCamera::new(0);
    let profile = SensorModel::PivarietyGsMono.profile();

    for stops in [3.0, 10.0, -1.5, -20.0, 0.7, 25.0] {
        controller.apply_correction(&mut camera, stops).await.unwrap();
        let gain = controller.handle(0).unwrap().last_gain;
        assert!(gain >= profile.gain_min && gain <= profile.gain_max);
    }

    // Already at the ceiling: further positive corrections write nothing
    let writes = probe.control_writes().len();
    assert!(!controller.apply_correction(&mut camera, 1.0).await.unwrap());
    assert_eq!(probe.control_writes().len(), writes);
    assert_eq!(controller.handle(0).unwrap().last_gain, profile.gain_max);
}

#[tokio::test]
async fn test_correction_never_touches_exposure() {
    let mut controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::Auto);
    let (mut camera, probe) = MockCamera::new(0);

    controller.apply_correction(&mut camera, 1.5).await.unwrap();

    let writes = probe.control_writes();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].exposure_us.is_none());
    assert_eq!(controller.handle(0).unwrap().last_exposure_us, 10_000);
}

#[tokio::test]
async fn test_failed_write_keeps_intent() {
    let mut controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::Auto);
    let (mut camera, probe) = MockCamera::new(0);
    probe.fail_next_control_writes(1);

    let result = controller.apply_correction(&mut camera, 1.0).await;
    assert!(matches!(result, Err(crate::error::CameraError::ControlWrite { .. })));
    assert_eq!(controller.handle(0).unwrap().last_gain, 2.0);
}

#[tokio::test]
async fn test_configure_manual_on_sensor_without_ae() {
    let mut controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::GainPriority);
    let (mut camera, probe) = MockCamera::new(0);

    controller
        .configure(&mut camera, Some(4.0), Some(20_000))
        .await
        .unwrap();

    assert_eq!(probe.control_writes(), vec![ControlRequest::manual(4.0, 20_000)]);
    let handle = controller.handle(0).unwrap();
    assert_eq!(handle.last_gain, 4.0);
    assert_eq!(handle.last_exposure_us, 20_000);
    assert!(!handle.hardware_ae);
}

#[tokio::test]
async fn test_configure_delegates_to_hardware_ae() {
    let (mut camera, probe) = MockCamera::new(0);

    let mut gain_priority = controller_for(SensorModel::Imx519, ExposureMode::GainPriority);
    gain_priority
        .configure(&mut camera, Some(3.0), None)
        .await
        .unwrap();

    let mut etime_priority = controller_for(SensorModel::Imx519, ExposureMode::EtimePriority);
    etime_priority
        .configure(&mut camera, None, Some(5_000))
        .await
        .unwrap();

    let mut auto = controller_for(SensorModel::Imx519, ExposureMode::Auto);
    auto.configure(&mut camera, None, None).await.unwrap();

    let writes = probe.control_writes();
    assert_eq!(
        writes[0],
        ControlRequest {
            ae_enable: Some(true),
            manual_gain: Some(true),
            gain: Some(3.0),
            exposure_us: None,
        }
    );
    assert_eq!(
        writes[1],
        ControlRequest {
            ae_enable: Some(true),
            manual_gain: Some(false),
            gain: None,
            exposure_us: Some(5_000),
        }
    );
    assert_eq!(
        writes[2],
        ControlRequest {
            ae_enable: Some(true),
            manual_gain: Some(false),
            gain: None,
            exposure_us: None,
        }
    );
    assert!(auto.handle(0).unwrap().hardware_ae);
}

#[tokio::test]
async fn test_configure_clamps_and_defaults() {
    let mut controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::Manual);
    let (mut camera, _probe) = MockCamera::new(0);

    controller.configure(&mut camera, Some(64.0), None).await.unwrap();
    let handle = controller.handle(0).unwrap();
    assert_eq!(handle.last_gain, 16.0);
    assert_eq!(handle.last_exposure_us, 10_000);
}

#[tokio::test]
async fn test_configure_failure_still_tracks_intent() {
    let mut controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::Manual);
    let (mut camera, probe) = MockCamera::new(0);
    probe.fail_next_control_writes(1);

    assert!(controller.configure(&mut camera, Some(2.0), Some(15_000)).await.is_err());
    let handle = controller.handle(0).unwrap();
    assert_eq!(handle.last_gain, 2.0);
    assert_eq!(handle.last_exposure_us, 15_000);
}

#[tokio::test]
async fn test_unregistered_camera_rejected() {
    let mut controller = ExposureController::new(ExposureMode::Auto);
    let (mut camera, _probe) = MockCamera::new(3);

    assert!(matches!(
        controller.configure(&mut camera, None, None).await,
        Err(crate::error::CameraError::UnknownCamera { index: 3 })
    ));
}

#[tokio::test]
async fn test_dark_frame_raises_gain_without_hardware_ae() {
    let mut controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::Auto);
    let (mut camera, probe) = MockCamera::new(0);
    controller.configure(&mut camera, None, None).await.unwrap();

    assert!(controller.should_use_smart_correction(0));

    let dark = raw_frame(20);
    let stops = controller.suggest_correction(0, false, &dark);
    assert!(stops > CORRECTION_DEADBAND_STOPS);

    let applied = controller
        .maybe_correct(&mut camera, false, &dark)
        .await
        .unwrap();
    assert_eq!(applied, Some(stops));

    let gain = controller.handle(0).unwrap().last_gain;
    assert!(gain > 1.0);
    // log2(737/20) is over five stops, past the 16x ceiling
    assert_eq!(gain, 16.0);
    assert_eq!(probe.last_written_gain(), Some(16.0));
}

#[tokio::test]
async fn test_deadband_suppresses_small_corrections() {
    let mut controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::SmartAuto);
    let (mut camera, probe) = MockCamera::new(0);

    // 0.1 stops under target
    let level = (0.18 * 4095.0 / 2f64.powf(0.1)) as u16;
    let applied = controller
        .maybe_correct(&mut camera, false, &raw_frame(level))
        .await
        .unwrap();
    assert_eq!(applied, None);
    assert!(probe.control_writes().is_empty());
}

#[tokio::test]
async fn test_manual_mode_never_corrects() {
    let mut controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::Manual);
    let (mut camera, probe) = MockCamera::new(0);

    let applied = controller
        .maybe_correct(&mut camera, false, &raw_frame(10))
        .await
        .unwrap();
    assert_eq!(applied, None);
    assert!(probe.control_writes().is_empty());
}

#[tokio::test]
async fn test_reconcile_reports_divergence() {
    let mut controller = controller_for(SensorModel::PivarietyGsMono, ExposureMode::Manual);
    let (mut camera, probe) = MockCamera::new(0);
    controller.configure(&mut camera, Some(2.0), None).await.unwrap();

    assert!(controller.reconcile(&mut camera).await.unwrap());

    probe.state().reported = Some(CameraMetadata {
        gain: 5.0,
        exposure_us: 10_000,
        ae_enabled: false,
    });
    assert!(!controller.reconcile(&mut camera).await.unwrap());
}

#[test]
fn test_mode_names() {
    assert_eq!(ExposureMode::default(), ExposureMode::Auto);
    assert_eq!(ExposureMode::SmartAutoLowNoise.to_string(), "smart-auto-low-noise");
    assert_eq!(ExposureMode::GainPriority.hardware_priority(), Some(AePriority::Gain));
    assert_eq!(ExposureMode::SmartAuto.hardware_priority(), None);
}
