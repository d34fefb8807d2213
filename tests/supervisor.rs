use pisnap::config::PisnapConfig;
use pisnap::testing::{MemorySink, MockMachineFactory};
use pisnap::{
    event_channel, AppState, ButtonEvent, CameraMode, CaptureSupervisor, MachineSettings,
    SharedStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn test_config(root: &TempDir) -> PisnapConfig {
    let mut config = PisnapConfig::default();
    config.capture.path = root.path().display().to_string();
    config.timing.preview_tick_ms = 5;
    config.timing.capture_tick_ms = 2;
    config.timing.off_tick_ms = 5;
    config.timing.watchdog_timeout_ms = 100;
    config.timing.watchdog_check_ms = 10;
    config.system.restart_base_delay_ms = 10;
    config.system.restart_max_delay_ms = 40;
    config.system.shutdown_timeout_ms = 500;
    config
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn hung_capture_task_is_restarted() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (sender, receiver) = event_channel(8);
    let factory = Arc::new(MockMachineFactory::new(
        MachineSettings::from_config(&config),
        receiver,
        MemorySink::new(),
    ));
    factory.hang_next_builds(1);

    let status = Arc::new(SharedStatus::new(CancellationToken::new()));
    let supervisor = CaptureSupervisor::from_config(&config, factory.clone(), Arc::clone(&status));
    let task = tokio::spawn(supervisor.run());

    // Entering IDLE makes the first camera's preview capture hang
    sender.send(ButtonEvent::B).await.unwrap();
    wait_for(|| factory.builds() == 2).await;

    assert_eq!(status.restarts(), 1);
    let first = factory.camera(0).unwrap();
    assert_eq!(first.releases(), 1);
    assert_eq!(factory.display(0).unwrap().releases(), 1);

    // The replacement starts from OFF and keeps ticking
    wait_for(|| factory.camera(1).unwrap().mode() == Some(CameraMode::Preview)).await;
    sender.send(ButtonEvent::A).await.unwrap();
    wait_for(|| status.state() == AppState::Capturing).await;
    wait_for(|| status.frames_saved() > 0).await;

    status.request_shutdown();
    task.await.unwrap().unwrap();
    assert_eq!(factory.camera(1).unwrap().releases(), 1);
    assert_eq!(first.releases(), 1);
}

#[tokio::test]
async fn healthy_task_is_left_alone() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (_sender, receiver) = event_channel(8);
    let factory = Arc::new(MockMachineFactory::new(
        MachineSettings::from_config(&config),
        receiver,
        MemorySink::new(),
    ));

    let status = Arc::new(SharedStatus::new(CancellationToken::new()));
    let supervisor = CaptureSupervisor::from_config(&config, factory.clone(), Arc::clone(&status));
    let task = tokio::spawn(supervisor.run());

    // Several watchdog periods in OFF
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(factory.builds(), 1);
    assert_eq!(status.restarts(), 0);

    status.request_shutdown();
    task.await.unwrap().unwrap();
    assert_eq!(factory.camera(0).unwrap().releases(), 1);
}

#[tokio::test]
async fn failed_device_open_is_retried() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (_sender, receiver) = event_channel(8);
    let factory = Arc::new(MockMachineFactory::new(
        MachineSettings::from_config(&config),
        receiver,
        MemorySink::new(),
    ));
    factory.fail_next_builds(2);

    let status = Arc::new(SharedStatus::new(CancellationToken::new()));
    let supervisor = CaptureSupervisor::from_config(&config, factory.clone(), Arc::clone(&status));
    let task = tokio::spawn(supervisor.run());

    wait_for(|| factory.builds() == 1).await;
    assert!(status.is_running());

    status.request_shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn slow_startup_is_cancelled_and_released() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (_sender, receiver) = event_channel(8);
    let factory = Arc::new(
        MockMachineFactory::new(
            MachineSettings::from_config(&config),
            receiver,
            MemorySink::new(),
        )
        .with_settle_delay(Duration::from_millis(5100)),
    );

    let status = Arc::new(SharedStatus::new(CancellationToken::new()));
    let supervisor = CaptureSupervisor::from_config(&config, factory.clone(), Arc::clone(&status));
    let task = tokio::spawn(supervisor.run());

    // Each startup outlasts the watchdog timeout
    wait_for(|| factory.builds() >= 2).await;
    assert_eq!(factory.camera(0).unwrap().releases(), 1);
    assert_eq!(factory.display(0).unwrap().releases(), 1);

    status.request_shutdown();
    let _ = task.await.unwrap();
    for build in 0..factory.builds() {
        assert_eq!(factory.camera(build).unwrap().releases(), 1);
        assert_eq!(factory.display(build).unwrap().releases(), 1);
    }
}

#[tokio::test]
async fn aborted_task_still_releases_hardware() {
    let root = TempDir::new().unwrap();
    let config = test_config(&root);
    let (_sender, receiver) = event_channel(8);
    let factory = Arc::new(MockMachineFactory::new(
        MachineSettings::from_config(&config),
        receiver,
        MemorySink::new(),
    ));
    factory.hang_release_next_builds(1);

    let status = Arc::new(SharedStatus::new(CancellationToken::new()));
    let supervisor = CaptureSupervisor::from_config(&config, factory.clone(), Arc::clone(&status));
    let task = tokio::spawn(supervisor.run());
    wait_for(|| factory.camera(0).map_or(false, |camera| camera.mode().is_some())).await;

    // Release hangs during shutdown, so the task is aborted after the stop timeout
    status.request_shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_err());
    assert_eq!(factory.camera(0).unwrap().releases(), 1);
    assert_eq!(factory.display(0).unwrap().releases(), 1);
}
