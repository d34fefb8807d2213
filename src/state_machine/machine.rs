use super::types::{AppState, MachineSettings, TickAction, TickOutcome};
use crate::camera::{CameraMode, CameraPort};
use crate::config::CaptureMode;
use crate::display::DisplayPort;
use crate::error::{CameraError, PisnapError, Result};
use crate::events::{ButtonEvent, ButtonEventReceiver};
use crate::exposure::ExposureController;
use crate::frame::{CaptureKind, Frame};
use crate::overlay::OverlayRenderer;
use crate::session::CaptureSession;
use crate::status::SharedStatus;
use crate::storage::FrameSink;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// The capture task. Owns the camera, the display and the current session,
/// and advances one event or one unit of work per tick.
pub struct CaptureStateMachine {
    camera: Box<dyn CameraPort>,
    display: Box<dyn DisplayPort>,
    sink: Arc<dyn FrameSink>,
    exposure: ExposureController,
    events: ButtonEventReceiver,
    renderer: OverlayRenderer,
    status: Arc<SharedStatus>,
    settings: MachineSettings,
    state: AppState,
    session: Option<CaptureSession>,
    /// Session created by a CAPTURING entry that has not completed yet
    pending_session: Option<CaptureSession>,
    started: bool,
    released: bool,
    camera_released: bool,
    display_released: bool,
    input_lost: bool,
}

impl CaptureStateMachine {
    /// The exposure controller must already know the camera's sensor profile.
    pub fn new(
        camera: Box<dyn CameraPort>,
        display: Box<dyn DisplayPort>,
        sink: Arc<dyn FrameSink>,
        exposure: ExposureController,
        events: ButtonEventReceiver,
        status: Arc<SharedStatus>,
        settings: MachineSettings,
    ) -> Self {
        let renderer = OverlayRenderer::new(display.resolution());
        Self {
            camera,
            display,
            sink,
            exposure,
            events,
            renderer,
            status,
            settings,
            state: AppState::Off,
            session: None,
            pending_session: None,
            started: false,
            released: false,
            camera_released: false,
            display_released: false,
            input_lost: false,
        }
    }

    pub fn with_renderer(mut self, renderer: OverlayRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn exposure(&self) -> &ExposureController {
        &self.exposure
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Enter OFF, apply the configured exposure and bring the camera up in
    /// preview mode. Transient camera failures are logged and tolerated.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        info!(
            "Starting capture state machine (camera {}, {} capture, {} exposure)",
            self.camera.index(),
            self.settings.capture_mode,
            self.exposure.mode()
        );

        self.enter_off().await;

        match self
            .camera
            .configure_mode(CameraMode::Preview)
            .await
        {
            Ok(()) => self
                .exposure
                .record_mode(self.camera.index(), CameraMode::Preview),
            Err(e) => warn!("Initial preview configuration failed: {}", e),
        }

        self.status.touch();
        match self
            .exposure
            .configure(
                self.camera.as_mut(),
                self.settings.requested_gain,
                self.settings.requested_exposure_us,
            )
            .await
        {
            Ok(()) => {
                if let Err(e) = self.exposure.reconcile(self.camera.as_mut()).await {
                    debug!("Could not read back camera controls: {}", e);
                }
            }
            Err(e) if e.is_transient() => warn!("Initial exposure configuration failed: {}", e),
            Err(e) => return Err(PisnapError::from(e)),
        }

        self.started = true;
        self.status.touch();
        Ok(())
    }

    /// One scheduling step: consume at most one event, otherwise do the
    /// current state's periodic work. Never fails.
    pub async fn tick(&mut self) -> TickOutcome {
        self.status.touch();

        if self.released {
            return self.outcome(None, TickAction::Released);
        }

        let event = match self.events.try_next() {
            Ok(event) => event,
            Err(e) => {
                if !self.input_lost {
                    warn!("Button input unavailable, continuing without it: {}", e);
                    self.input_lost = true;
                }
                None
            }
        };

        let transition = match event {
            Some(event) => self.handle_event(event).await,
            None => None,
        };
        let action = match transition {
            Some(action) => action,
            None => self.run_periodic().await,
        };

        self.status.set_state(self.state);
        self.status.touch();
        self.outcome(event, action)
    }

    /// Tick until cancelled, then hand the hardware back.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        self.run_until_cancelled(cancel).await
    }

    /// [`run`](Self::run) without giving up ownership, so the owner can
    /// still release the hardware if this future is dropped midway.
    pub async fn run_until_cancelled(&mut self, cancel: CancellationToken) -> Result<()> {
        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            started = self.start() => Some(started),
        };
        match started {
            None => {
                info!("Capture state machine cancelled during startup");
                self.shutdown().await;
                return Ok(());
            }
            Some(Err(e)) => {
                error!("Capture state machine failed to start: {}", e);
                self.shutdown().await;
                return Err(e);
            }
            Some(Ok(())) => {}
        }

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.tick() => outcome,
            };
            trace!("Tick in {}: {:?}", self.state, outcome.action);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(outcome.next_delay) => {}
            }
        }

        info!("Capture loop cancelled in {}", self.state);
        self.shutdown().await;
        Ok(())
    }

    /// Force OFF and release the camera and display. Safe to call repeatedly,
    /// including after an earlier call was dropped midway: each device's
    /// release completes at most once.
    pub async fn shutdown(&mut self) {
        if self.released {
            debug!("Capture hardware already released");
            return;
        }
        info!("Shutting down capture state machine from {}", self.state);

        if let Some(session) = self.pending_session.take() {
            session.abandon().await;
        }
        if !self.camera_released && self.camera.is_recording() {
            if let Err(e) = self.camera.stop_recording().await {
                warn!("Failed to stop recording: {}", e);
            }
        }
        self.close_session();
        if !self.display_released {
            self.enter_off().await;
        }
        self.state = AppState::Off;
        self.status.set_state(AppState::Off);

        if !self.camera_released {
            if let Err(e) = self.camera.release().await {
                warn!("Failed to release camera {}: {}", self.camera.index(), e);
            }
            self.camera_released = true;
        }
        if !self.display_released {
            if let Err(e) = self.display.release().await {
                warn!("Failed to release display: {}", e);
            }
            self.display_released = true;
        }
        self.released = true;
        info!("Camera and display released");
    }

    fn outcome(&self, event: Option<ButtonEvent>, action: TickAction) -> TickOutcome {
        TickOutcome {
            event,
            action,
            next_delay: self.settings.tick_delay(self.state),
        }
    }

    /// Apply the transition table. `None` means the event did not move the
    /// machine and the tick falls through to periodic work.
    async fn handle_event(&mut self, event: ButtonEvent) -> Option<TickAction> {
        let from = self.state;
        debug!("Button {} in {}", event, from);

        let moved = match (from, event) {
            (AppState::Off | AppState::Idle, ButtonEvent::A) => self.enter_capturing().await,
            (AppState::Off, ButtonEvent::B) => self.enter_idle().await,
            (AppState::Idle, ButtonEvent::B) => {
                self.enter_off().await;
                true
            }
            (AppState::Capturing, ButtonEvent::A) => {
                debug!("Already capturing, ignoring button A");
                false
            }
            (AppState::Capturing, ButtonEvent::B) => self.leave_capturing().await,
        };

        if !moved {
            return None;
        }
        info!("State transition: {} -> {}", from, self.state);
        Some(TickAction::Transition {
            from,
            to: self.state,
        })
    }

    async fn enter_off(&mut self) {
        if let Err(e) = self.display.set_backlight(false).await {
            warn!("Failed to switch backlight off: {}", e);
        }
        if let Err(e) = self.display.clear().await {
            warn!("Failed to clear display: {}", e);
        }
        self.state = AppState::Off;
    }

    async fn enter_idle(&mut self) -> bool {
        let index = self.camera.index();
        if let Err(e) = self.camera.configure_mode(CameraMode::Preview).await {
            warn!("Cannot enter IDLE: {}", e);
            return false;
        }
        self.exposure.record_mode(index, CameraMode::Preview);

        if let Err(e) = self.display.set_backlight(true).await {
            warn!("Failed to switch backlight on: {}", e);
        }
        self.state = AppState::Idle;
        true
    }

    /// Open a fresh session and switch the camera to still mode. Any failure
    /// leaves the state where it was and removes the empty session.
    async fn enter_capturing(&mut self) -> bool {
        let index = self.camera.index();
        let session =
            match CaptureSession::create(&self.settings.capture_root, self.settings.clock).await {
                Ok(session) => session,
                Err(e) => {
                    warn!("Cannot enter CAPTURING: {}", e);
                    return false;
                }
            };
        let video_path = session.video_path(index);
        self.pending_session = Some(session);

        if let Err(e) = self.camera.configure_mode(CameraMode::Still).await {
            warn!("Cannot enter CAPTURING: {}", e);
            self.abandon_pending_session().await;
            return false;
        }
        self.exposure.record_mode(index, CameraMode::Still);

        if self.settings.capture_mode == CaptureMode::Video {
            if let Err(e) = self.camera.start_recording(&video_path).await {
                warn!("Cannot enter CAPTURING: {}", e);
                self.abandon_pending_session().await;
                self.restore_preview().await;
                return false;
            }
        }

        if let Err(e) = self.display.set_backlight(true).await {
            warn!("Failed to switch backlight on: {}", e);
        }
        let Some(session) = self.pending_session.take() else {
            return false;
        };
        info!("Capture session opened at {}", session.directory().display());
        self.session = Some(session);
        self.state = AppState::Capturing;
        true
    }

    async fn abandon_pending_session(&mut self) {
        if let Some(session) = self.pending_session.take() {
            session.abandon().await;
        }
    }

    /// Back to preview after a failed CAPTURING entry from IDLE
    async fn restore_preview(&mut self) {
        if self.state != AppState::Idle {
            return;
        }
        match self.camera.configure_mode(CameraMode::Preview).await {
            Ok(()) => self
                .exposure
                .record_mode(self.camera.index(), CameraMode::Preview),
            Err(e) => warn!("Failed to restore preview mode: {}", e),
        }
    }

    async fn leave_capturing(&mut self) -> bool {
        if self.camera.is_recording() {
            if let Err(e) = self.camera.stop_recording().await {
                warn!("Failed to stop recording: {}", e);
            }
        }
        if !self.enter_idle().await {
            return false;
        }
        self.close_session();
        true
    }

    fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            info!(
                "Capture session {} closed with {} frames after {:.1}s",
                session.directory().display(),
                session.frames_saved(),
                session.elapsed().as_secs_f64()
            );
        }
    }

    async fn run_periodic(&mut self) -> TickAction {
        match self.state {
            AppState::Off => TickAction::Standby,
            AppState::Idle => self.preview_step().await,
            AppState::Capturing => match self.settings.capture_mode {
                CaptureMode::Raw => self.still_step(CaptureKind::RawStill).await,
                CaptureMode::Jpeg => self.still_step(CaptureKind::EncodedStill).await,
                CaptureMode::Video => self.recording_step().await,
            },
        }
    }

    /// IDLE: one preview frame, exposure gate, histogram overlay
    async fn preview_step(&mut self) -> TickAction {
        let preview = match self.camera.capture_frame(CaptureKind::Preview).await {
            Ok(Frame::Preview(preview)) => preview,
            Ok(other) => {
                warn!("Expected a preview frame, got {:?}", other.kind());
                return TickAction::PreviewMissed;
            }
            Err(e) => {
                debug!("Preview frame missed: {}", e);
                return TickAction::PreviewMissed;
            }
        };

        self.correct_exposure(true, &preview).await;

        match self.renderer.preview_with_histogram(&preview) {
            Ok(image) => {
                if let Err(e) = self.display.render_image(&image).await {
                    warn!("Failed to render preview: {}", e);
                }
            }
            Err(e) => warn!("Failed to compose preview: {}", e),
        }
        TickAction::Previewed
    }

    /// CAPTURING: one still, exposure gate for raw frames, persist, counter
    async fn still_step(&mut self, kind: CaptureKind) -> TickAction {
        let action = match self.camera.capture_frame(kind).await {
            Ok(frame) => {
                if let Frame::Raw(raw) = &frame {
                    self.correct_exposure(false, raw).await;
                }
                self.persist(&frame).await
            }
            Err(e) => {
                debug!("Still frame missed: {}", e);
                TickAction::CaptureMissed
            }
        };

        let count = self
            .session
            .as_ref()
            .map(CaptureSession::frames_saved)
            .unwrap_or(0);
        let screen = self.renderer.capture_counter_screen(count);
        if let Err(e) = self.display.render_image(&screen).await {
            warn!("Failed to render capture counter: {}", e);
        }
        action
    }

    async fn persist(&mut self, frame: &Frame) -> TickAction {
        let Some(session) = self.session.as_mut() else {
            error!("CAPTURING without an open session, dropping frame");
            return TickAction::SaveFailed;
        };

        let extension = match self.sink.extension(frame) {
            Ok(extension) => extension,
            Err(e) => {
                warn!("Cannot persist frame: {}", e);
                return TickAction::SaveFailed;
            }
        };
        let path = session.next_frame_path(extension);

        match self.sink.save(&path, frame).await {
            Ok(()) => {
                let count = session.record_saved();
                self.status.record_saved_frame();
                trace!("Saved {} ({} in session)", path.display(), count);
                TickAction::Saved { count }
            }
            Err(e) => {
                warn!("Failed to save frame: {}", e);
                TickAction::SaveFailed
            }
        }
    }

    /// CAPTURING in video mode: keep the recording alive and show elapsed time
    async fn recording_step(&mut self) -> TickAction {
        let Some(session) = self.session.as_ref() else {
            error!("CAPTURING without an open session");
            return TickAction::CaptureMissed;
        };
        let elapsed = session.elapsed().as_secs();

        if !self.camera.is_recording() {
            let path = session.video_path(self.camera.index());
            if let Err(e) = self.camera.start_recording(&path).await {
                warn!("Failed to restart recording: {}", e);
                return TickAction::CaptureMissed;
            }
        }

        let screen = self.renderer.recording_screen(elapsed);
        if let Err(e) = self.display.render_image(&screen).await {
            warn!("Failed to render recording screen: {}", e);
        }
        TickAction::Recording
    }

    async fn correct_exposure<F>(&mut self, is_preview: bool, frame: &F)
    where
        F: crate::frame::LuminanceSource + Sync + ?Sized,
    {
        match self
            .exposure
            .maybe_correct(self.camera.as_mut(), is_preview, frame)
            .await
        {
            Ok(Some(stops)) => debug!("Exposure corrected by {:+.2} stops", stops),
            Ok(None) => {}
            Err(CameraError::UnknownCamera { index }) => {
                error!("Camera {} missing from exposure controller", index)
            }
            Err(e) => warn!("Exposure correction failed: {}", e),
        }
    }
}
