use crate::error::PersistenceError;
use chrono::{Local, Utc};
use chrono_tz::Tz;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MAX_NAME_SUFFIX: u32 = 1000;

/// Parse an IANA zone name, falling back to UTC
pub fn resolve_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Invalid timezone '{}', falling back to UTC", tz_name);
            chrono_tz::UTC
        }
    }
}

/// Wall clock used for directory and file names
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionClock {
    Local,
    Zone(Tz),
}

impl SessionClock {
    /// `None` or `"local"` selects the host zone
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            None => SessionClock::Local,
            Some(name) if name.eq_ignore_ascii_case("local") => SessionClock::Local,
            Some(name) => SessionClock::Zone(resolve_timezone(name)),
        }
    }

    pub fn format_now(&self, fmt: &str) -> String {
        match self {
            SessionClock::Local => Local::now().format(fmt).to_string(),
            SessionClock::Zone(tz) => Utc::now().with_timezone(tz).format(fmt).to_string(),
        }
    }
}

/// One CAPTURING interval: a fresh directory and a saved-frame counter
#[derive(Debug)]
pub struct CaptureSession {
    directory: PathBuf,
    clock: SessionClock,
    started_at: Instant,
    frames_saved: u64,
    /// Timestamp part and suffix of the previous frame name
    last_stem: Option<(String, u32)>,
}

impl CaptureSession {
    /// Create `<root>/YYYYMMDD_HHMMSS`, adding `_N` when that name is taken
    pub async fn create(root: &Path, clock: SessionClock) -> Result<Self, PersistenceError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| PersistenceError::DirectoryCreation {
                path: root.display().to_string(),
                source,
            })?;

        let stamp = clock.format_now("%Y%m%d_%H%M%S");
        let mut candidate = root.join(&stamp);
        let mut suffix = 0;

        loop {
            match tokio::fs::create_dir(&candidate).await {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorKind::AlreadyExists && suffix < MAX_NAME_SUFFIX => {
                    suffix += 1;
                    candidate = root.join(format!("{}_{}", stamp, suffix));
                }
                Err(source) => {
                    return Err(PersistenceError::DirectoryCreation {
                        path: candidate.display().to_string(),
                        source,
                    })
                }
            }
        }

        info!("Capture session directory: {}", candidate.display());
        Ok(Self {
            directory: candidate,
            clock,
            started_at: Instant::now(),
            frames_saved: 0,
            last_stem: None,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn frames_saved(&self) -> u64 {
        self.frames_saved
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// `IMG_YYYYMMDD_HHMMSS_mmm.<ext>`. Frames within the same millisecond
    /// get a numeric suffix instead of overwriting each other.
    pub fn next_frame_path(&mut self, extension: &str) -> PathBuf {
        let base = format!("IMG_{}", self.clock.format_now("%Y%m%d_%H%M%S_%3f"));
        let mut suffix = match &self.last_stem {
            Some((last_base, last_suffix)) if *last_base == base => last_suffix + 1,
            _ => 0,
        };

        let name = |suffix: u32| match suffix {
            0 => format!("{}.{}", base, extension),
            n => format!("{}_{}.{}", base, n, extension),
        };
        while self.directory.join(name(suffix)).exists() {
            suffix += 1;
        }

        let path = self.directory.join(name(suffix));
        self.last_stem = Some((base, suffix));
        path
    }

    /// `video_cam<index>_YYYYMMDD_HHMMSS.mp4` inside the session directory
    pub fn video_path(&self, camera_index: u32) -> PathBuf {
        self.directory.join(format!(
            "video_cam{}_{}.mp4",
            camera_index,
            self.clock.format_now("%Y%m%d_%H%M%S")
        ))
    }

    /// Count a confirmed save and return the new total
    pub fn record_saved(&mut self) -> u64 {
        self.frames_saved += 1;
        self.frames_saved
    }

    /// Drop a session that never became active, removing its directory if empty
    pub async fn abandon(self) {
        match tokio::fs::remove_dir(&self.directory).await {
            Ok(()) => debug!("Removed unused session directory {}", self.directory.display()),
            Err(e) => debug!(
                "Leaving session directory {} in place: {}",
                self.directory.display(),
                e
            ),
        }
    }
}
