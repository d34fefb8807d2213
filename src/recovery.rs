use crate::config::SystemConfig;
use crate::error::PisnapError;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};

/// What the supervisor should do after a component failed
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Restart the component after waiting
    RetryAfterDelay(Duration),
    /// Give up and shut the process down
    Shutdown,
}

/// Restart budget and back-off
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Consecutive restarts allowed before giving up
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay between restarts
    pub max_delay: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self::from(&SystemConfig::default())
    }
}

impl From<&SystemConfig> for RecoveryConfig {
    fn from(system: &SystemConfig) -> Self {
        Self {
            max_retries: system.max_restarts,
            base_delay: Duration::from_millis(system.restart_base_delay_ms),
            max_delay: Duration::from_millis(system.restart_max_delay_ms),
        }
    }
}

/// Tracks consecutive failures per component and turns them into back-off
/// delays
#[derive(Debug)]
pub struct RecoveryManager {
    config: RecoveryConfig,
    retry_counts: HashMap<String, u32>,
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self::with_config(RecoveryConfig::default())
    }

    pub fn with_config(config: RecoveryConfig) -> Self {
        Self {
            config,
            retry_counts: HashMap::new(),
        }
    }

    /// Decide how to react to a failure of `component`
    pub fn handle_error(&mut self, component: &str, error: &PisnapError) -> RecoveryAction {
        if !error.is_recoverable() {
            warn!("Non-recoverable error in {}: {}", component, error);
            return RecoveryAction::Shutdown;
        }

        let retry_count = self.get_retry_count(component);
        if retry_count >= self.config.max_retries {
            error!(
                "Maximum restarts ({}) exceeded for {}: {}",
                self.config.max_retries, component, error
            );
            return RecoveryAction::Shutdown;
        }

        self.retry_counts
            .insert(component.to_string(), retry_count + 1);
        let delay = self.calculate_delay(retry_count);

        info!(
            "Scheduling restart of {} in {:?} (attempt {}/{}): {}",
            component,
            delay,
            retry_count + 1,
            self.config.max_retries,
            error
        );
        RecoveryAction::RetryAfterDelay(delay)
    }

    /// Forget past failures once the component has proven healthy
    pub fn reset_retry_count(&mut self, component: &str) {
        if self.retry_counts.remove(component).is_some() {
            info!("{} healthy again, restart budget reset", component);
        }
    }

    fn calculate_delay(&self, retry_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_count);
        self.config
            .base_delay
            .saturating_mul(factor)
            .min(self.config.max_delay)
    }

    pub fn get_retry_count(&self, component: &str) -> u32 {
        self.retry_counts.get(component).copied().unwrap_or(0)
    }

    pub fn has_exceeded_retry_limit(&self, component: &str) -> bool {
        self.get_retry_count(component) >= self.config.max_retries
    }
}
