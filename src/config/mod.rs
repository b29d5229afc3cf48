//! # Configuration
//!
//! Runtime settings for the orchestration core. Every field has a default,
//! so an empty configuration is valid; [`ConfigManager`] layers a TOML file
//! and `FLEET__`-prefixed environment variables on top of those defaults.
//!
//! ```toml
//! [movement]
//! standard_timeout_secs = 300
//! poll_interval_ms = 2000
//! strategy = "events_with_polling_fallback"
//!
//! [monitor]
//! event_channel_capacity = 256
//! ```

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::controller::topics;
use crate::models::MovementKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub movement: MovementConfig,
    pub monitor: MonitorConfig,
    pub cancellation: CancellationConfig,
    pub broadcast: BroadcastConfig,
}

impl FleetConfig {
    /// Reject values that would make waits or channels degenerate
    pub fn validate(&self) -> ConfigResult<()> {
        let m = &self.movement;
        for (field, value) in [
            ("movement.standard_timeout_secs", m.standard_timeout_secs),
            ("movement.charge_dock_timeout_secs", m.charge_dock_timeout_secs),
            ("movement.rack_align_timeout_secs", m.rack_align_timeout_secs),
            ("movement.unload_timeout_secs", m.unload_timeout_secs),
            ("movement.poll_interval_ms", m.poll_interval_ms),
            ("movement.event_stall_threshold_ms", m.event_stall_threshold_ms),
            (
                "cancellation.idle_wait_timeout_ms",
                self.cancellation.idle_wait_timeout_ms,
            ),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "must be greater than zero",
                ));
            }
        }

        if let Some(accuracy) = m.default_accuracy_m {
            if !(accuracy.is_finite() && accuracy > 0.0) {
                return Err(ConfigurationError::invalid_value(
                    "movement.default_accuracy_m",
                    accuracy,
                    "must be a positive distance in metres",
                ));
            }
        }

        if self.monitor.event_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "monitor.event_channel_capacity",
                0,
                "must be greater than zero",
            ));
        }
        if self.monitor.topics.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "monitor.topics",
                "[]",
                "at least one topic is required",
            ));
        }
        if self.broadcast.capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "broadcast.capacity",
                0,
                "must be greater than zero",
            ));
        }

        Ok(())
    }
}

/// How the movement coordinator learns that a goal finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStrategy {
    /// Wait on monitor events, polling only when no session exists or it stalls
    #[default]
    EventsWithPollingFallback,
    /// Always poll the controller's movement-status query
    PollingOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub standard_timeout_secs: u64,
    pub charge_dock_timeout_secs: u64,
    pub rack_align_timeout_secs: u64,
    pub unload_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Poll even with a live session when no event arrived for this long
    pub event_stall_threshold_ms: u64,
    /// Pause between an undock command and the next goal
    pub undock_settle_ms: u64,
    pub default_accuracy_m: Option<f64>,
    pub strategy: CompletionStrategy,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            standard_timeout_secs: 300,
            charge_dock_timeout_secs: 600,
            rack_align_timeout_secs: 300,
            unload_timeout_secs: 300,
            poll_interval_ms: 2000,
            event_stall_threshold_ms: 10_000,
            undock_settle_ms: 3000,
            default_accuracy_m: None,
            strategy: CompletionStrategy::default(),
        }
    }
}

impl MovementConfig {
    pub fn timeout_for(&self, kind: MovementKind) -> Duration {
        let secs = match kind {
            MovementKind::Standard => self.standard_timeout_secs,
            MovementKind::ChargeDock => self.charge_dock_timeout_secs,
            MovementKind::RackAlign => self.rack_align_timeout_secs,
            MovementKind::Unload => self.unload_timeout_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn event_stall_threshold(&self) -> Duration {
        Duration::from_millis(self.event_stall_threshold_ms)
    }

    pub fn undock_settle(&self) -> Duration {
        Duration::from_millis(self.undock_settle_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub topics: Vec<String>,
    /// Capacity of the per-robot typed event fan-out channel
    pub event_channel_capacity: usize,
    /// Terminal movement states remembered per session for late waiters
    pub terminal_cache_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            topics: topics::DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            event_channel_capacity: 256,
            terminal_cache_size: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CancellationConfig {
    /// How long a cancel waits for the in-flight goal to release the robot
    pub idle_wait_timeout_ms: u64,
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            idle_wait_timeout_ms: 30_000,
        }
    }
}

impl CancellationConfig {
    pub fn idle_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_wait_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = FleetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.movement.timeout_for(MovementKind::Standard),
            Duration::from_secs(300)
        );
        assert_eq!(config.movement.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.monitor.topics.len(), topics::DEFAULT_TOPICS.len());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = FleetConfig::default();
        config.movement.poll_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("movement.poll_interval_ms"));
    }

    #[test]
    fn test_negative_accuracy_rejected() {
        let mut config = FleetConfig::default();
        config.movement.default_accuracy_m = Some(-0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_per_kind_timeouts() {
        let movement = MovementConfig {
            charge_dock_timeout_secs: 42,
            ..Default::default()
        };
        assert_eq!(
            movement.timeout_for(MovementKind::ChargeDock),
            Duration::from_secs(42)
        );
        assert_eq!(
            movement.timeout_for(MovementKind::Unload),
            Duration::from_secs(300)
        );
    }
}
