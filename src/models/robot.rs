//! # Robot Model
//!
//! Persisted robot records, the live snapshot a monitor session keeps, and the
//! error-log entries written when a robot reports faults.

use super::{MovementStatus, RobotId, TaskId};
use crate::errors::ErrorSeverity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    #[default]
    Idle,
    Busy,
    Charging,
    Error,
    LocalizationLost,
    /// Transport trouble; the robot may still be executing its goal
    Degraded,
    Offline,
}

impl RobotStatus {
    /// Statuses that need an operator before the robot is trusted again
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Error | Self::LocalizationLost)
    }
}

impl fmt::Display for RobotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Charging => "charging",
            Self::Error => "error",
            Self::LocalizationLost => "localization_lost",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    pub area_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    pub percentage: f64,
    pub charging: bool,
    /// Engaged with a charging dock; controllers reject moves in this state
    pub docked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Auto,
    Manual,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub mode: ControlMode,
    pub emergency_stop: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationState {
    pub reliable: bool,
    pub quality: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl FaultLevel {
    pub fn is_severe(&self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Info => ErrorSeverity::Low,
            Self::Warning => ErrorSeverity::Medium,
            Self::Error => ErrorSeverity::High,
            Self::Critical => ErrorSeverity::Critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub code: i64,
    pub level: FaultLevel,
    pub message: String,
}

/// Last-known state of a robot, owned by its monitor session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotSnapshot {
    pub robot_id: RobotId,
    pub pose: Option<Pose>,
    pub battery: Option<BatteryState>,
    pub movement: Option<MovementStatus>,
    pub control: Option<ControlState>,
    pub localization: Option<LocalizationState>,
    pub faults: Vec<Fault>,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl RobotSnapshot {
    pub fn new(robot_id: impl Into<RobotId>) -> Self {
        Self {
            robot_id: robot_id.into(),
            ..Default::default()
        }
    }

    pub fn is_docked(&self) -> bool {
        self.battery.as_ref().is_some_and(|b| b.docked || b.charging)
    }
}

/// Summarized robot fields kept in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotRecord {
    pub id: RobotId,
    pub name: String,
    pub status: RobotStatus,
    pub battery_percentage: Option<f64>,
    pub charging: bool,
    pub pose: Option<Pose>,
    pub control_mode: Option<ControlMode>,
    pub emergency_stop: bool,
    pub localization_reliable: bool,
    pub active_faults: Vec<Fault>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl RobotRecord {
    pub fn new(id: impl Into<RobotId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: RobotStatus::Idle,
            battery_percentage: None,
            charging: false,
            pose: None,
            control_mode: None,
            emergency_stop: false,
            localization_reliable: true,
            active_faults: Vec::new(),
            last_seen_at: None,
        }
    }
}

/// Durable record of a robot-side problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogRecord {
    pub id: Uuid,
    pub robot_id: RobotId,
    pub task_id: Option<TaskId>,
    pub code: String,
    pub message: String,
    pub severity: ErrorSeverity,
    pub created_at: DateTime<Utc>,
}

impl ErrorLogRecord {
    pub fn new(
        robot_id: impl Into<RobotId>,
        code: impl Into<String>,
        message: impl Into<String>,
        severity: ErrorSeverity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            robot_id: robot_id.into(),
            task_id: None,
            code: code.into(),
            message: message.into(),
            severity,
            created_at: Utc::now(),
        }
    }
}
