//! # Movement Model
//!
//! Goals sent to a robot controller and the lifecycle states the controller
//! reports back for them.

use super::{ActionId, Point, RobotId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the controller should do once it reaches the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Standard,
    ChargeDock,
    RackAlign,
    Unload,
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::ChargeDock => write!(f, "charge_dock"),
            Self::RackAlign => write!(f, "rack_align"),
            Self::Unload => write!(f, "unload"),
        }
    }
}

/// Controller-side lifecycle of a movement action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementState {
    Idle,
    Moving,
    Succeeded,
    Failed,
    Cancelled,
}

impl MovementState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for MovementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Moving => write!(f, "moving"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Failure code and message exactly as the controller reported them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailReason {
    pub code: i64,
    pub message: String,
}

impl FailReason {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Reason used when the controller reports `cancelled` without a code
    pub fn cancelled() -> Self {
        Self::new(0, "Cancelled")
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A goal as submitted to the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveGoal {
    pub target: Point,
    pub kind: MovementKind,
    /// Acceptable distance from the target in metres
    pub accuracy: Option<f64>,
}

/// Result of querying, or being told about, one movement action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementStatus {
    pub action_id: ActionId,
    pub state: MovementState,
    pub fail_reason: Option<FailReason>,
    pub remaining_distance: Option<f64>,
}

impl MovementStatus {
    pub fn new(action_id: ActionId, state: MovementState) -> Self {
        Self {
            action_id,
            state,
            fail_reason: None,
            remaining_distance: None,
        }
    }

    pub fn failed(action_id: ActionId, reason: FailReason) -> Self {
        Self {
            action_id,
            state: MovementState::Failed,
            fail_reason: Some(reason),
            remaining_distance: None,
        }
    }
}

/// The coordinator's record of one outstanding goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementAction {
    pub id: ActionId,
    pub robot_id: RobotId,
    pub task_id: Option<TaskId>,
    pub target_point: Point,
    pub kind: MovementKind,
    pub state: MovementState,
    pub fail_reason: Option<FailReason>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MovementAction {
    /// Fold a terminal status into this action
    pub fn finish(&mut self, status: &MovementStatus) {
        self.state = status.state;
        self.fail_reason = status.fail_reason.clone();
        if status.state.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }
}
