//! Error types for the fleet orchestration core.
//!
//! `FleetError` is the crate-wide taxonomy. Layer-specific errors
//! (state machine, controller transport, configuration) convert into it, and
//! every variant can be flattened into the [`ErrorDetails`] record that is
//! persisted on a failed task.

use crate::config::ConfigurationError;
use crate::controller::ControllerError;
use crate::models::{ActionId, FailReason, PointRole, RobotId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FleetError {
    #[error("Invalid task configuration for task {task_id}: {reason}")]
    InvalidTaskConfiguration { task_id: TaskId, reason: String },

    #[error("Task {0} not found")]
    TaskNotFound(TaskId),

    #[error("Robot {0} not found")]
    RobotNotFound(RobotId),

    #[error("No point could be resolved for role {role} on task {task_id}")]
    PointNotFound { task_id: TaskId, role: PointRole },

    #[error("Movement {action_id} on robot {robot_id} ended without success: {reason}")]
    MovementFailed {
        robot_id: RobotId,
        action_id: ActionId,
        reason: FailReason,
    },

    #[error("Movement {action_id} on robot {robot_id} did not finish within {timeout:?}")]
    MovementTimeout {
        robot_id: RobotId,
        action_id: ActionId,
        timeout: Duration,
    },

    #[error("Robot {robot_id} already has an outstanding movement{}", fmt_action(.action_id))]
    MovementInProgress {
        robot_id: RobotId,
        action_id: Option<ActionId>,
    },

    #[error("Communication error with robot {robot_id}: {reason}")]
    CommunicationError { robot_id: RobotId, reason: String },

    #[error("Action {action} failed on robot {robot_id}: {reason}")]
    ActionFailed {
        robot_id: RobotId,
        action: String,
        reason: String,
    },

    #[error("Cancellation of task {task_id} failed: {reason}")]
    TaskCancellationFailed { task_id: TaskId, reason: String },

    #[error("Task {0} is already being executed")]
    TaskAlreadyRunning(TaskId),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("State machine error: {0}")]
    StateMachine(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

fn fmt_action(action_id: &Option<ActionId>) -> String {
    match action_id {
        Some(id) => format!(" (action {id})"),
        None => String::new(),
    }
}

pub type FleetResult<T> = Result<T, FleetError>;

/// Reason string used when a carrying task has nowhere safe to go.
pub const NO_SAFE_POINT_REASON: &str = "no safe point available for payload relocation";

/// Severity attached to persisted error details and error-log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Structured failure record persisted on a task and broadcast with its delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    pub severity: ErrorSeverity,
    pub requires_immediate_attention: bool,
    /// Controller-provided reason, passed through verbatim when present
    pub reason: Option<String>,
    /// Name of the step that was running when the failure happened
    pub step_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorDetails {
    pub fn with_step(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = Some(step_name.into());
        self
    }
}

impl FleetError {
    /// Stable machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTaskConfiguration { .. } => "INVALID_TASK_CONFIGURATION",
            Self::TaskNotFound(_) => "TASK_NOT_FOUND",
            Self::RobotNotFound(_) => "ROBOT_NOT_FOUND",
            Self::PointNotFound { .. } => "POINT_NOT_FOUND",
            Self::MovementFailed { .. } => "MOVEMENT_FAILED",
            Self::MovementTimeout { .. } => "MOVEMENT_TIMEOUT",
            Self::MovementInProgress { .. } => "MOVEMENT_IN_PROGRESS",
            Self::CommunicationError { .. } => "COMMUNICATION_ERROR",
            Self::ActionFailed { .. } => "ACTION_FAILED",
            Self::TaskCancellationFailed { .. } => "TASK_CANCELLATION_FAILED",
            Self::TaskAlreadyRunning(_) => "TASK_ALREADY_RUNNING",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::StateMachine(_) => "STATE_MACHINE_ERROR",
            Self::StoreError(_) => "STORE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::TaskCancellationFailed { .. } => ErrorSeverity::Critical,
            Self::MovementFailed { .. }
            | Self::MovementTimeout { .. }
            | Self::ActionFailed { .. }
            | Self::CommunicationError { .. }
            | Self::PointNotFound { .. }
            | Self::StoreError(_) => ErrorSeverity::High,
            Self::MovementInProgress { .. }
            | Self::TaskAlreadyRunning(_)
            | Self::InvalidState(_)
            | Self::StateMachine(_) => ErrorSeverity::Medium,
            Self::InvalidTaskConfiguration { .. }
            | Self::TaskNotFound(_)
            | Self::RobotNotFound(_)
            | Self::Configuration(_) => ErrorSeverity::Low,
        }
    }

    /// Whether an operator has to look at the robot before anything else runs
    pub fn requires_immediate_attention(&self) -> bool {
        matches!(
            self,
            Self::TaskCancellationFailed { .. }
                | Self::MovementTimeout { .. }
                | Self::CommunicationError { .. }
        )
    }

    /// Controller reason carried by this error, if any
    pub fn controller_reason(&self) -> Option<String> {
        match self {
            Self::MovementFailed { reason, .. } => Some(reason.message.clone()),
            Self::ActionFailed { reason, .. } => Some(reason.clone()),
            Self::TaskCancellationFailed { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn to_error_details(&self) -> ErrorDetails {
        ErrorDetails {
            code: self.error_code().to_string(),
            message: self.to_string(),
            severity: self.severity(),
            requires_immediate_attention: self.requires_immediate_attention(),
            reason: self.controller_reason(),
            step_name: None,
            occurred_at: Utc::now(),
        }
    }
}

impl From<ControllerError> for FleetError {
    fn from(err: ControllerError) -> Self {
        FleetError::CommunicationError {
            robot_id: err.robot_id().to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<ConfigurationError> for FleetError {
    fn from(err: ConfigurationError) -> Self {
        FleetError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        FleetError::StoreError(format!("JSON serialization error: {err}"))
    }
}
