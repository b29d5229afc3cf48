use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created, not yet bound to a robot run
    #[default]
    Pending,
    /// Bound to its robot and waiting for execution
    Assigned,
    /// Steps are being executed
    InProgress,
    /// Execution halted by an operator at a step boundary
    Paused,
    /// All steps finished
    Completed,
    /// A step failed; may be retried by an operator
    Failed,
    /// Cancelled, after safety relocation when the robot was carrying
    Cancelled,
}

impl TaskState {
    /// Check if this is a terminal state (execution will not continue on its own)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if the task currently owns its robot
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Assigned | Self::InProgress | Self::Paused)
    }

    /// Check if an operator may re-run this task from its current step
    pub fn allows_retry(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Assigned => write!(f, "assigned"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_terminal_check() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::InProgress.is_terminal());
        assert!(!TaskState::Paused.is_terminal());
    }

    #[test]
    fn test_active_states() {
        assert!(TaskState::Assigned.is_active());
        assert!(TaskState::InProgress.is_active());
        assert!(TaskState::Paused.is_active());
        assert!(!TaskState::Pending.is_active());
        assert!(!TaskState::Failed.is_active());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(TaskState::InProgress.to_string(), "in_progress");
        assert_eq!("paused".parse::<TaskState>().unwrap(), TaskState::Paused);
        assert!("complete".parse::<TaskState>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&TaskState::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");

        let parsed: TaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TaskState::InProgress);
    }
}
