use serde::{Deserialize, Serialize};

/// Events that can trigger task state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    /// Bind the task to its robot
    Assign,
    /// Begin executing steps
    Start,
    /// Halt at the next step boundary
    Pause,
    /// Continue a paused task
    Resume,
    /// All steps finished
    Complete,
    /// A step or a safety relocation failed
    Fail(String),
    /// Cancel the task
    Cancel,
    /// Operator-triggered re-run of a failed task from its failed step
    Retry,
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
            Self::Retry => "retry",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
