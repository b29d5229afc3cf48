use super::errors::{business_rule_violation, GuardResult};
use super::events::TaskEvent;
use super::states::TaskState;
use crate::models::Task;

/// Guard conditions for task state transitions
#[derive(Debug)]
pub struct TransitionGuard;

impl TransitionGuard {
    /// Check if a transition is valid for this task
    pub fn can_transition(
        from: TaskState,
        to: TaskState,
        event: &TaskEvent,
        task: &Task,
    ) -> GuardResult<()> {
        use TaskEvent::*;
        use TaskState::*;

        if from.is_terminal() && !(from.allows_retry() && matches!(event, Retry)) {
            return Err(business_rule_violation(format!(
                "Cannot transition from terminal state {from:?}"
            )));
        }

        let valid = match (from, to, event) {
            (Pending, Assigned, Assign) => true,
            (Pending | Assigned, InProgress, Start) => true,
            (InProgress, Paused, Pause) => true,
            (Paused, InProgress, Resume) => true,
            (InProgress, Completed, Complete) => true,
            (InProgress | Paused, Failed, Fail(_)) => true,
            (Pending | Assigned | InProgress | Paused, Cancelled, Cancel) => true,
            (Failed, InProgress, Retry) => true,
            _ => false,
        };

        if !valid {
            return Err(business_rule_violation(format!(
                "Invalid transition from {from:?} to {to:?} with event {event:?}"
            )));
        }

        // A payload on board must be relocated (and unloaded) before cancelling
        if matches!(event, Cancel) && task.carrying {
            return Err(business_rule_violation(format!(
                "Task {} cannot be cancelled while carrying a payload",
                task.id
            )));
        }

        if matches!(event, Retry) && task.error.is_some() {
            return Err(business_rule_violation(format!(
                "Task {} must have its error details cleared before retry",
                task.id
            )));
        }

        Ok(())
    }
}
