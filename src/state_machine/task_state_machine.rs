use super::errors::{StateMachineError, StateMachineResult};
use super::events::TaskEvent;
use super::guards::TransitionGuard;
use super::states::TaskState;
use crate::models::Task;
use chrono::Utc;
use tracing::debug;

/// Task lifecycle transitions applied to an in-memory task record.
///
/// Persisting the result is the caller's job (see
/// [`super::persistence::TaskPersistence`]); this type only decides whether a
/// transition is legal and stamps the timestamps that go with it.
#[derive(Debug)]
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: TaskState,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskState> {
        use TaskEvent::*;
        use TaskState::*;

        let target = match (current_state, event) {
            (Pending, Assign) => Assigned,
            (Pending | Assigned, Start) => InProgress,
            (InProgress, Pause) => Paused,
            (Paused, Resume) => InProgress,
            (InProgress, TaskEvent::Complete) => Completed,
            (InProgress | Paused, Fail(_)) => Failed,
            (state, Cancel) if !state.is_terminal() => Cancelled,
            (Failed, Retry) => InProgress,
            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Apply `event` to `task`, returning the state it left
    pub fn transition(task: &mut Task, event: &TaskEvent) -> StateMachineResult<TaskState> {
        let from = task.status;
        let to = Self::determine_target_state(from, event)?;
        TransitionGuard::can_transition(from, to, event, task)?;

        let now = Utc::now();
        match event {
            TaskEvent::Start | TaskEvent::Retry => {
                if task.started_at.is_none() {
                    task.started_at = Some(now);
                }
                task.completed_at = None;
            }
            TaskEvent::Complete | TaskEvent::Cancel | TaskEvent::Fail(_) => {
                task.completed_at = Some(now);
                task.sub_status = None;
            }
            TaskEvent::Assign | TaskEvent::Pause | TaskEvent::Resume => {}
        }

        task.status = to;
        task.updated_at = now;

        debug!(
            task_id = %task.id,
            from = %from,
            to = %to,
            event = event.event_type(),
            "Task state transition applied"
        );

        Ok(from)
    }
}
