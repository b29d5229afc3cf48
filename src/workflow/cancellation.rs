//! # Cancellation Safety
//!
//! A cancel must never leave a robot holding cargo with no record of where
//! it will end up. A task that is not carrying is cancelled as soon as its
//! robot has stopped. A carrying task is first driven to its shelf point and
//! unloaded; only then is `cancelled` written. When no shelf point can be
//! found, or the relocation fails, the task ends `failed` with an explicit
//! reason instead.

use super::executor::RunningTasks;
use crate::context::FleetContext;
use crate::errors::{FleetError, FleetResult, NO_SAFE_POINT_REASON};
use crate::models::{MovementKind, PointRole, SubStatus, Task, TaskId};
use crate::state_machine::{TaskEvent, TaskStateMachine};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

const HALT_POLL: Duration = Duration::from_millis(100);

pub struct CancellationProtocol {
    context: Arc<FleetContext>,
    running: Arc<RunningTasks>,
}

impl std::fmt::Debug for CancellationProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationProtocol")
            .field("running", &self.running)
            .finish()
    }
}

struct InFlightGuard<'a> {
    running: &'a RunningTasks,
    task_id: TaskId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.running.end_cancel(self.task_id);
    }
}

impl CancellationProtocol {
    pub fn new(context: Arc<FleetContext>, running: Arc<RunningTasks>) -> Self {
        Self { context, running }
    }

    /// Whether a cancel for `task_id` is still being carried out
    pub fn in_flight(&self, task_id: TaskId) -> bool {
        self.running.is_cancelling(task_id)
    }

    /// Cancel `task_id`, relocating the payload first when carrying.
    ///
    /// Terminal tasks are returned unchanged. A second cancel while one is
    /// in flight returns the task as it currently stands.
    #[instrument(skip(self))]
    pub async fn cancel(&self, task_id: TaskId) -> FleetResult<Task> {
        let task = self.context.persistence.load(task_id).await?;
        if task.status.is_terminal() {
            info!(task_id = %task_id, status = %task.status, "Cancel on terminal task ignored");
            return Ok(task);
        }
        if !self.running.begin_cancel(task_id) {
            info!(task_id = %task_id, "Cancel already in progress");
            return Ok(task);
        }
        let _guard = InFlightGuard {
            running: &self.running,
            task_id,
        };

        let task = self
            .context
            .persistence
            .mutate(task_id, |t| {
                if t.cancel_requested_at.is_none() {
                    t.cancel_requested_at = Some(Utc::now());
                }
                Ok(())
            })
            .await?;
        self.context.broadcast_task(&task);
        info!(task_id = %task_id, carrying = task.carrying, "Cancellation requested");

        if let Err(err) = self.halt_execution(&task).await {
            warn!(task_id = %task_id, error = %err, "Cancellation did not reach the robot");
            self.withdraw_request(task_id).await;
            return Err(err);
        }

        let task = self.context.persistence.load(task_id).await?;
        if task.status.is_terminal() {
            return Ok(task);
        }
        if task.carrying {
            return self.relocate_and_cancel(task).await;
        }

        match self.context.persistence.transition(task_id, TaskEvent::Cancel).await {
            Ok(task) => {
                self.context.broadcast_task(&task);
                info!(task_id = %task_id, "Task cancelled");
                Ok(task)
            }
            Err(err) => {
                // The guard refuses a plain cancel once the payload was taken
                let task = self.context.persistence.load(task_id).await?;
                if task.carrying {
                    self.relocate_and_cancel(task).await
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Clear the request so the task keeps running and failing normally
    async fn withdraw_request(&self, task_id: TaskId) {
        match self
            .context
            .persistence
            .mutate(task_id, |t| {
                t.cancel_requested_at = None;
                Ok(())
            })
            .await
        {
            Ok(task) => self.context.broadcast_task(&task),
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "Could not withdraw cancel request");
            }
        }
    }

    /// Stop the robot's goal for this task and wait for the executor to yield
    async fn halt_execution(&self, task: &Task) -> FleetResult<()> {
        let coordinator = &self.context.coordinator;
        let robot_id = &task.robot_id;
        let deadline = Instant::now() + self.context.config.cancellation.idle_wait_timeout();

        loop {
            if coordinator.outstanding_task(robot_id) == Some(task.id) {
                coordinator.cancel_current(robot_id).await?;
                let remaining = deadline.saturating_duration_since(Instant::now());
                if !coordinator.wait_until_idle(robot_id, remaining).await {
                    return Err(FleetError::TaskCancellationFailed {
                        task_id: task.id,
                        reason: "robot did not stop its current movement".to_string(),
                    });
                }
            }

            if !self.running.is_running(task.id) {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(FleetError::TaskCancellationFailed {
                    task_id: task.id,
                    reason: "task execution did not yield".to_string(),
                });
            }
            self.running
                .wait_stopped(task.id, remaining.min(HALT_POLL))
                .await;
        }
    }

    async fn relocate_and_cancel(&self, mut task: Task) -> FleetResult<Task> {
        let task_id = task.id;
        warn!(task_id = %task_id, robot_id = %task.robot_id, "Cancelling carrying task; relocating payload");

        task = self
            .context
            .persistence
            .mutate(task_id, |t| {
                t.sub_status = Some(SubStatus::RelocatingForCancel);
                Ok(())
            })
            .await?;
        self.context.broadcast_task(&task);

        let shelf = match self
            .context
            .resolver
            .resolve_point(&mut task, PointRole::Shelf)
            .await
        {
            Ok(point) => point,
            Err(err) => {
                error!(task_id = %task_id, error = %err, "No safe point for payload");
                return self.fail_cancellation(task_id, NO_SAFE_POINT_REASON.to_string()).await;
            }
        };

        let robot_id = task.robot_id.clone();
        if let Err(err) = self
            .context
            .coordinator
            .move_to(&robot_id, Some(task_id), &shelf, MovementKind::Unload)
            .await
        {
            error!(task_id = %task_id, error = %err, "Safety relocation failed");
            return self
                .fail_cancellation(task_id, format!("safety relocation failed: {err}"))
                .await;
        }

        let task = self
            .context
            .persistence
            .mutate(task_id, |t| {
                t.carrying = false;
                TaskStateMachine::transition(t, &TaskEvent::Cancel)?;
                Ok(())
            })
            .await?;
        self.context.broadcast_task(&task);
        info!(task_id = %task_id, shelf = %shelf.name, "Payload relocated; task cancelled");
        Ok(task)
    }

    /// Record a cancellation that could not be carried out safely
    async fn fail_cancellation(&self, task_id: TaskId, reason: String) -> FleetResult<Task> {
        let err = FleetError::TaskCancellationFailed {
            task_id,
            reason: reason.clone(),
        };
        let details = err.to_error_details().with_step("cancel");
        let task = self
            .context
            .persistence
            .mutate(task_id, |t| {
                t.error = Some(details);
                TaskStateMachine::transition(t, &TaskEvent::fail_with_error(reason))?;
                Ok(())
            })
            .await?;
        self.context.broadcast_task(&task);
        Ok(task)
    }
}
