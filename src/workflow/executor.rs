use super::registry::{Workflow, WorkflowRegistry};
use super::step_handler::StepContext;
use crate::context::FleetContext;
use crate::errors::{FleetError, FleetResult};
use crate::models::{Task, TaskId};
use crate::state_machine::{TaskEvent, TaskState, TaskStateMachine};
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, instrument, warn};

/// Task ids whose workflow is currently being driven
#[derive(Debug, Default)]
pub struct RunningTasks {
    tasks: DashSet<TaskId>,
    cancelling: DashSet<TaskId>,
    stopped: Notify,
}

impl RunningTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, task_id: TaskId) -> bool {
        self.tasks.contains(&task_id)
    }

    /// Whether a cancel is currently being carried out for the task
    pub fn is_cancelling(&self, task_id: TaskId) -> bool {
        self.cancelling.contains(&task_id)
    }

    pub(crate) fn begin_cancel(&self, task_id: TaskId) -> bool {
        self.cancelling.insert(task_id)
    }

    pub(crate) fn end_cancel(&self, task_id: TaskId) {
        self.cancelling.remove(&task_id);
    }

    fn claim(&self, task_id: TaskId) -> bool {
        self.tasks.insert(task_id)
    }

    fn release(&self, task_id: TaskId) {
        self.tasks.remove(&task_id);
        self.stopped.notify_waiters();
    }

    /// Wait up to `timeout` for the task's execution to end
    pub async fn wait_stopped(&self, task_id: TaskId, timeout: Duration) -> bool {
        let notified = self.stopped.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.is_running(task_id) {
            return true;
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        !self.is_running(task_id)
    }
}

struct RunningGuard<'a> {
    running: &'a RunningTasks,
    task_id: TaskId,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running.release(self.task_id);
    }
}

/// Advances one task through its workflow.
///
/// Progress is persisted after every step, so a task interrupted by a crash
/// resumes from `current_step_index`. Step failures are caught here, turned
/// into error details on the task and broadcast; they do not propagate.
pub struct WorkflowExecutor {
    context: Arc<FleetContext>,
    registry: Arc<WorkflowRegistry>,
    running: Arc<RunningTasks>,
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("registry", &self.registry)
            .field("running", &self.running.tasks.len())
            .finish()
    }
}

impl WorkflowExecutor {
    pub fn new(
        context: Arc<FleetContext>,
        registry: Arc<WorkflowRegistry>,
        running: Arc<RunningTasks>,
    ) -> Self {
        Self {
            context,
            registry,
            running,
        }
    }

    pub fn running(&self) -> &Arc<RunningTasks> {
        &self.running
    }

    /// Drive `task_id` until it completes, fails, pauses or is cancelled.
    ///
    /// Returns `true` only when the task ends `completed`.
    #[instrument(skip(self))]
    pub async fn execute(&self, task_id: TaskId) -> FleetResult<bool> {
        if !self.running.claim(task_id) {
            return Err(FleetError::TaskAlreadyRunning(task_id));
        }
        let _guard = RunningGuard {
            running: &self.running,
            task_id,
        };

        let task = self.context.persistence.load(task_id).await?;
        let workflow = self.registry.workflow_for(&task)?;

        let event = match task.status {
            TaskState::Completed => return Ok(true),
            TaskState::Cancelled | TaskState::Paused => return Ok(false),
            _ if task.cancel_requested() => return Ok(false),
            TaskState::Failed if task.error.is_some() => {
                info!(task_id = %task_id, "Failed task has not been cleared for retry");
                return Ok(false);
            }
            TaskState::Failed => Some(TaskEvent::Retry),
            TaskState::Pending | TaskState::Assigned => Some(TaskEvent::Start),
            TaskState::InProgress => None,
        };

        let mut task = match event {
            Some(event) => {
                let task = self.context.persistence.transition(task_id, event).await?;
                self.context.broadcast_task(&task);
                task
            }
            None => {
                info!(
                    task_id = %task_id,
                    step_index = task.current_step_index,
                    "Resuming in-progress task"
                );
                task
            }
        };

        let robot_id = task.robot_id.clone();
        self.context.monitor.register_interest(&robot_id, task_id);
        let result = self.run_steps(&mut task, workflow).await;
        self.context.monitor.release_interest(&robot_id, task_id);
        result
    }

    async fn run_steps(&self, task: &mut Task, workflow: &Workflow) -> FleetResult<bool> {
        let task_id = task.id;

        while task.current_step_index < workflow.len() {
            let fresh = self.context.persistence.load(task_id).await?;
            if should_yield(&fresh) {
                info!(task_id = %task_id, status = %fresh.status, "Task yielded at step boundary");
                return Ok(false);
            }
            *task = fresh;

            let step = Arc::clone(&workflow.steps[task.current_step_index]);
            let step_name = step.name();
            info!(
                task_id = %task_id,
                step = step_name,
                step_index = task.current_step_index,
                total_steps = workflow.len(),
                "Executing step"
            );

            let outcome = {
                let mut ctx = StepContext::new(task, &self.context, step_name);
                step.execute(&mut ctx).await
            };

            if let Err(err) = outcome {
                return self.handle_step_failure(task_id, step_name, err).await;
            }

            *task = self
                .context
                .persistence
                .mutate(task_id, |t| {
                    if !t.status.is_terminal() {
                        t.current_step_index += 1;
                        t.sub_status = None;
                    }
                    Ok(())
                })
                .await?;
            self.context.broadcast_task(task);
        }

        let fresh = self.context.persistence.load(task_id).await?;
        if should_yield(&fresh) {
            return Ok(fresh.status == TaskState::Completed);
        }

        *task = self
            .context
            .persistence
            .transition(task_id, TaskEvent::Complete)
            .await?;
        self.context.broadcast_task(task);
        info!(task_id = %task_id, "Task completed");
        Ok(true)
    }

    async fn handle_step_failure(
        &self,
        task_id: TaskId,
        step_name: &'static str,
        err: FleetError,
    ) -> FleetResult<bool> {
        let fresh = self.context.persistence.load(task_id).await?;
        if self.running.is_cancelling(task_id) || fresh.status.is_terminal() {
            info!(
                task_id = %task_id,
                step = step_name,
                error = %err,
                "Step ended by cancellation"
            );
            return Ok(false);
        }

        error!(task_id = %task_id, step = step_name, error = %err, "Step failed");
        let details = err.to_error_details().with_step(step_name);
        let message = details.message.clone();
        let failed = self
            .context
            .persistence
            .mutate(task_id, |t| {
                t.error = Some(details);
                TaskStateMachine::transition(t, &TaskEvent::fail_with_error(message))?;
                Ok(())
            })
            .await;

        match failed {
            Ok(task) => self.context.broadcast_task(&task),
            Err(persist_err) => {
                warn!(task_id = %task_id, error = %persist_err, "Could not record step failure");
            }
        }
        Ok(false)
    }
}

fn should_yield(task: &Task) -> bool {
    task.status != TaskState::InProgress || task.cancel_requested()
}
