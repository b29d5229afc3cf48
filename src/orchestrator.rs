//! # Task Orchestrator
//!
//! Entry point for collaborators (HTTP layer, schedulers, operator tools).
//! Wraps the executor, the cancellation protocol, the monitor and the store
//! behind task- and robot-level operations.
//!
//! ```rust,ignore
//! let context = FleetContext::new(config, controller, store, broadcaster);
//! let orchestrator = TaskOrchestrator::new(context);
//!
//! orchestrator.start_monitoring("robot-1").await?;
//! let task = orchestrator.create_task(new_task).await?;
//! let completed = orchestrator.execute_task(task.id).await?;
//! ```

use crate::broadcast::BroadcastGateway;
use crate::config::FleetConfig;
use crate::context::FleetContext;
use crate::controller::RobotController;
use crate::errors::{FleetError, FleetResult};
use crate::models::{NewTask, RobotSnapshot, Task, TaskId};
use crate::monitor::RobotEvent;
use crate::state_machine::{TaskEvent, TaskState};
use crate::store::TaskStore;
use crate::workflow::{CancellationProtocol, RunningTasks, WorkflowExecutor, WorkflowRegistry};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

pub struct TaskOrchestrator {
    context: Arc<FleetContext>,
    registry: Arc<WorkflowRegistry>,
    executor: Arc<WorkflowExecutor>,
    cancellation: CancellationProtocol,
}

impl std::fmt::Debug for TaskOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOrchestrator")
            .field("context", &self.context)
            .field("registry", &self.registry)
            .finish()
    }
}

impl TaskOrchestrator {
    /// Orchestrator with the built-in workflows
    pub fn new(context: Arc<FleetContext>) -> Self {
        Self::with_registry(context, WorkflowRegistry::standard())
    }

    pub fn with_registry(context: Arc<FleetContext>, registry: WorkflowRegistry) -> Self {
        let registry = Arc::new(registry);
        let running = Arc::new(RunningTasks::new());
        let executor = Arc::new(WorkflowExecutor::new(
            Arc::clone(&context),
            Arc::clone(&registry),
            Arc::clone(&running),
        ));
        let cancellation = CancellationProtocol::new(Arc::clone(&context), running);
        Self {
            context,
            registry,
            executor,
            cancellation,
        }
    }

    /// Build the context and orchestrator in one go
    pub fn from_parts(
        config: FleetConfig,
        controller: Arc<dyn RobotController>,
        store: Arc<dyn TaskStore>,
        broadcaster: Arc<dyn BroadcastGateway>,
    ) -> Self {
        Self::new(FleetContext::new(config, controller, store, broadcaster))
    }

    pub fn context(&self) -> &Arc<FleetContext> {
        &self.context
    }

    /// Validate and persist a new task in `pending`
    #[instrument(skip(self, new_task), fields(task_type = %new_task.task_type, robot_id = %new_task.robot_id))]
    pub async fn create_task(&self, new_task: NewTask) -> FleetResult<Task> {
        let task = new_task.into_task();
        if task.robot_id.trim().is_empty() {
            return Err(FleetError::InvalidTaskConfiguration {
                task_id: task.id,
                reason: "task has no robot".to_string(),
            });
        }
        self.registry.workflow_for(&task)?;

        self.context.persistence.insert(&task).await?;
        self.context.broadcast_task(&task);
        info!(task_id = %task.id, name = %task.name, "Task created");
        Ok(task)
    }

    /// Record that the task is bound to its robot
    pub async fn assign_task(&self, task_id: TaskId) -> FleetResult<Task> {
        let task = self
            .context
            .persistence
            .transition(task_id, TaskEvent::Assign)
            .await?;
        self.context.broadcast_task(&task);
        Ok(task)
    }

    /// Run the task's workflow to its next resting point.
    ///
    /// Returns `true` when the task is completed.
    pub async fn execute_task(&self, task_id: TaskId) -> FleetResult<bool> {
        self.executor.execute(task_id).await
    }

    /// Run the task's workflow on a background tokio task
    pub fn spawn_execution(&self, task_id: TaskId) -> JoinHandle<FleetResult<bool>> {
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move { executor.execute(task_id).await })
    }

    pub fn is_executing(&self, task_id: TaskId) -> bool {
        self.executor.running().is_running(task_id)
    }

    /// Ask a running task to stop at its next step boundary
    pub async fn pause_task(&self, task_id: TaskId) -> FleetResult<Task> {
        self.apply_unless_settled(task_id, TaskEvent::Pause, TaskState::Paused)
            .await
    }

    /// Return a paused task to `in_progress`.
    ///
    /// Execution continues from the current step once `execute_task` or
    /// `spawn_execution` is called again.
    pub async fn resume_task(&self, task_id: TaskId) -> FleetResult<Task> {
        self.apply_unless_settled(task_id, TaskEvent::Resume, TaskState::InProgress)
            .await
    }

    pub fn is_cancelling(&self, task_id: TaskId) -> bool {
        self.cancellation.in_flight(task_id)
    }

    pub async fn cancel_task(&self, task_id: TaskId) -> FleetResult<Task> {
        self.cancellation.cancel(task_id).await
    }

    /// Re-run a failed task from the step that failed
    pub async fn retry_task(&self, task_id: TaskId) -> FleetResult<bool> {
        let task = self.context.persistence.load(task_id).await?;
        match task.status {
            TaskState::Failed => {}
            TaskState::Completed => return Ok(true),
            TaskState::Cancelled => return Ok(false),
            other => {
                return Err(FleetError::InvalidState(format!(
                    "task {task_id} is {other}; only failed tasks can be retried"
                )))
            }
        }

        self.context
            .persistence
            .mutate(task_id, |t| {
                t.error = None;
                t.cancel_requested_at = None;
                Ok(())
            })
            .await?;
        info!(task_id = %task_id, step_index = task.current_step_index, "Retrying task");
        self.executor.execute(task_id).await
    }

    pub async fn get_task(&self, task_id: TaskId) -> FleetResult<Task> {
        self.context.persistence.load(task_id).await
    }

    pub async fn tasks_for_robot(&self, robot_id: &str) -> FleetResult<Vec<Task>> {
        self.context.store.tasks_for_robot(robot_id).await
    }

    pub async fn active_tasks(&self) -> FleetResult<Vec<Task>> {
        self.context.store.active_tasks().await
    }

    /// Delete a task that is not assigned, running or paused
    pub async fn delete_task(&self, task_id: TaskId) -> FleetResult<bool> {
        let task = self.context.persistence.load(task_id).await?;
        if task.is_active() || self.is_executing(task_id) {
            return Err(FleetError::InvalidState(format!(
                "task {task_id} is {}; cancel it before deleting",
                task.status
            )));
        }
        let deleted = self.context.store.delete_task(task_id).await?;
        self.context.persistence.forget(task_id);
        Ok(deleted)
    }

    pub async fn start_monitoring(&self, robot_id: &str) -> FleetResult<()> {
        self.context.monitor.start_monitoring(robot_id).await.map(|_| ())
    }

    pub async fn stop_monitoring(&self, robot_id: &str) -> bool {
        self.context.monitor.stop_monitoring(robot_id).await
    }

    pub fn is_monitoring(&self, robot_id: &str) -> bool {
        self.context.monitor.is_monitoring(robot_id)
    }

    pub fn robot_snapshot(&self, robot_id: &str) -> Option<RobotSnapshot> {
        self.context.monitor.snapshot(robot_id)
    }

    pub fn subscribe_robot(&self, robot_id: &str) -> Option<broadcast::Receiver<RobotEvent>> {
        self.context.monitor.subscribe(robot_id)
    }

    /// Stop every monitor session
    pub async fn shutdown(&self) {
        info!(robots = ?self.context.monitor.monitored_robots(), "Shutting down orchestrator");
        self.context.monitor.shutdown().await;
    }

    async fn apply_unless_settled(
        &self,
        task_id: TaskId,
        event: TaskEvent,
        target: TaskState,
    ) -> FleetResult<Task> {
        let task = self.context.persistence.load(task_id).await?;
        if task.status.is_terminal() || task.status == target {
            return Ok(task);
        }
        let task = self.context.persistence.transition(task_id, event).await?;
        self.context.broadcast_task(&task);
        info!(task_id = %task_id, status = %task.status, "Task state changed by operator");
        Ok(task)
    }
}
