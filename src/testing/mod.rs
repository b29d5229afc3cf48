//! # Testing Infrastructure
//!
//! In-process stand-ins for the collaborators the core depends on, so the
//! orchestration logic can be exercised without a robot or a database.
//!
//! ## Modules
//!
//! - `fake_controller` - Scriptable robot controller with a live event stream
//! - `recording_gateway` - Broadcast gateway that records every delta
//! - `factory` - Canned maps, tasks and fast configuration

pub mod factory;
pub mod fake_controller;
pub mod recording_gateway;

pub use factory::TaskFactory;
pub use fake_controller::{ControllerCall, FakeController, MoveOutcome};
pub use recording_gateway::RecordingBroadcastGateway;

use crate::config::FleetConfig;
use crate::models::{NewTask, Task};
use crate::orchestrator::TaskOrchestrator;
use crate::store::InMemoryTaskStore;
use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// An orchestrator wired to fakes, with handles to each fake
pub struct FleetTestHarness {
    pub controller: Arc<FakeController>,
    pub store: Arc<InMemoryTaskStore>,
    pub gateway: Arc<RecordingBroadcastGateway>,
    pub orchestrator: TaskOrchestrator,
}

impl FleetTestHarness {
    /// Harness over the standard map with fast timings
    pub fn new() -> Self {
        Self::with_controller(
            FakeController::new().with_map(TaskFactory::standard_map()),
            TaskFactory::fast_config(),
        )
    }

    pub fn with_controller(controller: FakeController, config: FleetConfig) -> Self {
        let controller = Arc::new(controller);
        let store = Arc::new(InMemoryTaskStore::new());
        let gateway = Arc::new(RecordingBroadcastGateway::new());
        let orchestrator = TaskOrchestrator::from_parts(
            config,
            Arc::clone(&controller) as _,
            Arc::clone(&store) as _,
            Arc::clone(&gateway) as _,
        );
        Self {
            controller,
            store,
            gateway,
            orchestrator,
        }
    }

    /// Create a task, run it once and return the outcome with the stored record
    pub async fn run_task(&self, new_task: NewTask) -> anyhow::Result<(bool, Task)> {
        let task = self
            .orchestrator
            .create_task(new_task)
            .await
            .context("creating task")?;
        let completed = self
            .orchestrator
            .execute_task(task.id)
            .await
            .with_context(|| format!("executing task {}", task.id))?;
        let task = self.orchestrator.get_task(task.id).await?;
        Ok((completed, task))
    }
}

impl Default for FleetTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
