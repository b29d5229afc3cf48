//! # Task Store
//!
//! Narrow keyed-record contract for tasks, robots and error logs. Durable
//! storage lives outside this crate; [`InMemoryTaskStore`] backs embedded
//! deployments and tests.

mod memory;

pub use memory::InMemoryTaskStore;

use crate::errors::FleetResult;
use crate::models::{ErrorLogRecord, RobotRecord, Task, TaskId};
use async_trait::async_trait;

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_task(&self, id: TaskId) -> FleetResult<Option<Task>>;

    /// Insert or replace the full task record
    async fn save_task(&self, task: &Task) -> FleetResult<()>;

    async fn delete_task(&self, id: TaskId) -> FleetResult<bool>;

    async fn tasks_for_robot(&self, robot_id: &str) -> FleetResult<Vec<Task>>;

    /// Tasks whose status is assigned, in progress or paused
    async fn active_tasks(&self) -> FleetResult<Vec<Task>>;

    async fn get_robot(&self, robot_id: &str) -> FleetResult<Option<RobotRecord>>;

    async fn save_robot(&self, robot: &RobotRecord) -> FleetResult<()>;

    async fn append_error_log(&self, record: ErrorLogRecord) -> FleetResult<()>;
}
