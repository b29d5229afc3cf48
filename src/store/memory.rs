use super::TaskStore;
use crate::errors::FleetResult;
use crate::models::{ErrorLogRecord, RobotRecord, Task, TaskId};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local store keyed by task and robot id
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<TaskId, Task>,
    robots: DashMap<String, RobotRecord>,
    error_logs: Mutex<Vec<ErrorLogRecord>>,
    task_writes: AtomicU64,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of task writes performed so far
    pub fn task_write_count(&self) -> u64 {
        self.task_writes.load(Ordering::SeqCst)
    }

    pub fn error_logs(&self) -> Vec<ErrorLogRecord> {
        self.error_logs.lock().clone()
    }

    pub fn error_logs_for(&self, robot_id: &str) -> Vec<ErrorLogRecord> {
        self.error_logs
            .lock()
            .iter()
            .filter(|r| r.robot_id == robot_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get_task(&self, id: TaskId) -> FleetResult<Option<Task>> {
        Ok(self.tasks.get(&id).map(|t| t.clone()))
    }

    async fn save_task(&self, task: &Task) -> FleetResult<()> {
        self.tasks.insert(task.id, task.clone());
        self.task_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_task(&self, id: TaskId) -> FleetResult<bool> {
        Ok(self.tasks.remove(&id).is_some())
    }

    async fn tasks_for_robot(&self, robot_id: &str) -> FleetResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.robot_id == robot_id)
            .map(|t| t.clone())
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn active_tasks(&self) -> FleetResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.status.is_active())
            .map(|t| t.clone())
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn get_robot(&self, robot_id: &str) -> FleetResult<Option<RobotRecord>> {
        Ok(self.robots.get(robot_id).map(|r| r.clone()))
    }

    async fn save_robot(&self, robot: &RobotRecord) -> FleetResult<()> {
        self.robots.insert(robot.id.clone(), robot.clone());
        Ok(())
    }

    async fn append_error_log(&self, record: ErrorLogRecord) -> FleetResult<()> {
        self.error_logs.lock().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorSeverity;
    use crate::models::{NewTask, TaskType};
    use crate::state_machine::TaskState;

    #[tokio::test]
    async fn test_task_round_trip_and_write_count() {
        let store = InMemoryTaskStore::new();
        let task = NewTask::new("Return to Dock", TaskType::Return, "r1").into_task();

        store.save_task(&task).await.unwrap();
        assert_eq!(store.task_write_count(), 1);
        assert_eq!(store.get_task(task.id).await.unwrap(), Some(task.clone()));
        assert!(store.delete_task(task.id).await.unwrap());
        assert!(store.get_task(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_and_robot_queries() {
        let store = InMemoryTaskStore::new();
        let mut running = NewTask::new("a", TaskType::Return, "r1").into_task();
        running.status = TaskState::InProgress;
        let mut done = NewTask::new("b", TaskType::Return, "r1").into_task();
        done.status = TaskState::Completed;
        let other = NewTask::new("c", TaskType::Return, "r2").into_task();

        for t in [&running, &done, &other] {
            store.save_task(t).await.unwrap();
        }

        let active = store.active_tasks().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, running.id);
        assert_eq!(store.tasks_for_robot("r1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_error_logs_filter_by_robot() {
        let store = InMemoryTaskStore::new();
        store
            .append_error_log(ErrorLogRecord::new("r1", "FAULT", "motor", ErrorSeverity::High))
            .await
            .unwrap();
        store
            .append_error_log(ErrorLogRecord::new("r2", "FAULT", "lidar", ErrorSeverity::High))
            .await
            .unwrap();
        assert_eq!(store.error_logs().len(), 2);
        assert_eq!(store.error_logs_for("r1")[0].message, "motor");
    }
}
