use super::events::TaskEvent;
use super::task_state_machine::TaskStateMachine;
use crate::errors::{FleetError, FleetResult};
use crate::logging::log_task_transition;
use crate::models::{Task, TaskId};
use crate::store::TaskStore;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Serialized read-modify-write access to task records.
///
/// Every write for a task goes through a per-task async lock, so the
/// executor, the cancellation protocol and operator calls never overwrite
/// each other's fields. The closure always sees the latest stored record.
pub struct TaskPersistence {
    store: Arc<dyn TaskStore>,
    locks: DashMap<TaskId, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for TaskPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPersistence")
            .field("locked_tasks", &self.locks.len())
            .finish()
    }
}

impl TaskPersistence {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub async fn load(&self, id: TaskId) -> FleetResult<Task> {
        self.store
            .get_task(id)
            .await?
            .ok_or(FleetError::TaskNotFound(id))
    }

    pub async fn insert(&self, task: &Task) -> FleetResult<()> {
        let lock = self.lock_for(task.id);
        let _guard = lock.lock().await;
        self.store.save_task(task).await
    }

    /// Apply `f` to the stored task and write it back.
    ///
    /// Nothing is written when `f` fails.
    pub async fn mutate<F>(&self, id: TaskId, f: F) -> FleetResult<Task>
    where
        F: FnOnce(&mut Task) -> FleetResult<()> + Send,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut task = self.load(id).await?;
        f(&mut task)?;
        task.touch();
        self.store.save_task(&task).await?;
        Ok(task)
    }

    /// Apply a lifecycle event and persist the result
    pub async fn transition(&self, id: TaskId, event: TaskEvent) -> FleetResult<Task> {
        let mut from = None;
        let task = self
            .mutate(id, |task| {
                from = Some(TaskStateMachine::transition(task, &event)?);
                Ok(())
            })
            .await?;
        if let Some(from) = from {
            log_task_transition(task.id, &task.robot_id, from, task.status);
        }
        Ok(task)
    }

    /// Drop the task's lock entry once the record is gone
    pub fn forget(&self, id: TaskId) {
        self.locks.remove(&id);
    }

    fn lock_for(&self, id: TaskId) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTask, TaskType};
    use crate::state_machine::TaskState;
    use crate::store::InMemoryTaskStore;

    async fn persisted_task() -> (TaskPersistence, Task) {
        let persistence = TaskPersistence::new(Arc::new(InMemoryTaskStore::new()));
        let task = NewTask::new("Return to Charger", TaskType::Return, "r1").into_task();
        persistence.insert(&task).await.unwrap();
        (persistence, task)
    }

    #[tokio::test]
    async fn test_transition_is_persisted() {
        let (persistence, task) = persisted_task().await;
        let updated = persistence.transition(task.id, TaskEvent::Start).await.unwrap();
        assert_eq!(updated.status, TaskState::InProgress);
        assert_eq!(
            persistence.load(task.id).await.unwrap().status,
            TaskState::InProgress
        );
    }

    #[tokio::test]
    async fn test_failed_mutation_writes_nothing() {
        let (persistence, task) = persisted_task().await;
        let err = persistence
            .transition(task.id, TaskEvent::Complete)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::StateMachine(_)));
        assert_eq!(persistence.load(task.id).await.unwrap(), task);
    }

    #[tokio::test]
    async fn test_concurrent_mutations_do_not_lose_updates() {
        let (persistence, task) = persisted_task().await;
        let persistence = Arc::new(persistence);
        let id = task.id;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let persistence = Arc::clone(&persistence);
                tokio::spawn(async move {
                    persistence
                        .mutate(id, |t| {
                            t.current_step_index += 1;
                            Ok(())
                        })
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(persistence.load(id).await.unwrap().current_step_index, 16);
    }

    #[tokio::test]
    async fn test_missing_task() {
        let persistence = TaskPersistence::new(Arc::new(InMemoryTaskStore::new()));
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            persistence.load(id).await.unwrap_err(),
            FleetError::TaskNotFound(id)
        );
    }
}
