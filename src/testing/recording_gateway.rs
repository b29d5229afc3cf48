use crate::broadcast::{BroadcastGateway, RobotDelta, StateDelta, TaskDelta};
use crate::models::TaskId;
use parking_lot::Mutex;

/// Broadcast gateway that keeps every delta for later assertions
#[derive(Debug, Default)]
pub struct RecordingBroadcastGateway {
    deltas: Mutex<Vec<StateDelta>>,
}

impl RecordingBroadcastGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deltas(&self) -> Vec<StateDelta> {
        self.deltas.lock().clone()
    }

    pub fn task_deltas(&self, task_id: TaskId) -> Vec<TaskDelta> {
        self.deltas
            .lock()
            .iter()
            .filter_map(|d| match d {
                StateDelta::Task(t) if t.task_id == task_id => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn robot_deltas(&self, robot_id: &str) -> Vec<RobotDelta> {
        self.deltas
            .lock()
            .iter()
            .filter_map(|d| match d {
                StateDelta::Robot(r) if r.robot_id == robot_id => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.deltas.lock().clear();
    }
}

impl BroadcastGateway for RecordingBroadcastGateway {
    fn publish(&self, delta: StateDelta) {
        self.deltas.lock().push(delta);
    }
}
