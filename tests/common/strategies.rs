use fleet_core::errors::FleetError;
use fleet_core::models::Task;
use fleet_core::state_machine::TaskEvent;
use proptest::prelude::*;
use proptest::strategy::Just;

/// One step of a generated task history
#[derive(Debug, Clone)]
pub enum TaskOp {
    Event(TaskEvent),
    SetCarrying(bool),
    SetError(bool),
}

impl TaskOp {
    /// Apply a non-event op directly to the record
    pub fn apply_to(&self, task: &mut Task) {
        match self {
            Self::SetCarrying(carrying) => task.carrying = *carrying,
            Self::SetError(true) => {
                task.error = Some(
                    FleetError::InvalidState("generated failure".to_string()).to_error_details(),
                )
            }
            Self::SetError(false) => task.error = None,
            Self::Event(_) => {}
        }
    }
}

pub fn task_event_strategy() -> impl Strategy<Value = TaskEvent> {
    prop_oneof![
        Just(TaskEvent::Assign),
        Just(TaskEvent::Start),
        Just(TaskEvent::Pause),
        Just(TaskEvent::Resume),
        Just(TaskEvent::Complete),
        "[a-zA-Z ]{1,24}".prop_map(TaskEvent::Fail),
        Just(TaskEvent::Cancel),
        Just(TaskEvent::Retry),
    ]
}

pub fn task_op_strategy() -> impl Strategy<Value = TaskOp> {
    prop_oneof![
        6 => task_event_strategy().prop_map(TaskOp::Event),
        1 => any::<bool>().prop_map(TaskOp::SetCarrying),
        1 => any::<bool>().prop_map(TaskOp::SetError),
    ]
}

pub fn task_history_strategy() -> impl Strategy<Value = Vec<TaskOp>> {
    prop::collection::vec(task_op_strategy(), 1..40)
}

/// Point names as operators type them: "Bay 3", "Rack 12"
pub fn point_name_strategy() -> impl Strategy<Value = String> {
    ("(Bay|Rack|Dock|Zone|Station)", 1u32..500).prop_map(|(prefix, n)| format!("{prefix} {n}"))
}
