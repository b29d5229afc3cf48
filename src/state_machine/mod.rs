// Task lifecycle state machine
//
// States, events and guards decide which transitions are legal; persistence
// applies them to stored records under a per-task lock.

pub mod errors;
pub mod events;
pub mod guards;
pub mod persistence;
pub mod states;
pub mod task_state_machine;

pub use errors::{GuardError, StateMachineError, StateMachineResult};
pub use events::TaskEvent;
pub use guards::TransitionGuard;
pub use persistence::TaskPersistence;
pub use states::TaskState;
pub use task_state_machine::TaskStateMachine;
