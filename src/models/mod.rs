//! # Models
//!
//! Records the orchestration core reads and writes: tasks and their point
//! references, map points, movement actions, robot records and error logs.

pub mod movement;
pub mod point;
pub mod robot;
pub mod task;

pub use movement::{
    FailReason, MoveGoal, MovementAction, MovementKind, MovementState, MovementStatus,
};
pub use point::{MapSnapshot, Point, PointRole, PointType};
pub use robot::{
    BatteryState, ControlMode, ControlState, ErrorLogRecord, Fault, FaultLevel,
    LocalizationState, Pose, RobotRecord, RobotSnapshot, RobotStatus,
};
pub use task::{NewTask, SubAction, SubStatus, Task, TaskPoint, TaskType};

/// Robot identifier as assigned by the fleet (usually the controller serial)
pub type RobotId = String;

/// Movement action identifier assigned by the robot controller
pub type ActionId = i64;

pub type TaskId = uuid::Uuid;
