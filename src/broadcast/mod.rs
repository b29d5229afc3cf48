//! # State Broadcast
//!
//! Fire-and-forget fan-out of task and robot state deltas to operator
//! clients. Publishing never blocks and never fails the caller: with no
//! subscribers a delta is simply dropped, and slow subscribers lag instead
//! of applying backpressure.
//!
//! ```rust
//! use fleet_core::broadcast::{BroadcastGateway, ChannelBroadcastGateway, StateDelta, TaskDelta};
//! use fleet_core::models::{NewTask, TaskType};
//!
//! # tokio_test::block_on(async {
//! let gateway = ChannelBroadcastGateway::new(16);
//! let mut rx = gateway.subscribe();
//!
//! let task = NewTask::new("Return to Charger", TaskType::Return, "r1").into_task();
//! gateway.publish(StateDelta::Task(TaskDelta::from_task(&task)));
//!
//! assert!(matches!(rx.recv().await.unwrap(), StateDelta::Task(_)));
//! # });
//! ```

use crate::errors::ErrorDetails;
use crate::models::{
    BatteryState, ControlState, Fault, LocalizationState, MovementStatus, PointRole, Pose,
    RobotId, RobotSnapshot, RobotStatus, SubStatus, Task, TaskId,
};
use crate::state_machine::TaskState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

/// Operator-visible slice of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDelta {
    pub task_id: TaskId,
    pub robot_id: RobotId,
    pub status: TaskState,
    pub sub_status: Option<SubStatus>,
    pub current_step_index: usize,
    /// Name of the point the current sub-status refers to
    pub current_point: Option<String>,
    pub carrying: bool,
    pub error: Option<ErrorDetails>,
    pub at: DateTime<Utc>,
}

impl TaskDelta {
    pub fn from_task(task: &Task) -> Self {
        let role_point = |role: PointRole| {
            task.task_point(role).and_then(|p| {
                p.resolved
                    .as_ref()
                    .map(|point| point.name.clone())
                    .or_else(|| p.name.clone())
            })
        };
        let current_point = task.sub_status.and_then(|s| match s {
            SubStatus::MovingToDropoff | SubStatus::WaitingForLoad => role_point(PointRole::Dropoff),
            SubStatus::MovingToShelf | SubStatus::Unloading | SubStatus::RelocatingForCancel => {
                role_point(PointRole::Shelf)
            }
            SubStatus::Returning => role_point(PointRole::Return),
            SubStatus::MovingToWaypoint => task.current_waypoint.and_then(|i| task.point_name(i)),
        });

        Self {
            task_id: task.id,
            robot_id: task.robot_id.clone(),
            status: task.status,
            sub_status: task.sub_status,
            current_step_index: task.current_step_index,
            current_point,
            carrying: task.carrying,
            error: task.error.clone(),
            at: Utc::now(),
        }
    }
}

/// Operator-visible slice of a robot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotDelta {
    pub robot_id: RobotId,
    pub status: RobotStatus,
    pub battery: Option<BatteryState>,
    pub pose: Option<Pose>,
    pub movement: Option<MovementStatus>,
    pub control: Option<ControlState>,
    pub localization: Option<LocalizationState>,
    pub faults: Vec<Fault>,
    pub at: DateTime<Utc>,
}

impl RobotDelta {
    pub fn from_snapshot(snapshot: &RobotSnapshot, status: RobotStatus) -> Self {
        Self {
            robot_id: snapshot.robot_id.clone(),
            status,
            battery: snapshot.battery.clone(),
            pose: snapshot.pose.clone(),
            movement: snapshot.movement.clone(),
            control: snapshot.control.clone(),
            localization: snapshot.localization.clone(),
            faults: snapshot.faults.clone(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateDelta {
    Task(TaskDelta),
    Robot(RobotDelta),
}

pub trait BroadcastGateway: Send + Sync {
    fn publish(&self, delta: StateDelta);
}

/// Tokio broadcast channel fan-out
#[derive(Debug)]
pub struct ChannelBroadcastGateway {
    sender: broadcast::Sender<StateDelta>,
    published: AtomicU64,
}

impl ChannelBroadcastGateway {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateDelta> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl BroadcastGateway for ChannelBroadcastGateway {
    fn publish(&self, delta: StateDelta) {
        self.published.fetch_add(1, Ordering::Relaxed);
        // No receivers is normal when no operator is connected
        if self.sender.send(delta).is_err() {
            trace!("State delta dropped; no subscribers");
        }
    }
}

/// Gateway for deployments without operator clients
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcastGateway;

impl BroadcastGateway for NoopBroadcastGateway {
    fn publish(&self, _delta: StateDelta) {}
}
