//! # Testing Factory
//!
//! Canned maps, tasks and configuration for exercising the orchestration
//! core against [`FakeController`](super::FakeController).
//!
//! The standard layout has one point per role:
//!
//! | id          | name    | type    | position |
//! |-------------|---------|---------|----------|
//! | `dropoff-a` | A       | dropoff | (1, 1)   |
//! | `shelf-b`   | B       | shelf   | (5, 5)   |
//! | `charger-1` | Charger | charger | (0, 0)   |

use crate::config::FleetConfig;
use crate::models::{
    MapSnapshot, NewTask, Point, PointRole, PointType, SubAction, TaskPoint, TaskType,
};

pub struct TaskFactory;

impl TaskFactory {
    pub fn dropoff_point() -> Point {
        Point::new("dropoff-a", "A", PointType::Dropoff, 1.0, 1.0)
    }

    pub fn shelf_point() -> Point {
        Point::new("shelf-b", "B", PointType::Shelf, 5.0, 5.0)
    }

    pub fn charger_point() -> Point {
        Point::new("charger-1", "Charger", PointType::Charger, 0.0, 0.0)
    }

    pub fn standard_map() -> MapSnapshot {
        MapSnapshot::new(
            "map-1",
            vec![
                Self::dropoff_point(),
                Self::shelf_point(),
                Self::charger_point(),
            ],
        )
    }

    /// Dropoff A, shelf B, return to charger; all points resolved
    pub fn dropoff_task(robot_id: &str) -> NewTask {
        NewTask::new("Dropoff from A to B", TaskType::Dropoff, robot_id)
            .with_point(TaskPoint::from_point(
                PointRole::Dropoff,
                Self::dropoff_point(),
            ))
            .with_point(TaskPoint::from_point(PointRole::Shelf, Self::shelf_point()))
            .with_return_point(TaskPoint::from_point(
                PointRole::Return,
                Self::charger_point(),
            ))
    }

    /// Pickup from shelf B, deliver to A, return to charger
    pub fn pickup_task(robot_id: &str) -> NewTask {
        NewTask::new("Pickup from B to A", TaskType::Pickup, robot_id)
            .with_point(TaskPoint::from_point(PointRole::Shelf, Self::shelf_point()))
            .with_point(TaskPoint::from_point(
                PointRole::Dropoff,
                Self::dropoff_point(),
            ))
            .with_return_point(TaskPoint::from_point(
                PointRole::Return,
                Self::charger_point(),
            ))
    }

    pub fn return_task(robot_id: &str) -> NewTask {
        NewTask::new("Return to Charger", TaskType::Return, robot_id).with_return_point(
            TaskPoint::from_point(PointRole::Return, Self::charger_point()),
        )
    }

    /// Visit dropoff A then shelf B, pausing briefly at A
    pub fn waypoint_task(robot_id: &str) -> NewTask {
        NewTask::new("Patrol A and B", TaskType::GenericMove, robot_id)
            .with_point(
                TaskPoint::from_point(PointRole::Dropoff, Self::dropoff_point())
                    .with_sub_action(SubAction::Wait { seconds: 0 }),
            )
            .with_point(TaskPoint::from_point(PointRole::Shelf, Self::shelf_point()))
    }

    /// Defaults scaled down to milliseconds so tests settle quickly
    pub fn fast_config() -> FleetConfig {
        let mut config = FleetConfig::default();
        config.movement.standard_timeout_secs = 5;
        config.movement.charge_dock_timeout_secs = 5;
        config.movement.rack_align_timeout_secs = 5;
        config.movement.unload_timeout_secs = 5;
        config.movement.poll_interval_ms = 20;
        config.movement.event_stall_threshold_ms = 1_000;
        config.movement.undock_settle_ms = 10;
        config.cancellation.idle_wait_timeout_ms = 3_000;
        config.monitor.event_channel_capacity = 64;
        config.monitor.terminal_cache_size = 16;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_config_is_valid() {
        assert!(TaskFactory::fast_config().validate().is_ok());
    }

    #[test]
    fn test_dropoff_task_has_every_role() {
        let task = TaskFactory::dropoff_task("r1").into_task();
        for role in [PointRole::Dropoff, PointRole::Shelf, PointRole::Return] {
            assert!(task.has_role(role), "missing {role}");
        }
    }
}
