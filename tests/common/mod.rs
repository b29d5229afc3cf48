#![allow(dead_code)]

pub mod strategies;

use fleet_core::testing::{eventually, FleetTestHarness};
use fleet_core::{Task, TaskId};
use std::time::Duration;

pub const ROBOT: &str = "robot-1";

pub const WAIT: Duration = Duration::from_secs(3);

pub fn init_tracing() {
    fleet_core::logging::init_tracing();
}

/// Wait until the stored task satisfies `check`
pub async fn wait_for_task<F>(harness: &FleetTestHarness, task_id: TaskId, check: F) -> Task
where
    F: Fn(&Task) -> bool,
{
    let orchestrator = &harness.orchestrator;
    let check = &check;
    let reached = eventually(WAIT, || async move {
        orchestrator
            .get_task(task_id)
            .await
            .is_ok_and(|task| check(&task))
    })
    .await;
    let task = harness
        .orchestrator
        .get_task(task_id)
        .await
        .expect("task exists");
    assert!(reached, "task never reached the expected state: {task:?}");
    task
}

/// Wait until the fake controller has received `count` goals for the robot
pub async fn wait_for_moves(harness: &FleetTestHarness, robot_id: &str, count: usize) {
    let controller = &harness.controller;
    let reached = eventually(WAIT, || async move {
        controller.submitted_moves(robot_id).len() >= count
    })
    .await;
    assert!(
        reached,
        "expected {count} goals, saw {:?}",
        controller.submitted_moves(robot_id)
    );
}
