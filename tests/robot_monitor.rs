mod common;

use common::{ROBOT, WAIT};
use fleet_core::controller::{topics, ControllerError};
use fleet_core::models::{ErrorLogRecord, FaultLevel, RobotRecord};
use fleet_core::monitor::RobotEvent;
use fleet_core::testing::{eventually, ControllerCall, FleetTestHarness};
use fleet_core::{ErrorSeverity, RawEvent, RobotStatus, TaskStore};
use serde_json::json;

async fn robot_status_becomes(harness: &FleetTestHarness, expected: RobotStatus) -> RobotRecord {
    let store = &harness.store;
    let reached = eventually(WAIT, || async move {
        matches!(store.get_robot(ROBOT).await, Ok(Some(r)) if r.status == expected)
    })
    .await;
    let record = store
        .get_robot(ROBOT)
        .await
        .expect("store readable")
        .expect("robot record written");
    assert!(reached, "robot never became {expected}: {record:?}");
    record
}

fn logs_with_code(harness: &FleetTestHarness, code: &str) -> Vec<ErrorLogRecord> {
    harness
        .store
        .error_logs_for(ROBOT)
        .into_iter()
        .filter(|log| log.code == code)
        .collect()
}

#[tokio::test]
async fn test_severe_fault_sets_error_status_and_logs_once() -> anyhow::Result<()> {
    common::init_tracing();
    let harness = FleetTestHarness::new();
    harness.orchestrator.start_monitoring(ROBOT).await?;

    harness
        .controller
        .emit_faults(ROBOT, &[(2001, "critical", "motor overheat")]);
    let record = robot_status_becomes(&harness, RobotStatus::Error).await;
    assert_eq!(record.active_faults.len(), 1);
    assert_eq!(record.active_faults[0].level, FaultLevel::Critical);

    // the same fault reported again is not logged twice
    harness.controller.emit_faults(
        ROBOT,
        &[(2001, "critical", "motor overheat"), (17, "info", "fan on")],
    );
    harness.controller.emit_faults(ROBOT, &[]);
    robot_status_becomes(&harness, RobotStatus::Idle).await;

    let logs = logs_with_code(&harness, "FAULT_2001");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].severity, ErrorSeverity::Critical);
    assert_eq!(logs[0].message, "motor overheat");
    assert!(logs_with_code(&harness, "FAULT_17").is_empty());

    harness.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_lost_localization_is_logged_and_recovers() -> anyhow::Result<()> {
    let harness = FleetTestHarness::new();
    harness.orchestrator.start_monitoring(ROBOT).await?;

    harness.controller.emit_localization(ROBOT, false);
    let record = robot_status_becomes(&harness, RobotStatus::LocalizationLost).await;
    assert!(!record.localization_reliable);
    assert_eq!(logs_with_code(&harness, "LOCALIZATION_LOST").len(), 1);

    harness.controller.emit_localization(ROBOT, true);
    let record = robot_status_becomes(&harness, RobotStatus::Idle).await;
    assert!(record.localization_reliable);

    harness.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_stream_error_degrades_until_next_event() -> anyhow::Result<()> {
    let harness = FleetTestHarness::new();
    harness.orchestrator.start_monitoring(ROBOT).await?;

    for _ in 0..3 {
        harness.controller.emit_error(
            ROBOT,
            ControllerError::Transport {
                robot_id: ROBOT.to_string(),
                reason: "websocket timeout".to_string(),
            },
        );
    }
    robot_status_becomes(&harness, RobotStatus::Degraded).await;
    assert_eq!(logs_with_code(&harness, "COMMUNICATION_ERROR").len(), 1);
    assert!(harness.orchestrator.is_monitoring(ROBOT));

    harness.controller.emit_battery(ROBOT, 0.5, true);
    let record = robot_status_becomes(&harness, RobotStatus::Charging).await;
    assert_eq!(record.battery_percentage, Some(50.0));
    assert!(record.charging);

    harness.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_closed_stream_marks_robot_offline() -> anyhow::Result<()> {
    let harness = FleetTestHarness::new();
    harness.orchestrator.start_monitoring(ROBOT).await?;
    harness.controller.emit_battery(ROBOT, 0.8, false);
    robot_status_becomes(&harness, RobotStatus::Idle).await;

    harness.controller.close_streams(ROBOT);

    robot_status_becomes(&harness, RobotStatus::Offline).await;
    let orchestrator = &harness.orchestrator;
    assert!(eventually(WAIT, || async move { !orchestrator.is_monitoring(ROBOT) }).await);

    // monitoring can be started again after the session ended
    harness.orchestrator.start_monitoring(ROBOT).await?;
    assert!(harness.orchestrator.is_monitoring(ROBOT));
    harness.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_subscribers_receive_typed_events() -> anyhow::Result<()> {
    let harness = FleetTestHarness::new();
    harness.orchestrator.start_monitoring(ROBOT).await?;
    let mut events = harness
        .orchestrator
        .subscribe_robot(ROBOT)
        .expect("session running");

    // malformed and untracked messages are skipped
    harness
        .controller
        .emit(ROBOT, RawEvent::new(topics::POSE, json!({"pos": "nowhere"})));
    harness
        .controller
        .emit(ROBOT, RawEvent::new("/camera/image", json!({})));
    harness.controller.emit(
        ROBOT,
        RawEvent::new(topics::POSE, json!({"pos": [2.0, 3.5], "ori": 1.57})),
    );

    let event = tokio::time::timeout(WAIT, events.recv()).await??;
    let RobotEvent::Pose(pose) = event else {
        panic!("expected pose event, got {event:?}");
    };
    assert_eq!((pose.x, pose.y), (2.0, 3.5));

    let snapshot = harness.orchestrator.robot_snapshot(ROBOT).expect("monitored");
    assert_eq!(snapshot.pose, Some(pose));
    assert!(snapshot.last_event_at.is_some());

    harness.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_start_is_idempotent_and_stop_ends_session() -> anyhow::Result<()> {
    let harness = FleetTestHarness::new();

    harness.orchestrator.start_monitoring(ROBOT).await?;
    harness.orchestrator.start_monitoring(ROBOT).await?;
    assert_eq!(
        harness
            .controller
            .call_count(|c| matches!(c, ControllerCall::OpenEventStream { .. })),
        1
    );

    assert!(harness.orchestrator.stop_monitoring(ROBOT).await);
    assert!(!harness.orchestrator.is_monitoring(ROBOT));
    assert!(harness.orchestrator.robot_snapshot(ROBOT).is_none());
    assert!(!harness.orchestrator.stop_monitoring(ROBOT).await);
    Ok(())
}

#[tokio::test]
async fn test_fault_log_names_task_running_on_robot() -> anyhow::Result<()> {
    let harness = FleetTestHarness::new();
    harness.orchestrator.start_monitoring(ROBOT).await?;
    harness
        .controller
        .script_move(ROBOT, fleet_core::testing::MoveOutcome::Hold);
    let task = harness
        .orchestrator
        .create_task(fleet_core::testing::TaskFactory::return_task(ROBOT))
        .await?;
    let _handle = harness.orchestrator.spawn_execution(task.id);
    common::wait_for_moves(&harness, ROBOT, 1).await;

    harness
        .controller
        .emit_faults(ROBOT, &[(3002, "error", "bumper pressed")]);
    robot_status_becomes(&harness, RobotStatus::Error).await;

    let logs = logs_with_code(&harness, "FAULT_3002");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].task_id, Some(task.id));

    harness.orchestrator.cancel_task(task.id).await?;
    harness.orchestrator.shutdown().await;
    Ok(())
}
