mod common;

use common::{ROBOT, WAIT};
use fleet_core::config::CompletionStrategy;
use fleet_core::models::{FailReason, MovementKind, MovementState};
use fleet_core::testing::{
    eventually, ControllerCall, FakeController, FleetTestHarness, MoveOutcome, TaskFactory,
};
use fleet_core::{FleetConfig, FleetError};
use std::sync::Arc;
use std::time::Duration;

fn harness_with(
    controller: FakeController,
    tweak: impl FnOnce(&mut FleetConfig),
) -> FleetTestHarness {
    let mut config = TaskFactory::fast_config();
    tweak(&mut config);
    FleetTestHarness::with_controller(controller.with_map(TaskFactory::standard_map()), config)
}

fn status_polls(harness: &FleetTestHarness) -> usize {
    harness
        .controller
        .call_count(|c| matches!(c, ControllerCall::MovementStatus { .. }))
}

#[tokio::test]
async fn test_second_goal_is_rejected_while_one_is_outstanding() -> anyhow::Result<()> {
    let harness = FleetTestHarness::new();
    harness.controller.script_move(ROBOT, MoveOutcome::Hold);
    let coordinator = Arc::clone(&harness.orchestrator.context().coordinator);

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .move_to(ROBOT, None, &TaskFactory::shelf_point(), MovementKind::Standard)
                .await
        })
    };
    let outstanding = &coordinator;
    assert!(
        eventually(WAIT, || async move { outstanding.outstanding_action(ROBOT).is_some() }).await
    );

    let err = coordinator
        .move_to(ROBOT, None, &TaskFactory::dropoff_point(), MovementKind::Standard)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FleetError::MovementInProgress { action_id: Some(_), .. }
    ));
    assert_eq!(harness.controller.submitted_moves(ROBOT).len(), 1);

    assert!(coordinator.cancel_current(ROBOT).await?);
    let err = first.await?.unwrap_err();
    assert!(matches!(
        err,
        FleetError::MovementFailed { ref reason, .. } if *reason == FailReason::cancelled()
    ));
    assert!(coordinator.wait_until_idle(ROBOT, WAIT).await);
    assert!(!coordinator.cancel_current(ROBOT).await?);
    Ok(())
}

#[tokio::test]
async fn test_completion_is_polled_without_a_session() -> anyhow::Result<()> {
    let harness = harness_with(FakeController::new().without_movement_events(), |_| {});
    let coordinator = &harness.orchestrator.context().coordinator;

    let action = coordinator
        .move_to(ROBOT, None, &TaskFactory::dropoff_point(), MovementKind::Standard)
        .await?;

    assert_eq!(action.state, MovementState::Succeeded);
    assert!(action.finished_at.is_some());
    assert!(status_polls(&harness) >= 1);
    assert!(!coordinator.has_outstanding(ROBOT));
    Ok(())
}

#[tokio::test]
async fn test_quiet_session_falls_back_to_polling() -> anyhow::Result<()> {
    let harness = harness_with(FakeController::new().without_movement_events(), |_| {});
    harness.orchestrator.start_monitoring(ROBOT).await?;

    let action = harness
        .orchestrator
        .context()
        .coordinator
        .move_to(ROBOT, None, &TaskFactory::dropoff_point(), MovementKind::Standard)
        .await?;

    assert_eq!(action.state, MovementState::Succeeded);
    assert!(status_polls(&harness) >= 1);
    harness.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_live_session_resolves_goal_from_events() -> anyhow::Result<()> {
    let harness = harness_with(FakeController::new(), |_| {});
    harness.orchestrator.start_monitoring(ROBOT).await?;
    harness.controller.emit_battery(ROBOT, 0.9, false);
    let monitor = &harness.orchestrator.context().monitor;
    assert!(
        eventually(WAIT, || async move {
            monitor.snapshot(ROBOT).is_some_and(|s| s.battery.is_some())
        })
        .await
    );

    let action = harness
        .orchestrator
        .context()
        .coordinator
        .move_to(ROBOT, None, &TaskFactory::shelf_point(), MovementKind::Unload)
        .await?;

    assert_eq!(action.state, MovementState::Succeeded);
    let snapshot = harness.orchestrator.robot_snapshot(ROBOT).expect("monitored");
    assert_eq!(
        snapshot.movement.map(|m| (m.action_id, m.state)),
        Some((action.id, MovementState::Succeeded))
    );
    // battery came from the session, not from a controller query
    assert_eq!(
        harness
            .controller
            .call_count(|c| matches!(c, ControllerCall::BatteryState { .. })),
        0
    );
    harness.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_polling_only_strategy_ignores_events() -> anyhow::Result<()> {
    let harness = harness_with(FakeController::new(), |config| {
        config.movement.strategy = CompletionStrategy::PollingOnly;
    });
    harness.orchestrator.start_monitoring(ROBOT).await?;

    harness
        .orchestrator
        .context()
        .coordinator
        .move_to(ROBOT, None, &TaskFactory::dropoff_point(), MovementKind::Standard)
        .await?;

    assert!(status_polls(&harness) >= 1);
    harness.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_goal_times_out_and_releases_robot() -> anyhow::Result<()> {
    let harness = harness_with(FakeController::new(), |config| {
        config.movement.standard_timeout_secs = 1;
    });
    harness.controller.script_move(ROBOT, MoveOutcome::Hold);
    let coordinator = &harness.orchestrator.context().coordinator;

    let started = tokio::time::Instant::now();
    let err = coordinator
        .move_to(ROBOT, None, &TaskFactory::dropoff_point(), MovementKind::Standard)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FleetError::MovementTimeout { timeout, .. } if timeout == Duration::from_secs(1)
    ));
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(!coordinator.has_outstanding(ROBOT));
    // a timeout leaves the goal alone on the robot
    assert_eq!(
        harness
            .controller
            .call_count(|c| matches!(c, ControllerCall::CancelMovement { .. })),
        0
    );
    Ok(())
}

#[tokio::test]
async fn test_docked_robot_is_undocked_before_moving() -> anyhow::Result<()> {
    let harness = FleetTestHarness::new();
    harness.controller.set_docked(ROBOT, true);

    harness
        .orchestrator
        .context()
        .coordinator
        .move_to(ROBOT, None, &TaskFactory::dropoff_point(), MovementKind::Standard)
        .await?;

    let calls = harness.controller.calls();
    let undock = calls
        .iter()
        .position(|c| matches!(c, ControllerCall::Undock { .. }))
        .expect("robot was undocked");
    let submit = calls
        .iter()
        .position(|c| matches!(c, ControllerCall::SubmitMove { .. }))
        .expect("goal was submitted");
    assert!(undock < submit);
    assert!(!harness.controller.is_docked(ROBOT));
    Ok(())
}

#[tokio::test]
async fn test_rejected_goal_is_action_failure() -> anyhow::Result<()> {
    let harness = FleetTestHarness::new();
    harness
        .controller
        .script_move(ROBOT, MoveOutcome::Reject("map not loaded".to_string()));
    let coordinator = &harness.orchestrator.context().coordinator;

    let err = coordinator
        .move_to(ROBOT, None, &TaskFactory::dropoff_point(), MovementKind::Standard)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FleetError::ActionFailed {
            robot_id: ROBOT.to_string(),
            action: "submit_move".to_string(),
            reason: "map not loaded".to_string(),
        }
    );
    assert!(!coordinator.has_outstanding(ROBOT));
    Ok(())
}

#[tokio::test]
async fn test_goal_carries_requested_or_default_accuracy() -> anyhow::Result<()> {
    let harness = harness_with(FakeController::new(), |config| {
        config.movement.default_accuracy_m = Some(0.25);
    });
    let coordinator = &harness.orchestrator.context().coordinator;

    coordinator
        .move_to(ROBOT, None, &TaskFactory::dropoff_point(), MovementKind::Standard)
        .await?;
    coordinator
        .move_to_with_accuracy(
            ROBOT,
            None,
            &TaskFactory::shelf_point(),
            MovementKind::Unload,
            Some(0.05),
        )
        .await?;

    let accuracies: Vec<_> = harness
        .controller
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            ControllerCall::SubmitMove { accuracy, .. } => Some(accuracy),
            _ => None,
        })
        .collect();
    assert_eq!(accuracies, vec![Some(0.25), Some(0.05)]);
    Ok(())
}
