//! Scriptable in-process [`RobotController`].
//!
//! Each robot gets a queue of [`MoveOutcome`]s; every submitted goal pops
//! the next one (an empty queue means `Succeed`). Outcomes settle after a
//! configurable delay and are published both on the robot's event stream
//! (as `/planning_state` messages in the controller's wire shape) and to the
//! movement-status query, unless events are switched off to exercise the
//! polling path.

use crate::controller::{
    topics, ControllerError, ControllerResult, EventStream, RawEvent, RobotController,
};
use crate::models::{
    ActionId, BatteryState, FailReason, MapSnapshot, MoveGoal, MovementKind, MovementState,
    MovementStatus, Point, RobotId,
};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// How the fake settles the next goal submitted for a robot
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Succeed,
    Fail(FailReason),
    /// Stay `moving` until cancelled
    Hold,
    /// Refuse the goal at submission
    Reject(String),
}

/// One call the fake received
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerCall {
    SubmitMove {
        robot_id: RobotId,
        action_id: ActionId,
        target: Point,
        kind: MovementKind,
        accuracy: Option<f64>,
    },
    MovementStatus {
        robot_id: RobotId,
        action_id: ActionId,
    },
    CancelMovement {
        robot_id: RobotId,
    },
    OpenEventStream {
        robot_id: RobotId,
    },
    CurrentMap {
        robot_id: RobotId,
    },
    Dock {
        robot_id: RobotId,
    },
    Undock {
        robot_id: RobotId,
    },
    BatteryState {
        robot_id: RobotId,
    },
}

#[derive(Debug, Default)]
struct FakeState {
    next_action_id: ActionId,
    outcomes: HashMap<RobotId, VecDeque<MoveOutcome>>,
    statuses: HashMap<ActionId, MovementStatus>,
    /// Goal currently executing per robot
    active: HashMap<RobotId, ActionId>,
    streams: HashMap<RobotId, Vec<mpsc::UnboundedSender<ControllerResult<RawEvent>>>>,
    docked: HashSet<RobotId>,
    map: Option<MapSnapshot>,
    calls: Vec<ControllerCall>,
}

#[derive(Debug, Clone)]
pub struct FakeController {
    state: Arc<Mutex<FakeState>>,
    completion_delay: Duration,
    emit_movement_events: bool,
    fail_cancel: bool,
}

impl Default for FakeController {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeController {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                next_action_id: 1,
                ..Default::default()
            })),
            completion_delay: Duration::from_millis(20),
            emit_movement_events: true,
            fail_cancel: false,
        }
    }

    pub fn with_map(self, map: MapSnapshot) -> Self {
        self.state.lock().map = Some(map);
        self
    }

    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = delay;
        self
    }

    /// Settle goals through the status query only
    pub fn without_movement_events(mut self) -> Self {
        self.emit_movement_events = false;
        self
    }

    /// Make every cancel request fail at the transport
    pub fn with_failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    pub fn set_map(&self, map: MapSnapshot) {
        self.state.lock().map = Some(map);
    }

    pub fn set_docked(&self, robot_id: &str, docked: bool) {
        let mut state = self.state.lock();
        if docked {
            state.docked.insert(robot_id.to_string());
        } else {
            state.docked.remove(robot_id);
        }
    }

    pub fn is_docked(&self, robot_id: &str) -> bool {
        self.state.lock().docked.contains(robot_id)
    }

    /// Queue the outcome for the robot's next goal
    pub fn script_move(&self, robot_id: &str, outcome: MoveOutcome) {
        self.state
            .lock()
            .outcomes
            .entry(robot_id.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn calls(&self) -> Vec<ControllerCall> {
        self.state.lock().calls.clone()
    }

    /// Goals submitted for a robot, in order
    pub fn submitted_moves(&self, robot_id: &str) -> Vec<(Point, MovementKind)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ControllerCall::SubmitMove {
                    robot_id: r,
                    target,
                    kind,
                    ..
                } if r == robot_id => Some((target.clone(), *kind)),
                _ => None,
            })
            .collect()
    }

    pub fn call_count(&self, matches: impl Fn(&ControllerCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| matches(c)).count()
    }

    /// Action the robot is currently executing
    pub fn active_action(&self, robot_id: &str) -> Option<ActionId> {
        self.state.lock().active.get(robot_id).copied()
    }

    /// Push a raw message to every open stream of the robot
    pub fn emit(&self, robot_id: &str, event: RawEvent) {
        Self::send(&mut self.state.lock(), robot_id, Ok(event));
    }

    pub fn emit_error(&self, robot_id: &str, error: ControllerError) {
        Self::send(&mut self.state.lock(), robot_id, Err(error));
    }

    pub fn emit_battery(&self, robot_id: &str, fraction: f64, docked: bool) {
        self.emit(
            robot_id,
            RawEvent::new(
                topics::BATTERY,
                json!({
                    "percentage": fraction,
                    "power_supply_status": if docked { "charging" } else { "discharging" },
                    "docked": docked,
                }),
            ),
        );
    }

    pub fn emit_faults(&self, robot_id: &str, faults: &[(i64, &str, &str)]) {
        let errors: Vec<_> = faults
            .iter()
            .map(|(code, level, msg)| json!({"code": code, "level": level, "msg": msg}))
            .collect();
        self.emit(
            robot_id,
            RawEvent::new(topics::FAULTS, json!({ "errors": errors })),
        );
    }

    pub fn emit_localization(&self, robot_id: &str, reliable: bool) {
        self.emit(
            robot_id,
            RawEvent::new(
                topics::LOCALIZATION,
                json!({"reliable": reliable, "position_quality": if reliable { 0.9 } else { 0.1 }}),
            ),
        );
    }

    /// End every open stream of the robot
    pub fn close_streams(&self, robot_id: &str) {
        self.state.lock().streams.remove(robot_id);
    }

    pub fn open_stream_count(&self, robot_id: &str) -> usize {
        self.state
            .lock()
            .streams
            .get(robot_id)
            .map_or(0, |senders| senders.iter().filter(|s| !s.is_closed()).count())
    }

    fn send(state: &mut FakeState, robot_id: &str, item: ControllerResult<RawEvent>) {
        if let Some(senders) = state.streams.get_mut(robot_id) {
            senders.retain(|tx| tx.unbounded_send(item.clone()).is_ok());
        }
    }

    fn movement_event(status: &MovementStatus) -> RawEvent {
        let (code, message) = match &status.fail_reason {
            Some(reason) => (Some(reason.code), Some(reason.message.clone())),
            None => (None, None),
        };
        RawEvent::new(
            topics::MOVEMENT,
            json!({
                "action_id": status.action_id,
                "move_state": status.state,
                "fail_reason": code,
                "fail_reason_str": message,
            }),
        )
    }

    /// Record a new status for an action and publish it
    fn settle(
        state: &Arc<Mutex<FakeState>>,
        robot_id: &str,
        status: MovementStatus,
        emit: bool,
    ) {
        let mut state = state.lock();
        let current = state.statuses.get(&status.action_id).map(|s| s.state);
        if current.is_some_and(|s| s.is_terminal()) {
            return;
        }
        if status.state.is_terminal()
            && state.active.get(robot_id) == Some(&status.action_id)
        {
            state.active.remove(robot_id);
        }
        state.statuses.insert(status.action_id, status.clone());
        if emit {
            Self::send(&mut state, robot_id, Ok(Self::movement_event(&status)));
        }
    }
}

#[async_trait]
impl RobotController for FakeController {
    async fn submit_move(&self, robot_id: &str, goal: &MoveGoal) -> ControllerResult<ActionId> {
        let (action_id, outcome) = {
            let mut state = self.state.lock();
            let outcome = state
                .outcomes
                .get_mut(robot_id)
                .and_then(|q| q.pop_front())
                .unwrap_or(MoveOutcome::Succeed);
            if let MoveOutcome::Reject(reason) = &outcome {
                return Err(ControllerError::Rejected {
                    robot_id: robot_id.to_string(),
                    request: "move".to_string(),
                    reason: reason.clone(),
                });
            }
            if state.docked.contains(robot_id) {
                return Err(ControllerError::Rejected {
                    robot_id: robot_id.to_string(),
                    request: "move".to_string(),
                    reason: "robot is docked".to_string(),
                });
            }

            let action_id = state.next_action_id;
            state.next_action_id += 1;
            state.calls.push(ControllerCall::SubmitMove {
                robot_id: robot_id.to_string(),
                action_id,
                target: goal.target.clone(),
                kind: goal.kind,
                accuracy: goal.accuracy,
            });
            state.active.insert(robot_id.to_string(), action_id);
            (action_id, outcome)
        };

        Self::settle(
            &self.state,
            robot_id,
            MovementStatus::new(action_id, MovementState::Moving),
            self.emit_movement_events,
        );

        let terminal = match outcome {
            MoveOutcome::Succeed => Some(MovementStatus::new(action_id, MovementState::Succeeded)),
            MoveOutcome::Fail(reason) => Some(MovementStatus::failed(action_id, reason)),
            MoveOutcome::Hold | MoveOutcome::Reject(_) => None,
        };
        if let Some(status) = terminal {
            let state = Arc::clone(&self.state);
            let robot_id = robot_id.to_string();
            let delay = self.completion_delay;
            let emit = self.emit_movement_events;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                Self::settle(&state, &robot_id, status, emit);
            });
        }

        Ok(action_id)
    }

    async fn movement_status(
        &self,
        robot_id: &str,
        action_id: ActionId,
    ) -> ControllerResult<MovementStatus> {
        let mut state = self.state.lock();
        state.calls.push(ControllerCall::MovementStatus {
            robot_id: robot_id.to_string(),
            action_id,
        });
        state
            .statuses
            .get(&action_id)
            .cloned()
            .ok_or_else(|| ControllerError::UnknownAction {
                robot_id: robot_id.to_string(),
                action_id,
            })
    }

    async fn cancel_movement(&self, robot_id: &str) -> ControllerResult<()> {
        let active = {
            let mut state = self.state.lock();
            state.calls.push(ControllerCall::CancelMovement {
                robot_id: robot_id.to_string(),
            });
            if self.fail_cancel {
                return Err(ControllerError::Transport {
                    robot_id: robot_id.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            state.active.get(robot_id).copied()
        };

        if let Some(action_id) = active {
            let mut status = MovementStatus::new(action_id, MovementState::Cancelled);
            status.fail_reason = Some(FailReason::cancelled());
            Self::settle(&self.state, robot_id, status, self.emit_movement_events);
        }
        Ok(())
    }

    async fn open_event_stream(
        &self,
        robot_id: &str,
        _topics: &[String],
    ) -> ControllerResult<EventStream> {
        let (tx, rx) = mpsc::unbounded();
        let mut state = self.state.lock();
        state.calls.push(ControllerCall::OpenEventStream {
            robot_id: robot_id.to_string(),
        });
        state
            .streams
            .entry(robot_id.to_string())
            .or_default()
            .push(tx);
        Ok(rx.boxed())
    }

    async fn current_map(&self, robot_id: &str) -> ControllerResult<MapSnapshot> {
        let mut state = self.state.lock();
        state.calls.push(ControllerCall::CurrentMap {
            robot_id: robot_id.to_string(),
        });
        state.map.clone().ok_or_else(|| ControllerError::Transport {
            robot_id: robot_id.to_string(),
            reason: "no map loaded".to_string(),
        })
    }

    async fn dock(&self, robot_id: &str) -> ControllerResult<()> {
        let mut state = self.state.lock();
        state.calls.push(ControllerCall::Dock {
            robot_id: robot_id.to_string(),
        });
        state.docked.insert(robot_id.to_string());
        Ok(())
    }

    async fn undock(&self, robot_id: &str) -> ControllerResult<()> {
        let mut state = self.state.lock();
        state.calls.push(ControllerCall::Undock {
            robot_id: robot_id.to_string(),
        });
        state.docked.remove(robot_id);
        Ok(())
    }

    async fn battery_state(&self, robot_id: &str) -> ControllerResult<BatteryState> {
        let mut state = self.state.lock();
        state.calls.push(ControllerCall::BatteryState {
            robot_id: robot_id.to_string(),
        });
        let docked = state.docked.contains(robot_id);
        Ok(BatteryState {
            percentage: 80.0,
            charging: docked,
            docked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PointType;

    fn goal() -> MoveGoal {
        MoveGoal {
            target: Point::new("p1", "A", PointType::Dropoff, 1.0, 1.0),
            kind: MovementKind::Standard,
            accuracy: None,
        }
    }

    #[tokio::test]
    async fn test_scripted_failure_is_reported_by_status_query() {
        let fake = FakeController::new().with_completion_delay(Duration::from_millis(1));
        fake.script_move("r1", MoveOutcome::Fail(FailReason::new(1003, "blocked")));

        let action_id = fake.submit_move("r1", &goal()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let status = fake.movement_status("r1", action_id).await.unwrap();
        assert_eq!(status.state, MovementState::Failed);
        assert_eq!(status.fail_reason, Some(FailReason::new(1003, "blocked")));
        assert_eq!(fake.active_action("r1"), None);
    }

    #[tokio::test]
    async fn test_held_goal_settles_on_cancel() {
        let fake = FakeController::new();
        fake.script_move("r1", MoveOutcome::Hold);
        let mut stream = fake.open_event_stream("r1", &[]).await.unwrap();

        let action_id = fake.submit_move("r1", &goal()).await.unwrap();
        fake.cancel_movement("r1").await.unwrap();

        let moving = stream.next().await.unwrap().unwrap();
        assert_eq!(moving.payload["move_state"], "moving");
        let cancelled = stream.next().await.unwrap().unwrap();
        assert_eq!(cancelled.payload["action_id"], action_id);
        assert_eq!(cancelled.payload["move_state"], "cancelled");
    }

    #[tokio::test]
    async fn test_docked_robot_rejects_goal() {
        let fake = FakeController::new();
        fake.set_docked("r1", true);
        let err = fake.submit_move("r1", &goal()).await.unwrap_err();
        assert!(matches!(err, ControllerError::Rejected { .. }));

        fake.undock("r1").await.unwrap();
        assert!(fake.submit_move("r1", &goal()).await.is_ok());
    }
}
