use crate::config::{CompletionStrategy, MovementConfig};
use crate::controller::{ControllerError, RobotController};
use crate::errors::{FleetError, FleetResult};
use crate::models::{
    ActionId, FailReason, MoveGoal, MovementAction, MovementKind, MovementState, MovementStatus,
    Point, RobotId, TaskId,
};
use crate::monitor::{MonitorSession, SessionRegistry};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// The goal currently owning a robot
#[derive(Debug, Clone)]
pub struct OutstandingMove {
    /// Unset until the controller accepted the goal
    pub action_id: Option<ActionId>,
    pub task_id: Option<TaskId>,
    pub target: Point,
    pub kind: MovementKind,
    pub submitted_at: DateTime<Utc>,
    pub cancelled: bool,
}

/// Submits movement goals and waits for them to finish.
///
/// At most one goal is outstanding per robot. Completion is learned from
/// monitor events when a live session exists, falling back to polling the
/// controller when there is no session or it has gone quiet.
pub struct MovementCoordinator {
    config: MovementConfig,
    controller: Arc<dyn RobotController>,
    sessions: Arc<SessionRegistry>,
    outstanding: DashMap<RobotId, OutstandingMove>,
    idle: Notify,
}

impl std::fmt::Debug for MovementCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovementCoordinator")
            .field("strategy", &self.config.strategy)
            .field("outstanding", &self.outstanding.len())
            .finish()
    }
}

/// Releases the robot's slot however `move_to` exits
struct SlotGuard<'a> {
    coordinator: &'a MovementCoordinator,
    robot_id: &'a str,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.outstanding.remove(self.robot_id);
        self.coordinator.idle.notify_waiters();
    }
}

impl MovementCoordinator {
    pub fn new(
        config: MovementConfig,
        controller: Arc<dyn RobotController>,
        sessions: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            config,
            controller,
            sessions,
            outstanding: DashMap::new(),
            idle: Notify::new(),
        }
    }

    /// Drive `robot_id` to `target` and wait for a terminal state.
    ///
    /// Docked robots are undocked first. Returns the finished action on
    /// success; controller-reported failures come back as
    /// [`FleetError::MovementFailed`] with the controller's reason intact.
    pub async fn move_to(
        &self,
        robot_id: &str,
        task_id: Option<TaskId>,
        target: &Point,
        kind: MovementKind,
    ) -> FleetResult<MovementAction> {
        self.move_to_with_accuracy(robot_id, task_id, target, kind, None)
            .await
    }

    /// [`Self::move_to`] with an arrival tolerance in meters; `None` uses the
    /// configured default
    #[instrument(skip(self, target), fields(target = %target.name))]
    pub async fn move_to_with_accuracy(
        &self,
        robot_id: &str,
        task_id: Option<TaskId>,
        target: &Point,
        kind: MovementKind,
        accuracy: Option<f64>,
    ) -> FleetResult<MovementAction> {
        match self.outstanding.entry(robot_id.to_string()) {
            Entry::Occupied(existing) => {
                return Err(FleetError::MovementInProgress {
                    robot_id: robot_id.to_string(),
                    action_id: existing.get().action_id,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(OutstandingMove {
                    action_id: None,
                    task_id,
                    target: target.clone(),
                    kind,
                    submitted_at: Utc::now(),
                    cancelled: false,
                });
            }
        }
        let _slot = SlotGuard {
            coordinator: self,
            robot_id,
        };

        self.ensure_undocked(robot_id).await?;

        if self.cancel_flagged(robot_id) {
            return Err(FleetError::ActionFailed {
                robot_id: robot_id.to_string(),
                action: "submit_move".to_string(),
                reason: "cancelled before submission".to_string(),
            });
        }

        let goal = MoveGoal {
            target: target.clone(),
            kind,
            accuracy: accuracy.or(self.config.default_accuracy_m),
        };
        let action_id = self
            .controller
            .submit_move(robot_id, &goal)
            .await
            .map_err(|err| match err {
                ControllerError::Rejected { reason, .. } => FleetError::ActionFailed {
                    robot_id: robot_id.to_string(),
                    action: "submit_move".to_string(),
                    reason,
                },
                other => other.into(),
            })?;

        let submitted_at = Utc::now();
        let cancelled = self
            .outstanding
            .get_mut(robot_id)
            .map(|mut m| {
                m.action_id = Some(action_id);
                m.submitted_at = submitted_at;
                m.cancelled
            })
            .unwrap_or(false);
        info!(robot_id = %robot_id, action_id, kind = %kind, "Movement goal submitted");

        if cancelled {
            debug!(robot_id = %robot_id, action_id, "Cancel arrived during submission");
            if let Err(err) = self.controller.cancel_movement(robot_id).await {
                warn!(robot_id = %robot_id, action_id, error = %err, "Late cancel failed");
            }
        }

        let mut action = MovementAction {
            id: action_id,
            robot_id: robot_id.to_string(),
            task_id,
            target_point: target.clone(),
            kind,
            state: MovementState::Moving,
            fail_reason: None,
            submitted_at,
            finished_at: None,
        };

        let timeout = self.config.timeout_for(kind);
        let Some(status) = self.wait_for_terminal(robot_id, action_id, timeout).await else {
            warn!(robot_id = %robot_id, action_id, ?timeout, "Movement timed out");
            return Err(FleetError::MovementTimeout {
                robot_id: robot_id.to_string(),
                action_id,
                timeout,
            });
        };
        action.finish(&status);

        match status.state {
            MovementState::Succeeded => {
                info!(robot_id = %robot_id, action_id, "Movement succeeded");
                Ok(action)
            }
            MovementState::Cancelled => Err(FleetError::MovementFailed {
                robot_id: robot_id.to_string(),
                action_id,
                reason: status.fail_reason.unwrap_or_else(FailReason::cancelled),
            }),
            _ => {
                let reason = status
                    .fail_reason
                    .unwrap_or_else(|| FailReason::new(-1, "unknown failure"));
                warn!(robot_id = %robot_id, action_id, reason = %reason, "Movement failed");
                Err(FleetError::MovementFailed {
                    robot_id: robot_id.to_string(),
                    action_id,
                    reason,
                })
            }
        }
    }

    /// Request cancellation of the robot's outstanding goal.
    ///
    /// Returns `false` when nothing is outstanding. A goal still being
    /// submitted is cancelled as soon as its action id is known.
    pub async fn cancel_current(&self, robot_id: &str) -> FleetResult<bool> {
        let action_id = match self.outstanding.get_mut(robot_id) {
            Some(mut m) => {
                m.cancelled = true;
                m.action_id
            }
            None => return Ok(false),
        };
        if let Some(action_id) = action_id {
            info!(robot_id = %robot_id, action_id, "Cancelling movement");
            self.controller.cancel_movement(robot_id).await?;
        }
        Ok(true)
    }

    /// Wait until the robot has no outstanding goal
    pub async fn wait_until_idle(&self, robot_id: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.outstanding.contains_key(robot_id) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return !self.outstanding.contains_key(robot_id);
            }
        }
    }

    pub fn has_outstanding(&self, robot_id: &str) -> bool {
        self.outstanding.contains_key(robot_id)
    }

    pub fn outstanding(&self, robot_id: &str) -> Option<OutstandingMove> {
        self.outstanding.get(robot_id).map(|m| m.clone())
    }

    pub fn outstanding_action(&self, robot_id: &str) -> Option<ActionId> {
        self.outstanding.get(robot_id).and_then(|m| m.action_id)
    }

    /// Task that owns the robot's outstanding goal, if any
    pub fn outstanding_task(&self, robot_id: &str) -> Option<TaskId> {
        self.outstanding.get(robot_id).and_then(|m| m.task_id)
    }

    fn cancel_flagged(&self, robot_id: &str) -> bool {
        self.outstanding
            .get(robot_id)
            .is_some_and(|m| m.cancelled)
    }

    async fn ensure_undocked(&self, robot_id: &str) -> FleetResult<()> {
        let live = self
            .sessions
            .get(robot_id)
            .filter(|s| !s.is_closed() && s.snapshot().battery.is_some());
        let docked = match live {
            Some(session) => session.is_docked(),
            None => {
                let battery = self.controller.battery_state(robot_id).await?;
                battery.docked || battery.charging
            }
        };
        if !docked {
            return Ok(());
        }

        info!(robot_id = %robot_id, "Undocking before movement");
        self.controller
            .undock(robot_id)
            .await
            .map_err(|err| FleetError::ActionFailed {
                robot_id: robot_id.to_string(),
                action: "undock".to_string(),
                reason: err.to_string(),
            })?;
        tokio::time::sleep(self.config.undock_settle()).await;
        Ok(())
    }

    /// Terminal status for `action_id`, or `None` once `timeout` elapses
    async fn wait_for_terminal(
        &self,
        robot_id: &str,
        action_id: ActionId,
        timeout: Duration,
    ) -> Option<MovementStatus> {
        let deadline = Instant::now() + timeout;
        let use_events = self.config.strategy == CompletionStrategy::EventsWithPollingFallback;
        let mut watch: Option<(Uuid, oneshot::Receiver<MovementStatus>)> = None;
        let mut last_session: Option<Arc<MonitorSession>> = None;

        loop {
            let now = Instant::now();
            if now >= deadline {
                if let Some(session) = last_session {
                    session.forget_action(action_id);
                }
                return None;
            }

            let session = if use_events {
                self.sessions.get(robot_id).filter(|s| !s.is_closed())
            } else {
                None
            };
            match &session {
                Some(s) if watch.as_ref().map(|(id, _)| *id) != Some(s.session_id()) => {
                    watch = Some((s.session_id(), s.watch_action(action_id)));
                }
                Some(_) => {}
                None => watch = None,
            }

            if session.as_ref().map_or(true, |s| self.is_stalled(s)) {
                if let Some(status) = self.poll_status(robot_id, action_id).await {
                    return Some(status);
                }
            }
            if session.is_some() {
                last_session = session;
            }

            let tick = self
                .config
                .poll_interval()
                .min(deadline.saturating_duration_since(Instant::now()));
            match watch.as_mut() {
                Some((_, rx)) => match tokio::time::timeout(tick, rx).await {
                    Ok(Ok(status)) => return Some(status),
                    // Session ended; poll on the next pass
                    Ok(Err(_)) => watch = None,
                    Err(_) => {}
                },
                None => tokio::time::sleep(tick).await,
            }
        }
    }

    fn is_stalled(&self, session: &MonitorSession) -> bool {
        let threshold = self.config.event_stall_threshold();
        match session.last_event_at() {
            Some(at) => (Utc::now() - at)
                .to_std()
                .map_or(false, |elapsed| elapsed > threshold),
            None => true,
        }
    }

    async fn poll_status(&self, robot_id: &str, action_id: ActionId) -> Option<MovementStatus> {
        match self.controller.movement_status(robot_id, action_id).await {
            Ok(status) if status.action_id == action_id && status.state.is_terminal() => {
                debug!(robot_id = %robot_id, action_id, state = %status.state, "Terminal status from polling");
                Some(status)
            }
            Ok(_) => None,
            Err(err) => {
                warn!(robot_id = %robot_id, action_id, error = %err, "Movement status poll failed");
                None
            }
        }
    }
}
