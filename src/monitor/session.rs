use super::events::RobotEvent;
use crate::models::{ActionId, MovementStatus, RobotId, RobotSnapshot, RobotStatus, TaskId};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, oneshot};
use tracing::debug;
use uuid::Uuid;

/// Live state for one monitored robot.
///
/// The dispatcher task is the only writer of the snapshot; everything else
/// reads copies. Movement waiters are keyed by action id and resolved when a
/// terminal status for that action arrives. Terminal statuses are also kept
/// in a small ring so a waiter registered after the event still resolves.
#[derive(Debug)]
pub struct MonitorSession {
    robot_id: RobotId,
    session_id: Uuid,
    snapshot: RwLock<RobotSnapshot>,
    status: RwLock<RobotStatus>,
    interested_tasks: DashSet<TaskId>,
    waiters: DashMap<ActionId, Vec<oneshot::Sender<MovementStatus>>>,
    terminal_cache: Mutex<VecDeque<MovementStatus>>,
    terminal_cache_size: usize,
    events: broadcast::Sender<RobotEvent>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    closed: AtomicBool,
}

impl MonitorSession {
    pub(crate) fn new(
        robot_id: impl Into<RobotId>,
        event_channel_capacity: usize,
        terminal_cache_size: usize,
    ) -> (Self, oneshot::Receiver<()>) {
        let robot_id = robot_id.into();
        let (events, _) = broadcast::channel(event_channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let session = Self {
            snapshot: RwLock::new(RobotSnapshot::new(robot_id.clone())),
            robot_id,
            session_id: Uuid::new_v4(),
            status: RwLock::new(RobotStatus::Idle),
            interested_tasks: DashSet::new(),
            waiters: DashMap::new(),
            terminal_cache: Mutex::new(VecDeque::with_capacity(terminal_cache_size)),
            terminal_cache_size,
            events,
            shutdown: Mutex::new(Some(shutdown_tx)),
            closed: AtomicBool::new(false),
        };
        (session, shutdown_rx)
    }

    pub fn robot_id(&self) -> &str {
        &self.robot_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn snapshot(&self) -> RobotSnapshot {
        self.snapshot.read().clone()
    }

    pub fn status(&self) -> RobotStatus {
        *self.status.read()
    }

    pub(crate) fn set_status(&self, status: RobotStatus) {
        *self.status.write() = status;
    }

    pub fn is_docked(&self) -> bool {
        self.snapshot.read().is_docked()
    }

    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().last_event_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Typed fan-out of every event this session processes, in arrival order
    pub fn subscribe(&self) -> broadcast::Receiver<RobotEvent> {
        self.events.subscribe()
    }

    /// Resolve when `action_id` reaches a terminal state.
    ///
    /// Resolves immediately when the terminal status was already seen. The
    /// receiver reports closed when the session ends first.
    pub fn watch_action(&self, action_id: ActionId) -> oneshot::Receiver<MovementStatus> {
        let (tx, rx) = oneshot::channel();
        let cache = self.terminal_cache.lock();
        if let Some(status) = cache.iter().rev().find(|s| s.action_id == action_id) {
            let _ = tx.send(status.clone());
            return rx;
        }
        if !self.is_closed() {
            self.waiters.entry(action_id).or_default().push(tx);
        }
        rx
    }

    /// Drop waiters for an action nobody is waiting on any more
    pub fn forget_action(&self, action_id: ActionId) {
        self.waiters.remove(&action_id);
    }

    pub fn register_interest(&self, task_id: TaskId) {
        self.interested_tasks.insert(task_id);
    }

    pub fn release_interest(&self, task_id: TaskId) {
        self.interested_tasks.remove(&task_id);
    }

    pub fn interested_tasks(&self) -> Vec<TaskId> {
        self.interested_tasks.iter().map(|t| *t).collect()
    }

    /// Fold an event into the snapshot and return the previous snapshot
    pub(crate) fn apply(&self, event: &RobotEvent) -> RobotSnapshot {
        let mut snapshot = self.snapshot.write();
        let previous = snapshot.clone();
        match event {
            RobotEvent::Pose(pose) => snapshot.pose = Some(pose.clone()),
            RobotEvent::Battery(battery) => snapshot.battery = Some(battery.clone()),
            RobotEvent::Movement(status) => snapshot.movement = Some(status.clone()),
            RobotEvent::Control(control) => snapshot.control = Some(control.clone()),
            RobotEvent::Localization(loc) => snapshot.localization = Some(loc.clone()),
            RobotEvent::Faults(faults) => snapshot.faults = faults.clone(),
        }
        snapshot.last_event_at = Some(Utc::now());
        previous
    }

    /// Record a terminal status and wake everyone waiting on its action
    pub(crate) fn resolve_waiters(&self, status: &MovementStatus) {
        if !status.state.is_terminal() {
            return;
        }
        let mut cache = self.terminal_cache.lock();
        if self.terminal_cache_size > 0 {
            if cache.len() == self.terminal_cache_size {
                cache.pop_front();
            }
            cache.push_back(status.clone());
        }
        if let Some((_, senders)) = self.waiters.remove(&status.action_id) {
            debug!(
                robot_id = %self.robot_id,
                action_id = status.action_id,
                waiters = senders.len(),
                state = %status.state,
                "Resolving movement waiters"
            );
            for sender in senders {
                let _ = sender.send(status.clone());
            }
        }
    }

    pub(crate) fn fan_out(&self, event: RobotEvent) {
        let _ = self.events.send(event);
    }

    /// Ask the dispatcher to stop; outstanding waiters see a closed channel
    pub fn stop(&self) {
        self.close();
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Hold the cache lock so no waiter slips in after the clear
        let _cache = self.terminal_cache.lock();
        self.waiters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailReason, MovementState};

    fn session() -> MonitorSession {
        MonitorSession::new("r1", 8, 4).0
    }

    #[tokio::test]
    async fn test_waiter_resolves_on_terminal_status() {
        let session = session();
        let rx = session.watch_action(5);

        session.resolve_waiters(&MovementStatus::new(5, MovementState::Moving));
        session.resolve_waiters(&MovementStatus::failed(5, FailReason::new(9, "Blocked")));

        let status = rx.await.unwrap();
        assert_eq!(status.state, MovementState::Failed);
        assert_eq!(status.fail_reason.unwrap().message, "Blocked");
    }

    #[tokio::test]
    async fn test_late_waiter_reads_terminal_cache() {
        let session = session();
        session.resolve_waiters(&MovementStatus::new(11, MovementState::Succeeded));
        let status = session.watch_action(11).await.unwrap();
        assert_eq!(status.state, MovementState::Succeeded);
    }

    #[tokio::test]
    async fn test_terminal_cache_is_bounded() {
        let session = session();
        for id in 0..6 {
            session.resolve_waiters(&MovementStatus::new(id, MovementState::Succeeded));
        }
        assert_eq!(session.terminal_cache.lock().len(), 4);
        assert!(session.watch_action(0).try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_closes_waiters() {
        let session = session();
        let rx = session.watch_action(1);
        session.stop();
        assert!(rx.await.is_err());
        assert!(session.is_closed());
    }

    #[test]
    fn test_apply_updates_snapshot() {
        let session = session();
        assert!(session.last_event_at().is_none());
        let previous = session.apply(&RobotEvent::Movement(MovementStatus::new(
            3,
            MovementState::Moving,
        )));
        assert!(previous.movement.is_none());
        assert_eq!(
            session.snapshot().movement.map(|m| m.state),
            Some(MovementState::Moving)
        );
        assert!(session.last_event_at().is_some());
    }
}
