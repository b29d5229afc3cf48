//! # Robot Monitor
//!
//! One long-lived session per robot consumes the controller's event stream,
//! keeps a last-known [`RobotSnapshot`], updates the stored robot record,
//! broadcasts robot deltas and wakes movement waiters.
//!
//! Sessions are not restarted when a stream closes; the robot is marked
//! offline and the next [`RobotMonitor::start_monitoring`] opens a fresh one.

mod dispatcher;
pub mod events;
pub mod registry;
pub mod session;

pub use events::RobotEvent;
pub use registry::SessionRegistry;
pub use session::MonitorSession;

use crate::broadcast::BroadcastGateway;
use crate::config::MonitorConfig;
use crate::controller::RobotController;
use crate::errors::FleetResult;
use crate::models::{RobotId, RobotSnapshot, TaskId};
use crate::store::TaskStore;
use dashmap::DashMap;
use dispatcher::EventDispatcher;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct RobotMonitor {
    config: MonitorConfig,
    controller: Arc<dyn RobotController>,
    store: Arc<dyn TaskStore>,
    broadcaster: Arc<dyn BroadcastGateway>,
    registry: Arc<SessionRegistry>,
    handles: DashMap<RobotId, JoinHandle<()>>,
    start_lock: Mutex<()>,
}

impl std::fmt::Debug for RobotMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotMonitor")
            .field("sessions", &self.registry.robot_ids())
            .finish()
    }
}

impl RobotMonitor {
    pub fn new(
        config: MonitorConfig,
        controller: Arc<dyn RobotController>,
        store: Arc<dyn TaskStore>,
        broadcaster: Arc<dyn BroadcastGateway>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            config,
            controller,
            store,
            broadcaster,
            registry,
            handles: DashMap::new(),
            start_lock: Mutex::new(()),
        }
    }

    /// Open a session for `robot_id`, or return the one already running
    pub async fn start_monitoring(&self, robot_id: &str) -> FleetResult<Arc<MonitorSession>> {
        let _guard = self.start_lock.lock().await;
        if let Some(existing) = self.registry.get(robot_id) {
            if !existing.is_closed() {
                debug!(robot_id = %robot_id, "Robot already monitored");
                return Ok(existing);
            }
        }

        let stream = self
            .controller
            .open_event_stream(robot_id, &self.config.topics)
            .await?;

        let (session, shutdown_rx) = MonitorSession::new(
            robot_id,
            self.config.event_channel_capacity,
            self.config.terminal_cache_size,
        );
        let session = Arc::new(session);
        self.registry.insert(Arc::clone(&session));

        let dispatcher = EventDispatcher {
            session: Arc::clone(&session),
            store: Arc::clone(&self.store),
            broadcaster: Arc::clone(&self.broadcaster),
            registry: Arc::clone(&self.registry),
        };
        let handle = tokio::spawn(dispatcher.run(stream, shutdown_rx));
        if let Some(stale) = self.handles.insert(robot_id.to_string(), handle) {
            stale.abort();
        }

        Ok(session)
    }

    /// Stop the robot's session; returns whether one was running
    pub async fn stop_monitoring(&self, robot_id: &str) -> bool {
        let Some(session) = self.registry.remove(robot_id) else {
            return false;
        };
        session.stop();
        if let Some((_, handle)) = self.handles.remove(robot_id) {
            let _ = handle.await;
        }
        info!(robot_id = %robot_id, "Monitor session stopped");
        true
    }

    pub fn is_monitoring(&self, robot_id: &str) -> bool {
        self.registry
            .get(robot_id)
            .is_some_and(|s| !s.is_closed())
    }

    pub fn session(&self, robot_id: &str) -> Option<Arc<MonitorSession>> {
        self.registry.get(robot_id).filter(|s| !s.is_closed())
    }

    pub fn snapshot(&self, robot_id: &str) -> Option<RobotSnapshot> {
        self.session(robot_id).map(|s| s.snapshot())
    }

    pub fn subscribe(&self, robot_id: &str) -> Option<broadcast::Receiver<RobotEvent>> {
        self.session(robot_id).map(|s| s.subscribe())
    }

    /// Tie a task to the robot's session so error logs carry its id
    pub fn register_interest(&self, robot_id: &str, task_id: TaskId) -> bool {
        match self.session(robot_id) {
            Some(session) => {
                session.register_interest(task_id);
                true
            }
            None => false,
        }
    }

    pub fn release_interest(&self, robot_id: &str, task_id: TaskId) {
        if let Some(session) = self.registry.get(robot_id) {
            session.release_interest(task_id);
        }
    }

    pub fn monitored_robots(&self) -> Vec<RobotId> {
        self.registry.robot_ids()
    }

    /// Stop every session and wait for the dispatchers to exit
    pub async fn shutdown(&self) {
        for robot_id in self.registry.robot_ids() {
            self.stop_monitoring(&robot_id).await;
        }
        let leftover: Vec<RobotId> = self.handles.iter().map(|e| e.key().clone()).collect();
        for robot_id in leftover {
            if let Some((_, handle)) = self.handles.remove(&robot_id) {
                let _ = handle.await;
            }
        }
    }
}
