use crate::broadcast::{BroadcastGateway, StateDelta, TaskDelta};
use crate::config::FleetConfig;
use crate::controller::RobotController;
use crate::models::Task;
use crate::monitor::{RobotMonitor, SessionRegistry};
use crate::movement::MovementCoordinator;
use crate::points::PointResolver;
use crate::state_machine::TaskPersistence;
use crate::store::TaskStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Shared dependencies for the orchestration core
///
/// Owned by the process root and handed to the executor, the cancellation
/// protocol and the orchestrator facade:
/// - Configuration
/// - Task/robot store and the serialized task writer on top of it
/// - Robot controller adapter
/// - Session registry, robot monitor and movement coordinator
/// - Point resolver
/// - Broadcast gateway
pub struct FleetContext {
    /// Context instance ID
    pub context_id: Uuid,

    pub config: Arc<FleetConfig>,

    pub store: Arc<dyn TaskStore>,

    pub persistence: Arc<TaskPersistence>,

    pub controller: Arc<dyn RobotController>,

    /// One monitor session per robot, shared with the coordinator
    pub sessions: Arc<SessionRegistry>,

    pub monitor: Arc<RobotMonitor>,

    pub coordinator: Arc<MovementCoordinator>,

    pub resolver: Arc<PointResolver>,

    pub broadcaster: Arc<dyn BroadcastGateway>,
}

impl std::fmt::Debug for FleetContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetContext")
            .field("context_id", &self.context_id)
            .field("config", &self.config)
            .field("store", &"Arc<dyn TaskStore>")
            .field("controller", &"Arc<dyn RobotController>")
            .field("monitored_robots", &self.sessions.robot_ids())
            .field("broadcaster", &"Arc<dyn BroadcastGateway>")
            .finish()
    }
}

impl FleetContext {
    /// Wire the core components around the given adapters
    pub fn new(
        config: FleetConfig,
        controller: Arc<dyn RobotController>,
        store: Arc<dyn TaskStore>,
        broadcaster: Arc<dyn BroadcastGateway>,
    ) -> Arc<Self> {
        let context_id = Uuid::new_v4();
        let config = Arc::new(config);
        let sessions = Arc::new(SessionRegistry::new());
        let persistence = Arc::new(TaskPersistence::new(Arc::clone(&store)));

        let monitor = Arc::new(RobotMonitor::new(
            config.monitor.clone(),
            Arc::clone(&controller),
            Arc::clone(&store),
            Arc::clone(&broadcaster),
            Arc::clone(&sessions),
        ));
        let coordinator = Arc::new(MovementCoordinator::new(
            config.movement.clone(),
            Arc::clone(&controller),
            Arc::clone(&sessions),
        ));
        let resolver = Arc::new(PointResolver::new(
            Arc::clone(&controller),
            Arc::clone(&persistence),
        ));

        info!(
            context_id = %context_id,
            strategy = ?config.movement.strategy,
            "Fleet context initialized"
        );

        Arc::new(Self {
            context_id,
            config,
            store,
            persistence,
            controller,
            sessions,
            monitor,
            coordinator,
            resolver,
            broadcaster,
        })
    }

    pub fn broadcast_task(&self, task: &Task) {
        self.broadcaster
            .publish(StateDelta::Task(TaskDelta::from_task(task)));
    }
}
