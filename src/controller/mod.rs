//! # Robot Controller Contract
//!
//! The vendor controller is consumed, not reimplemented. [`RobotController`]
//! is the seam an adapter for a concrete controller implements: goal
//! submission, status queries, cancellation, the live event stream, map
//! queries and dock/undock service calls.
//!
//! Events arrive raw ([`RawEvent`]: topic + JSON payload) and are normalized
//! by the monitor (see [`crate::monitor::events`]).

use crate::models::{ActionId, BatteryState, MapSnapshot, MoveGoal, MovementStatus, RobotId};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Topic names of the controller's event stream
pub mod topics {
    pub const POSE: &str = "/tracked_pose";
    pub const BATTERY: &str = "/battery_state";
    pub const MOVEMENT: &str = "/planning_state";
    pub const CONTROL_MODE: &str = "/wheel_state";
    pub const LOCALIZATION: &str = "/slam/state";
    pub const FAULTS: &str = "/diagnosis/result";

    pub const DEFAULT_TOPICS: &[&str] = &[POSE, BATTERY, MOVEMENT, CONTROL_MODE, LOCALIZATION, FAULTS];
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    #[error("transport failure talking to robot {robot_id}: {reason}")]
    Transport { robot_id: RobotId, reason: String },

    #[error("robot {robot_id} rejected {request}: {reason}")]
    Rejected {
        robot_id: RobotId,
        request: String,
        reason: String,
    },

    #[error("robot {robot_id} does not know action {action_id}")]
    UnknownAction {
        robot_id: RobotId,
        action_id: ActionId,
    },

    #[error("malformed {topic} payload from robot {robot_id}: {reason}")]
    Protocol {
        robot_id: RobotId,
        topic: String,
        reason: String,
    },
}

impl ControllerError {
    pub fn robot_id(&self) -> &str {
        match self {
            Self::Transport { robot_id, .. }
            | Self::Rejected { robot_id, .. }
            | Self::UnknownAction { robot_id, .. }
            | Self::Protocol { robot_id, .. } => robot_id,
        }
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;

/// One message from a robot's live event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl RawEvent {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// Live event stream; the stream ending means the session closed
pub type EventStream = BoxStream<'static, ControllerResult<RawEvent>>;

#[async_trait]
pub trait RobotController: Send + Sync {
    /// Submit a movement goal, returning the controller-assigned action id
    async fn submit_move(&self, robot_id: &str, goal: &MoveGoal) -> ControllerResult<ActionId>;

    async fn movement_status(
        &self,
        robot_id: &str,
        action_id: ActionId,
    ) -> ControllerResult<MovementStatus>;

    /// Mark the robot's in-flight action cancelled
    async fn cancel_movement(&self, robot_id: &str) -> ControllerResult<()>;

    async fn open_event_stream(
        &self,
        robot_id: &str,
        topics: &[String],
    ) -> ControllerResult<EventStream>;

    async fn current_map(&self, robot_id: &str) -> ControllerResult<MapSnapshot>;

    async fn dock(&self, robot_id: &str) -> ControllerResult<()>;

    async fn undock(&self, robot_id: &str) -> ControllerResult<()>;

    async fn battery_state(&self, robot_id: &str) -> ControllerResult<BatteryState>;
}
