//! # Task Model
//!
//! A task is one multi-step assignment for one robot. It carries the points
//! its workflow needs, the index of the step being executed, whether the robot
//! currently holds the payload, and the structured error from its last
//! failure.
//!
//! Each [`TaskPoint`] stores both the id the point had when the task was
//! created and a denormalized copy of the point itself. The copy is what steps
//! move to; the id and name exist so the resolver can repair the copy when
//! the map changes underneath the task.

use super::{Point, PointRole, RobotId, TaskId};
use crate::errors::ErrorDetails;
use crate::state_machine::TaskState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Dropoff,
    Pickup,
    Return,
    GenericMove,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dropoff => write!(f, "dropoff"),
            Self::Pickup => write!(f, "pickup"),
            Self::Return => write!(f, "return"),
            Self::GenericMove => write!(f, "generic_move"),
        }
    }
}

/// Extra work performed once the robot has arrived at a point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SubAction {
    Wait { seconds: u64 },
    Dock,
    Undock,
}

/// Intermediate progress shown to operators; never a top-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStatus {
    MovingToDropoff,
    WaitingForLoad,
    MovingToShelf,
    Unloading,
    Returning,
    MovingToWaypoint,
    RelocatingForCancel,
}

impl fmt::Display for SubStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MovingToDropoff => "moving_to_dropoff",
            Self::WaitingForLoad => "waiting_for_load",
            Self::MovingToShelf => "moving_to_shelf",
            Self::Unloading => "unloading",
            Self::Returning => "returning",
            Self::MovingToWaypoint => "moving_to_waypoint",
            Self::RelocatingForCancel => "relocating_for_cancel",
        };
        f.write_str(s)
    }
}

/// A point a task refers to in a given role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPoint {
    pub role: PointRole,
    /// Name the point had when the task was created
    pub name: Option<String>,
    /// Map id the point had when the task was created
    pub point_id: Option<String>,
    /// Denormalized copy used for movement
    pub resolved: Option<Point>,
    #[serde(default)]
    pub sub_actions: Vec<SubAction>,
}

impl TaskPoint {
    /// Reference a map point, keeping its id, name and a copy of it
    pub fn from_point(role: PointRole, point: Point) -> Self {
        Self {
            role,
            name: Some(point.name.clone()),
            point_id: Some(point.id.clone()),
            resolved: Some(point),
            sub_actions: Vec::new(),
        }
    }

    /// Reference a map point by id only
    pub fn by_id(role: PointRole, point_id: impl Into<String>) -> Self {
        Self {
            role,
            name: None,
            point_id: Some(point_id.into()),
            resolved: None,
            sub_actions: Vec::new(),
        }
    }

    /// Reference a map point by name only
    pub fn by_name(role: PointRole, name: impl Into<String>) -> Self {
        Self {
            role,
            name: Some(name.into()),
            point_id: None,
            resolved: None,
            sub_actions: Vec::new(),
        }
    }

    pub fn with_sub_action(mut self, action: SubAction) -> Self {
        self.sub_actions.push(action);
        self
    }

    /// Store a recovered point as this reference's denormalized copy
    pub fn record_resolution(&mut self, point: &Point) {
        self.point_id = Some(point.id.clone());
        if self.name.is_none() {
            self.name = Some(point.name.clone());
        }
        self.resolved = Some(point.clone());
    }
}

/// Parameters for creating a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub task_type: TaskType,
    pub robot_id: RobotId,
    pub points: Vec<TaskPoint>,
    pub return_point: Option<TaskPoint>,
}

impl NewTask {
    pub fn new(name: impl Into<String>, task_type: TaskType, robot_id: impl Into<RobotId>) -> Self {
        Self {
            name: name.into(),
            task_type,
            robot_id: robot_id.into(),
            points: Vec::new(),
            return_point: None,
        }
    }

    pub fn with_point(mut self, point: TaskPoint) -> Self {
        self.points.push(point);
        self
    }

    pub fn with_return_point(mut self, point: TaskPoint) -> Self {
        self.return_point = Some(point);
        self
    }

    pub fn into_task(self) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            name: self.name,
            task_type: self.task_type,
            robot_id: self.robot_id,
            status: TaskState::Pending,
            sub_status: None,
            points: self.points,
            return_point: self.return_point,
            current_step_index: 0,
            current_waypoint: None,
            carrying: false,
            error: None,
            cancel_requested_at: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Human-readable name; encodes role point names at creation time,
    /// e.g. "Dropoff from A to B"
    pub name: String,
    pub task_type: TaskType,
    pub robot_id: RobotId,
    pub status: TaskState,
    pub sub_status: Option<SubStatus>,
    pub points: Vec<TaskPoint>,
    pub return_point: Option<TaskPoint>,
    pub current_step_index: usize,
    /// Index into `points` of the waypoint being visited by a generic move
    #[serde(default)]
    pub current_waypoint: Option<usize>,
    pub carrying: bool,
    pub error: Option<ErrorDetails>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Point reference for a role; `Return` lives in `return_point`
    pub fn task_point(&self, role: PointRole) -> Option<&TaskPoint> {
        match role {
            PointRole::Return => self.return_point.as_ref(),
            _ => self.points.iter().find(|p| p.role == role),
        }
    }

    pub fn task_point_mut(&mut self, role: PointRole) -> Option<&mut TaskPoint> {
        match role {
            PointRole::Return => self.return_point.as_mut(),
            _ => self.points.iter_mut().find(|p| p.role == role),
        }
    }

    /// Name of a point reference, preferring the resolved map point
    pub fn point_name(&self, index: usize) -> Option<String> {
        let reference = self.points.get(index)?;
        reference
            .resolved
            .as_ref()
            .map(|point| point.name.clone())
            .or_else(|| reference.name.clone())
    }

    pub fn has_role(&self, role: PointRole) -> bool {
        self.task_point(role).is_some()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested_at.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PointType;

    #[test]
    fn test_return_role_reads_return_point() {
        let charger = Point::new("c1", "Charger", PointType::Charger, 0.0, 0.0);
        let task = NewTask::new("Return to Charger", TaskType::Return, "r1")
            .with_return_point(TaskPoint::from_point(PointRole::Return, charger.clone()))
            .into_task();

        assert!(task.has_role(PointRole::Return));
        assert!(!task.has_role(PointRole::Charger));
        assert_eq!(
            task.task_point(PointRole::Return).and_then(|p| p.resolved.clone()),
            Some(charger)
        );
        assert_eq!(task.status, TaskState::Pending);
        assert_eq!(task.current_step_index, 0);
        assert!(!task.carrying);
    }

    #[test]
    fn test_record_resolution_keeps_original_name() {
        let mut reference = TaskPoint::by_name(PointRole::Shelf, "Shelf B");
        let point = Point::new("s9", "shelf-b", PointType::Shelf, 5.0, 5.0);
        reference.record_resolution(&point);

        assert_eq!(reference.point_id.as_deref(), Some("s9"));
        assert_eq!(reference.name.as_deref(), Some("Shelf B"));
        assert_eq!(reference.resolved, Some(point));
    }

    #[test]
    fn test_sub_action_serde_shape() {
        let json = serde_json::to_value(SubAction::Wait { seconds: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({"action": "wait", "seconds": 3}));
        let dock: SubAction = serde_json::from_value(serde_json::json!({"action": "dock"})).unwrap();
        assert_eq!(dock, SubAction::Dock);
    }
}
