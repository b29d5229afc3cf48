use super::naming::{derived_names, fuzzy_find, name_from_task_title};
use crate::controller::RobotController;
use crate::errors::{FleetError, FleetResult};
use crate::models::{MapSnapshot, Point, PointRole, Task, TaskPoint};
use crate::state_machine::TaskPersistence;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which lookup produced a resolved point
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResolutionTier {
    /// Denormalized copy already stored on the task
    Inline,
    /// Stored map id still present on the live map
    StoredId,
    /// Stored name, or a docking spelling of it, found on the map
    DerivedName,
    /// Name recovered from the task's human-readable title
    TaskName,
    /// First point of a compatible type; degraded
    TypeFallback,
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inline => "inline",
            Self::StoredId => "stored_id",
            Self::DerivedName => "derived_name",
            Self::TaskName => "task_name",
            Self::TypeFallback => "type_fallback",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub point: Point,
    pub tier: ResolutionTier,
}

/// Resolves a task's role points against the robot's live map and repairs
/// the task's stored copy when a fallback had to be used.
pub struct PointResolver {
    controller: Arc<dyn RobotController>,
    persistence: Arc<TaskPersistence>,
}

impl fmt::Debug for PointResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointResolver").finish_non_exhaustive()
    }
}

/// The task reference being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// First reference holding the role (`Return` lives in `return_point`)
    Role(PointRole),
    /// Entry of `Task::points` by position; waypoints may share a role
    Waypoint(usize),
}

impl Slot {
    fn reference<'t>(&self, task: &'t Task) -> Option<&'t TaskPoint> {
        match *self {
            Self::Role(role) => task.task_point(role),
            Self::Waypoint(index) => task.points.get(index),
        }
    }
}

impl PointResolver {
    pub fn new(controller: Arc<dyn RobotController>, persistence: Arc<TaskPersistence>) -> Self {
        Self {
            controller,
            persistence,
        }
    }

    pub async fn resolve_point(&self, task: &mut Task, role: PointRole) -> FleetResult<Point> {
        self.resolve(task, role).await.map(|r| r.point)
    }

    /// Resolve `role` for `task`, first match wins.
    ///
    /// A point recovered below the inline tier is written to both `task` and
    /// the stored record, so the next resolution is inline and free.
    pub async fn resolve(&self, task: &mut Task, role: PointRole) -> FleetResult<Resolution> {
        self.resolve_slot(task, role, Slot::Role(role)).await
    }

    /// Resolve the `index`-th entry of `task.points` through the same chain,
    /// writing any recovery back to that entry only
    pub async fn resolve_waypoint(&self, task: &mut Task, index: usize) -> FleetResult<Resolution> {
        let Some(role) = task.points.get(index).map(|p| p.role) else {
            return Err(FleetError::InvalidState(format!(
                "task {} has no waypoint {index}",
                task.id
            )));
        };
        self.resolve_slot(task, role, Slot::Waypoint(index)).await
    }

    async fn resolve_slot(
        &self,
        task: &mut Task,
        role: PointRole,
        slot: Slot,
    ) -> FleetResult<Resolution> {
        if let Some(point) = slot.reference(task).and_then(|p| p.resolved.clone()) {
            return Ok(Resolution {
                point,
                tier: ResolutionTier::Inline,
            });
        }

        let map = self.controller.current_map(&task.robot_id).await?;
        let Some(resolution) = locate_reference(task, slot.reference(task), role, &map) else {
            warn!(task_id = %task.id, role = %role, ?slot, map_id = %map.map_id, "No point resolved");
            return Err(FleetError::PointNotFound {
                task_id: task.id,
                role,
            });
        };

        if resolution.tier == ResolutionTier::TypeFallback {
            warn!(
                task_id = %task.id,
                role = %role,
                point = %resolution.point.name,
                "Point resolved by type fallback; task references are degraded"
            );
        } else {
            info!(
                task_id = %task.id,
                role = %role,
                ?slot,
                point = %resolution.point.name,
                tier = %resolution.tier,
                "Recovered task point"
            );
        }

        let point = resolution.point.clone();
        write_back(task, slot, &point);
        let stored = self
            .persistence
            .mutate(task.id, |stored| {
                write_back(stored, slot, &point);
                Ok(())
            })
            .await?;
        task.updated_at = stored.updated_at;
        debug!(task_id = %task.id, role = %role, "Persisted recovered point");

        Ok(resolution)
    }
}

/// Map lookups below the inline tier, without side effects
pub fn locate(task: &Task, role: PointRole, map: &MapSnapshot) -> Option<Resolution> {
    locate_reference(task, task.task_point(role), role, map)
}

fn locate_reference(
    task: &Task,
    reference: Option<&TaskPoint>,
    role: PointRole,
    map: &MapSnapshot,
) -> Option<Resolution> {
    let found = |point: &Point, tier| {
        Some(Resolution {
            point: point.clone(),
            tier,
        })
    };

    if let Some(point) = reference
        .and_then(|r| r.point_id.as_deref())
        .and_then(|id| map.find_by_id(id))
    {
        return found(point, ResolutionTier::StoredId);
    }

    let stored_name = reference.and_then(|r| r.name.clone()).or_else(|| {
        // A return point without its own name docks at the task's charger
        match role {
            PointRole::Return => task.task_point(PointRole::Charger).and_then(|c| c.name.clone()),
            _ => None,
        }
    });
    if let Some(name) = stored_name {
        if let Some(point) = derived_names(&name, role)
            .iter()
            .find_map(|candidate| map.find_by_name(candidate))
        {
            return found(point, ResolutionTier::DerivedName);
        }
    }

    if let Some(point) =
        name_from_task_title(&task.name, role).and_then(|name| fuzzy_find(map, &name, role))
    {
        return found(point, ResolutionTier::TaskName);
    }

    map.first_of_types(role.compatible_types())
        .and_then(|point| found(point, ResolutionTier::TypeFallback))
}

fn write_back(task: &mut Task, slot: Slot, point: &Point) {
    let role = match slot {
        Slot::Waypoint(index) => {
            if let Some(reference) = task.points.get_mut(index) {
                reference.record_resolution(point);
            }
            return;
        }
        Slot::Role(role) => role,
    };
    if let Some(reference) = task.task_point_mut(role) {
        reference.record_resolution(point);
        return;
    }
    let reference = TaskPoint::from_point(role, point.clone());
    match role {
        PointRole::Return => task.return_point = Some(reference),
        _ => task.points.push(reference),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTask, PointType, TaskType};

    fn map() -> MapSnapshot {
        MapSnapshot::new(
            "m1",
            vec![
                Point::new("d-2", "A", PointType::Dropoff, 1.0, 1.0),
                Point::new("s-2", "B", PointType::Shelf, 5.0, 5.0),
                Point::new("c-2", "Home_docking", PointType::Docking, 0.0, 0.0),
            ],
        )
    }

    #[test]
    fn test_stored_id_wins_over_name() {
        let task = NewTask::new("Dropoff from A to B", TaskType::Dropoff, "r1")
            .with_point(TaskPoint::by_id(PointRole::Shelf, "s-2"))
            .into_task();
        let resolution = locate(&task, PointRole::Shelf, &map()).unwrap();
        assert_eq!(resolution.tier, ResolutionTier::StoredId);
        assert_eq!(resolution.point.id, "s-2");
    }

    #[test]
    fn test_derived_docking_name() {
        let task = NewTask::new("Return", TaskType::Return, "r1")
            .with_return_point(TaskPoint::by_name(PointRole::Return, "Home"))
            .into_task();
        let resolution = locate(&task, PointRole::Return, &map()).unwrap();
        assert_eq!(resolution.tier, ResolutionTier::DerivedName);
        assert_eq!(resolution.point.id, "c-2");
    }

    #[test]
    fn test_stale_id_recovered_from_title() {
        let task = NewTask::new("Dropoff from A to B", TaskType::Dropoff, "r1")
            .with_point(TaskPoint::by_id(PointRole::Dropoff, "d-1"))
            .into_task();
        let resolution = locate(&task, PointRole::Dropoff, &map()).unwrap();
        assert_eq!(resolution.tier, ResolutionTier::TaskName);
        assert_eq!(resolution.point.id, "d-2");
    }

    #[test]
    fn test_type_fallback_last() {
        let task = NewTask::new("Morning run", TaskType::Dropoff, "r1").into_task();
        let resolution = locate(&task, PointRole::Shelf, &map()).unwrap();
        assert_eq!(resolution.tier, ResolutionTier::TypeFallback);

        let empty = MapSnapshot::new("m2", vec![]);
        assert!(locate(&task, PointRole::Shelf, &empty).is_none());
    }

    #[test]
    fn test_write_back_creates_missing_reference() {
        let mut task = NewTask::new("Return", TaskType::Return, "r1").into_task();
        let point = Point::new("c-2", "Home_docking", PointType::Docking, 0.0, 0.0);
        write_back(&mut task, Slot::Role(PointRole::Return), &point);
        assert_eq!(
            task.task_point(PointRole::Return).and_then(|p| p.resolved.clone()),
            Some(point)
        );
    }

    #[test]
    fn test_waypoint_write_back_touches_only_its_entry() {
        let mut task = NewTask::new("Patrol", TaskType::GenericMove, "r1")
            .with_point(TaskPoint::by_name(PointRole::Dropoff, "A"))
            .with_point(TaskPoint::by_name(PointRole::Dropoff, "C"))
            .into_task();
        let c = Point::new("d-3", "C", PointType::Dropoff, 3.0, 3.0);

        let reference = Slot::Waypoint(1).reference(&task).cloned();
        let mut map = map();
        map.points.push(c.clone());
        let resolution = locate_reference(&task, reference.as_ref(), PointRole::Dropoff, &map).unwrap();
        assert_eq!(resolution.tier, ResolutionTier::DerivedName);
        assert_eq!(resolution.point, c);

        write_back(&mut task, Slot::Waypoint(1), &resolution.point);
        assert!(task.points[0].resolved.is_none());
        assert_eq!(task.points[1].resolved.as_ref(), Some(&c));
    }
}
