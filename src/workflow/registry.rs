use super::step_handler::StepHandler;
use super::steps::{DeliverPayloadStep, MoveToRoleStep, ReturnToChargerStep, VisitWaypointsStep};
use crate::errors::{FleetError, FleetResult};
use crate::models::{MovementKind, PointRole, SubStatus, Task, TaskType};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Ordered steps for one task type
#[derive(Clone)]
pub struct Workflow {
    pub task_type: TaskType,
    pub steps: Vec<Arc<dyn StepHandler>>,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("task_type", &self.task_type)
            .field("steps", &self.step_names())
            .finish()
    }
}

impl Workflow {
    pub fn new(task_type: TaskType, steps: Vec<Arc<dyn StepHandler>>) -> Self {
        Self { task_type, steps }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check that every step can run against `task`
    pub fn initialize(&self, task: &Task) -> FleetResult<()> {
        if task.task_type != self.task_type {
            return Err(FleetError::InvalidTaskConfiguration {
                task_id: task.id,
                reason: format!(
                    "{} workflow cannot run a {} task",
                    self.task_type, task.task_type
                ),
            });
        }
        for step in &self.steps {
            step.validate(task)
                .map_err(|reason| FleetError::InvalidTaskConfiguration {
                    task_id: task.id,
                    reason,
                })?;
        }
        Ok(())
    }
}

fn step(handler: impl StepHandler + 'static) -> Arc<dyn StepHandler> {
    Arc::new(handler)
}

/// Static mapping from task type to workflow
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<TaskType, Workflow>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in dropoff, pickup, return and generic-move
    /// workflows
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register(Workflow::new(
            TaskType::Dropoff,
            vec![
                step(
                    MoveToRoleStep::new(
                        "move_to_dropoff",
                        PointRole::Dropoff,
                        MovementKind::Standard,
                        SubStatus::MovingToDropoff,
                    )
                    .on_arrival(SubStatus::WaitingForLoad),
                ),
                step(DeliverPayloadStep::new(
                    "deliver_to_shelf",
                    PointRole::Shelf,
                    SubStatus::MovingToShelf,
                )),
                step(ReturnToChargerStep::new()),
            ],
        ));

        registry.register(Workflow::new(
            TaskType::Pickup,
            vec![
                step(
                    MoveToRoleStep::new(
                        "pick_from_shelf",
                        PointRole::Shelf,
                        MovementKind::RackAlign,
                        SubStatus::MovingToShelf,
                    )
                    .loads_payload(),
                ),
                step(DeliverPayloadStep::new(
                    "deliver_to_dropoff",
                    PointRole::Dropoff,
                    SubStatus::MovingToDropoff,
                )),
                step(ReturnToChargerStep::new()),
            ],
        ));

        registry.register(Workflow::new(
            TaskType::Return,
            vec![step(ReturnToChargerStep::requiring_return_point())],
        ));

        registry.register(Workflow::new(
            TaskType::GenericMove,
            vec![step(VisitWaypointsStep)],
        ));

        registry
    }

    pub fn register(&mut self, workflow: Workflow) {
        debug!(task_type = %workflow.task_type, steps = ?workflow.step_names(), "Registering workflow");
        self.workflows.insert(workflow.task_type, workflow);
    }

    pub fn get(&self, task_type: TaskType) -> Option<&Workflow> {
        self.workflows.get(&task_type)
    }

    /// Workflow for `task`, validated against it
    pub fn workflow_for(&self, task: &Task) -> FleetResult<&Workflow> {
        let workflow = self
            .get(task.task_type)
            .ok_or_else(|| FleetError::InvalidTaskConfiguration {
                task_id: task.id,
                reason: format!("no workflow registered for {} tasks", task.task_type),
            })?;
        workflow.initialize(task)?;
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTask, Point, PointType, TaskPoint};

    fn point(id: &str, kind: PointType) -> Point {
        Point::new(id, id, kind, 0.0, 0.0)
    }

    #[test]
    fn test_standard_workflows_step_order() {
        let registry = WorkflowRegistry::standard();
        assert_eq!(
            registry.get(TaskType::Dropoff).unwrap().step_names(),
            vec!["move_to_dropoff", "deliver_to_shelf", "return_to_charger"]
        );
        assert_eq!(
            registry.get(TaskType::Pickup).unwrap().step_names(),
            vec!["pick_from_shelf", "deliver_to_dropoff", "return_to_charger"]
        );
        assert_eq!(registry.get(TaskType::Return).unwrap().len(), 1);
    }

    #[test]
    fn test_dropoff_requires_shelf() {
        let registry = WorkflowRegistry::standard();
        let task = NewTask::new("Dropoff from A", TaskType::Dropoff, "r1")
            .with_point(TaskPoint::from_point(PointRole::Dropoff, point("a", PointType::Dropoff)))
            .into_task();

        let err = registry.workflow_for(&task).unwrap_err();
        assert!(matches!(err, FleetError::InvalidTaskConfiguration { ref reason, .. } if reason.contains("shelf")));
    }

    #[test]
    fn test_dropoff_without_return_point_is_valid() {
        let registry = WorkflowRegistry::standard();
        let task = NewTask::new("Dropoff from A to B", TaskType::Dropoff, "r1")
            .with_point(TaskPoint::from_point(PointRole::Dropoff, point("a", PointType::Dropoff)))
            .with_point(TaskPoint::from_point(PointRole::Shelf, point("b", PointType::Shelf)))
            .into_task();
        assert!(registry.workflow_for(&task).is_ok());
    }

    #[test]
    fn test_generic_move_needs_waypoints() {
        let registry = WorkflowRegistry::standard();
        let task = NewTask::new("Patrol", TaskType::GenericMove, "r1").into_task();
        assert!(registry.workflow_for(&task).is_err());
    }
}
