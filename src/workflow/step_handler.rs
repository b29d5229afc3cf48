//! # Step Handlers
//!
//! A workflow is an ordered list of [`StepHandler`]s. Each handler performs
//! one unit of robot work through a [`StepContext`], which keeps the task's
//! working copy in sync with the store and broadcasts every change.

use crate::context::FleetContext;
use crate::errors::{FleetError, FleetResult};
use crate::models::{
    MovementAction, MovementKind, Point, PointRole, SubAction, SubStatus, Task,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

#[async_trait]
pub trait StepHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Roles that must be present on the task before it starts
    fn required_roles(&self) -> &[PointRole] {
        &[]
    }

    /// Reject a task this step cannot run
    fn validate(&self, task: &Task) -> Result<(), String> {
        match self
            .required_roles()
            .iter()
            .find(|role| !task.has_role(**role))
        {
            Some(role) => Err(format!("step {} needs a {} point", self.name(), role)),
            None => Ok(()),
        }
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> FleetResult<()>;
}

/// Everything a step needs while it runs
pub struct StepContext<'a> {
    pub task: &'a mut Task,
    pub fleet: &'a FleetContext,
    pub step_name: &'static str,
}

impl<'a> StepContext<'a> {
    pub fn new(task: &'a mut Task, fleet: &'a FleetContext, step_name: &'static str) -> Self {
        Self {
            task,
            fleet,
            step_name,
        }
    }

    /// Apply `f` to the stored record, refresh the working copy and broadcast
    pub async fn persist<F>(&mut self, f: F) -> FleetResult<()>
    where
        F: FnOnce(&mut Task) -> FleetResult<()> + Send,
    {
        let stored = self.fleet.persistence.mutate(self.task.id, f).await?;
        *self.task = stored;
        self.fleet.broadcast_task(self.task);
        Ok(())
    }

    pub async fn set_sub_status(&mut self, sub_status: SubStatus) -> FleetResult<()> {
        self.persist(|t| {
            t.sub_status = Some(sub_status);
            Ok(())
        })
        .await
    }

    /// Record whether the robot holds the payload.
    ///
    /// Taking the payload is refused once a cancel has been requested.
    pub async fn set_carrying(&mut self, carrying: bool) -> FleetResult<()> {
        self.persist(|t| {
            if carrying && t.cancel_requested() {
                return Err(FleetError::InvalidState(format!(
                    "task {} has a pending cancel; not taking payload",
                    t.id
                )));
            }
            t.carrying = carrying;
            Ok(())
        })
        .await?;
        debug!(task_id = %self.task.id, carrying, "Payload state updated");
        Ok(())
    }

    pub async fn resolve(&mut self, role: PointRole) -> FleetResult<Point> {
        self.fleet.resolver.resolve_point(self.task, role).await
    }

    /// Resolve one entry of the task's point list by position
    pub async fn resolve_waypoint(&mut self, index: usize) -> FleetResult<Point> {
        self.fleet
            .resolver
            .resolve_waypoint(self.task, index)
            .await
            .map(|r| r.point)
    }

    pub async fn move_to_point(
        &mut self,
        point: &Point,
        kind: MovementKind,
    ) -> FleetResult<MovementAction> {
        info!(
            task_id = %self.task.id,
            step = self.step_name,
            point = %point.name,
            x = point.x,
            y = point.y,
            kind = %kind,
            "Moving robot"
        );
        self.fleet
            .coordinator
            .move_to(&self.task.robot_id, Some(self.task.id), point, kind)
            .await
    }

    /// Announce `sub_status`, resolve `role`, drive there and run the
    /// point's sub-actions
    pub async fn move_to_role(
        &mut self,
        role: PointRole,
        kind: MovementKind,
        sub_status: SubStatus,
    ) -> FleetResult<MovementAction> {
        self.set_sub_status(sub_status).await?;
        let point = self.resolve(role).await?;
        let action = self.move_to_point(&point, kind).await?;
        self.run_sub_actions(role).await?;
        Ok(action)
    }

    pub async fn run_sub_actions(&mut self, role: PointRole) -> FleetResult<()> {
        let actions = self
            .task
            .task_point(role)
            .map(|p| p.sub_actions.clone())
            .unwrap_or_default();
        self.perform_sub_actions(&actions).await
    }

    pub async fn perform_sub_actions(&mut self, actions: &[SubAction]) -> FleetResult<()> {
        let robot_id = self.task.robot_id.clone();

        for action in actions {
            debug!(task_id = %self.task.id, ?action, "Running sub-action");
            match action {
                SubAction::Wait { seconds } => {
                    tokio::time::sleep(Duration::from_secs(*seconds)).await;
                }
                SubAction::Dock => {
                    self.fleet.controller.dock(&robot_id).await.map_err(|err| {
                        FleetError::ActionFailed {
                            robot_id: robot_id.clone(),
                            action: "dock".to_string(),
                            reason: err.to_string(),
                        }
                    })?;
                }
                SubAction::Undock => {
                    self.fleet.controller.undock(&robot_id).await.map_err(|err| {
                        FleetError::ActionFailed {
                            robot_id: robot_id.clone(),
                            action: "undock".to_string(),
                            reason: err.to_string(),
                        }
                    })?;
                }
            }
        }
        Ok(())
    }
}
