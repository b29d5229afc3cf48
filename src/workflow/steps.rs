use super::step_handler::{StepContext, StepHandler};
use crate::errors::FleetResult;
use crate::models::{MovementKind, PointRole, SubStatus, Task, TaskPoint};
use async_trait::async_trait;

/// Drive to a role point, optionally taking the payload there
#[derive(Debug, Clone)]
pub struct MoveToRoleStep {
    name: &'static str,
    role: PointRole,
    kind: MovementKind,
    moving: SubStatus,
    on_arrival: Option<SubStatus>,
    loads_payload: bool,
    required: Vec<PointRole>,
}

impl MoveToRoleStep {
    pub fn new(name: &'static str, role: PointRole, kind: MovementKind, moving: SubStatus) -> Self {
        Self {
            name,
            role,
            kind,
            moving,
            on_arrival: None,
            loads_payload: false,
            required: vec![role],
        }
    }

    /// Sub-status to show once the robot has arrived
    pub fn on_arrival(mut self, sub_status: SubStatus) -> Self {
        self.on_arrival = Some(sub_status);
        self
    }

    /// The robot picks the payload up at this point
    pub fn loads_payload(mut self) -> Self {
        self.loads_payload = true;
        self
    }
}

#[async_trait]
impl StepHandler for MoveToRoleStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn required_roles(&self) -> &[PointRole] {
        &self.required
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> FleetResult<()> {
        ctx.move_to_role(self.role, self.kind, self.moving).await?;
        if self.loads_payload {
            ctx.set_carrying(true).await?;
        }
        if let Some(sub_status) = self.on_arrival {
            ctx.set_sub_status(sub_status).await?;
        }
        Ok(())
    }
}

/// Carry the payload to a role point and unload it there.
///
/// `carrying` is set before the goal is submitted and cleared only after the
/// unload succeeded, so a cancel in between always sees the payload.
#[derive(Debug, Clone)]
pub struct DeliverPayloadStep {
    name: &'static str,
    role: PointRole,
    moving: SubStatus,
    required: Vec<PointRole>,
}

impl DeliverPayloadStep {
    pub fn new(name: &'static str, role: PointRole, moving: SubStatus) -> Self {
        Self {
            name,
            role,
            moving,
            required: vec![role],
        }
    }
}

#[async_trait]
impl StepHandler for DeliverPayloadStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn required_roles(&self) -> &[PointRole] {
        &self.required
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> FleetResult<()> {
        ctx.set_carrying(true).await?;
        ctx.set_sub_status(self.moving).await?;
        let point = ctx.resolve(self.role).await?;
        ctx.move_to_point(&point, MovementKind::Unload).await?;
        ctx.set_sub_status(SubStatus::Unloading).await?;
        ctx.run_sub_actions(self.role).await?;
        ctx.set_carrying(false).await
    }
}

/// Drive back to the charger and dock.
///
/// The return point is optional on the task; the resolver falls back to the
/// charger name or any charging point on the map.
#[derive(Debug, Clone, Default)]
pub struct ReturnToChargerStep {
    required: Vec<PointRole>,
}

impl ReturnToChargerStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse tasks without an explicit return point
    pub fn requiring_return_point() -> Self {
        Self {
            required: vec![PointRole::Return],
        }
    }
}

#[async_trait]
impl StepHandler for ReturnToChargerStep {
    fn name(&self) -> &'static str {
        "return_to_charger"
    }

    fn required_roles(&self) -> &[PointRole] {
        &self.required
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> FleetResult<()> {
        ctx.move_to_role(PointRole::Return, MovementKind::ChargeDock, SubStatus::Returning)
            .await
            .map(|_| ())
    }
}

/// Visit every task point in order
#[derive(Debug, Clone, Default)]
pub struct VisitWaypointsStep;

#[async_trait]
impl StepHandler for VisitWaypointsStep {
    fn name(&self) -> &'static str {
        "visit_waypoints"
    }

    fn validate(&self, task: &Task) -> Result<(), String> {
        if task.points.is_empty() {
            return Err("a generic move needs at least one waypoint".to_string());
        }
        let unnamed = |p: &TaskPoint| p.resolved.is_none() && p.point_id.is_none() && p.name.is_none();
        if task.points.iter().any(unnamed) {
            return Err("every waypoint needs a point, an id or a name".to_string());
        }
        Ok(())
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> FleetResult<()> {
        for index in 0..ctx.task.points.len() {
            ctx.persist(move |t| {
                t.sub_status = Some(SubStatus::MovingToWaypoint);
                t.current_waypoint = Some(index);
                Ok(())
            })
            .await?;
            let point = ctx.resolve_waypoint(index).await?;
            ctx.move_to_point(&point, MovementKind::Standard).await?;

            let actions = ctx.task.points[index].sub_actions.clone();
            ctx.perform_sub_actions(&actions).await?;
        }
        Ok(())
    }
}
