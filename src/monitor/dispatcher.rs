use super::events::RobotEvent;
use super::registry::SessionRegistry;
use super::session::MonitorSession;
use crate::broadcast::{BroadcastGateway, RobotDelta, StateDelta};
use crate::controller::{ControllerError, EventStream};
use crate::errors::{ErrorSeverity, FleetResult};
use crate::models::{
    ErrorLogRecord, MovementState, RobotRecord, RobotSnapshot, RobotStatus,
};
use crate::store::TaskStore;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

const LOCALIZATION_LOST_CODE: &str = "LOCALIZATION_LOST";
const COMMUNICATION_ERROR_CODE: &str = "COMMUNICATION_ERROR";

/// Consumes one robot's event stream, in arrival order, until the stream
/// ends or the session is stopped.
pub(crate) struct EventDispatcher {
    pub session: Arc<MonitorSession>,
    pub store: Arc<dyn TaskStore>,
    pub broadcaster: Arc<dyn BroadcastGateway>,
    pub registry: Arc<SessionRegistry>,
}

impl EventDispatcher {
    pub async fn run(self, mut stream: EventStream, mut shutdown: oneshot::Receiver<()>) {
        let robot_id = self.session.robot_id().to_string();
        let mut degraded = false;
        info!(
            robot_id = %robot_id,
            session_id = %self.session.session_id(),
            "Monitor session started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!(robot_id = %robot_id, "Monitor session stop requested");
                    break;
                }
                item = stream.next() => match item {
                    Some(Ok(raw)) => match RobotEvent::from_raw(&raw, &robot_id) {
                        Ok(Some(event)) => {
                            degraded = false;
                            self.handle_event(event).await;
                        }
                        Ok(None) => {}
                        Err(err) => warn!(robot_id = %robot_id, error = %err, "Dropping malformed controller event"),
                    },
                    Some(Err(err)) => {
                        if !degraded {
                            degraded = true;
                            self.handle_stream_error(&err).await;
                        }
                    }
                    None => {
                        warn!(robot_id = %robot_id, "Controller event stream closed");
                        self.session.close();
                        self.registry.remove_if_same(&robot_id, self.session.session_id());
                        self.update_status(RobotStatus::Offline).await;
                        return;
                    }
                }
            }
        }

        self.session.close();
        self.registry
            .remove_if_same(&robot_id, self.session.session_id());
    }

    async fn handle_event(&self, event: RobotEvent) {
        let previous = self.session.apply(&event);
        let snapshot = self.session.snapshot();

        if let RobotEvent::Movement(status) = &event {
            self.session.resolve_waiters(status);
        }

        match &event {
            RobotEvent::Faults(_) => self.log_new_faults(&previous, &snapshot).await,
            RobotEvent::Localization(loc) => {
                let was_reliable = previous.localization.as_ref().map_or(true, |l| l.reliable);
                if was_reliable && !loc.reliable {
                    warn!(robot_id = %snapshot.robot_id, quality = loc.quality, "Robot lost localization");
                    self.append_log(ErrorLogRecord::new(
                        &snapshot.robot_id,
                        LOCALIZATION_LOST_CODE,
                        format!("localization unreliable (quality {:.2})", loc.quality),
                        ErrorSeverity::High,
                    ))
                    .await;
                }
            }
            _ => {}
        }

        let status = derive_status(&snapshot);
        self.session.set_status(status);
        self.persist_record(&snapshot, status).await;
        self.broadcaster
            .publish(StateDelta::Robot(RobotDelta::from_snapshot(&snapshot, status)));
        self.session.fan_out(event);
    }

    async fn handle_stream_error(&self, err: &ControllerError) {
        warn!(robot_id = %self.session.robot_id(), error = %err, "Controller event stream degraded");
        self.append_log(ErrorLogRecord::new(
            self.session.robot_id(),
            COMMUNICATION_ERROR_CODE,
            err.to_string(),
            ErrorSeverity::High,
        ))
        .await;
        self.update_status(RobotStatus::Degraded).await;
    }

    async fn log_new_faults(&self, previous: &RobotSnapshot, snapshot: &RobotSnapshot) {
        let known: HashSet<i64> = previous.faults.iter().map(|f| f.code).collect();
        for fault in snapshot
            .faults
            .iter()
            .filter(|f| f.level.is_severe() && !known.contains(&f.code))
        {
            error!(
                robot_id = %snapshot.robot_id,
                code = fault.code,
                level = ?fault.level,
                message = %fault.message,
                "Robot reported fault"
            );
            self.append_log(ErrorLogRecord::new(
                &snapshot.robot_id,
                format!("FAULT_{}", fault.code),
                fault.message.clone(),
                fault.level.severity(),
            ))
            .await;
        }
    }

    async fn append_log(&self, mut record: ErrorLogRecord) {
        record.task_id = self.session.interested_tasks().into_iter().next();
        if let Err(err) = self.store.append_error_log(record).await {
            warn!(robot_id = %self.session.robot_id(), error = %err, "Failed to write error log");
        }
    }

    async fn update_status(&self, status: RobotStatus) {
        self.session.set_status(status);
        let snapshot = self.session.snapshot();
        self.persist_record(&snapshot, status).await;
        self.broadcaster
            .publish(StateDelta::Robot(RobotDelta::from_snapshot(&snapshot, status)));
    }

    async fn persist_record(&self, snapshot: &RobotSnapshot, status: RobotStatus) {
        if let Err(err) = self.try_persist_record(snapshot, status).await {
            warn!(robot_id = %snapshot.robot_id, error = %err, "Failed to update robot record");
        }
    }

    async fn try_persist_record(
        &self,
        snapshot: &RobotSnapshot,
        status: RobotStatus,
    ) -> FleetResult<()> {
        let mut record = self
            .store
            .get_robot(&snapshot.robot_id)
            .await?
            .unwrap_or_else(|| RobotRecord::new(&snapshot.robot_id, &snapshot.robot_id));

        record.status = status;
        if let Some(battery) = &snapshot.battery {
            record.battery_percentage = Some(battery.percentage);
            record.charging = battery.charging;
        }
        if snapshot.pose.is_some() {
            record.pose = snapshot.pose.clone();
        }
        if let Some(control) = &snapshot.control {
            record.control_mode = Some(control.mode);
            record.emergency_stop = control.emergency_stop;
        }
        if let Some(loc) = &snapshot.localization {
            record.localization_reliable = loc.reliable;
        }
        record.active_faults = snapshot.faults.clone();
        if snapshot.last_event_at.is_some() {
            record.last_seen_at = snapshot.last_event_at;
        }

        self.store.save_robot(&record).await
    }
}

/// Robot status implied by the latest snapshot, most severe condition first
pub(crate) fn derive_status(snapshot: &RobotSnapshot) -> RobotStatus {
    if snapshot.faults.iter().any(|f| f.level.is_severe()) {
        RobotStatus::Error
    } else if snapshot.localization.as_ref().is_some_and(|l| !l.reliable) {
        RobotStatus::LocalizationLost
    } else if snapshot
        .movement
        .as_ref()
        .is_some_and(|m| m.state == MovementState::Moving)
    {
        RobotStatus::Busy
    } else if snapshot.battery.as_ref().is_some_and(|b| b.charging) {
        RobotStatus::Charging
    } else {
        RobotStatus::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatteryState, Fault, FaultLevel, LocalizationState, MovementStatus};

    #[test]
    fn test_fault_outranks_movement() {
        let mut snapshot = RobotSnapshot::new("r1");
        snapshot.movement = Some(MovementStatus::new(1, MovementState::Moving));
        assert_eq!(derive_status(&snapshot), RobotStatus::Busy);

        snapshot.faults = vec![Fault {
            code: 1,
            level: FaultLevel::Warning,
            message: "dusty lidar".into(),
        }];
        assert_eq!(derive_status(&snapshot), RobotStatus::Busy);

        snapshot.faults[0].level = FaultLevel::Error;
        assert_eq!(derive_status(&snapshot), RobotStatus::Error);
    }

    #[test]
    fn test_localization_and_charging() {
        let mut snapshot = RobotSnapshot::new("r1");
        snapshot.battery = Some(BatteryState {
            percentage: 50.0,
            charging: true,
            docked: true,
        });
        assert_eq!(derive_status(&snapshot), RobotStatus::Charging);

        snapshot.localization = Some(LocalizationState {
            reliable: false,
            quality: 0.1,
        });
        assert_eq!(derive_status(&snapshot), RobotStatus::LocalizationLost);
    }
}
