//! Normalization of raw controller messages into typed robot events.

use crate::controller::{topics, ControllerError, ControllerResult, RawEvent};
use crate::models::{
    ActionId, BatteryState, ControlMode, ControlState, FailReason, Fault, FaultLevel,
    LocalizationState, MovementState, MovementStatus, Pose,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One typed update from a robot's live stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RobotEvent {
    Pose(Pose),
    Battery(BatteryState),
    Movement(MovementStatus),
    Control(ControlState),
    Localization(LocalizationState),
    Faults(Vec<Fault>),
}

impl RobotEvent {
    /// Normalize a raw message; topics this crate does not track yield `None`
    pub fn from_raw(raw: &RawEvent, robot_id: &str) -> ControllerResult<Option<Self>> {
        let event = match raw.topic.as_str() {
            topics::POSE => {
                let p: PosePayload = decode(raw, robot_id)?;
                let [x, y] = p.pos;
                RobotEvent::Pose(Pose {
                    x,
                    y,
                    yaw: p.ori,
                    area_id: p.area_id,
                })
            }
            topics::BATTERY => {
                let b: BatteryPayload = decode(raw, robot_id)?;
                RobotEvent::Battery(BatteryState {
                    percentage: (b.percentage * 100.0).clamp(0.0, 100.0),
                    charging: b.power_supply_status.eq_ignore_ascii_case("charging"),
                    docked: b.docked,
                })
            }
            topics::MOVEMENT => {
                let m: MovementPayload = decode(raw, robot_id)?;
                RobotEvent::Movement(m.into_status())
            }
            topics::CONTROL_MODE => {
                let c: ControlPayload = decode(raw, robot_id)?;
                RobotEvent::Control(ControlState {
                    mode: c.control_mode,
                    emergency_stop: c.emergency_stop_pressed,
                })
            }
            topics::LOCALIZATION => {
                let l: LocalizationPayload = decode(raw, robot_id)?;
                RobotEvent::Localization(LocalizationState {
                    reliable: l.reliable,
                    quality: l.position_quality,
                })
            }
            topics::FAULTS => {
                let d: DiagnosisPayload = decode(raw, robot_id)?;
                RobotEvent::Faults(
                    d.errors
                        .into_iter()
                        .map(|e| Fault {
                            code: e.code,
                            level: e.level,
                            message: e.msg,
                        })
                        .collect(),
                )
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pose(_) => "pose",
            Self::Battery(_) => "battery",
            Self::Movement(_) => "movement",
            Self::Control(_) => "control",
            Self::Localization(_) => "localization",
            Self::Faults(_) => "faults",
        }
    }
}

fn decode<T: DeserializeOwned>(raw: &RawEvent, robot_id: &str) -> ControllerResult<T> {
    serde_json::from_value(raw.payload.clone()).map_err(|e| ControllerError::Protocol {
        robot_id: robot_id.to_string(),
        topic: raw.topic.clone(),
        reason: e.to_string(),
    })
}

#[derive(Deserialize)]
struct PosePayload {
    pos: [f64; 2],
    #[serde(default)]
    ori: f64,
    #[serde(default)]
    area_id: Option<String>,
}

#[derive(Deserialize)]
struct BatteryPayload {
    /// Fraction in 0..=1
    percentage: f64,
    #[serde(default)]
    power_supply_status: String,
    #[serde(default)]
    docked: bool,
}

#[derive(Deserialize)]
struct MovementPayload {
    action_id: ActionId,
    move_state: MovementState,
    #[serde(default)]
    fail_reason: Option<i64>,
    #[serde(default)]
    fail_reason_str: Option<String>,
    #[serde(default)]
    remaining_distance: Option<f64>,
}

impl MovementPayload {
    fn into_status(self) -> MovementStatus {
        let fail_reason = match (self.move_state, self.fail_reason, self.fail_reason_str) {
            (MovementState::Failed | MovementState::Cancelled, Some(code), message) => Some(
                FailReason::new(code, message.unwrap_or_else(|| format!("error {code}"))),
            ),
            (MovementState::Failed, None, message) => Some(FailReason::new(
                -1,
                message.unwrap_or_else(|| "unknown failure".to_string()),
            )),
            (MovementState::Cancelled, None, _) => Some(FailReason::cancelled()),
            _ => None,
        };

        MovementStatus {
            action_id: self.action_id,
            state: self.move_state,
            fail_reason,
            remaining_distance: self.remaining_distance,
        }
    }
}

#[derive(Deserialize)]
struct ControlPayload {
    control_mode: ControlMode,
    #[serde(default)]
    emergency_stop_pressed: bool,
}

#[derive(Deserialize)]
struct LocalizationPayload {
    reliable: bool,
    #[serde(default)]
    position_quality: f64,
}

#[derive(Deserialize)]
struct DiagnosisPayload {
    #[serde(default)]
    errors: Vec<DiagnosisEntry>,
}

#[derive(Deserialize)]
struct DiagnosisEntry {
    code: i64,
    level: FaultLevel,
    #[serde(default)]
    msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_movement_keeps_controller_reason() {
        let raw = RawEvent::new(
            topics::MOVEMENT,
            json!({
                "action_id": 7,
                "move_state": "failed",
                "fail_reason": 1003,
                "fail_reason_str": "NoFreeSpaceInRackArea"
            }),
        );
        let event = RobotEvent::from_raw(&raw, "r1").unwrap().unwrap();
        let RobotEvent::Movement(status) = event else {
            panic!("expected movement event");
        };
        assert_eq!(status.action_id, 7);
        assert_eq!(status.state, MovementState::Failed);
        assert_eq!(
            status.fail_reason,
            Some(FailReason::new(1003, "NoFreeSpaceInRackArea"))
        );
    }

    #[test]
    fn test_battery_fraction_scaled_to_percent() {
        let raw = RawEvent::new(
            topics::BATTERY,
            json!({"percentage": 0.42, "power_supply_status": "charging", "docked": true}),
        );
        let event = RobotEvent::from_raw(&raw, "r1").unwrap().unwrap();
        let RobotEvent::Battery(battery) = event else {
            panic!("expected battery event");
        };
        assert!((battery.percentage - 42.0).abs() < 1e-9);
        assert!(battery.charging);
        assert!(battery.docked);
    }

    #[test]
    fn test_unknown_topic_is_ignored() {
        let raw = RawEvent::new("/camera/image", json!({}));
        assert_eq!(RobotEvent::from_raw(&raw, "r1").unwrap(), None);
    }

    #[test]
    fn test_malformed_payload_is_protocol_error() {
        let raw = RawEvent::new(topics::POSE, json!({"pos": "nowhere"}));
        let err = RobotEvent::from_raw(&raw, "r1").unwrap_err();
        assert!(matches!(err, ControllerError::Protocol { ref topic, .. } if topic == topics::POSE));
    }

    #[test]
    fn test_faults_parsed() {
        let raw = RawEvent::new(
            topics::FAULTS,
            json!({"errors": [{"code": 2001, "level": "critical", "msg": "motor overheat"}]}),
        );
        let event = RobotEvent::from_raw(&raw, "r1").unwrap().unwrap();
        assert_eq!(
            event,
            RobotEvent::Faults(vec![Fault {
                code: 2001,
                level: FaultLevel::Critical,
                message: "motor overheat".to_string(),
            }])
        );
    }
}
