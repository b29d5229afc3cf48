use crate::errors::FleetError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },

    #[error("Invalid state transition from {from} with event {event}")]
    InvalidTransition { from: String, event: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    #[error("Business rule violation: {rule}")]
    BusinessRuleViolation { rule: String },

    #[error("Invalid state for guard check: {state}")]
    InvalidState { state: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type GuardResult<T> = Result<T, GuardError>;

pub fn business_rule_violation(rule: impl Into<String>) -> GuardError {
    GuardError::BusinessRuleViolation { rule: rule.into() }
}

impl From<GuardError> for StateMachineError {
    fn from(err: GuardError) -> Self {
        Self::GuardFailed {
            reason: err.to_string(),
        }
    }
}

impl From<StateMachineError> for FleetError {
    fn from(err: StateMachineError) -> Self {
        FleetError::StateMachine(err.to_string())
    }
}
