//! # Workflow Execution
//!
//! Task types map to ordered step lists ([`WorkflowRegistry`]); the
//! [`WorkflowExecutor`] drives a task through its steps and the
//! [`CancellationProtocol`] stops one safely.

pub mod cancellation;
pub mod executor;
pub mod registry;
pub mod step_handler;
pub mod steps;

pub use cancellation::CancellationProtocol;
pub use executor::{RunningTasks, WorkflowExecutor};
pub use registry::{Workflow, WorkflowRegistry};
pub use step_handler::{StepContext, StepHandler};
pub use steps::{DeliverPayloadStep, MoveToRoleStep, ReturnToChargerStep, VisitWaypointsStep};
