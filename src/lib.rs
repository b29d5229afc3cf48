#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Fleet Core
//!
//! Task orchestration and live monitoring for autonomous delivery robots.
//!
//! ## Overview
//!
//! A task (drop-off, pickup, return to charger, generic move) is a fixed
//! sequence of steps executed against one robot. The core persists the
//! task's progress after every step, moves the robot through a vendor
//! controller, keeps a live view of every robot from its event stream, and
//! makes sure a cancelled task never leaves a payload stranded on a robot.
//!
//! ## Architecture
//!
//! - The **workflow executor** drives a task through its registered steps,
//!   resuming from the persisted step index after a crash or a pause.
//! - The **movement coordinator** owns the single outstanding goal per robot
//!   and learns its outcome from monitor events, falling back to polling.
//! - The **robot monitor** keeps one session per robot: it normalizes raw
//!   controller messages, updates the robot record, writes error logs for
//!   faults and resolves movement waiters.
//! - The **point resolver** repairs stale point references against the
//!   robot's current map and writes the repair back to the task.
//! - The **cancellation protocol** stops the robot and, when the robot is
//!   carrying, relocates the payload to its shelf before cancelling.
//!
//! ## Module Organization
//!
//! - [`models`] - Tasks, points, movement actions and robot records
//! - [`state_machine`] - Task lifecycle states, events, guards and persistence
//! - [`controller`] - The robot controller contract
//! - [`monitor`] - Per-robot monitor sessions
//! - [`movement`] - Movement coordination
//! - [`points`] - Point resolution and recovery
//! - [`workflow`] - Step handlers, workflow registry, executor and cancellation
//! - [`store`] - Task and robot storage
//! - [`broadcast`] - Operator-facing state deltas
//! - [`orchestrator`] - Facade for collaborators
//! - [`config`] - Configuration management
//! - [`errors`] - Structured error handling
//! - [`logging`] - Tracing initialization
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleet_core::broadcast::ChannelBroadcastGateway;
//! use fleet_core::config::ConfigManager;
//! use fleet_core::controller::RobotController;
//! use fleet_core::store::InMemoryTaskStore;
//! use fleet_core::TaskOrchestrator;
//! use std::sync::Arc;
//!
//! # async fn example(controller: Arc<dyn RobotController>) -> Result<(), Box<dyn std::error::Error>> {
//! fleet_core::logging::init_tracing();
//! let config = ConfigManager::load()?.config().clone();
//!
//! let orchestrator = TaskOrchestrator::from_parts(
//!     config,
//!     controller,
//!     Arc::new(InMemoryTaskStore::new()),
//!     Arc::new(ChannelBroadcastGateway::new(1024)),
//! );
//! orchestrator.start_monitoring("robot-1").await?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod config;
pub mod context;
pub mod controller;
pub mod errors;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod movement;
pub mod orchestrator;
pub mod points;
pub mod state_machine;
pub mod store;
pub mod workflow;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use self::config::{ConfigManager, FleetConfig};
pub use context::FleetContext;
pub use controller::{ControllerError, RawEvent, RobotController};
pub use errors::{ErrorDetails, ErrorSeverity, FleetError, FleetResult};
pub use models::{NewTask, Point, PointRole, RobotSnapshot, RobotStatus, Task, TaskId, TaskType};
pub use orchestrator::TaskOrchestrator;
pub use state_machine::{TaskEvent, TaskState};
pub use store::{InMemoryTaskStore, TaskStore};
