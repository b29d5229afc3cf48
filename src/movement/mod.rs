//! # Movement Coordination
//!
//! Turns "go to this point" into a controller goal and a terminal outcome,
//! enforcing one outstanding goal per robot.

pub mod coordinator;

pub use coordinator::{MovementCoordinator, OutstandingMove};
