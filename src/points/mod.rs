//! # Point Resolution
//!
//! Point identity drifts between task creation and execution: maps are
//! refreshed and ids reassigned. [`PointResolver`] finds the intended point
//! through a fixed fallback chain and repairs the task's stored copy.

pub mod naming;
pub mod resolver;

pub use resolver::{locate, PointResolver, Resolution, ResolutionTier};
