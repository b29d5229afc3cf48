//! # Logging
//!
//! Environment-aware console logging on the tracing ecosystem. Output goes
//! to stdout so containers and service managers can collect it.
//!
//! - Level from `RUST_LOG` when set, otherwise from the environment
//!   (`FLEET_ENV`/`APP_ENV`: production logs `info`, everything else `debug`)
//! - JSON lines when `FLEET_LOG_FORMAT=json`
//! - ANSI colors only when stdout is a terminal

use crate::models::{RobotId, TaskId};
use crate::state_machine::TaskState;
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber once; later calls are no-ops
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let use_ansi = std::io::stdout().is_terminal();
        let json = std::env::var("FLEET_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

        let layer = if json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .boxed()
        };

        // Another subscriber (tests, an embedding binary) may already be set
        if tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized");
            return;
        }

        tracing::info!(environment = %environment, json, "Tracing initialized");
    });
}

fn get_environment() -> String {
    std::env::var("FLEET_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Uniform record of a task lifecycle change
pub fn log_task_transition(task_id: TaskId, robot_id: &RobotId, from: TaskState, to: TaskState) {
    tracing::info!(
        task_id = %task_id,
        robot_id = %robot_id,
        from = %from,
        to = %to,
        "TASK_TRANSITION"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_per_environment() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("staging"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
