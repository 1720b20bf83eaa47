// ABOUTME: Error types for hearth-core supervision
// ABOUTME: Start failures are terminal per instance; command timeouts are not errors

use thiserror::Error;

/// Why a supervisor failed to reach `Started`. Reported once per instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartFailure {
    /// `compose up` exited non-zero (or was killed by a signal).
    #[error("up: non-zero return code ({})", display_code(.code))]
    SetupExit { code: Option<i32> },

    /// `compose up` succeeded but printed no `Container <name> Started` line.
    /// The compose output format has likely changed.
    #[error("up: unexpected output, no started container found")]
    SetupOutputParse,

    #[error("up: did not finish within {secs}s")]
    SetupTimeout { secs: u64 },

    #[error("{phase}: failed to spawn compose: {message}")]
    Spawn {
        phase: &'static str,
        message: String,
    },
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

/// Errors returned by supervisor operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("start failed: {0}")]
    Start(#[from] StartFailure),

    /// The caller broke the lifecycle contract, e.g. `run` before `Started`.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("attached process exited ({})", display_code(.code))]
    AttachedExited { code: Option<i32> },

    #[error("stop: non-zero return code ({})", display_code(.code))]
    StopExit { code: Option<i32> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = SupervisorError> = std::result::Result<T, E>;
