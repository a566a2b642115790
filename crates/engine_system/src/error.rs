//! Scheduler error types.

use std::time::Duration;

use engine_component::Atom;

/// One system callback that failed during an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemFailure {
    /// The failing system's identifier.
    pub system: Atom,
    /// The system's human-readable name.
    pub name: String,
    /// The panic payload or error chain.
    pub message: String,
}

impl std::fmt::Display for SystemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "system `{}` ({}) failed: {}", self.name, self.system, self.message)
    }
}

/// Errors that can occur while configuring or driving a [`SystemScheduler`].
///
/// [`SystemScheduler`]: crate::SystemScheduler
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// More worker threads were requested than the availability bitmap can track.
    #[error("requested {requested} worker threads, but at most {max} are supported")]
    ThreadCountExceeded {
        /// The requested thread count.
        requested: u32,
        /// The bitmap width.
        max: u32,
    },

    /// An environment variable held a value that could not be parsed.
    #[error("invalid value {value:?} for environment variable {var}")]
    InvalidEnv {
        /// The variable name.
        var: &'static str,
        /// The raw value found.
        value: String,
    },

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// `spin` was called on a scheduler whose pool is already running.
    #[error("scheduler has already been spun")]
    AlreadySpun,

    /// An iteration was requested before the pool was spun.
    #[error("scheduler has not been spun")]
    NotSpun,

    /// The scheduler has begun (or finished) shutting down.
    #[error("scheduler is shut down")]
    ShutDown,

    /// A system was registered after the worker pool started.
    #[error("systems must be registered before the scheduler is spun")]
    RegistrationAfterSpin,

    /// An iteration started while workers were still busy with the previous one.
    #[error("an iteration is already in flight (availability mask {mask:#x})")]
    IterationInFlight {
        /// The availability bitmap observed.
        mask: u64,
    },

    /// One or more systems failed during the iteration. Every other system
    /// still ran to completion.
    #[error("{} system(s) failed during iteration: {}", .0.len(), join_failures(.0))]
    SystemFailures(Vec<SystemFailure>),

    /// Workers did not acknowledge shutdown in time.
    #[error("workers did not shut down within {timeout:?} (pending mask {pending:#x})")]
    ShutdownTimeout {
        /// The configured bound.
        timeout: Duration,
        /// Bits of the workers that never acknowledged.
        pending: u64,
    },
}

fn join_failures(failures: &[SystemFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_display_lists_every_system() {
        let err = SchedulerError::SystemFailures(vec![
            SystemFailure {
                system: Atom::from_raw(1),
                name: "physics".to_string(),
                message: "boom".to_string(),
            },
            SystemFailure {
                system: Atom::from_raw(2),
                name: "ai".to_string(),
                message: "bang".to_string(),
            },
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 system(s) failed"));
        assert!(text.contains("system `physics` (Atom(1)) failed: boom"));
        assert!(text.contains("system `ai` (Atom(2)) failed: bang"));
    }

    #[test]
    fn test_thread_count_message() {
        let err = SchedulerError::ThreadCountExceeded {
            requested: 65,
            max: 64,
        };
        assert_eq!(
            err.to_string(),
            "requested 65 worker threads, but at most 64 are supported"
        );
    }
}
