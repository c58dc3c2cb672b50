use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the Campus crates.
pub type CampusResult<T> = Result<T, CampusError>;

/// Error taxonomy for the orchestration core.
///
/// Transport-level failures (`Timeout`, `Http`) are retried inside the
/// fault-tolerant invoker and never reach orchestration code except as a
/// terminal task status. Structural failures (`AgentNotFound`,
/// `DependencyCycle`) abort a request before any dispatch.
#[derive(Error, Debug)]
pub enum CampusError {
    /// The routing target is not registered. Fatal, never retried.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// The declared dependency graph is not a DAG. The whole request is
    /// rejected before any dispatch.
    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    /// A single dispatch attempt exceeded its budget.
    #[error("Timeout calling agent {agent_id} after {budget:?}")]
    Timeout {
        /// Target agent of the attempt.
        agent_id: String,
        /// Per-attempt budget that was exceeded.
        budget: Duration,
    },

    /// The agent is quarantined by its circuit breaker; no call was made.
    #[error("Circuit open for agent: {0}")]
    CircuitOpen(String),

    /// All attempts against an agent failed.
    #[error("Retries exhausted for agent {agent_id} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Target agent.
        agent_id: String,
        /// Total attempts made (1 + retries).
        attempts: u32,
        /// Description of the final failure.
        last_error: String,
    },

    /// Agent-reported business failure. Terminal, not retried.
    #[error("Handler error: {0}")]
    Handler(String),

    /// Invalid task lifecycle operation (e.g. mutating a terminal task).
    #[error("Task state error: {0}")]
    TaskState(String),

    /// The originating request was cancelled.
    #[error("Request cancelled")]
    Cancelled,

    /// Configuration error detected at startup.
    #[error("Config error: {0}")]
    Config(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CampusError {
    /// Whether this error may succeed on a later attempt.
    ///
    /// Only transport-level failures are retryable; business failures and
    /// structural errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CampusError::Timeout { .. } | CampusError::Http(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(CampusError::Http("502 Bad Gateway".into()).is_retryable());
        assert!(CampusError::Timeout {
            agent_id: "finance_router".into(),
            budget: Duration::from_secs(10),
        }
        .is_retryable());

        assert!(!CampusError::Handler("student not found".into()).is_retryable());
        assert!(!CampusError::AgentNotFound("ghost".into()).is_retryable());
        assert!(!CampusError::CircuitOpen("finance_router".into()).is_retryable());
        assert!(!CampusError::Cancelled.is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = CampusError::RetriesExhausted {
            agent_id: "library_router".into(),
            attempts: 3,
            last_error: "connection refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("library_router"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("connection refused"));
    }
}
