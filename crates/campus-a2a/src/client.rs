use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use campus_core::{CampusError, CampusResult, Task, TaskStatus};

use crate::registry::{AgentRegistry, InvocationTarget};

/// Dispatches tasks to registered agents, local or remote, behind one
/// contract: task in, updated task (with a terminal status) out.
pub struct DispatchClient {
    registry: Arc<AgentRegistry>,
    http: reqwest::Client,
}

impl DispatchClient {
    /// Creates a client over a registry.
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            http: reqwest::Client::new(),
        }
    }

    /// The registry this client resolves against.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Dispatches one task to `task.to_agent`.
    ///
    /// Fails with [`CampusError::AgentNotFound`] when no target is
    /// registered; that error is fatal for the task and never retried.
    pub async fn dispatch(&self, task: Task) -> CampusResult<Task> {
        let target = self
            .registry
            .target(&task.to_agent)
            .ok_or_else(|| CampusError::AgentNotFound(task.to_agent.clone()))?;

        debug!(
            task_id = %task.task_id,
            to_agent = %task.to_agent,
            target = ?target,
            "dispatching task"
        );

        match target {
            InvocationTarget::Local(handler) => handler.handle(task).await,
            InvocationTarget::Remote { endpoint } => self.dispatch_remote(task, &endpoint).await,
        }
    }

    async fn dispatch_remote(&self, task: Task, endpoint: &str) -> CampusResult<Task> {
        let url = format!("{}/tasks", endpoint.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .json(&task)
            .send()
            .await
            .map_err(|e| CampusError::Http(format!("POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(task_id = %task.task_id, %url, %status, "remote dispatch failed");
            // Mirror the task server's status conventions so remote business
            // failures and unknown agents keep their non-retryable class.
            return Err(match status {
                reqwest::StatusCode::UNPROCESSABLE_ENTITY => CampusError::Handler(body),
                reqwest::StatusCode::NOT_FOUND => {
                    CampusError::AgentNotFound(task.to_agent.clone())
                }
                _ => CampusError::Http(format!("{url} returned {status}: {body}")),
            });
        }

        let updated: Task = response
            .json()
            .await
            .map_err(|e| CampusError::Http(format!("invalid task payload from {url}: {e}")))?;

        // A remote handler reporting a business failure is a handler error,
        // not a transport error; the invoker must not retry it.
        if let TaskStatus::Failed { reason } = &updated.status {
            return Err(CampusError::Handler(reason.clone()));
        }

        Ok(updated)
    }

    /// Fans out a batch of independent tasks concurrently.
    ///
    /// Returns one result per input task in input order. Failures are
    /// per-task: results for tasks that did complete are always returned.
    pub async fn dispatch_parallel(&self, tasks: Vec<Task>) -> Vec<CampusResult<Task>> {
        join_all(tasks.into_iter().map(|t| self.dispatch(t))).await
    }
}
