use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use campus_a2a::{AgentRegistry, FaultTolerantInvoker, TaskHandler};
use campus_core::{CampusError, CampusResult, CancelToken, Department, Task};

/// Intermediate orchestrator for one department.
///
/// Receives a single task (with any `dependency_results` already threaded
/// in), picks the department sub-agent declaring the task's type, dispatches
/// through the shared fault-tolerant invoker, and returns the sub-agent's
/// result unmodified. No synthesis happens at this layer.
pub struct DepartmentRouter {
    department: Department,
    registry: Arc<AgentRegistry>,
    invoker: Arc<FaultTolerantInvoker>,
}

impl DepartmentRouter {
    /// Creates a router scoped to one department.
    pub fn new(
        department: Department,
        registry: Arc<AgentRegistry>,
        invoker: Arc<FaultTolerantInvoker>,
    ) -> Self {
        Self {
            department,
            registry,
            invoker,
        }
    }

    /// The department this router serves.
    pub fn department(&self) -> Department {
        self.department
    }

    fn pick_sub_agent(&self, task: &Task) -> CampusResult<String> {
        let candidates = self.registry.find_by_skill(task.task_type);
        candidates
            .into_iter()
            .find(|card| card.department == Some(self.department) && !card.is_orchestrator)
            .map(|card| card.agent_id)
            .ok_or_else(|| {
                warn!(
                    department = %self.department,
                    task_type = %task.task_type,
                    "no sub-agent for task type"
                );
                CampusError::AgentNotFound(format!(
                    "{} agent for {}",
                    self.department, task.task_type
                ))
            })
    }
}

#[async_trait]
impl TaskHandler for DepartmentRouter {
    async fn handle(&self, mut task: Task) -> CampusResult<Task> {
        let sub_agent = self.pick_sub_agent(&task)?;
        debug!(
            task_id = %task.task_id,
            department = %self.department,
            %sub_agent,
            "routing to sub-agent"
        );

        let router_id = task.to_agent.clone();
        task.to_agent = sub_agent;

        // No request-scoped token crosses the handler boundary; cancelling
        // the outer invoke drops this future and the dispatch with it.
        let mut result = self.invoker.invoke(task, &CancelToken::never()).await?;
        // The task stays addressed to this router from the caller's view.
        result.to_agent = router_id;
        Ok(result)
    }
}
