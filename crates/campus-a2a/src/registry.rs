use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use campus_core::{AgentCard, CampusResult, Department, Task, TaskType};

/// An in-process task handler.
///
/// Implementations receive a task in `Working` state and must return it (or
/// a successor) in a terminal state, or fail with a transport/handler error.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Processes one task to a terminal state.
    async fn handle(&self, task: Task) -> CampusResult<Task>;
}

/// How a registered agent is invoked. Local and remote variants expose the
/// same task-in/task-out contract; callers never branch on the variant.
#[derive(Clone)]
pub enum InvocationTarget {
    /// Direct in-process call.
    Local(Arc<dyn TaskHandler>),
    /// Networked call to `{endpoint}/tasks`.
    Remote {
        /// Base URL of the remote agent server.
        endpoint: String,
    },
}

impl std::fmt::Debug for InvocationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvocationTarget::Local(_) => f.write_str("Local"),
            InvocationTarget::Remote { endpoint } => write!(f, "Remote({endpoint})"),
        }
    }
}

struct RegisteredAgent {
    card: AgentCard,
    target: InvocationTarget,
}

/// Registry of all known agents and their invocation targets.
///
/// Explicitly constructed and passed by reference; read-heavy, safe to read
/// concurrently with dispatch, and registration may happen during live
/// operation.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, RegisteredAgent>>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent. Idempotent: re-registering an agent id
    /// overwrites the previous entry.
    pub fn register(&self, card: AgentCard, target: InvocationTarget) {
        info!(agent_id = %card.agent_id, department = ?card.department, "agent registered");
        self.agents
            .write()
            .insert(card.agent_id.clone(), RegisteredAgent { card, target });
    }

    /// Removes an agent.
    pub fn unregister(&self, agent_id: &str) {
        self.agents.write().remove(agent_id);
    }

    /// The card for an agent id.
    pub fn card(&self, agent_id: &str) -> Option<AgentCard> {
        self.agents.read().get(agent_id).map(|a| a.card.clone())
    }

    /// The invocation target for an agent id.
    pub fn target(&self, agent_id: &str) -> Option<InvocationTarget> {
        self.agents.read().get(agent_id).map(|a| a.target.clone())
    }

    /// All cards, in arbitrary order.
    pub fn cards(&self) -> Vec<AgentCard> {
        self.agents.read().values().map(|a| a.card.clone()).collect()
    }

    /// Cards of agents in one department.
    pub fn cards_by_department(&self, department: Department) -> Vec<AgentCard> {
        self.agents
            .read()
            .values()
            .filter(|a| a.card.department == Some(department))
            .map(|a| a.card.clone())
            .collect()
    }

    /// Agents declaring a given skill.
    pub fn find_by_skill(&self, task_type: TaskType) -> Vec<AgentCard> {
        self.agents
            .read()
            .values()
            .filter(|a| a.card.has_skill(task_type))
            .map(|a| a.card.clone())
            .collect()
    }

    /// The router agent for a department, if one is registered.
    pub fn department_router(&self, department: Department) -> Option<AgentCard> {
        self.agents
            .read()
            .values()
            .find(|a| a.card.department == Some(department) && a.card.is_orchestrator)
            .map(|a| a.card.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl TaskHandler for NoopHandler {
        async fn handle(&self, mut task: Task) -> CampusResult<Task> {
            task.complete("ok", None)?;
            Ok(task)
        }
    }

    fn card(id: &str, dept: Department, skills: Vec<TaskType>) -> AgentCard {
        AgentCard::new(id, id, Some(dept), skills)
    }

    #[test]
    fn register_is_idempotent_overwrite() {
        let registry = AgentRegistry::new();
        registry.register(
            card("tuition_agent", Department::Finance, vec![TaskType::CheckFeeStatus]),
            InvocationTarget::Local(Arc::new(NoopHandler)),
        );
        registry.register(
            card(
                "tuition_agent",
                Department::Finance,
                vec![TaskType::CheckFeeStatus, TaskType::CheckPaymentStatus],
            ),
            InvocationTarget::Local(Arc::new(NoopHandler)),
        );

        assert_eq!(registry.cards().len(), 1);
        let updated = registry.card("tuition_agent").unwrap();
        assert!(updated.has_skill(TaskType::CheckPaymentStatus));
    }

    #[test]
    fn department_router_lookup() {
        let registry = AgentRegistry::new();
        registry.register(
            card("tuition_agent", Department::Finance, vec![TaskType::CheckFeeStatus]),
            InvocationTarget::Local(Arc::new(NoopHandler)),
        );
        registry.register(
            card("finance_router", Department::Finance, vec![]).orchestrator(),
            InvocationTarget::Local(Arc::new(NoopHandler)),
        );

        let router = registry.department_router(Department::Finance).unwrap();
        assert_eq!(router.agent_id, "finance_router");
        assert!(registry.department_router(Department::Library).is_none());
    }

    #[test]
    fn skill_search() {
        let registry = AgentRegistry::new();
        registry.register(
            card("book_agent", Department::Library, vec![TaskType::SearchBook]),
            InvocationTarget::Remote {
                endpoint: "http://localhost:8100".into(),
            },
        );
        let found = registry.find_by_skill(TaskType::SearchBook);
        assert_eq!(found.len(), 1);
        assert!(registry.find_by_skill(TaskType::PasswordReset).is_empty());
    }

    #[test]
    fn unregister_removes_agent() {
        let registry = AgentRegistry::new();
        registry.register(
            card("it_agent", Department::It, vec![TaskType::PasswordReset]),
            InvocationTarget::Local(Arc::new(NoopHandler)),
        );
        registry.unregister("it_agent");
        assert!(registry.card("it_agent").is_none());
        assert!(registry.target("it_agent").is_none());
    }
}
