use serde::{Deserialize, Serialize};

use crate::task::{Department, TaskType};

/// Protocol features an agent supports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapabilities {
    /// Whether the agent streams partial results.
    #[serde(default)]
    pub streaming: bool,
    /// Whether the agent can push task updates.
    #[serde(default)]
    pub push_notifications: bool,
    /// Whether the agent supports multi-turn exchanges.
    #[serde(default = "default_true")]
    pub multi_turn: bool,
    /// Maximum concurrent tasks the agent accepts.
    #[serde(default = "default_concurrency")]
    pub max_concurrency: u32,
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> u32 {
    8
}

impl Default for AgentCapabilities {
    fn default() -> Self {
        Self {
            streaming: false,
            push_notifications: false,
            multi_turn: true,
            max_concurrency: default_concurrency(),
        }
    }
}

/// An agent's self-description, created at registration time and read-only
/// afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    /// Stable agent identifier.
    pub agent_id: String,
    /// Human-readable name.
    pub name: String,
    /// What the agent does.
    pub description: String,
    /// Department the agent belongs to, if any.
    pub department: Option<Department>,
    /// HTTP endpoint for remote agents; `None` for in-process handlers.
    pub endpoint: Option<String>,
    /// Task types the agent can handle.
    pub skills: Vec<TaskType>,
    /// Supported protocol features.
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    /// Whether the agent routes work inside a department.
    #[serde(default)]
    pub is_orchestrator: bool,
}

impl AgentCard {
    /// Creates a card for an in-process department agent.
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        department: Option<Department>,
        skills: Vec<TaskType>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            description: String::new(),
            department,
            endpoint: None,
            skills,
            capabilities: AgentCapabilities::default(),
            is_orchestrator: false,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Marks the agent as a department router.
    pub fn orchestrator(mut self) -> Self {
        self.is_orchestrator = true;
        self
    }

    /// Sets the remote endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Whether the agent declares the given skill.
    pub fn has_skill(&self, task_type: TaskType) -> bool {
        self.skills.contains(&task_type)
    }
}
