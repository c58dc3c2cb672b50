//! Protocol types and shared contracts for the Campus multi-agent system.
//!
//! This crate defines the task-lifecycle protocol used between the request
//! orchestrator, department routers, and agents, plus the error taxonomy,
//! agent identity cards, cancellation primitive, and the boundary traits
//! for the external record, retrieval, and completion services.

/// Cancellation handle/token pair.
pub mod cancel;
/// Agent identity cards and capabilities.
pub mod card;
/// Error taxonomy.
pub mod error;
/// External-service boundary traits.
pub mod services;
/// Task, message, and artifact protocol types.
pub mod task;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use card::{AgentCapabilities, AgentCard};
pub use error::{CampusError, CampusResult};
pub use services::{CompletionConstraints, KnowledgeIndex, RecordStore, Snippet, TextCompleter};
pub use task::{
    Artifact, Department, Message, MessagePart, MessageRole, Task, TaskStatus, TaskType,
};
