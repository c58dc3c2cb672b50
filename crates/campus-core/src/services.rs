use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CampusResult;

/// A ranked text snippet returned by document retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    /// The snippet text.
    pub text: String,
    /// Source document identifier.
    pub source: String,
    /// Relevance score, higher is better.
    pub score: f32,
}

/// Structured-record lookup boundary.
///
/// Synchronous-feeling, assumed low-latency. A missing record is `Ok(None)`,
/// not an error; failures are transport-level.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Looks up one record by entity kind and key.
    async fn query(&self, entity_kind: &str, key: &str) -> CampusResult<Option<Value>>;
}

/// Document-retrieval boundary. Pure retrieval, no generation; an empty
/// result list is a valid outcome.
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    /// Returns ranked snippets for a query within one collection.
    async fn search(&self, query: &str, collection: &str) -> CampusResult<Vec<Snippet>>;
}

/// Generation constraints for a completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConstraints {
    /// Optional system prompt.
    pub system_prompt: Option<String>,
    /// Output token budget.
    pub max_tokens: u32,
}

impl Default for CompletionConstraints {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_tokens: 1024,
        }
    }
}

/// Natural-language generation boundary. Best-effort, possibly slow,
/// possibly failing; callers must bound it with a timeout or route it
/// through the fault-tolerant invoker.
#[async_trait]
pub trait TextCompleter: Send + Sync {
    /// Generates text for a prompt under the given constraints.
    async fn complete(&self, prompt: &str, constraints: &CompletionConstraints)
        -> CampusResult<String>;
}
