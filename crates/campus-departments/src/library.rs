use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use campus_a2a::TaskHandler;
use campus_core::{CampusError, CampusResult, KnowledgeIndex, RecordStore, Task, TaskType};

use crate::support::student_id;

/// Catalogue search and library-card lookups.
pub struct LibraryAgent {
    records: Arc<dyn RecordStore>,
    knowledge: Arc<dyn KnowledgeIndex>,
}

impl LibraryAgent {
    /// Stable agent id.
    pub const AGENT_ID: &'static str = "library_agent";

    /// Creates the agent over its backends.
    pub fn new(records: Arc<dyn RecordStore>, knowledge: Arc<dyn KnowledgeIndex>) -> Self {
        Self { records, knowledge }
    }

    async fn search_book(&self, mut task: Task) -> CampusResult<Task> {
        let query = task.request_text();
        let hits = self.knowledge.search(&query, "catalogue").await?;

        if hits.is_empty() {
            task.complete(
                "No matching titles in the catalogue.",
                Some(json!({ "matches": [] })),
            )?;
            return Ok(task);
        }

        let matches: Vec<&str> = hits.iter().take(5).map(|s| s.text.as_str()).collect();
        task.complete(matches.join("\n"), Some(json!({ "matches": matches })))?;
        Ok(task)
    }

    async fn card_status(&self, mut task: Task) -> CampusResult<Task> {
        let id = student_id(&task)?;
        let card = self
            .records
            .query("library_card", &id)
            .await?
            .ok_or_else(|| CampusError::Handler(format!("no library card for student {id}")))?;

        let active = card["active"].as_bool().unwrap_or(false);
        let text = if active {
            format!(
                "Your library card is active until {}.",
                card["expires"].as_str().unwrap_or("further notice")
            )
        } else {
            "Your library card is inactive; please visit the front desk.".to_string()
        };
        task.complete(text, Some(card))?;
        Ok(task)
    }
}

#[async_trait]
impl TaskHandler for LibraryAgent {
    async fn handle(&self, task: Task) -> CampusResult<Task> {
        match task.task_type {
            TaskType::SearchBook => self.search_book(task).await,
            TaskType::CheckLibraryCard => self.card_status(task).await,
            other => Err(CampusError::Handler(format!(
                "library agent cannot handle {other}"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryRecordStore, StaticKnowledgeIndex};
    use campus_core::TaskStatus;
    use uuid::Uuid;

    fn agent() -> LibraryAgent {
        LibraryAgent::new(
            Arc::new(InMemoryRecordStore::seeded()),
            Arc::new(StaticKnowledgeIndex::seeded()),
        )
    }

    #[tokio::test]
    async fn book_search_finds_catalogue_entry() {
        let task = Task::new(
            "library_router",
            LibraryAgent::AGENT_ID,
            TaskType::SearchBook,
            "do you have a book about Rust",
            Uuid::new_v4(),
        );
        let result = agent().handle(task).await.unwrap();
        assert!(result
            .get_latest_message()
            .unwrap()
            .text_content()
            .contains("Rust Programming Language"));
    }

    #[tokio::test]
    async fn empty_catalogue_hit_still_completes() {
        let task = Task::new(
            "library_router",
            LibraryAgent::AGENT_ID,
            TaskType::SearchBook,
            "xylophone maintenance quarterly",
            Uuid::new_v4(),
        );
        let result = agent().handle(task).await.unwrap();
        assert_eq!(result.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn card_status_reports_expiry() {
        let task = Task::new(
            "library_router",
            LibraryAgent::AGENT_ID,
            TaskType::CheckLibraryCard,
            "is my card valid",
            Uuid::new_v4(),
        )
        .with_data(json!({ "student_id": "20220015" }));
        let result = agent().handle(task).await.unwrap();
        assert!(result
            .get_latest_message()
            .unwrap()
            .text_content()
            .contains("2027-06-30"));
    }
}
