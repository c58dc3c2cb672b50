use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use campus_a2a::TaskHandler;
use campus_core::{CampusResult, KnowledgeIndex, RecordStore, Task, TaskType};

use crate::support::{dependency_payload, student_id};

/// Course-registration eligibility, combining the fee and academic
/// precedents.
///
/// Precedent results take priority; direct record lookups are only a
/// fallback for tasks that ran without them.
pub struct CourseRegistrationAgent {
    records: Arc<dyn RecordStore>,
}

impl CourseRegistrationAgent {
    /// Stable agent id.
    pub const AGENT_ID: &'static str = "course_registration_agent";

    /// Minimum GPA to register without advisor approval.
    const MIN_GPA: f64 = 2.0;

    /// Creates the agent over a record store.
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    async fn fee_blocks(&self, task: &Task, id: &str) -> CampusResult<Option<String>> {
        let fee = match dependency_payload(task, TaskType::CheckFeeStatus) {
            Some(fee) => Some(fee.clone()),
            None => self.records.query("tuition_status", id).await?,
        };
        Ok(fee.and_then(|fee| {
            fee["has_debt"].as_bool().unwrap_or(false).then(|| {
                format!(
                    "an outstanding balance of {} must be settled first",
                    fee["debt_amount"]
                )
            })
        }))
    }

    async fn academic_blocks(&self, task: &Task, id: &str) -> CampusResult<Option<String>> {
        let academic = match dependency_payload(task, TaskType::CheckAcademicStatus) {
            Some(academic) => Some(academic.clone()),
            None => self.records.query("academic_status", id).await?,
        };
        Ok(academic.and_then(|academic| {
            let gpa = academic["gpa"].as_f64().unwrap_or(0.0);
            let allowed = academic["can_register"].as_bool().unwrap_or(true);
            (!allowed || gpa < Self::MIN_GPA).then(|| {
                format!(
                    "academic standing does not allow registration (GPA {gpa:.2}, minimum {:.1})",
                    Self::MIN_GPA
                )
            })
        }))
    }
}

#[async_trait]
impl TaskHandler for CourseRegistrationAgent {
    async fn handle(&self, mut task: Task) -> CampusResult<Task> {
        let id = student_id(&task)?;
        debug!(task_id = %task.task_id, deps = task.dependency_results.len(), "eligibility check");

        let mut blockers = Vec::new();
        if let Some(reason) = self.fee_blocks(&task, &id).await? {
            blockers.push(reason);
        }
        if let Some(reason) = self.academic_blocks(&task, &id).await? {
            blockers.push(reason);
        }

        let can_register = blockers.is_empty();
        let text = if can_register {
            "You may register for courses through the student portal.".to_string()
        } else {
            format!("Registration is blocked: {}.", blockers.join("; "))
        };
        task.complete(
            text,
            Some(json!({ "can_register": can_register, "blockers": blockers })),
        )?;
        Ok(task)
    }
}

/// Free-form campus questions answered from the handbook collection.
pub struct CampusInfoAgent {
    knowledge: Arc<dyn KnowledgeIndex>,
}

impl CampusInfoAgent {
    /// Stable agent id.
    pub const AGENT_ID: &'static str = "campus_info_agent";

    /// Creates the agent over a knowledge index.
    pub fn new(knowledge: Arc<dyn KnowledgeIndex>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl TaskHandler for CampusInfoAgent {
    async fn handle(&self, mut task: Task) -> CampusResult<Task> {
        let query = task.request_text();
        let snippets = self.knowledge.search(&query, "handbook").await?;

        if snippets.is_empty() {
            task.complete(
                "I could not find anything about that in the campus handbook.",
                Some(json!({ "snippets": [] })),
            )?;
            return Ok(task);
        }

        let top: Vec<&str> = snippets.iter().take(3).map(|s| s.text.as_str()).collect();
        let sources: Vec<&str> = snippets.iter().take(3).map(|s| s.source.as_str()).collect();
        task.complete(
            top.join("\n"),
            Some(json!({ "snippets": top, "sources": sources })),
        )?;
        Ok(task)
    }
}
