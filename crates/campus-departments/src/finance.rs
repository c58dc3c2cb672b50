use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use campus_a2a::TaskHandler;
use campus_core::{CampusError, CampusResult, RecordStore, Task, TaskType};

use crate::support::{dependency_payload, student_id};

/// Tuition and payment lookups against the finance ledger.
pub struct TuitionAgent {
    records: Arc<dyn RecordStore>,
}

impl TuitionAgent {
    /// Stable agent id.
    pub const AGENT_ID: &'static str = "tuition_agent";

    /// Creates the agent over a record store.
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    async fn fee_status(&self, mut task: Task) -> CampusResult<Task> {
        let id = student_id(&task)?;
        let record = self
            .records
            .query("tuition_status", &id)
            .await?
            .ok_or_else(|| CampusError::Handler(format!("no tuition record for student {id}")))?;

        let has_debt = record["has_debt"].as_bool().unwrap_or(false);
        let text = if has_debt {
            format!(
                "You have an outstanding balance of {} due by {}.",
                record["debt_amount"],
                record["due_date"].as_str().unwrap_or("the end of term")
            )
        } else {
            "You have no outstanding tuition balance.".to_string()
        };
        task.complete(text, Some(record))?;
        Ok(task)
    }

    async fn payment_status(&self, mut task: Task) -> CampusResult<Task> {
        let id = student_id(&task)?;

        // The fee precedent, when present, frames the payment answer.
        let balance_note = dependency_payload(&task, TaskType::CheckFeeStatus)
            .and_then(|fee| fee["has_debt"].as_bool())
            .map(|has_debt| {
                if has_debt {
                    " Note: your account still shows an open balance."
                } else {
                    " Your account is fully settled."
                }
            })
            .unwrap_or("");

        let history = self
            .records
            .query("payment_history", &id)
            .await?
            .unwrap_or_else(|| json!([]));
        let count = history.as_array().map_or(0, Vec::len);

        let text = format!("Found {count} recorded payments.{balance_note}");
        task.complete(text, Some(json!({ "payments": history })))?;
        Ok(task)
    }
}

#[async_trait]
impl TaskHandler for TuitionAgent {
    async fn handle(&self, task: Task) -> CampusResult<Task> {
        debug!(task_id = %task.task_id, task_type = %task.task_type, "tuition agent handling");
        match task.task_type {
            TaskType::CheckFeeStatus => self.fee_status(task).await,
            TaskType::CheckPaymentStatus => self.payment_status(task).await,
            other => Err(CampusError::Handler(format!(
                "tuition agent cannot handle {other}"
            ))),
        }
    }
}

/// Scholarship eligibility, gated on academic standing.
pub struct ScholarshipAgent {
    records: Arc<dyn RecordStore>,
}

impl ScholarshipAgent {
    /// Stable agent id.
    pub const AGENT_ID: &'static str = "scholarship_agent";

    /// Minimum GPA for merit scholarship eligibility.
    const MIN_GPA: f64 = 3.0;

    /// Creates the agent over a record store.
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl TaskHandler for ScholarshipAgent {
    async fn handle(&self, mut task: Task) -> CampusResult<Task> {
        let id = student_id(&task)?;

        // Prefer the academic-status precedent; fall back to a direct
        // lookup when this task ran without one.
        let gpa = match dependency_payload(&task, TaskType::CheckAcademicStatus)
            .and_then(|academic| academic["gpa"].as_f64())
        {
            Some(gpa) => gpa,
            None => self
                .records
                .query("academic_status", &id)
                .await?
                .and_then(|r| r["gpa"].as_f64())
                .ok_or_else(|| {
                    CampusError::Handler(format!("no academic record for student {id}"))
                })?,
        };

        let current = self.records.query("scholarship", &id).await?;
        let holds_scholarship = current
            .as_ref()
            .and_then(|s| s["active"].as_bool())
            .unwrap_or(false);
        let eligible = gpa >= Self::MIN_GPA;

        let text = match (holds_scholarship, eligible) {
            (true, _) => "You already hold an active scholarship.".to_string(),
            (false, true) => format!(
                "With a GPA of {gpa:.2} you are eligible to apply for a merit scholarship."
            ),
            (false, false) => format!(
                "A GPA of at least {:.1} is required; yours is {gpa:.2}.",
                Self::MIN_GPA
            ),
        };
        task.complete(
            text,
            Some(json!({
                "eligible": eligible,
                "gpa": gpa,
                "active_scholarship": holds_scholarship,
            })),
        )?;
        Ok(task)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRecordStore;
    use campus_core::TaskStatus;
    use serde_json::Value;
    use uuid::Uuid;

    fn task(task_type: TaskType, student: &str) -> Task {
        Task::new(
            "finance_router",
            "tuition_agent",
            task_type,
            "finance question",
            Uuid::new_v4(),
        )
        .with_data(json!({ "student_id": student }))
    }

    #[tokio::test]
    async fn fee_status_without_debt() {
        let agent = TuitionAgent::new(Arc::new(InMemoryRecordStore::seeded()));
        let result = agent
            .handle(task(TaskType::CheckFeeStatus, "20220015"))
            .await
            .unwrap();
        assert_eq!(result.status, TaskStatus::Completed);
        let payload = result.get_latest_message().unwrap().data_content();
        assert_eq!(payload["has_debt"], Value::Bool(false));
    }

    #[tokio::test]
    async fn fee_status_with_debt_mentions_amount() {
        let agent = TuitionAgent::new(Arc::new(InMemoryRecordStore::seeded()));
        let result = agent
            .handle(task(TaskType::CheckFeeStatus, "20220016"))
            .await
            .unwrap();
        assert!(result
            .get_latest_message()
            .unwrap()
            .text_content()
            .contains("4500"));
    }

    #[tokio::test]
    async fn unknown_student_is_handler_error() {
        let agent = TuitionAgent::new(Arc::new(InMemoryRecordStore::seeded()));
        let err = agent
            .handle(task(TaskType::CheckFeeStatus, "99999999"))
            .await
            .unwrap_err();
        assert!(matches!(err, CampusError::Handler(_)));
    }

    #[tokio::test]
    async fn scholarship_uses_precedent_gpa() {
        let agent = ScholarshipAgent::new(Arc::new(InMemoryRecordStore::seeded()));
        let mut t = task(TaskType::CheckScholarship, "20220016");
        // Precedent overrides the stored (failing) GPA.
        t.dependency_results
            .insert(TaskType::CheckAcademicStatus, json!({"gpa": 3.6}));

        let result = agent.handle(t).await.unwrap();
        let payload = result.get_latest_message().unwrap().data_content();
        assert_eq!(payload["eligible"], Value::Bool(true));
        assert_eq!(payload["gpa"], json!(3.6));
    }

    #[tokio::test]
    async fn scholarship_falls_back_to_records() {
        let agent = ScholarshipAgent::new(Arc::new(InMemoryRecordStore::seeded()));
        let result = agent
            .handle(task(TaskType::CheckScholarship, "20220016"))
            .await
            .unwrap();
        let payload = result.get_latest_message().unwrap().data_content();
        assert_eq!(payload["eligible"], Value::Bool(false));
    }
}
