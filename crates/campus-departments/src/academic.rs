use std::sync::Arc;

use async_trait::async_trait;

use campus_a2a::TaskHandler;
use campus_core::{CampusError, CampusResult, RecordStore, Task};

use crate::support::student_id;

/// GPA and academic-standing lookups.
pub struct AcademicStatusAgent {
    records: Arc<dyn RecordStore>,
}

impl AcademicStatusAgent {
    /// Stable agent id.
    pub const AGENT_ID: &'static str = "academic_status_agent";

    /// Creates the agent over a record store.
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl TaskHandler for AcademicStatusAgent {
    async fn handle(&self, mut task: Task) -> CampusResult<Task> {
        let id = student_id(&task)?;
        let record = self
            .records
            .query("academic_status", &id)
            .await?
            .ok_or_else(|| CampusError::Handler(format!("no academic record for student {id}")))?;

        let gpa = record["gpa"].as_f64().unwrap_or(0.0);
        let standing = record["standing"].as_str().unwrap_or("unknown");
        let text = format!("Your GPA is {gpa:.2} and your standing is '{standing}'.");
        task.complete(text, Some(record))?;
        Ok(task)
    }
}
