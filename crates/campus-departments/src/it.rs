use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use campus_a2a::TaskHandler;
use campus_core::{CampusError, CampusResult, RecordStore, Task};

use crate::support::student_id;

/// Account password resets.
pub struct PasswordResetAgent {
    records: Arc<dyn RecordStore>,
}

impl PasswordResetAgent {
    /// Stable agent id.
    pub const AGENT_ID: &'static str = "password_reset_agent";

    /// Creates the agent over a record store.
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl TaskHandler for PasswordResetAgent {
    async fn handle(&self, mut task: Task) -> CampusResult<Task> {
        let id = student_id(&task)?;
        let account = self
            .records
            .query("account", &id)
            .await?
            .ok_or_else(|| CampusError::Handler(format!("no account for student {id}")))?;

        let email = account["email"].as_str().unwrap_or("your registered address");
        let text = format!(
            "A password reset link has been sent to {email}. \
             It expires in 30 minutes."
        );
        task.complete(
            text,
            Some(json!({ "reset_sent": true, "email": email })),
        )?;
        Ok(task)
    }
}
