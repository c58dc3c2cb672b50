use serde_json::Value;

use campus_core::{CampusError, CampusResult, Task};

/// Pulls the student id out of a task's request payload.
///
/// Tasks that need one are screened by the orchestrator before dispatch, so
/// a missing id here is a handler-level contract violation, not retryable.
pub fn student_id(task: &Task) -> CampusResult<String> {
    match task.request_data().get("student_id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        _ => Err(CampusError::Handler(format!(
            "task {} carries no student id",
            task.task_id
        ))),
    }
}

/// A completed precedent's payload, if the orchestrator threaded one in.
pub fn dependency_payload(task: &Task, dep: campus_core::TaskType) -> Option<&Value> {
    task.dependency_results.get(&dep)
}
