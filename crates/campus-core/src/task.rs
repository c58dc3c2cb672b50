use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{CampusError, CampusResult};

/// Closed set of work categories the system can route.
///
/// Routing and dependency rules key off this enum, so a missing route is an
/// exhaustiveness error at compile time rather than a runtime string mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Outstanding tuition / fee balance lookup.
    CheckFeeStatus,
    /// Course registration eligibility check.
    CheckCourseRegistration,
    /// GPA and academic standing lookup.
    CheckAcademicStatus,
    /// Payment history lookup.
    CheckPaymentStatus,
    /// Account password reset.
    PasswordReset,
    /// Scholarship eligibility check.
    CheckScholarship,
    /// Library catalogue search.
    SearchBook,
    /// Library card status lookup.
    CheckLibraryCard,
    /// Free-form question answered from departmental documents.
    GeneralQuery,
}

impl TaskType {
    /// The department responsible for this task type.
    ///
    /// `GeneralQuery` defaults to student affairs, matching the original
    /// routing behaviour for unclassified questions.
    pub fn department(self) -> Department {
        match self {
            TaskType::CheckFeeStatus
            | TaskType::CheckPaymentStatus
            | TaskType::CheckScholarship => Department::Finance,
            TaskType::CheckCourseRegistration | TaskType::GeneralQuery => {
                Department::StudentAffairs
            }
            TaskType::CheckAcademicStatus => Department::AcademicAffairs,
            TaskType::PasswordReset => Department::It,
            TaskType::SearchBook | TaskType::CheckLibraryCard => Department::Library,
        }
    }

    /// Whether handling this task type requires a student identifier.
    pub fn requires_student_id(self) -> bool {
        !matches!(self, TaskType::SearchBook | TaskType::GeneralQuery)
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskType::CheckFeeStatus => "check_fee_status",
            TaskType::CheckCourseRegistration => "check_course_registration",
            TaskType::CheckAcademicStatus => "check_academic_status",
            TaskType::CheckPaymentStatus => "check_payment_status",
            TaskType::PasswordReset => "password_reset",
            TaskType::CheckScholarship => "check_scholarship",
            TaskType::SearchBook => "search_book",
            TaskType::CheckLibraryCard => "check_library_card",
            TaskType::GeneralQuery => "general_query",
        };
        write!(f, "{s}")
    }
}

/// Departments the helpdesk routes work to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    /// Tuition, payments, and scholarships.
    Finance,
    /// Registration, records, and general campus questions.
    StudentAffairs,
    /// Grades and academic standing.
    AcademicAffairs,
    /// Accounts and technical support.
    It,
    /// Catalogue and lending.
    Library,
}

impl Department {
    /// Agent id of this department's router.
    pub fn router_agent_id(self) -> &'static str {
        match self {
            Department::Finance => "finance_router",
            Department::StudentAffairs => "student_affairs_router",
            Department::AcademicAffairs => "academic_affairs_router",
            Department::It => "it_router",
            Department::Library => "library_router",
        }
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Department::Finance => "finance",
            Department::StudentAffairs => "student_affairs",
            Department::AcademicAffairs => "academic_affairs",
            Department::It => "it",
            Department::Library => "library",
        };
        write!(f, "{s}")
    }
}

/// Task lifecycle states.
///
/// Transitions are monotonic: `Submitted → Working → Completed | Failed`,
/// with `Cancelled` reachable from either non-terminal state. There is no
/// transition out of a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet dispatched.
    Submitted,
    /// Owned by an in-flight dispatch.
    Working,
    /// Terminal success.
    Completed,
    /// Terminal failure with a descriptive reason.
    Failed {
        /// Why the task failed.
        reason: String,
    },
    /// Terminal cancellation, e.g. because a precedent task failed.
    Cancelled {
        /// Why the task was cancelled.
        reason: String,
    },
}

impl TaskStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed { .. } | TaskStatus::Cancelled { .. }
        )
    }

    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Submitted => 0,
            TaskStatus::Working => 1,
            _ => 2,
        }
    }
}

/// Author role of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// The originating end-user.
    User,
    /// A handling agent.
    Agent,
    /// System-level annotation.
    System,
}

/// Typed content fragment inside a message or artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// Structured JSON payload.
    Data {
        /// The structured content.
        data: Value,
    },
}

/// A single protocol message. Immutable once created; a task's message
/// history only grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub message_id: Uuid,
    /// Author role.
    pub role: MessageRole,
    /// Ordered content parts.
    pub parts: Vec<MessagePart>,
    /// Correlation id; equals the owning task's `context_id`.
    pub context_id: Option<Uuid>,
    /// Creation timestamp (UTC).
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message with a single text part.
    pub fn text(role: MessageRole, text: impl Into<String>, context_id: Option<Uuid>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            role,
            parts: vec![MessagePart::Text { text: text.into() }],
            context_id,
            timestamp: Utc::now(),
        }
    }

    /// Creates a message with a text part followed by a data part.
    pub fn text_with_data(
        role: MessageRole,
        text: impl Into<String>,
        data: Value,
        context_id: Option<Uuid>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            role,
            parts: vec![
                MessagePart::Text { text: text.into() },
                MessagePart::Data { data },
            ],
            context_id,
            timestamp: Utc::now(),
        }
    }

    /// Concatenates all text parts.
    pub fn text_content(&self) -> String {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::Data { .. } => None,
            })
            .collect();
        texts.join(" ")
    }

    /// Merges all data parts into one JSON object. Later parts win on key
    /// collision.
    pub fn data_content(&self) -> Value {
        let mut merged = serde_json::Map::new();
        for part in &self.parts {
            if let MessagePart::Data {
                data: Value::Object(map),
            } = part
            {
                for (k, v) in map {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        Value::Object(merged)
    }
}

/// A concrete result produced by a handling agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique identifier.
    pub artifact_id: Uuid,
    /// Human-readable artifact name.
    pub name: String,
    /// Ordered content parts.
    pub parts: Vec<MessagePart>,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Creates a text artifact.
    pub fn text(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            artifact_id: Uuid::new_v4(),
            name: name.into(),
            parts: vec![MessagePart::Text {
                text: content.into(),
            }],
            created_at: Utc::now(),
        }
    }

    /// Creates a structured-data artifact.
    pub fn data(name: impl Into<String>, data: Value) -> Self {
        Self {
            artifact_id: Uuid::new_v4(),
            name: name.into(),
            parts: vec![MessagePart::Data { data }],
            created_at: Utc::now(),
        }
    }
}

/// A unit of work routed to one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub task_id: Uuid,
    /// Shared by all tasks spawned from one originating request.
    pub context_id: Uuid,
    /// Agent that created the task.
    pub from_agent: String,
    /// Agent the task is routed to.
    pub to_agent: String,
    /// Work category; drives routing and dependency rules.
    pub task_type: TaskType,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Task types that must complete before this task runs.
    #[serde(default)]
    pub dependencies: Vec<TaskType>,
    /// Result payloads of completed precedents, keyed by their task type.
    /// Empty until every dependency is terminal.
    #[serde(default)]
    pub dependency_results: BTreeMap<TaskType, Value>,
    /// Append-only message history; the first entry is the initiating
    /// message.
    pub messages: Vec<Message>,
    /// Results produced by the handling agent.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp (UTC).
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a submitted task with an initiating user message.
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        task_type: TaskType,
        text: impl Into<String>,
        context_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            context_id,
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            task_type,
            status: TaskStatus::Submitted,
            dependencies: Vec::new(),
            dependency_results: BTreeMap::new(),
            messages: vec![Message::text(MessageRole::User, text, Some(context_id))],
            artifacts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attaches a structured data part to the initiating message.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Some(first) = self.messages.first_mut() {
            first.parts.push(MessagePart::Data { data });
        }
        self
    }

    /// Declares precedent task types.
    pub fn with_dependencies(mut self, deps: Vec<TaskType>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Whether the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Advances the lifecycle status.
    ///
    /// Rejects any transition out of a terminal state and any regression to
    /// an earlier non-terminal state.
    pub fn update_status(&mut self, new_status: TaskStatus) -> CampusResult<()> {
        if self.status.is_terminal() {
            return Err(CampusError::TaskState(format!(
                "task {} is terminal ({:?}); cannot transition to {:?}",
                self.task_id, self.status, new_status
            )));
        }
        if new_status.rank() < self.status.rank() {
            return Err(CampusError::TaskState(format!(
                "task {} cannot regress from {:?} to {:?}",
                self.task_id, self.status, new_status
            )));
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Appends a message. Valid in any non-terminal state; does not alter
    /// status.
    pub fn add_message(&mut self, message: Message) -> CampusResult<()> {
        if self.status.is_terminal() {
            return Err(CampusError::TaskState(format!(
                "task {} is terminal; message history is frozen",
                self.task_id
            )));
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Appends an artifact.
    pub fn add_artifact(&mut self, artifact: Artifact) {
        self.artifacts.push(artifact);
        self.updated_at = Utc::now();
    }

    /// The most recent message, or `None` when the history is empty.
    pub fn get_latest_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Text of the initiating message.
    pub fn request_text(&self) -> String {
        self.messages
            .first()
            .map(Message::text_content)
            .unwrap_or_default()
    }

    /// Merged data of the initiating message.
    pub fn request_data(&self) -> Value {
        self.messages
            .first()
            .map(Message::data_content)
            .unwrap_or(Value::Null)
    }

    /// Completes the task with an agent reply and optional result payload.
    pub fn complete(&mut self, text: impl Into<String>, data: Option<Value>) -> CampusResult<()> {
        let msg = match data {
            Some(d) => Message::text_with_data(MessageRole::Agent, text, d, Some(self.context_id)),
            None => Message::text(MessageRole::Agent, text, Some(self.context_id)),
        };
        self.add_message(msg)?;
        self.update_status(TaskStatus::Completed)
    }

    /// Fails the task, recording the reason as an agent message.
    pub fn fail(&mut self, reason: impl Into<String>) -> CampusResult<()> {
        let reason = reason.into();
        self.add_message(Message::text(
            MessageRole::Agent,
            format!("Error: {reason}"),
            Some(self.context_id),
        ))?;
        self.update_status(TaskStatus::Failed { reason })
    }

    /// Cancels the task, recording the causing reason as a system message.
    pub fn cancel(&mut self, reason: impl Into<String>) -> CampusResult<()> {
        let reason = reason.into();
        self.add_message(Message::text(
            MessageRole::System,
            format!("Cancelled: {reason}"),
            Some(self.context_id),
        ))?;
        self.update_status(TaskStatus::Cancelled { reason })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task() -> Task {
        Task::new(
            "main_orchestrator",
            "finance_router",
            TaskType::CheckFeeStatus,
            "Do I owe tuition?",
            Uuid::new_v4(),
        )
    }

    #[test]
    fn new_task_is_submitted_with_one_message() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Submitted);
        assert_eq!(t.messages.len(), 1);
        assert_eq!(t.request_text(), "Do I owe tuition?");
        assert!(t.dependency_results.is_empty());
    }

    #[test]
    fn status_is_monotonic() {
        let mut t = task();
        t.update_status(TaskStatus::Working).unwrap();
        assert!(t.update_status(TaskStatus::Submitted).is_err());
        t.update_status(TaskStatus::Completed).unwrap();
        assert!(t
            .update_status(TaskStatus::Failed {
                reason: "late".into()
            })
            .is_err());
    }

    #[test]
    fn cancel_allowed_from_submitted_and_working() {
        let mut a = task();
        a.cancel("precedent failed").unwrap();
        assert!(matches!(a.status, TaskStatus::Cancelled { .. }));

        let mut b = task();
        b.update_status(TaskStatus::Working).unwrap();
        b.cancel("request aborted").unwrap();
        assert!(b.is_terminal());

        let mut c = task();
        c.complete("done", None).unwrap();
        assert!(c.cancel("too late").is_err());
    }

    #[test]
    fn add_message_frozen_after_terminal() {
        let mut t = task();
        t.fail("backend down").unwrap();
        let msg = Message::text(MessageRole::Agent, "extra", None);
        assert!(t.add_message(msg).is_err());
    }

    #[test]
    fn latest_message_on_empty_history() {
        let mut t = task();
        t.messages.clear();
        assert!(t.get_latest_message().is_none());
        assert_eq!(t.request_text(), "");
    }

    #[test]
    fn fail_records_reason_message() {
        let mut t = task();
        t.fail("ledger unavailable").unwrap();
        let last = t.get_latest_message().unwrap();
        assert_eq!(last.role, MessageRole::Agent);
        assert!(last.text_content().contains("ledger unavailable"));
        assert_eq!(
            t.status,
            TaskStatus::Failed {
                reason: "ledger unavailable".into()
            }
        );
    }

    #[test]
    fn message_data_merging() {
        let msg = Message::text_with_data(
            MessageRole::User,
            "check my fees",
            json!({"student_id": "20220015", "task_type": "check_fee_status"}),
            None,
        );
        assert_eq!(msg.text_content(), "check my fees");
        assert_eq!(msg.data_content()["student_id"], "20220015");
    }

    #[test]
    fn task_type_routing_table() {
        assert_eq!(TaskType::CheckFeeStatus.department(), Department::Finance);
        assert_eq!(
            TaskType::CheckCourseRegistration.department(),
            Department::StudentAffairs
        );
        assert_eq!(
            TaskType::CheckAcademicStatus.department(),
            Department::AcademicAffairs
        );
        assert_eq!(TaskType::PasswordReset.department(), Department::It);
        assert_eq!(TaskType::SearchBook.department(), Department::Library);
    }

    #[test]
    fn task_serialization_round_trip() {
        let mut t = task().with_dependencies(vec![TaskType::CheckAcademicStatus]);
        t.dependency_results
            .insert(TaskType::CheckAcademicStatus, json!({"gpa": 3.2}));
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("check_fee_status"));
        let parsed: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.task_id, t.task_id);
        assert_eq!(parsed.dependencies, vec![TaskType::CheckAcademicStatus]);
        assert_eq!(
            parsed.dependency_results[&TaskType::CheckAcademicStatus]["gpa"],
            json!(3.2)
        );
    }
}
