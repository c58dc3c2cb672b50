use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use campus_a2a::{AgentRegistry, FaultTolerantInvoker, InvocationTarget};
use campus_core::{
    AgentCard, Artifact, CampusError, CampusResult, CancelToken, Task, TaskStatus, TaskType,
};

use crate::classifier::RequestClassifier;
use crate::queue::ReadyQueue;
use crate::resolver::DependencyResolver;

/// What a handled request produced.
#[derive(Debug)]
pub enum RequestOutcome {
    /// Every task reached a terminal state. Tasks are in decomposition
    /// order (injected precedents appended), regardless of completion order.
    Completed {
        /// The request's terminal tasks with their artifacts.
        tasks: Vec<Task>,
    },
    /// The request cannot be decomposed without more information from the
    /// user. No tasks were created.
    NeedsInput {
        /// Question to put back to the user.
        prompt: String,
        /// Names of the missing parameters.
        missing: Vec<String>,
        /// Task types that need them.
        required_for: Vec<TaskType>,
    },
}

/// Top-level orchestrator: decomposes a request, resolves dependencies,
/// and drains the plan wave by wave through the fault-tolerant invoker.
pub struct RequestOrchestrator {
    agent_id: String,
    registry: Arc<AgentRegistry>,
    invoker: Arc<FaultTolerantInvoker>,
    resolver: DependencyResolver,
    classifier: Arc<dyn RequestClassifier>,
    queue: Arc<dyn ReadyQueue>,
}

impl RequestOrchestrator {
    /// Wires an orchestrator from its parts.
    pub fn new(
        registry: Arc<AgentRegistry>,
        invoker: Arc<FaultTolerantInvoker>,
        resolver: DependencyResolver,
        classifier: Arc<dyn RequestClassifier>,
        queue: Arc<dyn ReadyQueue>,
    ) -> Self {
        Self {
            agent_id: "main_orchestrator".to_string(),
            registry,
            invoker,
            resolver,
            classifier,
            queue,
        }
    }

    /// Registers an agent with the shared registry.
    pub fn register_agent(&self, card: AgentCard, target: InvocationTarget) {
        self.registry.register(card, target);
    }

    /// Handles one raw request end to end.
    ///
    /// Structural problems (dependency cycle, unregistered routing target)
    /// abort the whole request before any dispatch. Per-task failures do
    /// not: independent branches proceed, and dependents of a failed
    /// precedent are cancelled rather than dispatched with missing data.
    pub async fn handle_request(
        &self,
        text: &str,
        user_id: Option<&str>,
        context_id: Option<Uuid>,
        cancel: &CancelToken,
    ) -> CampusResult<RequestOutcome> {
        let context_id = context_id.unwrap_or_else(Uuid::new_v4);
        let classified = self.classifier.classify(text).await?;
        let student_id = user_id
            .map(str::to_string)
            .or(classified.student_id);

        info!(
            %context_id,
            task_types = ?classified.task_types,
            student_id = student_id.as_deref().unwrap_or("-"),
            "request decomposed"
        );

        let needing_id: Vec<TaskType> = classified
            .task_types
            .iter()
            .copied()
            .filter(|t| t.requires_student_id())
            .collect();
        if student_id.is_none() && !needing_id.is_empty() {
            return Ok(RequestOutcome::NeedsInput {
                prompt: "I need your student id to process this request. \
                         For example: 'My student id is 20220015'."
                    .to_string(),
                missing: vec!["student_id".to_string()],
                required_for: needing_id,
            });
        }

        let tasks: Vec<Task> = classified
            .task_types
            .iter()
            .map(|&task_type| {
                let mut task = Task::new(
                    self.agent_id.clone(),
                    task_type.department().router_agent_id(),
                    task_type,
                    text,
                    context_id,
                );
                if let Some(id) = &student_id {
                    task = task.with_data(json!({ "student_id": id }));
                }
                task
            })
            .collect();

        let plan = self.resolver.resolve(tasks)?;

        // Unregistered routing targets abort before any dispatch.
        for task in &plan.tasks {
            if self.registry.target(&task.to_agent).is_none() {
                return Err(CampusError::AgentNotFound(task.to_agent.clone()));
            }
        }

        let waves = plan.waves;
        let mut slots: Vec<Option<Task>> = plan.tasks.into_iter().map(Some).collect();
        let mut completed_payloads: BTreeMap<TaskType, Value> = BTreeMap::new();
        let mut terminal_statuses: BTreeMap<TaskType, TaskStatus> = BTreeMap::new();

        for (wave_idx, wave) in waves.iter().enumerate() {
            let mut slot_of: HashMap<Uuid, usize> = HashMap::new();
            let mut ready = 0usize;

            for (idx, slot) in slots.iter_mut().enumerate() {
                let Some(mut task) = slot.take() else {
                    continue;
                };
                if !wave.contains(&task.task_type) {
                    *slot = Some(task);
                    continue;
                }

                if let Some(reason) = failed_precedent(&task, &terminal_statuses) {
                    warn!(
                        task_id = %task.task_id,
                        task_type = %task.task_type,
                        %reason,
                        "cancelling dependent of failed precedent"
                    );
                    task.cancel(reason)?;
                    terminal_statuses.insert(task.task_type, task.status.clone());
                    *slot = Some(task);
                    continue;
                }

                let deps = task.dependencies.clone();
                for dep in deps {
                    if let Some(payload) = completed_payloads.get(&dep) {
                        task.dependency_results.insert(dep, payload.clone());
                    }
                }

                slot_of.insert(task.task_id, idx);
                self.queue.enqueue(task).await;
                ready += 1;
            }

            let mut batch = Vec::with_capacity(ready);
            for _ in 0..ready {
                match self.queue.dequeue(cancel).await {
                    Some(task) => batch.push(task),
                    None => return Err(CampusError::Cancelled),
                }
            }

            info!(wave = wave_idx, dispatching = batch.len(), "wave dispatch");

            let outcomes = join_all(batch.into_iter().map(|task| {
                let snapshot = task.clone();
                async move { (snapshot, self.invoker.invoke(task, cancel).await) }
            }))
            .await;

            for (snapshot, outcome) in outcomes {
                let mut task = match outcome {
                    Ok(task) => task,
                    // Quarantine and similar per-call errors fail the
                    // affected task only; siblings are unaffected.
                    Err(e) => {
                        let mut failed = snapshot;
                        failed.fail(e.to_string())?;
                        failed
                    }
                };

                if let TaskStatus::Failed { reason } = &task.status {
                    if task.artifacts.is_empty() {
                        let reason = reason.clone();
                        task.add_artifact(Artifact::text("error", reason));
                    }
                }
                if task.status == TaskStatus::Completed {
                    completed_payloads.insert(task.task_type, result_payload(&task));
                }
                terminal_statuses.insert(task.task_type, task.status.clone());

                let idx = slot_of.get(&task.task_id).copied().ok_or_else(|| {
                    CampusError::TaskState(format!(
                        "dispatch returned unknown task {}",
                        task.task_id
                    ))
                })?;
                slots[idx] = Some(task);
            }
        }

        let tasks: Vec<Task> = slots.into_iter().flatten().collect();
        Ok(RequestOutcome::Completed { tasks })
    }
}

/// Reason string if any precedent of `task` ended other than `Completed`.
fn failed_precedent(
    task: &Task,
    terminal_statuses: &BTreeMap<TaskType, TaskStatus>,
) -> Option<String> {
    for dep in &task.dependencies {
        match terminal_statuses.get(dep) {
            Some(TaskStatus::Completed) | None => {}
            Some(TaskStatus::Failed { reason }) => {
                return Some(format!("precedent {dep} failed: {reason}"));
            }
            Some(TaskStatus::Cancelled { reason }) => {
                return Some(format!("precedent {dep} was cancelled: {reason}"));
            }
            Some(other) => {
                return Some(format!("precedent {dep} in unexpected state {other:?}"));
            }
        }
    }
    None
}

/// The payload a completed task contributes to its dependents'
/// `dependency_results`: the last data artifact, else the final message's
/// data, else its text.
fn result_payload(task: &Task) -> Value {
    for artifact in task.artifacts.iter().rev() {
        for part in artifact.parts.iter().rev() {
            if let campus_core::MessagePart::Data { data } = part {
                return data.clone();
            }
        }
    }
    if let Some(message) = task.get_latest_message() {
        let data = message.data_content();
        if data.as_object().is_some_and(|m| !m.is_empty()) {
            return data;
        }
        return Value::String(message.text_content());
    }
    Value::Null
}
