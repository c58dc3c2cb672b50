use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info};

use campus_core::{CampusError, Task};

use crate::registry::{AgentRegistry, InvocationTarget};

/// Shared server state.
pub struct AppState {
    /// Registry of agents hosted by this process.
    pub registry: Arc<AgentRegistry>,
}

/// HTTP surface of one agent process.
///
/// Exposes locally registered handlers at `POST /tasks` so remote peers can
/// dispatch to them, plus card discovery at `/.well-known/agent.json`.
pub struct AgentServer;

impl AgentServer {
    /// Builds the router over a registry.
    pub fn build(registry: Arc<AgentRegistry>) -> Router {
        let state = Arc::new(AppState { registry });

        Router::new()
            .route("/tasks", post(handle_task))
            .route("/.well-known/agent.json", get(agent_cards))
            .route("/agents/{agent_id}/card", get(agent_card))
            .route("/health", get(health))
            .with_state(state)
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "campus"}))
}

async fn agent_cards(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.cards())
}

async fn agent_card(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    state
        .registry
        .card(&agent_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn handle_task(
    State(state): State<Arc<AppState>>,
    Json(task): Json<Task>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let agent_id = task.to_agent.clone();

    let Some(InvocationTarget::Local(handler)) = state.registry.target(&agent_id) else {
        // Unknown agents and remote-registered ones are both "not here".
        return Err((
            StatusCode::NOT_FOUND,
            format!("no local handler for agent '{agent_id}'"),
        ));
    };

    info!(task_id = %task.task_id, to_agent = %agent_id, "task received");

    match handler.handle(task).await {
        Ok(updated) => Ok(Json(updated)),
        Err(CampusError::Handler(reason)) => {
            // Business failures travel as a failed task, not an HTTP error,
            // so the caller can read the reason from the protocol payload.
            Err((StatusCode::UNPROCESSABLE_ENTITY, reason))
        }
        Err(e) => {
            error!(to_agent = %agent_id, error = %e, "handler error");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::TaskHandler;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use campus_core::{AgentCard, CampusResult, Department, TaskStatus, TaskType};
    use tower::ServiceExt;
    use uuid::Uuid;

    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn handle(&self, mut task: Task) -> CampusResult<Task> {
            let text = task.request_text();
            task.complete(format!("echo: {text}"), None)?;
            Ok(task)
        }
    }

    fn registry_with_echo() -> Arc<AgentRegistry> {
        let registry = Arc::new(AgentRegistry::new());
        registry.register(
            AgentCard::new(
                "echo",
                "Echo",
                Some(Department::StudentAffairs),
                vec![TaskType::GeneralQuery],
            ),
            InvocationTarget::Local(Arc::new(EchoHandler)),
        );
        registry
    }

    fn post_task(to_agent: &str) -> Request<Body> {
        let task = Task::new(
            "main_orchestrator",
            to_agent,
            TaskType::GeneralQuery,
            "ping",
            Uuid::new_v4(),
        );
        Request::builder()
            .method("POST")
            .uri("/tasks")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&task).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn post_task_runs_local_handler() {
        let app = AgentServer::build(registry_with_echo());
        let response = app.oneshot(post_task("echo")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let task: Task = serde_json::from_slice(&body).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.get_latest_message().unwrap().text_content(), "echo: ping");
    }

    #[tokio::test]
    async fn unknown_agent_is_404() {
        let app = AgentServer::build(registry_with_echo());
        let response = app.oneshot(post_task("ghost")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn card_discovery() {
        let app = AgentServer::build(registry_with_echo());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/.well-known/agent.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let cards: Vec<AgentCard> = serde_json::from_slice(&body).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].agent_id, "echo");
    }
}
