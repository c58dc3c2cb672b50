use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use campus_a2a::{
    AgentRegistry, AgentServer, DispatchClient, FaultTolerantInvoker, InvocationTarget,
    InvokerConfig,
};
use campus_core::{AgentCard, CancelToken, Department, Task, TaskStatus};
use campus_departments::{
    register_department_agents, InMemoryRecordStore, StaticKnowledgeIndex,
};
use campus_orchestrator::{
    DependencyResolver, DependencyRules, DepartmentRouter, InMemoryReadyQueue, KeywordClassifier,
    RequestOrchestrator, RequestOutcome,
};

#[derive(Parser)]
#[command(name = "campus", about = "Campus — multi-agent university helpdesk")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "campus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle one request and print the result
    Ask {
        /// The request text
        text: String,
        /// Student id, when not included in the text
        #[arg(long)]
        student_id: Option<String>,
    },
    /// Start the helpdesk HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Deserialize, Default)]
struct CampusConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    invoker: InvokerConfig,
    #[serde(default)]
    dependencies: Option<DependencyRules>,
}

#[derive(Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

struct App {
    registry: Arc<AgentRegistry>,
    orchestrator: Arc<RequestOrchestrator>,
}

/// Wires the registry, invoker, routers, agents, and orchestrator.
fn bootstrap(config: &CampusConfig) -> anyhow::Result<App> {
    let rules = config.dependencies.clone().unwrap_or_default();
    rules.validate()?;

    let registry = Arc::new(AgentRegistry::new());
    let client = Arc::new(DispatchClient::new(registry.clone()));
    let invoker = Arc::new(FaultTolerantInvoker::new(client, config.invoker.clone()));

    let records = Arc::new(InMemoryRecordStore::seeded());
    let knowledge = Arc::new(StaticKnowledgeIndex::seeded());
    register_department_agents(&registry, records, knowledge);

    for department in [
        Department::Finance,
        Department::StudentAffairs,
        Department::AcademicAffairs,
        Department::It,
        Department::Library,
    ] {
        registry.register(
            AgentCard::new(
                department.router_agent_id(),
                format!("{department} router"),
                Some(department),
                vec![],
            )
            .orchestrator(),
            InvocationTarget::Local(Arc::new(DepartmentRouter::new(
                department,
                registry.clone(),
                invoker.clone(),
            ))),
        );
    }

    let orchestrator = Arc::new(RequestOrchestrator::new(
        registry.clone(),
        invoker,
        DependencyResolver::new(rules),
        Arc::new(KeywordClassifier::new()?),
        Arc::new(InMemoryReadyQueue::new()),
    ));

    Ok(App {
        registry,
        orchestrator,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config: CampusConfig = match tokio::fs::read_to_string(&cli.config).await {
        Ok(text) => toml::from_str(&text)?,
        Err(_) => {
            info!(config = %cli.config.display(), "no config file, using defaults");
            CampusConfig::default()
        }
    };

    let app = bootstrap(&config)?;

    match cli.command {
        Commands::Ask { text, student_id } => {
            let outcome = app
                .orchestrator
                .handle_request(&text, student_id.as_deref(), None, &CancelToken::never())
                .await?;
            print_outcome(outcome);
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);
            let addr = format!("{host}:{port}");

            let router = Router::new()
                .route("/requests", post(handle_http_request))
                .with_state(app.orchestrator.clone())
                .merge(AgentServer::build(app.registry.clone()));

            info!(%addr, "campus helpdesk listening");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, router).await?;
        }
    }

    Ok(())
}

#[derive(Deserialize)]
struct HttpRequest {
    text: String,
    student_id: Option<String>,
}

async fn handle_http_request(
    State(orchestrator): State<Arc<RequestOrchestrator>>,
    Json(request): Json<HttpRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let outcome = orchestrator
        .handle_request(
            &request.text,
            request.student_id.as_deref(),
            None,
            &CancelToken::never(),
        )
        .await
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let body = match outcome {
        RequestOutcome::Completed { tasks } => serde_json::json!({
            "outcome": "completed",
            "tasks": tasks,
        }),
        RequestOutcome::NeedsInput {
            prompt,
            missing,
            required_for,
        } => serde_json::json!({
            "outcome": "needs_input",
            "prompt": prompt,
            "missing": missing,
            "required_for": required_for,
        }),
    };
    Ok(Json(body))
}

fn print_outcome(outcome: RequestOutcome) {
    match outcome {
        RequestOutcome::NeedsInput { prompt, .. } => println!("{prompt}"),
        RequestOutcome::Completed { tasks } => {
            for task in tasks {
                println!("[{}] {}", task.task_type, status_line(&task));
            }
        }
    }
}

fn status_line(task: &Task) -> String {
    let reply = task
        .get_latest_message()
        .map(|m| m.text_content())
        .unwrap_or_default();
    match &task.status {
        TaskStatus::Completed => reply,
        TaskStatus::Failed { reason } => format!("failed: {reason}"),
        TaskStatus::Cancelled { reason } => format!("cancelled: {reason}"),
        other => format!("{other:?}"),
    }
}
