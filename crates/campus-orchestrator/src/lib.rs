//! Request orchestration: decomposition of a raw helpdesk request into
//! typed tasks, rule-driven dependency injection and wave scheduling, the
//! ready queue feeding the invoker, and the per-department routers.

/// Request decomposition (keyword and completion-backed).
pub mod classifier;
/// The top-level request orchestrator.
pub mod engine;
/// Ready-queue trait and in-memory implementation.
pub mod queue;
/// Dependency resolution into execution waves.
pub mod resolver;
/// Department-scoped routing.
pub mod router;
/// The task-type dependency rule table.
pub mod rules;

pub use classifier::{ClassifiedRequest, FallbackClassifier, KeywordClassifier, RequestClassifier};
pub use engine::{RequestOrchestrator, RequestOutcome};
pub use queue::{InMemoryReadyQueue, ReadyQueue};
pub use resolver::{DependencyResolver, ExecutionPlan};
pub use router::DepartmentRouter;
pub use rules::DependencyRules;
