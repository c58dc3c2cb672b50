use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use campus_core::{CampusError, CampusResult, CancelToken, Task, TaskStatus};

use crate::client::DispatchClient;

/// Timeout, retry, and circuit-breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    /// Budget per dispatch attempt, in milliseconds.
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub backoff_base_ms: u64,
    /// Backoff cap, in milliseconds.
    pub backoff_max_ms: u64,
    /// Consecutive failures that open an agent's circuit.
    pub failure_threshold: u32,
    /// Open → HalfOpen delay, in milliseconds.
    pub cooldown_ms: u64,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 2,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            failure_threshold: 3,
            cooldown_ms: 15_000,
        }
    }
}

impl InvokerConfig {
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let delay = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }
}

/// Circuit state for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls fail fast until the cooldown elapses.
    Open,
    /// One trial call is in flight; its outcome decides Closed or Open.
    HalfOpen,
}

#[derive(Debug)]
struct Breaker {
    failure_count: u32,
    state: CircuitState,
    opened_at: Instant,
}

impl Default for Breaker {
    fn default() -> Self {
        Self {
            failure_count: 0,
            state: CircuitState::Closed,
            opened_at: Instant::now(),
        }
    }
}

/// Wraps every dispatch with a per-attempt timeout, bounded retry with
/// exponential backoff, and a per-agent circuit breaker.
///
/// This is the only place retries and circuit logic exist. Callers see
/// either a terminal-status task or a fatal error ([`CampusError::AgentNotFound`],
/// [`CampusError::CircuitOpen`]), never a raw transport failure.
pub struct FaultTolerantInvoker {
    client: Arc<DispatchClient>,
    config: InvokerConfig,
    breakers: Mutex<HashMap<String, Breaker>>,
}

impl FaultTolerantInvoker {
    /// Creates an invoker over a dispatch client.
    pub fn new(client: Arc<DispatchClient>, config: InvokerConfig) -> Self {
        Self {
            client,
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Current breaker state for an agent. Closed when the agent has never
    /// been called.
    pub fn circuit_state(&self, agent_id: &str) -> CircuitState {
        self.breakers
            .lock()
            .get(agent_id)
            .map_or(CircuitState::Closed, |b| b.state)
    }

    /// Invokes the agent named by `task.to_agent`, applying the full
    /// timeout/retry/breaker policy.
    ///
    /// Re-invoking a task already in a terminal state is rejected without
    /// calling the handler.
    pub async fn invoke(&self, mut task: Task, cancel: &CancelToken) -> CampusResult<Task> {
        if task.is_terminal() {
            return Err(CampusError::TaskState(format!(
                "task {} is already terminal; not re-dispatching",
                task.task_id
            )));
        }

        let agent_id = task.to_agent.clone();
        self.acquire(&agent_id)?;

        task.update_status(TaskStatus::Working)?;

        let mut last_error = String::new();
        let max_attempts = self.config.max_retries + 1;
        let mut attempts_made = 0;

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                self.abort_trial(&agent_id);
                task.cancel("request cancelled")?;
                return Ok(task);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    self.abort_trial(&agent_id);
                    task.cancel("request cancelled")?;
                    return Ok(task);
                }
                result = tokio::time::timeout(
                    self.config.timeout(),
                    self.client.dispatch(task.clone()),
                ) => result,
            };

            attempts_made = attempt + 1;
            match outcome {
                Ok(Ok(updated)) => {
                    self.record_success(&agent_id);
                    info!(
                        task_id = %updated.task_id,
                        to_agent = %agent_id,
                        attempt,
                        "dispatch succeeded"
                    );
                    return Ok(updated);
                }
                Ok(Err(CampusError::AgentNotFound(id))) => {
                    // Structural, not an agent-health signal.
                    self.abort_trial(&agent_id);
                    return Err(CampusError::AgentNotFound(id));
                }
                Ok(Err(e)) if e.is_retryable() => {
                    let state = self.record_failure(&agent_id);
                    last_error = e.to_string();
                    warn!(
                        task_id = %task.task_id,
                        to_agent = %agent_id,
                        attempt,
                        error = %last_error,
                        "transient dispatch failure"
                    );
                    // An Open circuit admits no calls, retries included.
                    if state == CircuitState::Open {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    // Handler-reported business failure: terminal, no retry.
                    self.record_failure(&agent_id);
                    warn!(
                        task_id = %task.task_id,
                        to_agent = %agent_id,
                        error = %e,
                        "handler failure"
                    );
                    task.fail(e.to_string())?;
                    return Ok(task);
                }
                Err(_) => {
                    let state = self.record_failure(&agent_id);
                    let err = CampusError::Timeout {
                        agent_id: agent_id.clone(),
                        budget: self.config.timeout(),
                    };
                    last_error = err.to_string();
                    warn!(
                        task_id = %task.task_id,
                        to_agent = %agent_id,
                        attempt,
                        "dispatch attempt timed out"
                    );
                    if state == CircuitState::Open {
                        break;
                    }
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.config.backoff(attempt);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        task.cancel("request cancelled")?;
                        return Ok(task);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let reason = CampusError::RetriesExhausted {
            agent_id: agent_id.clone(),
            attempts: attempts_made,
            last_error,
        }
        .to_string();
        task.fail(reason)?;
        Ok(task)
    }

    /// Admits a call or fails fast with [`CampusError::CircuitOpen`].
    ///
    /// An Open breaker past its cooldown moves to HalfOpen and admits
    /// exactly one trial; concurrent callers observe the HalfOpen state and
    /// are rejected until the trial resolves.
    fn acquire(&self, agent_id: &str) -> CampusResult<()> {
        let mut breakers = self.breakers.lock();
        let breaker = breakers.entry(agent_id.to_string()).or_default();
        match breaker.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Err(CampusError::CircuitOpen(agent_id.to_string())),
            CircuitState::Open => {
                if breaker.opened_at.elapsed() < Duration::from_millis(self.config.cooldown_ms) {
                    Err(CampusError::CircuitOpen(agent_id.to_string()))
                } else {
                    info!(to_agent = %agent_id, "circuit half-open, admitting trial call");
                    breaker.state = CircuitState::HalfOpen;
                    Ok(())
                }
            }
        }
    }

    fn record_success(&self, agent_id: &str) {
        let mut breakers = self.breakers.lock();
        let breaker = breakers.entry(agent_id.to_string()).or_default();
        if breaker.state != CircuitState::Closed {
            info!(to_agent = %agent_id, "circuit closed");
        }
        breaker.failure_count = 0;
        breaker.state = CircuitState::Closed;
    }

    /// Counts a failure against the agent and returns the resulting state,
    /// so the attempt loop can stop dispatching the moment the circuit opens.
    fn record_failure(&self, agent_id: &str) -> CircuitState {
        let mut breakers = self.breakers.lock();
        let breaker = breakers.entry(agent_id.to_string()).or_default();
        match breaker.state {
            CircuitState::HalfOpen => {
                warn!(to_agent = %agent_id, "trial call failed, circuit re-opened");
                breaker.state = CircuitState::Open;
                breaker.opened_at = Instant::now();
            }
            _ => {
                breaker.failure_count += 1;
                if breaker.failure_count >= self.config.failure_threshold {
                    warn!(
                        to_agent = %agent_id,
                        failures = breaker.failure_count,
                        "failure threshold reached, circuit opened"
                    );
                    breaker.state = CircuitState::Open;
                    breaker.opened_at = Instant::now();
                }
            }
        }
        breaker.state
    }

    /// Returns a consumed HalfOpen trial without counting an outcome, for
    /// calls that never reached the agent.
    fn abort_trial(&self, agent_id: &str) {
        let mut breakers = self.breakers.lock();
        if let Some(breaker) = breakers.get_mut(agent_id) {
            if breaker.state == CircuitState::HalfOpen {
                breaker.state = CircuitState::Open;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::{AgentRegistry, InvocationTarget, TaskHandler};
    use async_trait::async_trait;
    use campus_core::{AgentCard, TaskType};
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    /// Handler that fails a fixed number of times before succeeding.
    struct FlakyHandler {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    impl FlakyHandler {
        fn new(failures_before_success: u32) -> Self {
            Self {
                failures_before_success,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TaskHandler for FlakyHandler {
        async fn handle(&self, mut task: Task) -> CampusResult<Task> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(CampusError::Http("503 Service Unavailable".into()))
            } else {
                task.complete("ok", None)?;
                Ok(task)
            }
        }
    }

    struct CountingFailure {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl TaskHandler for CountingFailure {
        async fn handle(&self, _task: Task) -> CampusResult<Task> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CampusError::Http("500 Internal Server Error".into()))
        }
    }

    struct BusinessFailure {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl TaskHandler for BusinessFailure {
        async fn handle(&self, _task: Task) -> CampusResult<Task> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CampusError::Handler("no such student".into()))
        }
    }

    fn fast_config() -> InvokerConfig {
        InvokerConfig {
            timeout_ms: 200,
            max_retries: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 4,
            failure_threshold: 3,
            cooldown_ms: 100,
        }
    }

    fn setup(handler: Arc<dyn TaskHandler>) -> (FaultTolerantInvoker, Arc<AgentRegistry>) {
        let registry = Arc::new(AgentRegistry::new());
        registry.register(
            AgentCard::new("agent", "Agent", None, vec![TaskType::GeneralQuery]),
            InvocationTarget::Local(handler),
        );
        let client = Arc::new(DispatchClient::new(registry.clone()));
        (FaultTolerantInvoker::new(client, fast_config()), registry)
    }

    fn task() -> Task {
        Task::new(
            "main_orchestrator",
            "agent",
            TaskType::GeneralQuery,
            "hi",
            Uuid::new_v4(),
        )
    }

    #[tokio::test]
    async fn retry_then_success() {
        let (invoker, _r) = setup(Arc::new(FlakyHandler::new(1)));
        let result = invoker.invoke(task(), &CancelToken::never()).await.unwrap();
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(invoker.circuit_state("agent"), CircuitState::Closed);
    }

    #[tokio::test]
    async fn retry_bound_is_one_plus_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let (invoker, _r) = setup(Arc::new(CountingFailure { calls: calls.clone() }));

        let result = invoker.invoke(task(), &CancelToken::never()).await.unwrap();
        assert!(matches!(result.status, TaskStatus::Failed { .. }));
        // max_retries = 2 => at most 3 calls.
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let TaskStatus::Failed { reason } = &result.status else {
            panic!("expected failed status");
        };
        assert!(reason.contains("3 attempts"), "reason: {reason}");
    }

    #[tokio::test]
    async fn handler_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let (invoker, _r) = setup(Arc::new(BusinessFailure { calls: calls.clone() }));

        let result = invoker.invoke(task(), &CancelToken::never()).await.unwrap();
        assert!(matches!(result.status, TaskStatus::Failed { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn breaker_opens_after_threshold_and_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let (invoker, _r) = setup(Arc::new(CountingFailure { calls: calls.clone() }));

        // One invoke makes 3 attempts; threshold is 3, so the circuit opens.
        let _ = invoker.invoke(task(), &CancelToken::never()).await.unwrap();
        assert_eq!(invoker.circuit_state("agent"), CircuitState::Open);

        let called_before = calls.load(Ordering::SeqCst);
        let err = invoker.invoke(task(), &CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, CampusError::CircuitOpen(_)));
        // No call reached the handler while open.
        assert_eq!(calls.load(Ordering::SeqCst), called_before);
    }

    #[tokio::test]
    async fn half_open_trial_closes_on_success() {
        let registry = Arc::new(AgentRegistry::new());
        // Fails enough to open the circuit, then recovers.
        registry.register(
            AgentCard::new("agent", "Agent", None, vec![TaskType::GeneralQuery]),
            InvocationTarget::Local(Arc::new(FlakyHandler::new(3))),
        );
        let client = Arc::new(DispatchClient::new(registry));
        let invoker = FaultTolerantInvoker::new(client, fast_config());

        let _ = invoker.invoke(task(), &CancelToken::never()).await.unwrap();
        assert_eq!(invoker.circuit_state("agent"), CircuitState::Open);

        // Wait out the cooldown, then the trial call succeeds and closes.
        tokio::time::sleep(Duration::from_millis(120)).await;
        let result = invoker.invoke(task(), &CancelToken::never()).await.unwrap();
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(invoker.circuit_state("agent"), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_trial_reopens_on_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let (invoker, _r) = setup(Arc::new(CountingFailure { calls: calls.clone() }));

        let _ = invoker.invoke(task(), &CancelToken::never()).await.unwrap();
        assert_eq!(invoker.circuit_state("agent"), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_millis(120)).await;
        let result = invoker.invoke(task(), &CancelToken::never()).await.unwrap();
        assert!(matches!(result.status, TaskStatus::Failed { .. }));
        assert_eq!(invoker.circuit_state("agent"), CircuitState::Open);
        // The failed trial re-opens the circuit; no retries follow it.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn circuit_opening_mid_invoke_halts_remaining_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = Arc::new(AgentRegistry::new());
        registry.register(
            AgentCard::new("agent", "Agent", None, vec![TaskType::GeneralQuery]),
            InvocationTarget::Local(Arc::new(CountingFailure { calls: calls.clone() })),
        );
        let client = Arc::new(DispatchClient::new(registry));
        let invoker = FaultTolerantInvoker::new(
            client,
            InvokerConfig {
                timeout_ms: 200,
                max_retries: 3,
                backoff_base_ms: 1,
                backoff_max_ms: 4,
                failure_threshold: 1,
                cooldown_ms: 60_000,
            },
        );

        let result = invoker.invoke(task(), &CancelToken::never()).await.unwrap();
        assert!(matches!(result.status, TaskStatus::Failed { .. }));
        assert_eq!(invoker.circuit_state("agent"), CircuitState::Open);
        // The first failure opens the circuit; the retry budget must not be
        // spent against an Open breaker.
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let TaskStatus::Failed { reason } = &result.status else {
            panic!("expected failed status");
        };
        assert!(reason.contains("1 attempts"), "reason: {reason}");
    }

    #[tokio::test]
    async fn terminal_task_is_rejected() {
        let calls = Arc::new(AtomicU32::new(0));
        let (invoker, _r) = setup(Arc::new(CountingFailure { calls: calls.clone() }));

        let mut done = task();
        done.complete("already handled", None).unwrap();

        let err = invoker.invoke(done, &CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, CampusError::TaskState(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_aborts_promptly() {
        struct SlowHandler;

        #[async_trait]
        impl TaskHandler for SlowHandler {
            async fn handle(&self, mut task: Task) -> CampusResult<Task> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                task.complete("too slow", None)?;
                Ok(task)
            }
        }

        let (invoker, _r) = setup(Arc::new(SlowHandler));
        let (handle, token) = campus_core::cancel_pair();

        let invocation = invoker.invoke(task(), &token);
        tokio::pin!(invocation);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(10)) => handle.cancel(),
            _ = &mut invocation => panic!("should not resolve before cancel"),
        }

        let result = tokio::time::timeout(Duration::from_millis(100), invocation)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result.status, TaskStatus::Cancelled { .. }));
    }

    #[tokio::test]
    async fn unknown_agent_surfaces_agent_not_found() {
        let registry = Arc::new(AgentRegistry::new());
        let client = Arc::new(DispatchClient::new(registry));
        let invoker = FaultTolerantInvoker::new(client, fast_config());

        let err = invoker
            .invoke(task(), &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, CampusError::AgentNotFound(_)));
    }
}
