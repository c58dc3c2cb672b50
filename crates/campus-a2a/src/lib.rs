//! Agent-to-agent plumbing: the registry of known agents, the dispatch
//! client that invokes them (in-process or over HTTP), the fault-tolerant
//! invoker that wraps every dispatch with timeout/retry/circuit-breaker
//! policy, and the HTTP server that exposes local handlers to remote peers.

/// Dispatch client for local and remote agents.
pub mod client;
/// Fault-tolerant invocation layer.
pub mod invoker;
/// Agent registry and handler trait.
pub mod registry;
/// HTTP task server.
pub mod server;

pub use client::DispatchClient;
pub use invoker::{CircuitState, FaultTolerantInvoker, InvokerConfig};
pub use registry::{AgentRegistry, InvocationTarget, TaskHandler};
pub use server::AgentServer;
