use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use campus_core::{CancelToken, Task};

/// Buffer between wave computation and the invoker.
///
/// Tasks are enqueued only once every precedent is terminal. Once dequeued a
/// task is owned by its invoker for the rest of its lifecycle; there is no
/// acknowledgement or redelivery. Implementations with a capacity bound or
/// ack semantics can be swapped in without touching the orchestrator or
/// invoker contracts.
#[async_trait]
pub trait ReadyQueue: Send + Sync {
    /// Makes a task available for dispatch.
    async fn enqueue(&self, task: Task);

    /// Blocks until a task is available or the request is cancelled.
    /// Returns `None` on cancellation.
    async fn dequeue(&self, cancel: &CancelToken) -> Option<Task>;

    /// Number of tasks currently waiting.
    async fn len(&self) -> usize;

    /// Whether the queue is empty.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Unbounded FIFO queue over a tokio mutex.
#[derive(Default)]
pub struct InMemoryReadyQueue {
    tasks: Mutex<VecDeque<Task>>,
    notify: Notify,
}

impl InMemoryReadyQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadyQueue for InMemoryReadyQueue {
    async fn enqueue(&self, task: Task) {
        self.tasks.lock().await.push_back(task);
        self.notify.notify_one();
    }

    async fn dequeue(&self, cancel: &CancelToken) -> Option<Task> {
        loop {
            if let Some(task) = self.tasks.lock().await.pop_front() {
                return Some(task);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }
}
