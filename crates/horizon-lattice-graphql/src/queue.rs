//! Named request queues.
//!
//! Each queue name serializes its submissions with concurrency 1, in the
//! order they were submitted. Distinct names run independently of each
//! other, and calls without a queue name never wait on any queue.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Resolves once a queued job and every job ahead of it are finished.
type Completion = Shared<BoxFuture<'static, ()>>;

/// Registry of named queues, created lazily per name and never torn down.
///
/// Owned by a dispatcher; clones share the same queues.
#[derive(Clone, Default)]
pub struct QueueRegistry {
    tails: Arc<Mutex<HashMap<String, Completion>>>,
}

impl QueueRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next slot in queue `name`.
    ///
    /// The slot's position is fixed by this call, not by when the returned
    /// ticket is first awaited.
    pub fn enqueue(&self, name: &str) -> QueueTicket {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let mut tails = self.tails.lock();
        let predecessor = tails.get(name).cloned();

        let chained = predecessor.clone();
        let completion = async move {
            if let Some(previous) = chained {
                previous.await;
            }
            // A dropped ticket counts as finished.
            let _ = done_rx.await;
        }
        .boxed()
        .shared();
        tails.insert(name.to_string(), completion);

        tracing::trace!(target: "horizon_lattice_graphql::queue", queue = name, "enqueued");

        QueueTicket {
            name: name.to_string(),
            predecessor,
            done: done_tx,
        }
    }

    /// Names of every queue used so far.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tails.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRegistry")
            .field("queues", &self.queue_names())
            .finish()
    }
}

/// A reserved slot in a named queue.
#[must_use = "a ticket holds its queue until it is run or dropped"]
pub struct QueueTicket {
    name: String,
    predecessor: Option<Completion>,
    done: oneshot::Sender<()>,
}

impl QueueTicket {
    /// Name of the queue this ticket belongs to.
    pub fn queue_name(&self) -> &str {
        &self.name
    }

    /// Wait for every earlier job in the queue, then run `job`.
    pub async fn run<F: Future>(self, job: F) -> F::Output {
        if let Some(previous) = self.predecessor {
            previous.await;
        }
        tracing::trace!(target: "horizon_lattice_graphql::queue", queue = %self.name, "running");
        let output = job.await;
        let _ = self.done.send(());
        output
    }
}
