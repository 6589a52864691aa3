// src/reactor.rs

//! Public reactor handle.
//!
//! [`Reactor`] is a cheap, cloneable front end over the engine: every method
//! enqueues an event onto the bounded queue consumed by the runtime loop.
//! Submissions may therefore suspend when the queue is full; that is the
//! intended backpressure.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::engine::runtime::ListenerSet;
use crate::engine::{
    CoreEngine, EngineEvent, Event, NodeId, Runtime, EVENT_QUEUE_CAPACITY,
};
use crate::errors::{ReactorError, Result};
use crate::exec::{Dispatcher, TokioDispatcher};
use crate::graph::node::NodeSpec;

/// Handle to a task reactor.
///
/// Clones share the same engine. All methods must be used from within a Tokio
/// runtime.
#[derive(Clone)]
pub struct Reactor {
    shared: Arc<Shared>,
}

struct Shared {
    event_tx: mpsc::Sender<EngineEvent>,
    listeners: ListenerSet,
    lifecycle: Mutex<Lifecycle>,
}

/// Guarded lifecycle state: whether the loop is running, plus the parts the
/// loop consumes when it starts.
struct Lifecycle {
    started: bool,
    boot: Option<Boot>,
}

struct Boot {
    event_rx: mpsc::Receiver<EngineEvent>,
    dispatcher: Box<dyn Dispatcher>,
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor").finish_non_exhaustive()
    }
}

impl Reactor {
    /// Create a reactor with default settings and start its event loop.
    pub fn new() -> Self {
        let reactor = Self::builder().build();
        reactor.start();
        reactor
    }

    /// Configure queue capacity or the dispatcher before building.
    pub fn builder() -> ReactorBuilder {
        ReactorBuilder::new()
    }

    /// Ensure the event loop is running. Idempotent.
    ///
    /// Once the loop has exited (after [`close`](Self::close)), `start` does
    /// not resurrect it.
    pub fn start(&self) {
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.started {
            debug!("reactor already started");
            return;
        }
        let Some(boot) = lifecycle.boot.take() else {
            warn!("reactor event loop already finished; start ignored");
            return;
        };
        lifecycle.started = true;
        drop(lifecycle);

        let runtime = Runtime::new(
            CoreEngine::new(),
            boot.event_rx,
            self.shared.event_tx.clone(),
            boot.dispatcher,
            Arc::clone(&self.shared.listeners),
        );

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let Err(err) = runtime.run().await {
                error!(error = %err, "reactor runtime terminated with error");
            }
            let mut lifecycle = shared
                .lifecycle
                .lock()
                .expect("reactor lifecycle mutex poisoned");
            lifecycle.started = false;
        });
    }

    /// Submit a node: an id, a fallible task body, and the ids it depends on.
    ///
    /// The dependency list is recorded verbatim. Re-submitting an id
    /// overwrites the previous record, even one that already ran.
    pub async fn submit<F, Fut>(&self, id: impl Into<NodeId>, action: F, dependencies: &[&str]) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let spec = NodeSpec::new(id, action, dependencies.iter().copied());
        self.send(EngineEvent::Submit { spec }).await
    }

    /// Add the given ids to the watch set, making them (and their reachable
    /// dependencies) eligible to run.
    pub async fn execute(&self, ids: &[&str]) -> Result<()> {
        self.send(EngineEvent::Execute {
            ids: to_node_ids(ids),
        })
        .await
    }

    /// Suspend until every given id has completed or been rendered
    /// un-runnable by missing or failed dependencies.
    ///
    /// Returns `Ok(())` when all targets are done; otherwise the composed
    /// error. Exactly one reply is delivered per wait.
    pub async fn wait(&self, ids: &[&str]) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineEvent::Wait {
            ids: to_node_ids(ids),
            reply: reply_tx,
        })
        .await?;

        match reply_rx.await {
            Ok(result) => result,
            // The loop dropped the reply without settling; it is gone.
            Err(_) => Err(ReactorError::Closed),
        }
    }

    /// [`execute`](Self::execute) followed by [`wait`](Self::wait) on the
    /// same ids. Events are strictly ordered, so the Execute is always
    /// processed first.
    pub async fn execute_and_wait(&self, ids: &[&str]) -> Result<()> {
        self.execute(ids).await?;
        self.wait(ids).await
    }

    /// Register a listener. Every event the loop processes is sent to every
    /// listener, in registration order; a slow listener backpressures the
    /// engine. Intended to be called before `start`, tolerated at any time.
    pub fn listen(&self, sink: mpsc::Sender<Event>) {
        let mut listeners = self
            .shared
            .listeners
            .lock()
            .expect("listener set mutex poisoned");
        listeners.push(sink);
    }

    /// Enqueue a Close event. The loop settles pending waiters with
    /// [`ReactorError::Closed`] and stops; in-flight tasks are not
    /// interrupted.
    pub async fn close(&self) {
        if self.send(EngineEvent::Close).await.is_err() {
            debug!("reactor already closed");
        }
    }

    async fn send(&self, event: EngineEvent) -> Result<()> {
        self.shared
            .event_tx
            .send(event)
            .await
            .map_err(|_| ReactorError::Closed)
    }

    fn lock_lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.shared
            .lifecycle
            .lock()
            .expect("reactor lifecycle mutex poisoned")
    }
}

fn to_node_ids(ids: &[&str]) -> Vec<NodeId> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Builder for [`Reactor`].
pub struct ReactorBuilder {
    queue_capacity: usize,
    dispatcher: Box<dyn Dispatcher>,
}

impl ReactorBuilder {
    pub fn new() -> Self {
        Self {
            queue_capacity: EVENT_QUEUE_CAPACITY,
            dispatcher: Box::new(TokioDispatcher),
        }
    }

    /// Capacity of the bounded event queue. Clamped to at least 1.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Replace the production dispatcher, e.g. with a fake in tests.
    pub fn dispatcher(mut self, dispatcher: impl Dispatcher) -> Self {
        self.dispatcher = Box::new(dispatcher);
        self
    }

    /// Build an unstarted reactor; call [`Reactor::start`] to run its loop.
    pub fn build(self) -> Reactor {
        let (event_tx, event_rx) = mpsc::channel(self.queue_capacity);

        Reactor {
            shared: Arc::new(Shared {
                event_tx,
                listeners: Arc::new(Mutex::new(Vec::new())),
                lifecycle: Mutex::new(Lifecycle {
                    started: false,
                    boot: Some(Boot {
                        event_rx,
                        dispatcher: self.dispatcher,
                    }),
                }),
            }),
        }
    }
}

impl Default for ReactorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
