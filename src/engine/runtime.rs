// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::engine::{Command, CoreEngine, CoreEvent, EngineEvent, Event, WaiterId};
use crate::errors::Result;
use crate::exec::Dispatcher;

/// Listener channels, shared with the reactor handle so `listen` works at any
/// time. The mutex is only held to snapshot or append, never across an await.
pub type ListenerSet = Arc<Mutex<Vec<mpsc::Sender<Event>>>>;

/// Drives the core state machine in response to queued [`EngineEvent`]s and
/// delegates task launching to a [`Dispatcher`].
///
/// This is a pure IO shell around [`CoreEngine`], which contains all the
/// engine semantics. The shell owns the channel ends: it keeps each waiter's
/// reply sender keyed by [`WaiterId`] (the core never sees a channel) and it
/// broadcasts events to listeners.
pub struct Runtime<D: Dispatcher> {
    core: CoreEngine,
    event_rx: mpsc::Receiver<EngineEvent>,
    /// Handed to task workers so they can post TaskStart/TaskExit.
    event_tx: mpsc::Sender<EngineEvent>,
    dispatcher: D,
    listeners: ListenerSet,
    replies: HashMap<WaiterId, oneshot::Sender<Result<()>>>,
    next_waiter: WaiterId,
}

impl<D: Dispatcher> fmt::Debug for Runtime<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("pending_replies", &self.replies.len())
            .finish_non_exhaustive()
    }
}

impl<D: Dispatcher> Runtime<D> {
    pub fn new(
        core: CoreEngine,
        event_rx: mpsc::Receiver<EngineEvent>,
        event_tx: mpsc::Sender<EngineEvent>,
        dispatcher: D,
        listeners: ListenerSet,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            dispatcher,
            listeners,
            replies: HashMap::new(),
            next_waiter: 0,
        }
    }

    /// Main event loop.
    ///
    /// For each dequeued event, in order:
    /// 1. feed it into the pure core
    /// 2. execute the commands the core returns (state-change broadcasts,
    ///    task dispatches, waiter replies)
    /// 3. broadcast the event itself to every listener
    ///
    /// Returns when a Close event is processed. Events still queued behind
    /// the Close are neither drained nor replied to.
    pub async fn run(mut self) -> Result<()> {
        info!("reactor runtime started");

        while let Some(event) = self.event_rx.recv().await {
            debug!(?event, "runtime received event");

            let (core_event, echo) = self.prepare(event);
            let step = self.core.step(core_event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("close processed; stopping runtime");
                break;
            }

            if let Some(echo) = echo {
                self.broadcast(echo).await;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    /// Strip the channel payloads off a queue event: register the waiter's
    /// reply sender, and build the listener-facing echo of the event.
    fn prepare(&mut self, event: EngineEvent) -> (CoreEvent, Option<Event>) {
        match event {
            EngineEvent::Submit { spec } => {
                let echo = Event::Submit {
                    id: spec.id.clone(),
                };
                (CoreEvent::Submit { spec }, Some(echo))
            }
            EngineEvent::Execute { ids } => (
                CoreEvent::Execute { ids: ids.clone() },
                Some(Event::Execute { ids }),
            ),
            EngineEvent::Wait { ids, reply } => {
                let waiter = self.next_waiter;
                self.next_waiter += 1;
                self.replies.insert(waiter, reply);
                (
                    CoreEvent::Wait {
                        waiter,
                        ids: ids.clone(),
                    },
                    Some(Event::Wait { ids }),
                )
            }
            EngineEvent::Close => (CoreEvent::Close, None),
            EngineEvent::TaskStart { id } => (
                CoreEvent::TaskStart { id: id.clone() },
                Some(Event::TaskStart { id }),
            ),
            EngineEvent::TaskExit { id, err } => (
                CoreEvent::TaskExit {
                    id: id.clone(),
                    err: err.clone(),
                },
                Some(Event::TaskExit { id, err }),
            ),
        }
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Notify(event) => {
                self.broadcast(event).await;
                Ok(())
            }
            Command::Dispatch { id, action } => {
                debug!(task = %id, "dispatching task");
                self.dispatcher
                    .dispatch(id, action, self.event_tx.clone())
                    .await
            }
            Command::Settle { waiter, result } => {
                match self.replies.remove(&waiter) {
                    Some(reply) => {
                        if reply.send(result).is_err() {
                            debug!(waiter, "wait caller gone before reply");
                        }
                    }
                    None => warn!(waiter, "settle for unknown waiter"),
                }
                Ok(())
            }
        }
    }

    /// Synchronous send to every listener, in registration order.
    ///
    /// A slow listener backpressures the whole engine so that observers see
    /// every event; a listener whose receiver was dropped is skipped.
    async fn broadcast(&self, event: Event) {
        let sinks: Vec<mpsc::Sender<Event>> = {
            let guard = self
                .listeners
                .lock()
                .expect("listener set mutex poisoned");
            guard.clone()
        };

        for sink in sinks {
            if sink.send(event.clone()).await.is_err() {
                debug!(?event, "listener receiver dropped; skipping");
            }
        }
    }
}
