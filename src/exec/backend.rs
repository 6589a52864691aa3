// src/exec/backend.rs

//! Pluggable dispatcher abstraction.
//!
//! The runtime talks to a `Dispatcher` instead of spawning workers directly.
//! This makes it easy to swap in a fake dispatcher in tests while keeping the
//! production implementation in [`worker`](crate::exec::worker).

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::engine::{EngineEvent, NodeId};
use crate::errors::Result;
use crate::exec::worker::run_action;
use crate::graph::node::TaskAction;

/// Trait abstracting how dispatched task bodies are executed.
///
/// Production code uses [`TokioDispatcher`]; tests can provide their own
/// implementation that records dispatches and completes them synthetically.
pub trait Dispatcher: Send + Sync + 'static {
    /// Launch the given task body.
    ///
    /// The implementation must arrange for a TaskStart and a TaskExit event
    /// to reach the engine through `events`, and must not interact with the
    /// engine in any other way.
    fn dispatch(
        &mut self,
        id: NodeId,
        action: TaskAction,
        events: mpsc::Sender<EngineEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

impl Dispatcher for Box<dyn Dispatcher> {
    fn dispatch(
        &mut self,
        id: NodeId,
        action: TaskAction,
        events: mpsc::Sender<EngineEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        (**self).dispatch(id, action, events)
    }
}

/// Production dispatcher: one spawned worker per dispatched node.
///
/// Workers run concurrently with the event loop and communicate with it
/// solely by enqueuing TaskStart/TaskExit.
#[derive(Debug, Default)]
pub struct TokioDispatcher;

impl Dispatcher for TokioDispatcher {
    fn dispatch(
        &mut self,
        id: NodeId,
        action: TaskAction,
        events: mpsc::Sender<EngineEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        tokio::spawn(run_action(id, action, events));
        Box::pin(async { Ok(()) })
    }
}
