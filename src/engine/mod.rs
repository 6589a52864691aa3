// src/engine/mod.rs

//! The reactor engine.
//!
//! This module ties together:
//! - the event vocabulary (queue events, pure core events, broadcast events)
//! - the pure core state machine that owns all node state
//! - the waiter registry and settlement rules
//! - the async runtime shell that consumes the event queue
//!
//! The pure core lives in [`core`]; the async/IO shell is implemented in
//! [`runtime`].

use std::fmt;

use tokio::sync::oneshot;

use crate::errors::ReactorError;
use crate::graph::node::{NodeSpec, NodeState, TaskAction};

/// Canonical node id type used throughout the engine.
pub type NodeId = String;

/// Engine-assigned handle for a registered waiter.
pub type WaiterId = u64;

/// Capacity of the bounded event queue.
///
/// Large enough that task workers posting TaskStart/TaskExit never deadlock
/// against the loop; caller submissions block on a full queue, which is the
/// intended backpressure.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Events observable by external listeners, broadcast in loop order.
#[derive(Debug, Clone)]
pub enum Event {
    Submit {
        id: NodeId,
    },
    Execute {
        ids: Vec<NodeId>,
    },
    Wait {
        ids: Vec<NodeId>,
    },
    TaskStart {
        id: NodeId,
    },
    TaskExit {
        id: NodeId,
        err: Option<ReactorError>,
    },
    StateChange {
        id: NodeId,
        prev: NodeState,
        next: NodeState,
    },
}

/// Events flowing through the bounded queue into the runtime.
///
/// Carries the internal payloads (the node record with its task body, the
/// waiter reply channel) that are never part of the external observation.
pub enum EngineEvent {
    Submit {
        spec: NodeSpec,
    },
    Execute {
        ids: Vec<NodeId>,
    },
    Wait {
        ids: Vec<NodeId>,
        reply: oneshot::Sender<crate::errors::Result<()>>,
    },
    Close,
    TaskStart {
        id: NodeId,
    },
    TaskExit {
        id: NodeId,
        err: Option<ReactorError>,
    },
}

impl fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::Submit { spec } => {
                f.debug_struct("Submit").field("spec", spec).finish()
            }
            EngineEvent::Execute { ids } => {
                f.debug_struct("Execute").field("ids", ids).finish()
            }
            EngineEvent::Wait { ids, .. } => f
                .debug_struct("Wait")
                .field("ids", ids)
                .finish_non_exhaustive(),
            EngineEvent::Close => f.write_str("Close"),
            EngineEvent::TaskStart { id } => {
                f.debug_struct("TaskStart").field("id", id).finish()
            }
            EngineEvent::TaskExit { id, err } => f
                .debug_struct("TaskExit")
                .field("id", id)
                .field("err", err)
                .finish(),
        }
    }
}

/// Events fed into the pure core.
///
/// Identical to [`EngineEvent`] except that the waiter's reply channel stays
/// in the shell; the core tracks waiters by [`WaiterId`] only, so it remains
/// free of channel types and fully unit-testable.
pub enum CoreEvent {
    Submit {
        spec: NodeSpec,
    },
    Execute {
        ids: Vec<NodeId>,
    },
    Wait {
        waiter: WaiterId,
        ids: Vec<NodeId>,
    },
    Close,
    TaskStart {
        id: NodeId,
    },
    TaskExit {
        id: NodeId,
        err: Option<ReactorError>,
    },
}

impl fmt::Debug for CoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreEvent::Submit { spec } => {
                f.debug_struct("Submit").field("spec", spec).finish()
            }
            CoreEvent::Execute { ids } => {
                f.debug_struct("Execute").field("ids", ids).finish()
            }
            CoreEvent::Wait { waiter, ids } => f
                .debug_struct("Wait")
                .field("waiter", waiter)
                .field("ids", ids)
                .finish(),
            CoreEvent::Close => f.write_str("Close"),
            CoreEvent::TaskStart { id } => {
                f.debug_struct("TaskStart").field("id", id).finish()
            }
            CoreEvent::TaskExit { id, err } => f
                .debug_struct("TaskExit")
                .field("id", id)
                .field("err", err)
                .finish(),
        }
    }
}

/// Command produced by the pure core, to be executed by the outer IO shell.
pub enum Command {
    /// Broadcast this event to every listener.
    Notify(Event),
    /// Hand this node's task to the dispatcher.
    Dispatch { id: NodeId, action: TaskAction },
    /// Reply to a registered waiter; written exactly once per waiter.
    Settle {
        waiter: WaiterId,
        result: crate::errors::Result<()>,
    },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Notify(event) => f.debug_tuple("Notify").field(event).finish(),
            Command::Dispatch { id, .. } => f
                .debug_struct("Dispatch")
                .field("id", id)
                .finish_non_exhaustive(),
            Command::Settle { waiter, result } => f
                .debug_struct("Settle")
                .field("waiter", waiter)
                .field("result", result)
                .finish(),
        }
    }
}

/// Decision returned by the core after handling a single [`CoreEvent`].
#[derive(Debug)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<Command>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

pub mod core;
pub mod runtime;
pub mod waiters;

pub use self::core::CoreEngine;
pub use self::runtime::Runtime;
pub use self::waiters::Waiter;
