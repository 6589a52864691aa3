// src/graph/node.rs

//! Node records and the per-node state machine.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use crate::engine::{Event, NodeId};
use crate::errors::ReactorError;

/// Future produced by a task body.
pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// An opaque, fallible task body. Invoked at most once per node record.
pub type TaskAction = Box<dyn FnOnce() -> TaskFuture + Send + Sync>;

/// Lifecycle state of a node.
///
/// Transitions are driven exclusively by the event loop. Once a node reaches
/// `Done`, `Errored` or `Blocked` it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Submitted and not yet evaluated, or re-evaluated each walker pass.
    Submitted,
    /// Elected to run; its task has been handed to the dispatcher.
    Dispatched,
    /// The task worker has reported start.
    Running,
    /// The task finished successfully.
    Done,
    /// Some declared dependency has not been submitted yet. Not terminal: a
    /// later submit of the missing id lifts the node back into evaluation.
    MissingDependency,
    /// The task itself failed.
    Errored,
    /// A transitive dependency failed or is part of a cycle.
    Blocked,
}

impl NodeState {
    /// Whether the walker should (re-)examine a node in this state.
    pub fn needs_evaluation(self) -> bool {
        matches!(self, NodeState::Submitted | NodeState::MissingDependency)
    }

    /// Whether a dependency in this state propagates failure to its parent.
    pub fn is_blocking(self) -> bool {
        matches!(self, NodeState::Errored | NodeState::Blocked)
    }

    /// Whether this state can never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Done | NodeState::Errored | NodeState::Blocked
        )
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Submitted => "Submitted",
            NodeState::Dispatched => "Dispatched",
            NodeState::Running => "Running",
            NodeState::Done => "Done",
            NodeState::MissingDependency => "MissingDependency",
            NodeState::Errored => "Errored",
            NodeState::Blocked => "Blocked",
        };
        f.write_str(name)
    }
}

/// A submitted node record, as handed to the engine by a caller.
///
/// The dependency list is recorded verbatim: duplicates and self-references
/// are neither rejected nor deduplicated here.
pub struct NodeSpec {
    pub id: NodeId,
    pub action: TaskAction,
    pub dependencies: Vec<NodeId>,
}

impl NodeSpec {
    pub fn new<F, Fut, I, S>(id: impl Into<NodeId>, action: F, dependencies: I) -> Self
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        Self {
            id: id.into(),
            action: Box::new(move || {
                let fut: TaskFuture = Box::pin(action());
                fut
            }),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Engine-side node record.
pub struct Node {
    pub id: NodeId,
    pub state: NodeState,
    pub err: Option<ReactorError>,
    /// Taken out exactly once, when the node is dispatched.
    pub action: Option<TaskAction>,
    pub dependencies: Vec<NodeId>,
}

impl Node {
    pub fn from_spec(spec: NodeSpec) -> Self {
        Self {
            id: spec.id,
            state: NodeState::Submitted,
            err: None,
            action: Some(spec.action),
            dependencies: spec.dependencies,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("err", &self.err)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Assign a new state to a node and produce the matching broadcast event.
///
/// Returns `None` (and logs) if the id is unknown; no record is created
/// implicitly.
pub(crate) fn set_node_state(
    nodes: &mut HashMap<NodeId, Node>,
    id: &str,
    next: NodeState,
) -> Option<Event> {
    let Some(node) = nodes.get_mut(id) else {
        warn!(task = %id, state = %next, "state change for unknown node; ignoring");
        return None;
    };

    let prev = node.state;
    node.state = next;
    debug!(task = %id, prev = %prev, next = %next, "node state changed");

    Some(Event::StateChange {
        id: id.to_string(),
        prev,
        next,
    })
}
