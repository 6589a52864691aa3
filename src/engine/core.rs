// src/engine/core.rs

//! Pure core state machine.
//!
//! This module contains a synchronous, deterministic core that consumes
//! [`CoreEvent`]s and produces:
//! - updated node state
//! - an ordered list of [`Command`]s describing what the IO shell should do
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from the bounded queue
//! - handing dispatched tasks to the dispatcher
//! - replying to waiters and broadcasting to listeners
//!
//! The core holds no channels and performs no IO, so it can be exhaustively
//! unit tested without Tokio.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::engine::waiters::{self, Waiter};
use crate::engine::{Command, CoreEvent, CoreStep, NodeId};
use crate::graph::node::{set_node_state, Node, NodeSpec, NodeState};
use crate::graph::Walker;

/// Pure engine state: the node map, the watch set, and the waiter registry.
///
/// All mutation happens through [`CoreEngine::step`], one event at a time.
#[derive(Debug, Default)]
pub struct CoreEngine {
    nodes: HashMap<NodeId, Node>,
    /// Ids targeted by some Execute, in registration order. Grows
    /// monotonically and seeds every walker pass.
    watching: Vec<NodeId>,
    waiting: Vec<Waiter>,
}

impl CoreEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a node, if submitted.
    pub fn node_state(&self, id: &str) -> Option<NodeState> {
        self.nodes.get(id).map(|n| n.state)
    }

    /// Number of waiters not yet settled.
    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Handle a single event: apply its direct effect, re-run the walker over
    /// every watched node, then settle any satisfied waiters.
    ///
    /// The returned commands are ordered exactly as the state was assigned.
    pub fn step(&mut self, event: CoreEvent) -> CoreStep {
        let mut commands = Vec::new();

        match event {
            CoreEvent::Submit { spec } => self.handle_submit(spec),
            CoreEvent::Execute { ids } => self.handle_execute(ids),
            CoreEvent::Wait { waiter, ids } => {
                debug!(waiter, ?ids, "waiter registered");
                self.waiting.push(Waiter { id: waiter, ids });
            }
            CoreEvent::TaskStart { id } => {
                self.set_state(&id, NodeState::Running, &mut commands);
            }
            CoreEvent::TaskExit { id, err } => match err {
                None => self.set_state(&id, NodeState::Done, &mut commands),
                Some(err) => {
                    self.set_state(&id, NodeState::Errored, &mut commands);
                    if let Some(node) = self.nodes.get_mut(&id) {
                        node.err = Some(err);
                    }
                }
            },
            CoreEvent::Close => {
                debug!(waiters = self.waiting.len(), "close; draining waiters");
                waiters::drain_on_close(&mut self.waiting, &mut commands);
                return CoreStep {
                    commands,
                    keep_running: false,
                };
            }
        }

        Walker::run(&mut self.nodes, &self.watching, &mut commands);
        waiters::settle(&self.nodes, &mut self.waiting, &mut commands);

        CoreStep {
            commands,
            keep_running: true,
        }
    }

    fn handle_submit(&mut self, spec: NodeSpec) {
        if let Some(existing) = self.nodes.get(&spec.id) {
            // Overwrite is kept for compatibility; it resets the record, so a
            // node that already ran may run again under the new record.
            if existing.state == NodeState::Submitted {
                debug!(task = %spec.id, "resubmission overwrites node record");
            } else {
                warn!(
                    task = %spec.id,
                    state = %existing.state,
                    "resubmission overwrites a node that already left Submitted"
                );
            }
        }

        debug!(task = %spec.id, deps = ?spec.dependencies, "node submitted");
        self.nodes.insert(spec.id.clone(), Node::from_spec(spec));
    }

    fn handle_execute(&mut self, ids: Vec<NodeId>) {
        for id in ids {
            if !self.watching.contains(&id) {
                debug!(task = %id, "watching node");
                self.watching.push(id);
            }
        }
    }

    fn set_state(&mut self, id: &str, next: NodeState, commands: &mut Vec<Command>) {
        if let Some(event) = set_node_state(&mut self.nodes, id, next) {
            commands.push(Command::Notify(event));
        }
    }
}
