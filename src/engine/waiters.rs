// src/engine/waiters.rs

//! Waiter registry and settlement rules.
//!
//! A waiter is a caller suspended on `wait`. After every event the engine
//! computes a verdict for each unsettled waiter against its target ids; a
//! settled waiter receives exactly one reply and is dropped from the
//! registry.

use std::collections::HashMap;

use tracing::debug;

use crate::engine::{Command, NodeId, WaiterId};
use crate::errors::{compose_errors, ReactorError};
use crate::graph::node::{Node, NodeState};

/// A registered, not-yet-settled waiter.
///
/// The reply channel itself lives in the IO shell, keyed by `id`; the core
/// only decides *when* a waiter settles and with what result.
#[derive(Debug, Clone)]
pub struct Waiter {
    pub id: WaiterId,
    pub ids: Vec<NodeId>,
}

/// Settle every waiter whose targets have all reached a reportable state.
///
/// Settled waiters are removed from `waiting` and produce a
/// [`Command::Settle`]; the rest are retained for a later pass.
pub(crate) fn settle(
    nodes: &HashMap<NodeId, Node>,
    waiting: &mut Vec<Waiter>,
    commands: &mut Vec<Command>,
) {
    let mut retained = Vec::with_capacity(waiting.len());

    for waiter in waiting.drain(..) {
        match verdict(nodes, &waiter) {
            Some(result) => {
                debug!(waiter = waiter.id, ok = result.is_ok(), "waiter settled");
                commands.push(Command::Settle {
                    waiter: waiter.id,
                    result,
                });
            }
            None => retained.push(waiter),
        }
    }

    *waiting = retained;
}

/// Settle every remaining waiter with [`ReactorError::Closed`].
pub(crate) fn drain_on_close(waiting: &mut Vec<Waiter>, commands: &mut Vec<Command>) {
    for waiter in waiting.drain(..) {
        debug!(waiter = waiter.id, "settling waiter on close");
        commands.push(Command::Settle {
            waiter: waiter.id,
            result: Err(ReactorError::Closed),
        });
    }
}

/// Compute a waiter's verdict, or `None` if any target is still in flight.
fn verdict(nodes: &HashMap<NodeId, Node>, waiter: &Waiter) -> Option<crate::errors::Result<()>> {
    let mut errors = Vec::new();

    for id in &waiter.ids {
        let Some(node) = nodes.get(id) else {
            errors.push(ReactorError::TaskNotFound(id.clone()));
            continue;
        };

        match node.state {
            NodeState::MissingDependency => {
                let missing: Vec<NodeId> = node
                    .dependencies
                    .iter()
                    .filter(|dep| !nodes.contains_key(*dep))
                    .cloned()
                    .collect();
                errors.push(ReactorError::MissingDependencies { ids: missing });
            }
            NodeState::Errored | NodeState::Blocked => {
                if let Some(err) = &node.err {
                    errors.push(err.clone());
                }
            }
            NodeState::Done => {}
            // Still in flight; this waiter is not settled yet.
            NodeState::Submitted | NodeState::Dispatched | NodeState::Running => return None,
        }
    }

    Some(match compose_errors(errors) {
        Some(err) => Err(err),
        None => Ok(()),
    })
}
