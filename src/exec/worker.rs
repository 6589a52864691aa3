// src/exec/worker.rs

//! Individual task worker.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::{EngineEvent, NodeId};
use crate::errors::ReactorError;
use crate::graph::node::TaskAction;

/// Run a single dispatched task body.
///
/// Protocol: enqueue TaskStart, await the body, enqueue TaskExit carrying the
/// result. The worker performs no other engine interaction. Sends are
/// best-effort: if the engine has already shut down the events are dropped
/// with a log line, but the body still runs to completion.
pub async fn run_action(id: NodeId, action: TaskAction, events: mpsc::Sender<EngineEvent>) {
    if events
        .send(EngineEvent::TaskStart { id: id.clone() })
        .await
        .is_err()
    {
        debug!(task = %id, "engine gone before task start could be reported");
    }

    debug!(task = %id, "task body starting");
    let result = action().await;

    let err = match result {
        Ok(()) => None,
        Err(e) => {
            debug!(task = %id, error = %e, "task body failed");
            Some(ReactorError::task(e))
        }
    };

    if events
        .send(EngineEvent::TaskExit {
            id: id.clone(),
            err,
        })
        .await
        .is_err()
    {
        warn!(task = %id, "engine gone before task exit could be reported");
    }
}
