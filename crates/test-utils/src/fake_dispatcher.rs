// crates/test-utils/src/fake_dispatcher.rs

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use task_reactor::engine::{EngineEvent, NodeId};
use task_reactor::errors::{ReactorError, Result};
use task_reactor::exec::Dispatcher;
use task_reactor::graph::node::TaskAction;

/// A fake dispatcher that:
/// - records which tasks were dispatched, in order
/// - immediately reports TaskStart and a successful TaskExit, without ever
///   running the task body.
pub struct FakeDispatcher {
    dispatched: Arc<Mutex<Vec<NodeId>>>,
}

impl FakeDispatcher {
    pub fn new(dispatched: Arc<Mutex<Vec<NodeId>>>) -> Self {
        Self { dispatched }
    }
}

impl Dispatcher for FakeDispatcher {
    fn dispatch(
        &mut self,
        id: NodeId,
        action: TaskAction,
        events: mpsc::Sender<EngineEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let dispatched = Arc::clone(&self.dispatched);

        Box::pin(async move {
            {
                let mut guard = dispatched.lock().unwrap();
                guard.push(id.clone());
            }

            // The body is dropped, never run.
            drop(action);

            events
                .send(EngineEvent::TaskStart { id: id.clone() })
                .await
                .map_err(|_| ReactorError::Closed)?;
            events
                .send(EngineEvent::TaskExit { id, err: None })
                .await
                .map_err(|_| ReactorError::Closed)?;
            Ok(())
        })
    }
}
