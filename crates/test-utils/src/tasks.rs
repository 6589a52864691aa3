// crates/test-utils/src/tasks.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use task_reactor::graph::node::TaskFuture;

/// An instrumented task body for tests.
///
/// Records how often it was invoked (panicking on a second invocation, which
/// the engine promises never to do) and returns a configured result.
pub struct TestTask {
    id: String,
    invocations: Arc<AtomicUsize>,
    fail_with: Option<String>,
}

impl TestTask {
    /// A task that succeeds.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            invocations: Arc::new(AtomicUsize::new(0)),
            fail_with: None,
        }
    }

    /// A task that fails with the given message.
    pub fn failing(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::new(id)
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn invoked(&self) -> bool {
        self.invocation_count() > 0
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// The submittable task body. Can be called before or after submission;
    /// the returned closure owns everything it needs.
    pub fn action(&self) -> impl FnOnce() -> TaskFuture + Send + 'static {
        let id = self.id.clone();
        let invocations = Arc::clone(&self.invocations);
        let fail_with = self.fail_with.clone();

        move || {
            let fut: TaskFuture = Box::pin(async move {
                let previous = invocations.fetch_add(1, Ordering::SeqCst);
                if previous > 0 {
                    panic!("task {id} executed more than once");
                }
                match fail_with {
                    Some(message) => Err(anyhow::anyhow!(message)),
                    None => Ok(()),
                }
            });
            fut
        }
    }
}
