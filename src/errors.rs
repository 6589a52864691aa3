// src/errors.rs

//! Crate-wide error types and composition helpers.

use std::sync::Arc;

use thiserror::Error;

/// Errors produced by the reactor.
///
/// Every variant is cheaply cloneable so a single failure can propagate to
/// several dependents and to several waiters at once.
#[derive(Error, Debug, Clone)]
pub enum ReactorError {
    /// A node declares dependencies that were never submitted.
    ///
    /// `ids` lists the missing dependency ids in declaration order.
    #[error("missing dependencies: {}", .ids.join(", "))]
    MissingDependencies { ids: Vec<String> },

    /// The walker found a dependency cycle.
    ///
    /// `path` lists the cycle members in recursion order.
    #[error("cycle detected: {}", .path.join(", "))]
    CycleDetected { path: Vec<String> },

    /// A wait target was never submitted.
    #[error("failed to find task {0}")]
    TaskNotFound(String),

    /// A task body failed. The original failure is preserved verbatim.
    #[error("{0}")]
    Task(Arc<anyhow::Error>),

    /// Several targets of a single wait each produced an error.
    #[error("{}", join_messages(.0))]
    Composite(Vec<ReactorError>),

    /// The reactor was closed before the operation could complete.
    #[error("reactor closed")]
    Closed,
}

impl ReactorError {
    /// Wrap a task body's failure.
    pub fn task(err: anyhow::Error) -> Self {
        ReactorError::Task(Arc::new(err))
    }

    /// Child errors of a composite; empty for every other variant.
    pub fn children(&self) -> &[ReactorError] {
        match self {
            ReactorError::Composite(errors) => errors,
            _ => &[],
        }
    }
}

/// Collapse a list of errors into at most one.
///
/// Zero errors mean success, a single error is returned verbatim, and two or
/// more are preserved as a [`ReactorError::Composite`].
pub(crate) fn compose_errors(mut errors: Vec<ReactorError>) -> Option<ReactorError> {
    match errors.len() {
        0 => None,
        1 => errors.pop(),
        _ => Some(ReactorError::Composite(errors)),
    }
}

fn join_messages(errors: &[ReactorError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, ReactorError>;
