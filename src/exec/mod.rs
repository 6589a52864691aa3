// src/exec/mod.rs

//! Task execution layer.
//!
//! This module is responsible for actually running dispatched task bodies and
//! reporting back to the engine via `EngineEvent`s.
//!
//! - [`backend`] provides the `Dispatcher` trait and the concrete
//!   `TokioDispatcher` the runtime uses in production, and which tests can
//!   replace with a fake implementation.
//! - [`worker`] drives a single task: report start, run the body, report exit.

pub mod backend;
pub mod worker;

pub use backend::{Dispatcher, TokioDispatcher};
