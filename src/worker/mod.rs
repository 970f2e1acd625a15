//! Fan-out of a stage across a fixed pool of OS threads.
//!
//! Each worker thread owns its own current-thread Tokio runtime and its own
//! [`Worker`] instance, built on that thread by the pool's factory. Threads
//! share nothing with the pipeline: items and results move through
//! channels. Output order is not preserved.

pub mod pool;
pub mod protocol;

pub use pool::WorkerPool;
pub use protocol::{WorkerEvent, WorkerJob, WorkerResult, WorkerState};

use async_trait::async_trait;

use crate::error::Result;

/// Passed to the worker factory on the worker's own thread.
#[derive(Debug, Clone)]
pub struct WorkerOptions<D> {
    pub worker_index: usize,
    pub pool_name: &'static str,
    pub data: D,
}

/// User code run on a worker thread. One item at a time per worker.
///
/// The futures need not be `Send`: they never leave the worker's thread.
#[async_trait(?Send)]
pub trait Worker: 'static {
    type In: Send + 'static;
    type Out: Send + 'static;

    async fn process(&mut self, payload: Self::In, index: u64) -> Result<Self::Out>;
}
