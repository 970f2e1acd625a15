//! Messages exchanged between the pool's main side and its worker threads.
//!
//! main → worker: `Option<WorkerJob<In>>`, where `None` is the end-of-input
//! sentinel. worker → main: [`WorkerEvent<Out>`].

use crate::error::Result;

/// One item sent to a worker. `index` is the global dispatch sequence
/// number and the correlation key for the result.
#[derive(Debug)]
pub struct WorkerJob<T> {
    pub index: u64,
    pub payload: T,
}

#[derive(Debug)]
pub struct WorkerResult<T> {
    pub index: u64,
    pub worker_index: usize,
    pub outcome: Result<T>,
}

#[derive(Debug)]
pub enum WorkerEvent<T> {
    /// The worker was constructed and is waiting for jobs.
    Ready { worker_index: usize },
    Result(WorkerResult<T>),
    /// The worker saw the sentinel, finished its queue and returned.
    Exited { worker_index: usize },
    /// The worker could not start or panicked. Fatal to the pool.
    Failed { worker_index: usize, message: String },
}

/// Lifecycle of one worker as seen from the main side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Ready,
    Busy,
    Draining,
    Exited,
}
