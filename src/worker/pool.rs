use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};

use crate::error::{Error, Result};
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{forward, Flow, Pipe};
use crate::worker::protocol::{WorkerEvent, WorkerJob, WorkerResult, WorkerState};
use crate::worker::{Worker, WorkerOptions};

type Factory<W, D> = dyn Fn(WorkerOptions<D>) -> Result<W> + Send + Sync;

/// Runs a [`Worker`] on `pool_size` dedicated threads.
///
/// Items are dispatched round-robin by their input index, so worker
/// `index % pool_size` always gets item `index`. At most `concurrency`
/// items are outstanding at once (defaults to the pool size); the stage
/// stops pulling input until a result comes back.
///
/// A failed item is logged and dropped. A worker that cannot be built or
/// panics fails the whole stage with [`Error::WorkerFailed`].
pub struct WorkerPool<W, D = ()>
where
    W: Worker,
{
    name: &'static str,
    pool_size: usize,
    concurrency: Option<usize>,
    data: D,
    factory: Arc<Factory<W, D>>,
}

impl<W, D> WorkerPool<W, D>
where
    W: Worker,
    D: Clone + Send + 'static,
{
    /// `factory` runs once per worker, on the worker's own thread.
    pub fn new<F>(name: &'static str, data: D, factory: F) -> Self
    where
        F: Fn(WorkerOptions<D>) -> Result<W> + Send + Sync + 'static,
    {
        Self {
            name,
            pool_size: default_pool_size(),
            concurrency: None,
            data,
            factory: Arc::new(factory),
        }
    }

    pub fn pool_size(mut self, n: usize) -> Self {
        self.pool_size = n.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n.max(1));
        self
    }

    fn spawn_worker(
        &self,
        worker_index: usize,
        events: UnboundedSender<WorkerEvent<W::Out>>,
    ) -> Result<WorkerSlot<W::In>> {
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded();
        let options = WorkerOptions {
            worker_index,
            pool_name: self.name,
            data: self.data.clone(),
        };
        let factory = Arc::clone(&self.factory);

        let thread = std::thread::Builder::new()
            .name(format!("{}-{}", self.name, worker_index))
            .spawn(move || run_worker(options, factory, jobs_rx, events))?;

        Ok(WorkerSlot {
            jobs: jobs_tx,
            thread,
            state: WorkerState::Starting,
            in_flight: 0,
        })
    }
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

struct WorkerSlot<T> {
    jobs: crossbeam_channel::Sender<Option<WorkerJob<T>>>,
    thread: JoinHandle<()>,
    state: WorkerState,
    in_flight: usize,
}

fn run_worker<W, D>(
    options: WorkerOptions<D>,
    factory: Arc<Factory<W, D>>,
    jobs: crossbeam_channel::Receiver<Option<WorkerJob<W::In>>>,
    events: UnboundedSender<WorkerEvent<W::Out>>,
) where
    W: Worker,
{
    let worker_index = options.worker_index;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<()> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let mut worker = factory(options)?;
        if events.send(WorkerEvent::Ready { worker_index }).is_err() {
            return Ok(());
        }

        // A closed job channel means the pool is gone; treat it as the sentinel.
        while let Ok(Some(job)) = jobs.recv() {
            let outcome = rt.block_on(worker.process(job.payload, job.index));
            let result = WorkerResult {
                index: job.index,
                worker_index,
                outcome,
            };
            if events.send(WorkerEvent::Result(result)).is_err() {
                break;
            }
        }
        Ok(())
    }));

    let last = match outcome {
        Ok(Ok(())) => WorkerEvent::Exited { worker_index },
        Ok(Err(e)) => WorkerEvent::Failed {
            worker_index,
            message: e.to_string(),
        },
        Err(payload) => WorkerEvent::Failed {
            worker_index,
            message: panic_message(payload.as_ref()),
        },
    };
    let _ = events.send(last);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[async_trait]
impl<W, D> Pipe<W::In, W::Out> for WorkerPool<W, D>
where
    W: Worker,
    D: Clone + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        self.name
    }

    async fn process(
        &self,
        mut input: Receiver<W::In>,
        output: Sender<W::Out>,
        ctx: StageContext,
    ) -> Result<()> {
        let stage = self.name;
        let pool_size = self.pool_size;
        let concurrency = ctx.concurrency_for(stage, self.concurrency.unwrap_or(pool_size));

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut slots = Vec::with_capacity(pool_size);
        for worker_index in 0..pool_size {
            match self.spawn_worker(worker_index, events_tx.clone()) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    shutdown(stage, slots).await;
                    return Err(e);
                }
            }
        }
        // Only worker threads hold senders from here on.
        drop(events_tx);
        tracing::debug!(event = "flowline.worker.spawned", stage = stage, pool_size = pool_size, concurrency = concurrency, "flowline.worker.spawned");

        let mut pending: HashMap<u64, usize> = HashMap::new();
        let mut next_index = 0u64;
        let mut input_done = false;
        let mut exited = 0usize;
        let mut emitted = 0u64;
        let mut dropped = 0u64;

        let result = loop {
            if exited == pool_size {
                break Ok(());
            }

            tokio::select! {
                biased;

                _ = ctx.cancel().cancelled() => {
                    tracing::debug!(event = "flowline.cancelled", stage = stage, where_ = "recv", "flowline.cancelled");
                    break Ok(());
                }
                ev = events.recv() => {
                    let Some(ev) = ev else {
                        break Err(Error::stage(stage, "all workers went away without exiting"));
                    };
                    match ev {
                        WorkerEvent::Ready { worker_index } => {
                            let slot = &mut slots[worker_index];
                            if slot.state == WorkerState::Starting {
                                slot.state = if slot.in_flight > 0 { WorkerState::Busy } else { WorkerState::Ready };
                            }
                            tracing::trace!(event = "flowline.worker.ready", stage = stage, worker = worker_index, "flowline.worker.ready");
                        }
                        WorkerEvent::Result(WorkerResult { index, worker_index, outcome }) => {
                            if pending.remove(&index).is_none() {
                                tracing::warn!(event = "flowline.worker.unknown_result", stage = stage, worker = worker_index, index = index, "flowline.worker.unknown_result");
                                continue;
                            }
                            let slot = &mut slots[worker_index];
                            slot.in_flight = slot.in_flight.saturating_sub(1);
                            if slot.in_flight == 0 && slot.state == WorkerState::Busy {
                                slot.state = WorkerState::Ready;
                            }
                            match outcome {
                                Ok(out) => {
                                    emitted += 1;
                                    if forward(stage, &output, out).await == Flow::Stop {
                                        break Ok(());
                                    }
                                }
                                Err(error) => {
                                    dropped += 1;
                                    tracing::warn!(
                                        event = "flowline.worker.item_failed",
                                        stage = stage,
                                        worker = worker_index,
                                        index = index,
                                        error = %error,
                                        "flowline.worker.item_failed"
                                    );
                                }
                            }
                        }
                        WorkerEvent::Exited { worker_index } => {
                            slots[worker_index].state = WorkerState::Exited;
                            exited += 1;
                            tracing::trace!(event = "flowline.worker.exited", stage = stage, worker = worker_index, "flowline.worker.exited");
                        }
                        WorkerEvent::Failed { worker_index, message } => {
                            slots[worker_index].state = WorkerState::Exited;
                            tracing::error!(event = "flowline.worker.failed", stage = stage, worker = worker_index, error = %message, "flowline.worker.failed");
                            break Err(Error::WorkerFailed { worker_index, message });
                        }
                    }
                }
                msg = input.recv(), if !input_done && pending.len() < concurrency => {
                    match msg {
                        Some(payload) => {
                            let index = next_index;
                            next_index += 1;
                            let worker_index = (index % pool_size as u64) as usize;
                            let slot = &mut slots[worker_index];
                            if slot.jobs.send(Some(WorkerJob { index, payload })).is_err() {
                                break Err(terminal_failure(worker_index, &mut events).await);
                            }
                            slot.in_flight += 1;
                            if slot.state == WorkerState::Ready {
                                slot.state = WorkerState::Busy;
                            }
                            pending.insert(index, worker_index);
                        }
                        None => {
                            input_done = true;
                            // Workers finish their queue before they see the sentinel.
                            for slot in slots.iter_mut() {
                                let _ = slot.jobs.send(None);
                                if slot.state != WorkerState::Exited {
                                    slot.state = WorkerState::Draining;
                                }
                            }
                            tracing::debug!(event = "flowline.worker.draining", stage = stage, dispatched = next_index, "flowline.worker.draining");
                        }
                    }
                }
            }
        };

        tracing::debug!(
            event = "flowline.worker.done",
            stage = stage,
            dispatched = next_index,
            emitted = emitted,
            dropped = dropped,
            "flowline.worker.done"
        );
        drop(events);
        shutdown(stage, slots).await;
        result
    }
}

/// A worker drops its job receiver only after its final event was sent, so
/// that event is already queued when a dispatch fails.
async fn terminal_failure<T>(worker_index: usize, events: &mut UnboundedReceiver<WorkerEvent<T>>) -> Error {
    while let Some(ev) = events.recv().await {
        match ev {
            WorkerEvent::Failed { worker_index: i, message } if i == worker_index => {
                return Error::WorkerFailed { worker_index, message };
            }
            WorkerEvent::Exited { worker_index: i } if i == worker_index => break,
            _ => {}
        }
    }
    Error::WorkerFailed {
        worker_index,
        message: "worker stopped accepting jobs".to_string(),
    }
}

/// Send the sentinel to every worker and join their threads off the
/// runtime. A worker in the middle of a long item is waited for.
async fn shutdown<T: Send + 'static>(stage: &'static str, slots: Vec<WorkerSlot<T>>) {
    let threads: Vec<JoinHandle<()>> = slots
        .into_iter()
        .map(|slot| {
            let _ = slot.jobs.send(None);
            slot.thread
        })
        .collect();

    let joined = tokio::task::spawn_blocking(move || {
        threads
            .into_iter()
            .map(JoinHandle::join)
            .filter(std::result::Result::is_err)
            .count()
    })
    .await;

    match joined {
        Ok(0) => {}
        Ok(n) => tracing::warn!(event = "flowline.worker.join_failed", stage = stage, threads = n, "flowline.worker.join_failed"),
        Err(e) => tracing::warn!(event = "flowline.worker.join_failed", stage = stage, error = %e, "flowline.worker.join_failed"),
    }
}
