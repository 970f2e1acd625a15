use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::pipeline::cancel::{AbortHandle, CancelToken};
use crate::pipeline::close::CloseProtocol;
use crate::pipeline::config::StageConfig;
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::Pipe;

/// The abort handle runs of a [`Pipeline`] answer to.
///
/// Once an aborted run finishes, a fired handle is replaced with a fresh
/// one so the pipeline can run again. Handles passed in through
/// [`Pipeline::abort_handle`] belong to the caller and are never replaced.
#[derive(Clone)]
struct AbortSlot {
    handle: Arc<Mutex<AbortHandle>>,
    external: bool,
}

impl AbortSlot {
    fn new(handle: AbortHandle, external: bool) -> Self {
        Self {
            handle: Arc::new(Mutex::new(handle)),
            external,
        }
    }

    fn current(&self) -> AbortHandle {
        match self.handle.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn retire_fired(&self) {
        if self.external {
            return;
        }
        let mut guard = match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_aborted() {
            *guard = AbortHandle::new();
        }
    }
}

/// Drives a composed `Source → Transform* → Sink` chain to completion.
#[derive(Clone)]
pub struct Pipeline {
    buffer: usize,
    config: StageConfig,
    allow_graceful_close: bool,
    allow_graceful_abort: bool,
    abort: AbortSlot,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            buffer: 128,
            config: StageConfig::default(),
            allow_graceful_close: false,
            allow_graceful_abort: false,
            abort: AbortSlot::new(AbortHandle::new(), false),
        }
    }

    /// Capacity of every inter-stage channel.
    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Capacity of the channel leaving the stage named `stage`.
    pub fn buffer_stage(mut self, stage: &'static str, buffer: usize) -> Self {
        self.config.set_buffer(stage, buffer);
        self
    }

    /// Concurrency for the stage named `stage`, overriding the stage's own.
    pub fn concurrency_stage(mut self, stage: &'static str, concurrency: usize) -> Self {
        self.config.set_concurrency(stage, concurrency);
        self
    }

    /// Treat a completed close protocol as success instead of
    /// [`Error::Closed`].
    pub fn allow_graceful_close(mut self, yes: bool) -> Self {
        self.allow_graceful_close = yes;
        self
    }

    /// Treat an abort as success instead of [`Error::Aborted`].
    pub fn allow_graceful_abort(mut self, yes: bool) -> Self {
        self.allow_graceful_abort = yes;
        self
    }

    /// Use an externally created abort handle for every run, spawned ones
    /// included. Once fired it stays fired.
    pub fn abort_handle(mut self, handle: AbortHandle) -> Self {
        self.abort = AbortSlot::new(handle, true);
        self
    }

    /// Handle that aborts the current `run`/`collect` of this pipeline, or
    /// the next one if none is running. [`Pipeline::spawn`] hands out a
    /// handle of its own.
    pub fn abort(&self) -> AbortHandle {
        self.abort.current()
    }

    /// Run a chain ending in a sink.
    pub async fn run<P>(&self, pipe: P) -> Result<()>
    where
        P: Pipe<(), ()> + Send + Sync,
    {
        self.drive(&pipe).await.map(|_| ())
    }

    /// Run a chain and gather whatever its last stage emits.
    pub async fn collect<T, P>(&self, pipe: P) -> Result<Vec<T>>
    where
        T: Send + 'static,
        P: Pipe<(), T> + Send + Sync,
    {
        self.drive(&pipe).await
    }

    /// Run a chain ending in a sink on a new task.
    pub fn spawn<P>(&self, pipe: P) -> (AbortHandle, JoinHandle<Result<()>>)
    where
        P: Pipe<(), ()> + Send + Sync + 'static,
    {
        let mut driver = self.clone();
        if !driver.abort.external {
            driver.abort = AbortSlot::new(AbortHandle::new(), false);
        }
        let abort = driver.abort();
        let handle = tokio::spawn(async move { driver.run(pipe).await });
        (abort, handle)
    }

    async fn drive<T, P>(&self, pipe: &P) -> Result<Vec<T>>
    where
        T: Send + 'static,
        P: Pipe<(), T> + Send + Sync,
    {
        let span = tracing::info_span!(
            "flowline.pipeline",
            stage = pipe.stage_name(),
            buffer = self.buffer
        );
        self.drive_inner(pipe).instrument(span).await
    }

    async fn drive_inner<T, P>(&self, pipe: &P) -> Result<Vec<T>>
    where
        T: Send + 'static,
        P: Pipe<(), T> + Send + Sync,
    {
        let (tx_start, rx_start) = mpsc::channel::<()>(1);
        let (tx_out, mut rx_out) = mpsc::channel::<T>(self.buffer);

        let abort = self.abort.current();
        let cancel = CancelToken::default();
        let close = CloseProtocol::new();
        let ctx = StageContext::new(self.buffer, cancel.clone(), self.config.clone(), close.clone())
            .scoped(pipe.capabilities());

        if tx_start.send(()).await.is_err() {
            return Err(Error::pipeline("start channel closed"));
        }
        drop(tx_start);

        let process = pipe.process(rx_start, tx_out, ctx);
        let drain = async {
            let mut items = Vec::new();
            while let Some(item) = rx_out.recv().await {
                items.push(item);
            }
            // The terminal stage has returned: whatever was in flight is out.
            close.mark_drained();
            items
        };
        let work = async { tokio::join!(process, drain) };
        tokio::pin!(work);

        let (res, items) = loop {
            tokio::select! {
                out = &mut work => break out,
                _ = abort.aborted(), if !cancel.is_cancelled() => {
                    tracing::info!(event = "flowline.aborted", "flowline.aborted");
                    cancel.cancel();
                }
            }
        };

        let aborted = abort.is_aborted();
        if aborted {
            self.abort.retire_fired();
        }

        res?;

        if aborted {
            if !self.allow_graceful_abort {
                return Err(Error::Aborted);
            }
            tracing::debug!(event = "flowline.aborted.graceful", items = items.len(), "flowline.aborted.graceful");
        }

        if let Some(stage) = close.requested_by() {
            if !self.allow_graceful_close {
                return Err(Error::Closed { stage });
            }
            tracing::debug!(event = "flowline.close.graceful", stage = stage, "flowline.close.graceful");
        }

        Ok(items)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
