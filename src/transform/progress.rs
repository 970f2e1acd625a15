use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{forward, Flow, Pipe};

/// Point-in-time counters of a [`ProgressPipe`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressStats {
    pub processed: u64,
    pub elapsed: Duration,
    pub per_second: f64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    started: Mutex<Option<Instant>>,
    finished: Mutex<Option<Instant>>,
}

/// Read side of a [`ProgressPipe`], usable while and after it runs.
#[derive(Clone, Default)]
pub struct ProgressHandle {
    counters: Arc<Counters>,
}

impl ProgressHandle {
    pub fn snapshot(&self) -> ProgressStats {
        let processed = self.counters.processed.load(Ordering::Relaxed);
        let started = read_instant(&self.counters.started);
        let finished = read_instant(&self.counters.finished);
        let elapsed = match (started, finished) {
            (Some(s), Some(f)) => f.saturating_duration_since(s),
            (Some(s), None) => s.elapsed(),
            _ => Duration::ZERO,
        };
        let secs = elapsed.as_secs_f64();
        ProgressStats {
            processed,
            elapsed,
            per_second: if secs > 0.0 { processed as f64 / secs } else { 0.0 },
        }
    }

    fn start(&self) {
        write_instant(&self.counters.started, Instant::now());
    }

    fn finish(&self) {
        write_instant(&self.counters.finished, Instant::now());
    }

    fn bump(&self) -> u64 {
        self.counters.processed.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn read_instant(slot: &Mutex<Option<Instant>>) -> Option<Instant> {
    match slot.lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

fn write_instant(slot: &Mutex<Option<Instant>>, at: Instant) {
    match slot.lock() {
        Ok(mut guard) => *guard = Some(at),
        Err(poisoned) => *poisoned.into_inner() = Some(at),
    }
}

/// Pass-through stage that counts items and logs throughput every
/// `log_every` items and once at the end.
pub struct ProgressPipe {
    metric: &'static str,
    log_every: u64,
    handle: ProgressHandle,
}

impl ProgressPipe {
    pub fn new(metric: &'static str) -> Self {
        Self {
            metric,
            log_every: 1000,
            handle: ProgressHandle::default(),
        }
    }

    /// `0` disables the periodic lines; the final summary is always logged.
    pub fn log_every(mut self, n: u64) -> Self {
        self.log_every = n;
        self
    }

    pub fn handle(&self) -> ProgressHandle {
        self.handle.clone()
    }

    fn log(&self, event: &'static str) {
        let stats = self.handle.snapshot();
        tracing::info!(
            event = event,
            metric = self.metric,
            processed = stats.processed,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            per_second = stats.per_second,
            "{}",
            event
        );
    }
}

#[async_trait]
impl<T> Pipe<T, T> for ProgressPipe
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "progress"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<T>,
        ctx: StageContext,
    ) -> Result<()> {
        self.handle.start();
        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => break,
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    let n = self.handle.bump();
                    if self.log_every > 0 && n % self.log_every == 0 {
                        self.log("flowline.progress");
                    }
                    if forward("progress", &output, v).await == Flow::Stop {
                        break;
                    }
                }
            }
        }
        self.handle.finish();
        self.log("flowline.progress.final");
        Ok(())
    }
}
