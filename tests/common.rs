#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flowline::error::Result;
use flowline::pipeline::context::StageContext;
use flowline::pipeline::pipe::Pipe;
use flowline::source::PullSource;
use flowline::transform::map::BoxFuture;
use tokio::sync::mpsc::{Receiver, Sender};

/// Sink that keeps reading until its input closes, even after the
/// pipeline is cancelled, so tests see everything that was emitted.
pub struct DrainSink<T> {
    out: Arc<Mutex<Vec<T>>>,
}

impl<T> DrainSink<T> {
    pub fn new() -> (Self, Arc<Mutex<Vec<T>>>) {
        let out = Arc::new(Mutex::new(Vec::new()));
        (Self { out: out.clone() }, out)
    }
}

#[async_trait]
impl<T> Pipe<T, ()> for DrainSink<T>
where
    T: Send + 'static,
{
    async fn process(
        &self,
        mut input: Receiver<T>,
        _output: Sender<()>,
        _ctx: StageContext,
    ) -> Result<()> {
        while let Some(v) = input.recv().await {
            self.out.lock().expect("mutex poisoned").push(v);
        }
        Ok(())
    }
}

pub type Produce = BoxFuture<Result<Option<u64>>>;

/// Source of `0..total` that sleeps `delay` before each item and counts how
/// many it produced. `u64::MAX` is endless for test purposes.
pub fn counting_source(
    total: u64,
    delay: Duration,
) -> (
    PullSource<impl Fn(u64) -> Produce + Send + Sync + 'static>,
    Arc<AtomicU64>,
) {
    let produced = Arc::new(AtomicU64::new(0));
    let counter = produced.clone();
    let source = PullSource::new(move |index: u64| -> Produce {
        let counter = counter.clone();
        Box::pin(async move {
            if index >= total {
                return Ok(None);
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(index))
        })
    });
    (source, produced)
}
