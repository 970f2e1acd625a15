use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::Pipe;

/// Pushes every item into a shared `Vec`.
///
/// Memory grows with the input; meant for tests and bounded streams.
pub struct CollectSink<T> {
    out: Arc<Mutex<Vec<T>>>,
}

impl<T> CollectSink<T> {
    pub fn new(out: Arc<Mutex<Vec<T>>>) -> Self {
        Self { out }
    }
}

#[async_trait]
impl<T> Pipe<T, ()> for CollectSink<T>
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "collect_sink"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        _output: Sender<()>,
        ctx: StageContext,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => break,
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    self.out
                        .lock()
                        .map_err(|_| Error::pipeline("collect_sink mutex poisoned"))?
                        .push(v);
                }
            }
        }
        Ok(())
    }
}

/// Consumes and discards everything.
#[derive(Default)]
pub struct VoidSink;

#[async_trait]
impl<T> Pipe<T, ()> for VoidSink
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "void_sink"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        _output: Sender<()>,
        ctx: StageContext,
    ) -> Result<()> {
        let mut count = 0u64;
        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => break,
                msg = input.recv() => {
                    if msg.is_none() {
                        break;
                    }
                    count += 1;
                }
            }
        }
        tracing::trace!(event = "flowline.sink.done", stage = "void_sink", items = count, "flowline.sink.done");
        Ok(())
    }
}
