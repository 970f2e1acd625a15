use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::error::Result;
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{Capabilities, Pipe};
use crate::transform::map::{ErrorMode, MapPipe};

/// Runs an async callback for every item, with the same concurrency bound
/// and error modes as [`MapPipe`].
pub struct ForEachSink<T> {
    inner: MapPipe<T, ()>,
}

impl<T> ForEachSink<T>
where
    T: Send + 'static,
{
    pub fn new<F, Fut>(stage: &'static str, f: F) -> Self
    where
        F: Fn(T, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            inner: MapPipe::new(stage, f),
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.inner = self.inner.concurrency(concurrency);
        self
    }

    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.inner = self.inner.error_mode(mode);
        self
    }
}

#[async_trait]
impl<T> Pipe<T, ()> for ForEachSink<T>
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        self.inner.stage_name()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    async fn process(
        &self,
        input: Receiver<T>,
        _output: Sender<()>,
        ctx: StageContext,
    ) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<()>(ctx.buffer());
        let drain = async move { while rx.recv().await.is_some() {} };
        let (res, ()) = tokio::join!(self.inner.process(input, tx, ctx), drain);
        res
    }
}
