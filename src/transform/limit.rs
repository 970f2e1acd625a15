use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::close::close_pipeline;
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{forward, Capabilities, Flow, Pipe};

/// Passes through at most `limit` items. A limit of `0` means no limit.
///
/// Without [`LimitPipe::close_source`] the stage can only end downstream;
/// the source keeps producing and the extra items are discarded here.
pub struct LimitPipe {
    stage: &'static str,
    limit: usize,
    close_source: bool,
}

impl LimitPipe {
    pub fn new(limit: usize) -> Self {
        Self {
            stage: "limit",
            limit,
            close_source: false,
        }
    }

    /// Stage name used for logging, per-stage settings and
    /// [`Error::Closed`](crate::error::Error::Closed). Defaults to `"limit"`.
    pub fn named(mut self, stage: &'static str) -> Self {
        self.stage = stage;
        self
    }

    /// Stop the pipeline's source through the close protocol once the limit
    /// is reached.
    pub fn close_source(mut self) -> Self {
        self.close_source = true;
        self
    }
}

impl From<Option<usize>> for LimitPipe {
    fn from(limit: Option<usize>) -> Self {
        Self::new(limit.unwrap_or(0))
    }
}

#[async_trait]
impl<T> Pipe<T, T> for LimitPipe
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        self.stage
    }

    fn capabilities(&self) -> Capabilities {
        if self.close_source && self.limit > 0 {
            Capabilities::REQUEST_CLOSE
        } else {
            Capabilities::NONE
        }
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<T>,
        ctx: StageContext,
    ) -> Result<()> {
        let stage = self.stage;
        let mut passed = 0usize;

        // A limit is reached only after an item was forwarded, so `limit`
        // items always make it through before the close starts.
        loop {
            if self.limit > 0 && passed >= self.limit {
                tracing::info!(event = "flowline.limit.reached", stage = stage, limit = self.limit, "flowline.limit.reached");
                close_pipeline(stage, input, output, &ctx).await;
                return Ok(());
            }

            tokio::select! {
                _ = ctx.cancel().cancelled() => break,
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    passed += 1;
                    if forward(stage, &output, v).await == Flow::Stop {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Drops the first `offset` items.
pub struct OffsetPipe {
    offset: usize,
}

impl OffsetPipe {
    pub fn new(offset: usize) -> Self {
        Self { offset }
    }
}

#[async_trait]
impl<T> Pipe<T, T> for OffsetPipe
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "offset"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<T>,
        ctx: StageContext,
    ) -> Result<()> {
        let mut seen = 0usize;
        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => break,
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    seen += 1;
                    if seen <= self.offset {
                        continue;
                    }
                    if forward("offset", &output, v).await == Flow::Stop {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
