use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{forward, Flow, Pipe};

/// map: O -> N, synchronous and infallible.
pub struct MapSyncPipe<F>(pub F);

#[async_trait]
impl<I, N, F> Pipe<I, N> for MapSyncPipe<F>
where
    I: Send + 'static,
    N: Send + 'static,
    F: Fn(I) -> N + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        "map_sync"
    }

    async fn process(
        &self,
        mut input: Receiver<I>,
        output: Sender<N>,
        ctx: StageContext,
    ) -> Result<()> {
        const STAGE: &str = "map_sync";
        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => break,
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    if forward(STAGE, &output, (self.0)(v)).await == Flow::Stop {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

pub struct FilterSyncPipe<P>(pub P);

#[async_trait]
impl<T, P> Pipe<T, T> for FilterSyncPipe<P>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        "filter_sync"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<T>,
        ctx: StageContext,
    ) -> Result<()> {
        const STAGE: &str = "filter_sync";
        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => break,
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    if (self.0)(&v) && forward(STAGE, &output, v).await == Flow::Stop {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Calls `f` on every item and passes it through unchanged.
pub struct TapPipe<F>(pub F);

#[async_trait]
impl<T, F> Pipe<T, T> for TapPipe<F>
where
    T: Send + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        "tap"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<T>,
        ctx: StageContext,
    ) -> Result<()> {
        const STAGE: &str = "tap";
        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => break,
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    (self.0)(&v);
                    if forward(STAGE, &output, v).await == Flow::Stop {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
