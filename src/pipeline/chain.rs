use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{Capabilities, Pipe};
use crate::transform::chunk::ChunkPipe;
use crate::transform::limit::{LimitPipe, OffsetPipe};
use crate::transform::map::MapPipe;
use crate::transform::simple::{FilterSyncPipe, MapSyncPipe, TapPipe};

pub struct Chain<A, B, M> {
    a: A,
    b: B,
    _m: PhantomData<fn() -> M>,
}

impl<A, B, M> Chain<A, B, M> {
    pub fn new(a: A, b: B) -> Self {
        Self {
            a,
            b,
            _m: PhantomData,
        }
    }
}

#[async_trait]
impl<I, M, O, A, B> Pipe<I, O> for Chain<A, B, M>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
    A: Pipe<I, M> + Send + Sync,
    B: Pipe<M, O> + Send + Sync,
{
    /// A chain produces its last stage's output, so it goes by that name.
    fn stage_name(&self) -> &'static str {
        self.b.stage_name()
    }

    fn capabilities(&self) -> Capabilities {
        self.a.capabilities() | self.b.capabilities()
    }

    async fn process(
        &self,
        input: mpsc::Receiver<I>,
        output: mpsc::Sender<O>,
        ctx: StageContext,
    ) -> Result<()> {
        let (tx_mid, rx_mid) = mpsc::channel::<M>(ctx.buffer_for(self.a.stage_name()));
        let cancel = ctx.cancel().clone();

        let left = self
            .a
            .process(input, tx_mid, ctx.scoped(self.a.capabilities()));
        let right = self
            .b
            .process(rx_mid, output, ctx.scoped(self.b.capabilities()));

        tokio::pin!(left);
        tokio::pin!(right);

        let mut left_res: Option<Result<()>> = None;
        let mut right_res: Option<Result<()>> = None;

        while left_res.is_none() || right_res.is_none() {
            tokio::select! {
                res = &mut left, if left_res.is_none() => {
                    if res.as_ref().is_err_and(Error::cancels_pipeline) {
                        cancel.cancel();
                    }
                    left_res = Some(res);
                }
                res = &mut right, if right_res.is_none() => {
                    if res.as_ref().is_err_and(Error::cancels_pipeline) {
                        cancel.cancel();
                    }
                    right_res = Some(res);
                }
            }
        }

        left_res.unwrap_or(Ok(()))?;
        right_res.unwrap_or(Ok(()))?;
        Ok(())
    }
}

pub trait PipeExt<I, O>: Pipe<I, O> + Sized
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn pipe<N, P2>(self, next: P2) -> Chain<Self, P2, O>
    where
        N: Send + 'static,
        P2: Pipe<O, N> + Send + Sync,
        Self: Send + Sync,
    {
        Chain::new(self, next)
    }

    /// Synchronous one-to-one mapping.
    fn map<N, F>(self, f: F) -> Chain<Self, MapSyncPipe<F>, O>
    where
        N: Send + 'static,
        F: Fn(O) -> N + Send + Sync + 'static,
        Self: Send + Sync,
    {
        Chain::new(self, MapSyncPipe(f))
    }

    fn filter<F>(self, pred: F) -> Chain<Self, FilterSyncPipe<F>, O>
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
        Self: Send + Sync,
    {
        Chain::new(self, FilterSyncPipe(pred))
    }

    fn tap<F>(self, f: F) -> Chain<Self, TapPipe<F>, O>
    where
        F: Fn(&O) + Send + Sync + 'static,
        Self: Send + Sync,
    {
        Chain::new(self, TapPipe(f))
    }

    /// Asynchronous, fallible mapping; configure concurrency and error mode
    /// by building a [`MapPipe`] directly and passing it to [`PipeExt::pipe`].
    fn map_async<N, F, Fut>(self, stage: &'static str, f: F) -> Chain<Self, MapPipe<O, N>, O>
    where
        N: Send + 'static,
        F: Fn(O, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<N>> + Send + 'static,
        Self: Send + Sync,
    {
        Chain::new(self, MapPipe::new(stage, f))
    }

    fn limit(self, limit: usize) -> Chain<Self, LimitPipe, O>
    where
        Self: Send + Sync,
    {
        Chain::new(self, LimitPipe::new(limit))
    }

    fn offset(self, offset: usize) -> Chain<Self, OffsetPipe, O>
    where
        Self: Send + Sync,
    {
        Chain::new(self, OffsetPipe::new(offset))
    }

    fn chunk(self, size: usize) -> Chain<Self, ChunkPipe, O>
    where
        Self: Send + Sync,
    {
        Chain::new(self, ChunkPipe::new(size))
    }
}

impl<I, O, P> PipeExt<I, O> for P
where
    I: Send + 'static,
    O: Send + 'static,
    P: Pipe<I, O> + Sized + Send + Sync,
{
}
