//! Bounded-concurrency asynchronous map, filter and flat-map.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinSet;

use crate::error::{AggregateError, Error, ItemFailure, Result};
use crate::pipeline::close::close_pipeline;
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{forward, Capabilities, Flow, Pipe};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type Mapper<I, O> = Box<dyn Fn(I, u64) -> BoxFuture<Result<Emit<O>>> + Send + Sync>;
type Predicate<O> = Box<dyn Fn(&O, u64) -> bool + Send + Sync>;

/// What to do when the mapper fails for one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// Fail the stage, and with it the pipeline, on the first error.
    #[default]
    ThrowImmediately,
    /// Log the error, drop the item, keep going.
    Suppress,
    /// Keep going and fail at the end with every error collected.
    ThrowAggregated,
}

/// Result of mapping one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emit<O> {
    One(O),
    Many(Vec<O>),
    Skip,
    /// Stop emitting and end the pipeline through the close protocol.
    End,
}

pub struct MapPipe<I, O> {
    stage: &'static str,
    mapper: Mapper<I, O>,
    predicate: Option<Predicate<O>>,
    concurrency: usize,
    error_mode: ErrorMode,
}

impl<I, O> MapPipe<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Mapper returning the full [`Emit`] outcome.
    pub fn emit<F, Fut>(stage: &'static str, f: F) -> Self
    where
        F: Fn(I, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Emit<O>>> + Send + 'static,
    {
        Self::from_mapper(
            stage,
            Box::new(move |item, index| -> BoxFuture<Result<Emit<O>>> { Box::pin(f(item, index)) }),
        )
    }

    /// One output per input.
    pub fn new<F, Fut>(stage: &'static str, f: F) -> Self
    where
        F: Fn(I, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        Self::from_mapper(
            stage,
            Box::new(move |item, index| -> BoxFuture<Result<Emit<O>>> {
                let fut = f(item, index);
                Box::pin(async move { fut.await.map(Emit::One) })
            }),
        )
    }

    /// Every element of the returned `Vec` becomes its own output item.
    pub fn flat<F, Fut>(stage: &'static str, f: F) -> Self
    where
        F: Fn(I, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<O>>> + Send + 'static,
    {
        Self::from_mapper(
            stage,
            Box::new(move |item, index| -> BoxFuture<Result<Emit<O>>> {
                let fut = f(item, index);
                Box::pin(async move { fut.await.map(Emit::Many) })
            }),
        )
    }

    pub fn sync<F>(stage: &'static str, f: F) -> Self
    where
        F: Fn(I, u64) -> Result<O> + Send + Sync + 'static,
    {
        Self::from_mapper(
            stage,
            Box::new(move |item, index| -> BoxFuture<Result<Emit<O>>> {
                Box::pin(std::future::ready(f(item, index).map(Emit::One)))
            }),
        )
    }

    fn from_mapper(stage: &'static str, mapper: Mapper<I, O>) -> Self {
        Self {
            stage,
            mapper,
            predicate: None,
            concurrency: 1,
            error_mode: ErrorMode::default(),
        }
    }

    /// Maximum number of mapper calls in flight. Output order is only
    /// preserved with `1`.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Keep only outputs for which `predicate(output, input_index)` holds.
    pub fn predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&O, u64) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }
}

impl<T> MapPipe<T, T>
where
    T: Send + 'static,
{
    /// Asynchronous filter. The predicate gets a reference only for the
    /// synchronous part of the call; the returned future must own its data.
    pub fn filter<P, Fut>(stage: &'static str, predicate: P) -> Self
    where
        P: Fn(&T, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        Self::from_mapper(
            stage,
            Box::new(move |item, index| -> BoxFuture<Result<Emit<T>>> {
                let keep = predicate(&item, index);
                Box::pin(async move {
                    Ok(if keep.await? {
                        Emit::One(item)
                    } else {
                        Emit::Skip
                    })
                })
            }),
        )
    }
}

enum Step {
    Continue,
    DownstreamClosed,
    End,
}

/// Why the receive loop of a [`MapPipe`] stopped. Every exit still reports
/// the failures gathered under [`ErrorMode::ThrowAggregated`].
enum Exit {
    Drained,
    Ended,
    DownstreamClosed,
    Cancelled,
}

#[derive(Default)]
struct Tally {
    succeeded: u64,
    failures: Vec<ItemFailure>,
}

impl<I, O> MapPipe<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn settle(
        &self,
        index: u64,
        outcome: Result<Emit<O>>,
        output: &Sender<O>,
        tally: &mut Tally,
    ) -> Result<Step> {
        let emitted = match outcome {
            Ok(emitted) => {
                tally.succeeded += 1;
                emitted
            }
            Err(error) => {
                match self.error_mode {
                    ErrorMode::ThrowImmediately => return Err(Error::item(self.stage, index, error)),
                    ErrorMode::Suppress => {
                        tracing::warn!(
                            event = "flowline.item.suppressed",
                            stage = self.stage,
                            index = index,
                            error = %error,
                            "flowline.item.suppressed"
                        );
                    }
                    ErrorMode::ThrowAggregated => {
                        tracing::warn!(
                            event = "flowline.item.failed",
                            stage = self.stage,
                            index = index,
                            error = %error,
                            "flowline.item.failed"
                        );
                        tally.failures.push(ItemFailure { index, error });
                    }
                }
                return Ok(Step::Continue);
            }
        };

        let values = match emitted {
            Emit::One(value) => vec![value],
            Emit::Many(values) => values,
            Emit::Skip => return Ok(Step::Continue),
            Emit::End => return Ok(Step::End),
        };

        for value in values {
            if let Some(predicate) = &self.predicate {
                if !predicate(&value, index) {
                    continue;
                }
            }
            if forward(self.stage, output, value).await == Flow::Stop {
                return Ok(Step::DownstreamClosed);
            }
        }
        Ok(Step::Continue)
    }
}

#[async_trait]
impl<I, O> Pipe<I, O> for MapPipe<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        self.stage
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::REQUEST_CLOSE
    }

    async fn process(
        &self,
        mut input: Receiver<I>,
        output: Sender<O>,
        ctx: StageContext,
    ) -> Result<()> {
        let stage = self.stage;
        let concurrency = ctx.concurrency_for(stage, self.concurrency);

        let mut in_flight: JoinSet<(u64, Result<Emit<O>>)> = JoinSet::new();
        let mut next_index = 0u64;
        let mut input_done = false;
        let mut tally = Tally::default();

        let exit = loop {
            if input_done && in_flight.is_empty() {
                break Exit::Drained;
            }

            tokio::select! {
                biased;

                _ = ctx.cancel().cancelled() => {
                    tracing::debug!(event = "flowline.cancelled", stage = stage, where_ = "recv", "flowline.cancelled");
                    break Exit::Cancelled;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    let (index, outcome) = joined?;
                    match self.settle(index, outcome, &output, &mut tally).await? {
                        Step::Continue => {}
                        Step::DownstreamClosed => break Exit::DownstreamClosed,
                        Step::End => break Exit::Ended,
                    }
                }
                msg = input.recv(), if !input_done && in_flight.len() < concurrency => {
                    match msg {
                        Some(item) => {
                            let index = next_index;
                            next_index += 1;
                            let fut = (self.mapper)(item, index);
                            in_flight.spawn(async move { (index, fut.await) });
                        }
                        None => input_done = true,
                    }
                }
            }
        };

        match exit {
            Exit::Drained => {}
            Exit::Ended => {
                in_flight.abort_all();
                tracing::info!(event = "flowline.map.end", stage = stage, index = next_index, "flowline.map.end");
                close_pipeline(stage, input, output, &ctx).await;
            }
            Exit::DownstreamClosed | Exit::Cancelled => in_flight.abort_all(),
        }

        tracing::debug!(
            event = "flowline.map.done",
            stage = stage,
            received = next_index,
            succeeded = tally.succeeded,
            failed = tally.failures.len(),
            "flowline.map.done"
        );

        if !tally.failures.is_empty() {
            return Err(AggregateError::new(stage, tally.failures, tally.succeeded).into());
        }
        Ok(())
    }
}
