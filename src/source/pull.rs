use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{Capabilities, Flow, Pipe};
use crate::source::{await_start, stopped};

/// Pull-based generator source.
///
/// `f(index)` is called only when downstream has room for another item.
/// `Ok(Some(item))` produces an item, `Ok(None)` ends the stream and `Err`
/// fails the stage.
pub struct PullSource<F> {
    f: F,
}

impl<F> PullSource<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<T, F, Fut> Pipe<(), T> for PullSource<F>
where
    T: Send + 'static,
    F: Fn(u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>>> + Send,
{
    fn stage_name(&self) -> &'static str {
        "pull_source"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DESTROYABLE
    }

    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<T>,
        ctx: StageContext,
    ) -> Result<()> {
        if await_start("pull_source", &mut input, &ctx).await == Flow::Stop {
            return Ok(());
        }

        let mut index = 0u64;
        loop {
            // Demand: only produce once downstream can take the item.
            let permit = tokio::select! {
                _ = stopped(&ctx) => break,
                permit = output.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                _ = stopped(&ctx) => break,
                next = (self.f)(index) => next?,
            };
            let Some(item) = next else { break; };
            permit.send(item);
            index += 1;
        }

        tracing::debug!(event = "flowline.source.done", stage = "pull_source", produced = index, "flowline.source.done");
        Ok(())
    }
}

