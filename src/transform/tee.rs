use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{forward, Flow, Pipe};

/// Sends a copy of every item into a side channel and passes the item on.
///
/// The side channel is awaited like any other downstream, so a slow side
/// consumer slows the pipeline. If the side receiver goes away the stage
/// keeps passing items through. The side channel is closed when the stage
/// finishes; a `TeePipe` is good for one run.
pub struct TeePipe<T> {
    side: Mutex<Option<Sender<T>>>,
}

impl<T> TeePipe<T> {
    pub fn new(side: Sender<T>) -> Self {
        Self {
            side: Mutex::new(Some(side)),
        }
    }
}

#[async_trait]
impl<T> Pipe<T, T> for TeePipe<T>
where
    T: Clone + Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "tee"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<T>,
        ctx: StageContext,
    ) -> Result<()> {
        let mut side = match self.side.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if side.is_none() {
            tracing::warn!(event = "flowline.tee.reused", stage = "tee", "flowline.tee.reused");
        }
        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => break,
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    if let Some(tx) = &side {
                        if tx.send(v.clone()).await.is_err() {
                            tracing::debug!(event = "flowline.tee.side_closed", stage = "tee", "flowline.tee.side_closed");
                            side = None;
                        }
                    }
                    if forward("tee", &output, v).await == Flow::Stop {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
