use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{forward, Pipe};

/// Buffers the whole input and emits it as a single `Vec` at the end.
///
/// Memory grows with the input; use only on bounded streams.
#[derive(Default)]
pub struct ToArrayPipe;

#[async_trait]
impl<T> Pipe<T, Vec<T>> for ToArrayPipe
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "to_array"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<Vec<T>>,
        ctx: StageContext,
    ) -> Result<()> {
        let mut items = Vec::new();
        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => return Ok(()),
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    items.push(v);
                }
            }
        }
        forward("to_array", &output, items).await;
        Ok(())
    }
}
