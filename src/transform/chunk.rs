use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{forward, Flow, Pipe};

/// Groups items into `Vec`s of `size`; a partial last group is flushed at
/// the end of input.
pub struct ChunkPipe {
    size: usize,
}

impl ChunkPipe {
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }
}

#[async_trait]
impl<T> Pipe<T, Vec<T>> for ChunkPipe
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "chunk"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<Vec<T>>,
        ctx: StageContext,
    ) -> Result<()> {
        let mut buf = Vec::with_capacity(self.size);
        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => return Ok(()),
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    buf.push(v);
                    if buf.len() >= self.size {
                        let full = std::mem::replace(&mut buf, Vec::with_capacity(self.size));
                        if forward("chunk", &output, full).await == Flow::Stop {
                            return Ok(());
                        }
                    }
                }
            }
        }

        if !buf.is_empty() {
            forward("chunk", &output, buf).await;
        }
        Ok(())
    }
}
