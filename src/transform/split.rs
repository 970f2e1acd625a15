use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{forward, Flow, Pipe};

/// Splits a raw byte stream into records on a delimiter (newline by
/// default).
///
/// Records may cross chunk boundaries; only the unterminated tail is
/// buffered. A non-empty tail is flushed as the last record at end of
/// input. Records are emitted byte for byte, delimiter excluded. Record
/// size is unbounded unless [`SplitPipe::max_record_bytes`] is set.
pub struct SplitPipe {
    delimiter: u8,
    max_record_bytes: Option<usize>,
}

impl SplitPipe {
    pub fn new() -> Self {
        Self {
            delimiter: b'\n',
            max_record_bytes: None,
        }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Maximum size of one record; longer records fail the stage.
    pub fn max_record_bytes(mut self, n: usize) -> Self {
        self.max_record_bytes = Some(n);
        self
    }

    fn check_len(&self, len: usize) -> Result<()> {
        match self.max_record_bytes {
            Some(max) if len > max => Err(Error::stage(
                "split",
                format!("record exceeded max_record_bytes ({len} > {max})"),
            )),
            _ => Ok(()),
        }
    }
}

impl Default for SplitPipe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipe<Bytes, Bytes> for SplitPipe {
    fn stage_name(&self) -> &'static str {
        "split"
    }

    async fn process(
        &self,
        mut input: Receiver<Bytes>,
        output: Sender<Bytes>,
        ctx: StageContext,
    ) -> Result<()> {
        let mut tail = BytesMut::new();

        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => {
                    tracing::debug!(event = "flowline.cancelled", stage = "split", where_ = "recv", "flowline.cancelled");
                    return Ok(())
                },
                msg = input.recv() => {
                    let Some(chunk) = msg else { break; };

                    let mut start = 0;
                    while let Some(pos) = chunk[start..].iter().position(|&b| b == self.delimiter) {
                        let end = start + pos;
                        let record = if tail.is_empty() {
                            chunk.slice(start..end)
                        } else {
                            tail.extend_from_slice(&chunk[start..end]);
                            tail.split().freeze()
                        };
                        self.check_len(record.len())?;
                        if forward("split", &output, record).await == Flow::Stop {
                            return Ok(());
                        }
                        start = end + 1;
                    }

                    tail.extend_from_slice(&chunk[start..]);
                    self.check_len(tail.len())?;
                }
            }
        }

        if !tail.is_empty() {
            forward("split", &output, tail.freeze()).await;
        }
        Ok(())
    }
}
