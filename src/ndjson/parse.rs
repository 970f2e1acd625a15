use std::marker::PhantomData;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::chain::Chain;
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{forward, Flow, Pipe};
use crate::transform::split::SplitPipe;

/// Parses one JSON value per record.
///
/// Blank records (after stripping a trailing `\r`) are skipped. In strict
/// mode, the default, a record that does not parse fails the stage; with
/// `strict(false)` it is logged and dropped.
pub struct JsonParsePipe<T> {
    strict: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonParsePipe<T> {
    pub fn new() -> Self {
        Self {
            strict: true,
            _marker: PhantomData,
        }
    }

    pub fn strict(mut self, yes: bool) -> Self {
        self.strict = yes;
        self
    }
}

impl<T> Default for JsonParsePipe<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Pipe<Bytes, T> for JsonParsePipe<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "json_parse"
    }

    async fn process(
        &self,
        mut input: Receiver<Bytes>,
        output: Sender<T>,
        ctx: StageContext,
    ) -> Result<()> {
        const STAGE: &str = "json_parse";
        let mut record_index = 0u64;

        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => {
                    tracing::debug!(event = "flowline.cancelled", stage = STAGE, where_ = "recv", "flowline.cancelled");
                    return Ok(());
                }
                msg = input.recv() => {
                    let Some(record) = msg else { break; };
                    let index = record_index;
                    record_index += 1;

                    let line = strip_cr(&record);
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }

                    let value = match serde_json::from_slice::<T>(line) {
                        Ok(value) => value,
                        Err(err) if self.strict => {
                            return Err(Error::stage(
                                STAGE,
                                format!(
                                    "failed to parse record {} ({} bytes, preview: {:?}): {}",
                                    index,
                                    line.len(),
                                    preview(line),
                                    err
                                ),
                            ));
                        }
                        Err(err) => {
                            tracing::warn!(
                                event = "flowline.item.suppressed",
                                stage = STAGE,
                                index = index,
                                preview = %preview(line),
                                error = %err,
                                "flowline.item.suppressed"
                            );
                            continue;
                        }
                    };

                    if forward(STAGE, &output, value).await == Flow::Stop {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Serializes every item as one line of JSON, newline included.
pub struct JsonStringifyPipe<T> {
    strict: bool,
    _marker: PhantomData<fn(T)>,
}

impl<T> JsonStringifyPipe<T> {
    pub fn new() -> Self {
        Self {
            strict: true,
            _marker: PhantomData,
        }
    }

    pub fn strict(mut self, yes: bool) -> Self {
        self.strict = yes;
        self
    }
}

impl<T> Default for JsonStringifyPipe<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Pipe<T, Bytes> for JsonStringifyPipe<T>
where
    T: Serialize + Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "json_stringify"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<Bytes>,
        ctx: StageContext,
    ) -> Result<()> {
        const STAGE: &str = "json_stringify";
        let mut index = 0u64;

        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => return Ok(()),
                msg = input.recv() => {
                    let Some(value) = msg else { break; };
                    let current = index;
                    index += 1;

                    let mut line = match serde_json::to_vec(&value) {
                        Ok(line) => line,
                        Err(err) if self.strict => return Err(Error::item(STAGE, current, err.into())),
                        Err(err) => {
                            tracing::warn!(event = "flowline.item.suppressed", stage = STAGE, index = current, error = %err, "flowline.item.suppressed");
                            continue;
                        }
                    };
                    line.push(b'\n');

                    if forward(STAGE, &output, Bytes::from(line)).await == Flow::Stop {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Raw NDJSON bytes to typed values: [`SplitPipe`] then [`JsonParsePipe`].
pub fn from_ndjson<T>() -> Chain<SplitPipe, JsonParsePipe<T>, Bytes>
where
    T: DeserializeOwned + Send + 'static,
{
    Chain::new(SplitPipe::new(), JsonParsePipe::new())
}

/// Typed values to NDJSON bytes.
pub fn to_ndjson<T>() -> JsonStringifyPipe<T>
where
    T: Serialize + Send + 'static,
{
    JsonStringifyPipe::new()
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn preview(line: &[u8]) -> String {
    const PREVIEW_LEN: usize = 80;
    let text = String::from_utf8_lossy(line);
    let escaped = text.replace('\n', "\\n").replace('\r', "\\r");
    let mut short = escaped.chars().take(PREVIEW_LEN).collect::<String>();
    if escaped.chars().count() > PREVIEW_LEN {
        short.push_str("...");
    }
    short
}
