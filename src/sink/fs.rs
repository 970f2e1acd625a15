use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::Pipe;

/// Writes byte chunks to a file, creating parent directories as needed.
/// The file is truncated at the start of every run and flushed at the end.
pub struct FsSink {
    path: PathBuf,
}

impl FsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Pipe<Bytes, ()> for FsSink {
    fn stage_name(&self) -> &'static str {
        "fs_sink"
    }

    async fn process(
        &self,
        mut input: Receiver<Bytes>,
        _output: Sender<()>,
        ctx: StageContext,
    ) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = File::create(&self.path).await.map_err(|e| {
            Error::stage("fs_sink", format!("cannot create {}: {e}", self.path.display()))
        })?;
        let mut writer = BufWriter::new(file);

        let mut written = 0u64;
        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => break,
                msg = input.recv() => {
                    let Some(chunk) = msg else { break; };
                    writer.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
            }
        }

        writer.flush().await?;
        tracing::debug!(
            event = "flowline.sink.done",
            stage = "fs_sink",
            path = %self.path.display(),
            bytes = written,
            "flowline.sink.done"
        );
        Ok(())
    }
}
