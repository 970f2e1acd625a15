use std::path::PathBuf;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{Capabilities, Flow, Pipe};
use crate::source::{await_start, emit, stopped};

const DEFAULT_READ_CHUNK_BYTES: usize = 64 * 1024;

/// Streams a file as raw byte chunks.
///
/// The file handle is held only while the stage runs and is closed as soon
/// as the source is destroyed, cancelled or loses its downstream.
pub struct FsSource {
    path: PathBuf,
    read_chunk_bytes: usize,
}

impl FsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
        }
    }

    /// Number of bytes read per filesystem call.
    pub fn read_chunk_bytes(mut self, n: usize) -> Self {
        self.read_chunk_bytes = n.max(1);
        self
    }
}

#[async_trait]
impl Pipe<(), Bytes> for FsSource {
    fn stage_name(&self) -> &'static str {
        "fs_source"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DESTROYABLE
    }

    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<Bytes>,
        ctx: StageContext,
    ) -> Result<()> {
        if await_start("fs_source", &mut input, &ctx).await == Flow::Stop {
            return Ok(());
        }

        let mut file = File::open(&self.path).await.map_err(|e| {
            Error::stage("fs_source", format!("cannot open {}: {e}", self.path.display()))
        })?;

        let mut total = 0u64;
        loop {
            let mut buf = BytesMut::zeroed(self.read_chunk_bytes);
            let n = tokio::select! {
                _ = stopped(&ctx) => break,
                read = file.read(&mut buf) => read?,
            };
            if n == 0 {
                break;
            }
            buf.truncate(n);
            total += n as u64;
            if emit("fs_source", &output, buf.freeze(), &ctx).await == Flow::Stop {
                break;
            }
        }

        drop(file);
        tracing::debug!(
            event = "flowline.source.done",
            stage = "fs_source",
            path = %self.path.display(),
            bytes = total,
            "flowline.source.done"
        );
        Ok(())
    }
}
