use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{Capabilities, Flow, Pipe};
use crate::source::{await_start, emit, stopped};

/// Producer side of a [`PushSource`]. Dropping every handle ends the
/// stream.
#[derive(Clone)]
pub struct PushHandle<T> {
    tx: Sender<T>,
}

impl<T: Send> PushHandle<T> {
    /// Waits while the source's buffer is full.
    pub async fn push(&self, item: T) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| Error::stage("push_source", "source is no longer running"))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Source fed from outside the pipeline through a [`PushHandle`].
pub struct PushSource<T> {
    rx: Mutex<Option<Receiver<T>>>,
}

impl<T> PushSource<T> {
    pub fn channel(capacity: usize) -> (PushHandle<T>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            PushHandle { tx },
            Self {
                rx: Mutex::new(Some(rx)),
            },
        )
    }
}

#[async_trait]
impl<T> Pipe<(), T> for PushSource<T>
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "push_source"
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
        let rx = match self.rx.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => return Err(Error::pipeline("push_source lock poisoned")),
        };
        let Some(mut rx) = rx else {
            return Err(Error::stage("push_source", "source already consumed"));
        };

        if await_start("push_source", &mut input, &ctx).await == Flow::Stop {
            return Ok(());
        }

        loop {
            let item = tokio::select! {
                _ = stopped(&ctx) => break,
                item = rx.recv() => item,
            };
            let Some(item) = item else { break; };
            if emit("push_source", &output, item, &ctx).await == Flow::Stop {
                break;
            }
        }
        // Dropping `rx` here makes pending and future pushes fail.
        Ok(())
    }
}
