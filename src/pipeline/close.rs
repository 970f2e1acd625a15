//! Transform-initiated early termination.
//!
//! A pull-based source cannot be stopped instantly without either losing
//! output that is already buffered downstream or leaking the source's
//! underlying handle. A stage that wants to end the whole pipeline early
//! (a limit being reached, a mapper returning `Emit::End`) therefore runs
//! [`close_pipeline`], which performs, in order:
//!
//! 1. stop emitting: the stage drops its output sender, ending downstream;
//! 2. detach from the source: the stage drops its input receiver, so no new
//!    items are pulled;
//! 3. wait until the driver reports the pipeline drained, i.e. the terminal
//!    stage has processed everything already in flight and returned;
//! 4. destroy the source, which releases its resource and returns.
//!
//! The outcome is recorded here, as a [`CloseProtocol::requested_by`]
//! reason, and the driver maps it to success or to
//! [`Error::Closed`](crate::error::Error::Closed).

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{Receiver, Sender};

use crate::pipeline::cancel::CancelToken;
use crate::pipeline::context::StageContext;

#[derive(Default)]
struct Inner {
    requested_by: Mutex<Option<&'static str>>,
    drained: CancelToken,
    source_destroyed: CancelToken,
}

/// Shared state of the close protocol for one pipeline run.
#[derive(Clone, Default)]
pub struct CloseProtocol {
    inner: Arc<Inner>,
}

impl CloseProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a close request. Only the first request is kept; returns
    /// whether this call was it.
    pub fn request(&self, stage: &'static str) -> bool {
        let mut slot = match self.inner.requested_by.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(stage);
        true
    }

    /// Stage that initiated the close, if any.
    pub fn requested_by(&self) -> Option<&'static str> {
        match self.inner.requested_by.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub(crate) fn mark_drained(&self) {
        self.inner.drained.cancel();
    }

    pub fn is_drained(&self) -> bool {
        self.inner.drained.is_cancelled()
    }

    pub async fn drained(&self) {
        self.inner.drained.cancelled().await
    }

    pub fn destroy_source(&self) {
        self.inner.source_destroyed.cancel();
    }

    pub fn is_source_destroyed(&self) -> bool {
        self.inner.source_destroyed.is_cancelled()
    }

    /// Resolves once the source has been told to release its resources.
    pub async fn source_destroyed(&self) {
        self.inner.source_destroyed.cancelled().await
    }
}

/// Run the close protocol on behalf of `stage`.
///
/// Takes ownership of the stage's channel ends so that steps 1 and 2 are
/// enforced by the type system. When `ctx` carries no close protocol the
/// stage can only end downstream: it then keeps pulling and discarding its
/// input until upstream finishes, so the source is not stopped early.
pub async fn close_pipeline<I, O>(
    stage: &'static str,
    mut input: Receiver<I>,
    output: Sender<O>,
    ctx: &StageContext,
) where
    I: Send + 'static,
    O: Send + 'static,
{
    let Some(close) = ctx.close() else {
        drop(output);
        let mut discarded = 0u64;
        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => break,
                msg = input.recv() => {
                    if msg.is_none() {
                        break;
                    }
                    discarded += 1;
                }
            }
        }
        tracing::debug!(event = "flowline.close.unwired", stage = stage, discarded = discarded, "flowline.close.unwired");
        return;
    };

    if !close.request(stage) {
        tracing::debug!(event = "flowline.close.duplicate", stage = stage, "flowline.close.duplicate");
    }

    drop(output);
    drop(input);
    tracing::debug!(event = "flowline.close.detached", stage = stage, "flowline.close.detached");

    tokio::select! {
        _ = ctx.cancel().cancelled() => {
            tracing::debug!(event = "flowline.cancelled", stage = stage, where_ = "close", "flowline.cancelled");
        }
        _ = close.drained() => {
            tracing::debug!(event = "flowline.close.drained", stage = stage, "flowline.close.drained");
        }
    }

    close.destroy_source();
    tracing::info!(event = "flowline.close.source_destroyed", stage = stage, "flowline.close.source_destroyed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_wins() {
        let close = CloseProtocol::new();
        assert!(close.request("limit"));
        assert!(!close.request("map"));
        assert_eq!(close.requested_by(), Some("limit"));
    }

    #[tokio::test]
    async fn destroy_fires_after_drain() {
        let close = CloseProtocol::new();
        let observer = close.clone();
        let waiter = tokio::spawn(async move {
            observer.source_destroyed().await;
            observer.is_drained()
        });

        close.mark_drained();
        close.destroy_source();
        assert!(waiter.await.unwrap());
    }
}
