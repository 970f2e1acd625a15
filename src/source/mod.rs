//! Sources: stages with no upstream, started by the driver's start tick.
//!
//! Every source here declares [`Capabilities::DESTROYABLE`] and stops as
//! soon as the close protocol destroys it, the pipeline is cancelled, or
//! downstream goes away.
//!
//! [`Capabilities::DESTROYABLE`]: crate::pipeline::pipe::Capabilities::DESTROYABLE

pub mod array;
pub mod fs;
pub mod pull;
pub mod push;

pub use array::{ArraySource, IterSource};
pub use fs::FsSource;
pub use pull::PullSource;
pub use push::{PushHandle, PushSource};

use tokio::sync::mpsc::{Receiver, Sender};

use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::Flow;

/// Resolves once the source must stop for any reason other than
/// downstream closing.
pub(crate) async fn stopped(ctx: &StageContext) {
    match ctx.close() {
        Some(close) => {
            tokio::select! {
                _ = ctx.cancel().cancelled() => {}
                _ = close.source_destroyed() => {}
            }
        }
        None => ctx.cancel().cancelled().await,
    }
}

/// Wait for the driver's start tick.
pub(crate) async fn await_start(stage: &'static str, input: &mut Receiver<()>, ctx: &StageContext) -> Flow {
    tokio::select! {
        _ = stopped(ctx) => {
            tracing::debug!(event = "flowline.cancelled", stage = stage, where_ = "start", "flowline.cancelled");
            Flow::Stop
        }
        _ = input.recv() => Flow::Continue,
    }
}

/// Send one produced item, giving up when the source is stopped or
/// downstream is gone.
pub(crate) async fn emit<T: Send>(stage: &'static str, output: &Sender<T>, item: T, ctx: &StageContext) -> Flow {
    tokio::select! {
        _ = stopped(ctx) => {
            tracing::debug!(event = "flowline.source.stopped", stage = stage, where_ = "send", "flowline.source.stopped");
            Flow::Stop
        }
        sent = output.send(item) => {
            if sent.is_err() {
                tracing::debug!(event = "flowline.downstream.closed", stage = stage, "flowline.downstream.closed");
                Flow::Stop
            } else {
                Flow::Continue
            }
        }
    }
}
