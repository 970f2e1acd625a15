use std::ops::BitOr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::context::StageContext;

/// What a stage declares it takes part in, beyond plain item flow.
///
/// The driver only hands the close protocol to stages that declare one of
/// these, so a stage never has to be recognised by its type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    bits: u8,
}

impl Capabilities {
    pub const NONE: Self = Self { bits: 0 };
    /// The stage may initiate the close protocol.
    pub const REQUEST_CLOSE: Self = Self { bits: 0b01 };
    /// The stage is a source that releases its resource when destroyed.
    pub const DESTROYABLE: Self = Self { bits: 0b10 };

    pub const fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub(crate) const fn wants_close(self) -> bool {
        !self.is_empty()
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

#[async_trait]
pub trait Pipe<I: Send + 'static, O: Send + 'static>: Send + Sync {
    fn stage_name(&self) -> &'static str {
        "stage"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    async fn process(&self, input: Receiver<I>, output: Sender<O>, ctx: StageContext)
        -> Result<()>;
}

/// A shared stage, e.g. one source run by several pipelines in turn.
#[async_trait]
impl<I, O, P> Pipe<I, O> for Arc<P>
where
    I: Send + 'static,
    O: Send + 'static,
    P: Pipe<I, O> + ?Sized,
{
    fn stage_name(&self) -> &'static str {
        (**self).stage_name()
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    async fn process(&self, input: Receiver<I>, output: Sender<O>, ctx: StageContext) -> Result<()> {
        (**self).process(input, output, ctx).await
    }
}

/// Whether a stage loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// Send `item` downstream. A closed downstream is not an error: the stage
/// stops quietly.
pub(crate) async fn forward<T: Send>(stage: &'static str, output: &Sender<T>, item: T) -> Flow {
    if output.send(item).await.is_err() {
        tracing::debug!(event = "flowline.downstream.closed", stage = stage, "flowline.downstream.closed");
        return Flow::Stop;
    }
    Flow::Continue
}
