use crate::pipeline::cancel::CancelToken;
use crate::pipeline::close::CloseProtocol;
use crate::pipeline::config::StageConfig;
use crate::pipeline::pipe::Capabilities;

/// Everything a stage gets from the driver besides its channels.
#[derive(Clone)]
pub struct StageContext {
    buffer: usize,
    cancel: CancelToken,
    config: StageConfig,
    close: Option<CloseProtocol>,
}

impl StageContext {
    pub(crate) fn new(
        buffer: usize,
        cancel: CancelToken,
        config: StageConfig,
        close: CloseProtocol,
    ) -> Self {
        Self {
            buffer: buffer.max(1),
            cancel,
            config,
            close: Some(close),
        }
    }

    /// A context with no driver behind it, for running a stage by hand.
    pub fn detached(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            cancel: CancelToken::default(),
            config: StageConfig::default(),
            close: None,
        }
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    pub fn buffer_for(&self, stage: &'static str) -> usize {
        self.config.buffer_for(stage, self.buffer)
    }

    pub fn concurrency_for(&self, stage: &'static str, own: usize) -> usize {
        self.config.concurrency_for(stage, own)
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    /// The close protocol, present only for stages that declared a
    /// capability needing it.
    pub fn close(&self) -> Option<&CloseProtocol> {
        self.close.as_ref()
    }

    /// Context as seen by a child stage with the given capabilities.
    pub(crate) fn scoped(&self, capabilities: Capabilities) -> Self {
        Self {
            buffer: self.buffer,
            cancel: self.cancel.clone(),
            config: self.config.clone(),
            close: if capabilities.wants_close() {
                self.close.clone()
            } else {
                None
            },
        }
    }
}
