use std::collections::HashMap;
use std::sync::Arc;

/// Per-stage overrides keyed by [`Pipe::stage_name`](crate::pipeline::pipe::Pipe::stage_name).
#[derive(Clone, Default, Debug)]
pub struct StageConfig {
    pub(crate) buffers: Arc<HashMap<&'static str, usize>>,
    pub(crate) concurrencies: Arc<HashMap<&'static str, usize>>,
}

impl StageConfig {
    pub fn buffer_for(&self, stage: &'static str, global: usize) -> usize {
        self.buffers.get(stage).copied().unwrap_or(global).max(1)
    }

    /// Override for `stage`, or the stage's own setting.
    pub fn concurrency_for(&self, stage: &'static str, own: usize) -> usize {
        self.concurrencies.get(stage).copied().unwrap_or(own).max(1)
    }

    pub(crate) fn set_buffer(&mut self, stage: &'static str, buffer: usize) {
        Arc::make_mut(&mut self.buffers).insert(stage, buffer);
    }

    pub(crate) fn set_concurrency(&mut self, stage: &'static str, concurrency: usize) {
        Arc::make_mut(&mut self.concurrencies).insert(stage, concurrency);
    }
}
