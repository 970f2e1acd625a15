use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{Capabilities, Flow, Pipe};
use crate::source::{await_start, emit};

/// Emits the items of a `Vec` in order. Reusable: every run emits a fresh
/// copy.
#[derive(Clone)]
pub struct ArraySource<T> {
    items: Vec<T>,
}

impl<T> ArraySource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T> From<Vec<T>> for ArraySource<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

#[async_trait]
impl<T> Pipe<(), T> for ArraySource<T>
where
    T: Send + Sync + Clone + 'static,
{
    fn stage_name(&self) -> &'static str {
        "array_source"
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
        if await_start("array_source", &mut input, &ctx).await == Flow::Stop {
            return Ok(());
        }

        for item in self.items.iter().cloned() {
            if emit("array_source", &output, item, &ctx).await == Flow::Stop {
                break;
            }
        }
        Ok(())
    }
}

/// Emits the items of any iterator, once. A second run fails.
pub struct IterSource<It> {
    iter: Mutex<Option<It>>,
}

impl<It> IterSource<It> {
    pub fn new<C>(items: C) -> Self
    where
        C: IntoIterator<IntoIter = It>,
    {
        Self {
            iter: Mutex::new(Some(items.into_iter())),
        }
    }
}

#[async_trait]
impl<It> Pipe<(), It::Item> for IterSource<It>
where
    It: Iterator + Send + 'static,
    It::Item: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "iter_source"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DESTROYABLE
    }

    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<It::Item>,
        ctx: StageContext,
    ) -> Result<()> {
        let iter = match self.iter.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => return Err(Error::pipeline("iter_source lock poisoned")),
        };
        let Some(iter) = iter else {
            return Err(Error::stage("iter_source", "iterator already consumed"));
        };

        if await_start("iter_source", &mut input, &ctx).await == Flow::Stop {
            return Ok(());
        }

        for item in iter {
            if emit("iter_source", &output, item, &ctx).await == Flow::Stop {
                break;
            }
        }
        Ok(())
    }
}
