//! # flowline
//!
//! **Backpressure-aware streaming pipelines in Rust.**
//!
//! `flowline` composes sources, transforms and sinks into a typed chain and
//! drives it over bounded Tokio channels. A slow stage stalls the ones
//! before it; nothing buffers more than its channel capacity.
//!
//! ---
//!
//! ## Core Model
//!
//! ```text
//! Source → Transform → … → Sink
//! ```
//!
//! Every stage implements [`Pipe`]. Sources are `Pipe<(), T>` and start on
//! the driver's tick; sinks are `Pipe<T, ()>`. [`Pipeline`] runs the chain
//! and owns completion, error propagation, the close protocol and aborts.
//!
//! ---
//!
//! ## Example
//!
//! ```no_run
//! use flowline::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> flowline::error::Result<()> {
//!     let pipe = ArraySource::new((1..=100u32).collect())
//!         .filter(|x| x % 2 == 0)
//!         .pipe(
//!             MapPipe::new("square", |x: u32, _index| async move { Ok(x * x) })
//!                 .concurrency(8)
//!                 .error_mode(ErrorMode::ThrowAggregated),
//!         )
//!         .pipe(LimitPipe::new(10).close_source());
//!
//!     let out = Pipeline::new()
//!         .buffer(32)
//!         .allow_graceful_close(true)
//!         .collect(pipe)
//!         .await?;
//!     assert_eq!(out.len(), 10);
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## Early termination
//!
//! A stage that is done with the whole stream (a limit reached, a mapper
//! returning [`Emit::End`]) runs the close protocol: it ends downstream,
//! detaches from upstream, waits until everything in flight has reached
//! the end of the pipeline and only then destroys the source. The run ends
//! with [`Error::Closed`] unless [`Pipeline::allow_graceful_close`] is set.
//!
//! Stages opt in through [`Pipe::capabilities`]; a stage that does not
//! declare `REQUEST_CLOSE` never sees the protocol.
//!
//! ---
//!
//! ## Cancellation
//!
//! ```no_run
//! use flowline::prelude::*;
//!
//! # async fn demo<P>(pipe: P) -> flowline::error::Result<()>
//! # where
//! #   P: Pipe<(), ()> + Send + Sync + 'static,
//! # {
//! let (abort, handle) = Pipeline::new().allow_graceful_abort(true).spawn(pipe);
//! abort.abort();
//! handle.await??;
//! # Ok(())
//! # }
//! ```
//!
//! ---
//!
//! ## Worker threads
//!
//! [`WorkerPool`] runs a [`Worker`] on N OS threads, each with its own
//! current-thread runtime. Items are dispatched round-robin; output is
//! unordered.
//!
//! ---
//!
//! ## Observability
//!
//! `flowline` emits `tracing` events named `flowline.*` (for example
//! `flowline.downstream.closed`, `flowline.close.source_destroyed`,
//! `flowline.item.suppressed`, `flowline.worker.failed`) inside a
//! `flowline.pipeline` span. Install any subscriber:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("flowline=debug")
//!     .init();
//! ```
//!
//! ---
//!
//! ## Feature Flags
//!
//! - `ndjson` *(default)*: JSON record stages and the NDJSON file helpers
//!   in [`ndjson`].
//!
//! [`Pipe`]: pipeline::pipe::Pipe
//! [`Pipe::capabilities`]: pipeline::pipe::Pipe::capabilities
//! [`Pipeline`]: pipeline::runtime::Pipeline
//! [`Pipeline::allow_graceful_close`]: pipeline::runtime::Pipeline::allow_graceful_close
//! [`Emit::End`]: transform::map::Emit::End
//! [`Error::Closed`]: error::Error::Closed
//! [`WorkerPool`]: worker::WorkerPool
//! [`Worker`]: worker::Worker

pub mod error;
#[cfg(feature = "ndjson")]
pub mod ndjson;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod transform;
pub mod worker;

pub mod prelude {
    //! Convenient imports for most `flowline` users.

    pub use crate::error::{Error, Result};
    pub use crate::pipeline::cancel::{AbortHandle, CancelToken};
    pub use crate::pipeline::chain::PipeExt;
    pub use crate::pipeline::pipe::{Capabilities, Pipe};
    pub use crate::pipeline::runtime::Pipeline;
    pub use crate::sink::{CollectSink, ForEachSink, VoidSink};
    pub use crate::source::{ArraySource, IterSource, PullSource, PushSource};
    pub use crate::transform::{Emit, ErrorMode, LimitPipe, MapPipe, OffsetPipe, ThrottlePipe};
}
