//! Early termination through the close protocol.
//!
//! Run with:
//!   cargo run --example limit_close
//!
//! A file-like endless source is cut short by a limit. With `close_source`
//! the limit drains what is in flight and then destroys the source; without
//! it, downstream still sees only N items but the source runs to its end.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flowline::error::{Error, Result};
use flowline::pipeline::chain::PipeExt;
use flowline::pipeline::runtime::Pipeline;
use flowline::source::{ArraySource, PullSource};
use flowline::transform::map::BoxFuture;
use flowline::transform::{Emit, LimitPipe, MapPipe};

type Next = BoxFuture<Result<Option<u64>>>;

fn numbers(total: u64, produced: Arc<AtomicU64>) -> PullSource<impl Fn(u64) -> Next + Send + Sync + 'static> {
    PullSource::new(move |i: u64| -> Next {
        let produced = produced.clone();
        Box::pin(async move {
            if i >= total {
                return Ok(None);
            }
            produced.fetch_add(1, Ordering::SeqCst);
            Ok(Some(i))
        })
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter("flowline=debug")
        .init();

    let produced = Arc::new(AtomicU64::new(0));
    let out = Pipeline::new()
        .buffer(8)
        .allow_graceful_close(true)
        .collect(numbers(1_000_000, produced.clone()).pipe(LimitPipe::new(5).close_source()))
        .await?;
    println!("with close:    got {:?}, source produced {}", out, produced.load(Ordering::SeqCst));

    let produced = Arc::new(AtomicU64::new(0));
    let out = Pipeline::new()
        .buffer(8)
        .collect(numbers(10_000, produced.clone()).pipe(LimitPipe::new(5)))
        .await?;
    println!("without close: got {:?}, source produced {}", out, produced.load(Ordering::SeqCst));

    let until = MapPipe::emit("until_negative", |x: i64, _index| async move {
        Ok::<_, Error>(if x < 0 { Emit::End } else { Emit::One(x) })
    });
    let res = Pipeline::new()
        .collect(ArraySource::new(vec![3, 2, 1, -1, 5]).pipe(until))
        .await;
    println!("mapper end, not graceful: {res:?}");
    Ok(())
}
