//! Backpressure Demonstration
//!
//! Run with:
//!   cargo run --example backpressure_demo
//!
//! A fast pull source feeds a slow concurrent transform. The source only
//! produces when the channel after it has room, so its rate follows the
//! transform's, whatever the buffer size.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flowline::error::{Error, Result};
use flowline::pipeline::chain::PipeExt;
use flowline::pipeline::runtime::Pipeline;
use flowline::sink::VoidSink;
use flowline::source::PullSource;
use flowline::transform::MapPipe;

async fn run_with(buffer: usize, concurrency: usize, items: u64, delay: Duration) -> Result<()> {
    let produced = Arc::new(AtomicU64::new(0));
    let processed = Arc::new(AtomicU64::new(0));

    let counter = produced.clone();
    let source = PullSource::new(move |i: u64| {
        let counter = counter.clone();
        async move {
            if i >= items {
                return Ok::<_, Error>(None);
            }
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(i))
        }
    });

    let done = processed.clone();
    let work = MapPipe::new("slow", move |x: u64, _index| {
        let done = done.clone();
        async move {
            tokio::time::sleep(delay).await;
            done.fetch_add(1, Ordering::SeqCst);
            Ok(x)
        }
    })
    .concurrency(concurrency);

    let (_abort, handle) = Pipeline::new().buffer(buffer).spawn(source.pipe(work).pipe(VoidSink));
    let start = Instant::now();

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!(
        "  buffer={:>3} concurrency={} | after 200ms: produced={:>3}, processed={:>3}",
        buffer,
        concurrency,
        produced.load(Ordering::SeqCst),
        processed.load(Ordering::SeqCst)
    );

    handle.await??;
    println!(
        "  buffer={:>3} concurrency={} | done in {:>4}ms",
        buffer,
        concurrency,
        start.elapsed().as_millis()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter("flowline=info")
        .init();

    let items = 50;
    let delay = Duration::from_millis(20);
    println!("{items} items, {}ms per item in the transform\n", delay.as_millis());

    for (buffer, concurrency) in [(2, 1), (10, 1), (100, 1), (2, 4)] {
        run_with(buffer, concurrency, items, delay).await?;
    }
    Ok(())
}
