use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowline::error::{Error, Result};
use flowline::pipeline::chain::PipeExt;
use flowline::pipeline::runtime::Pipeline;
use flowline::sink::VoidSink;
use flowline::source::ArraySource;
use flowline::worker::{Worker, WorkerOptions, WorkerPool};

mod common;
use common::counting_source;

/// Doubles its input and reports which worker did it.
struct Doubler {
    worker_index: usize,
    offset: u64,
}

#[async_trait(?Send)]
impl Worker for Doubler {
    type In = u64;
    type Out = (usize, u64, u64);

    async fn process(&mut self, payload: u64, index: u64) -> Result<(usize, u64, u64)> {
        if payload == u64::MAX {
            return Err(Error::custom("refusing max"));
        }
        tokio::task::yield_now().await;
        Ok((self.worker_index, index, payload * 2 + self.offset))
    }
}

fn doubler_pool(pool_size: usize, offset: u64) -> WorkerPool<Doubler, u64> {
    WorkerPool::new("doubler", offset, |opts: WorkerOptions<u64>| {
        Ok(Doubler {
            worker_index: opts.worker_index,
            offset: opts.data,
        })
    })
    .pool_size(pool_size)
}

#[tokio::test]
async fn every_item_is_processed_exactly_once() -> Result<()> {
    let n = 200u64;
    let pipe = ArraySource::new((0..n).collect()).pipe(doubler_pool(4, 0));

    let out = Pipeline::new().buffer(8).collect(pipe).await?;

    let mut values: Vec<u64> = out.iter().map(|(_, _, v)| *v).collect();
    values.sort_unstable();
    assert_eq!(values, (0..n).map(|x| x * 2).collect::<Vec<u64>>());

    let indexes: HashSet<u64> = out.iter().map(|(_, i, _)| *i).collect();
    assert_eq!(indexes.len(), n as usize);
    Ok(())
}

#[tokio::test]
async fn dispatch_is_round_robin_by_index() -> Result<()> {
    let pool_size = 3;
    let pipe = ArraySource::new((0..30u64).collect()).pipe(doubler_pool(pool_size, 0).concurrency(6));

    let out = Pipeline::new().collect(pipe).await?;

    assert_eq!(out.len(), 30);
    for (worker, index, _) in out {
        assert_eq!(worker, (index % pool_size as u64) as usize);
    }
    Ok(())
}

#[tokio::test]
async fn worker_data_reaches_every_worker() -> Result<()> {
    let pipe = ArraySource::new(vec![1u64, 2, 3, 4]).pipe(doubler_pool(2, 100));
    let mut out: Vec<u64> = Pipeline::new()
        .collect(pipe)
        .await?
        .into_iter()
        .map(|(_, _, v)| v)
        .collect();
    out.sort_unstable();
    assert_eq!(out, vec![102, 104, 106, 108]);
    Ok(())
}

#[tokio::test]
async fn failed_items_are_dropped() -> Result<()> {
    let pipe = ArraySource::new(vec![1u64, u64::MAX, 3]).pipe(doubler_pool(2, 0));
    let mut out: Vec<u64> = Pipeline::new()
        .collect(pipe)
        .await?
        .into_iter()
        .map(|(_, _, v)| v)
        .collect();
    out.sort_unstable();
    assert_eq!(out, vec![2, 6]);
    Ok(())
}

#[tokio::test]
async fn empty_input_shuts_the_pool_down() -> Result<()> {
    let pipe = ArraySource::new(Vec::<u64>::new()).pipe(doubler_pool(3, 0));
    assert!(Pipeline::new().collect(pipe).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn factory_error_fails_the_stage() {
    let pool: WorkerPool<Doubler, ()> = WorkerPool::new("broken", (), |opts: WorkerOptions<()>| {
        if opts.worker_index == 1 {
            return Err(Error::custom("no model"));
        }
        Ok(Doubler {
            worker_index: opts.worker_index,
            offset: 0,
        })
    })
    .pool_size(2);

    let pipe = ArraySource::new((0..10u64).collect()).pipe(pool);
    let err = Pipeline::new().collect(pipe).await.unwrap_err();
    match err {
        Error::WorkerFailed { worker_index, message } => {
            assert_eq!(worker_index, 1);
            assert!(message.contains("no model"), "got {message}");
        }
        other => panic!("expected worker failure, got {other:?}"),
    }
}

struct Panicker;

#[async_trait(?Send)]
impl Worker for Panicker {
    type In = u64;
    type Out = u64;

    async fn process(&mut self, payload: u64, _index: u64) -> Result<u64> {
        if payload == 3 {
            panic!("worker blew up");
        }
        Ok(payload)
    }
}

#[tokio::test]
async fn panicking_worker_fails_the_stage() {
    let pool = WorkerPool::new("panicky", (), |_opts: WorkerOptions<()>| Ok(Panicker)).pool_size(2);
    let pipe = ArraySource::new((0..10u64).collect()).pipe(pool);

    let err = Pipeline::new().collect(pipe).await.unwrap_err();
    match err {
        Error::WorkerFailed { message, .. } => assert!(message.contains("worker blew up"), "got {message}"),
        other => panic!("expected worker failure, got {other:?}"),
    }
}

/// Counts items being processed across all workers and the workers still
/// alive.
#[derive(Default)]
struct Gauge {
    running: AtomicUsize,
    peak: AtomicUsize,
    alive: AtomicUsize,
}

struct Sleeper {
    gauge: Arc<Gauge>,
}

impl Drop for Sleeper {
    fn drop(&mut self) {
        self.gauge.alive.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait(?Send)]
impl Worker for Sleeper {
    type In = u64;
    type Out = u64;

    async fn process(&mut self, payload: u64, _index: u64) -> Result<u64> {
        let now = self.gauge.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.gauge.running.fetch_sub(1, Ordering::SeqCst);
        Ok(payload)
    }
}

fn sleeper_pool(gauge: &Arc<Gauge>, pool_size: usize) -> WorkerPool<Sleeper, Arc<Gauge>> {
    WorkerPool::new("sleeper", gauge.clone(), |opts: WorkerOptions<Arc<Gauge>>| {
        opts.data.alive.fetch_add(1, Ordering::SeqCst);
        Ok(Sleeper { gauge: opts.data })
    })
    .pool_size(pool_size)
}

#[tokio::test]
async fn concurrency_bounds_outstanding_jobs_across_workers() -> Result<()> {
    let gauge = Arc::new(Gauge::default());
    let pipe = ArraySource::new((0..40u64).collect()).pipe(sleeper_pool(&gauge, 4).concurrency(2));

    let out = Pipeline::new().collect(pipe).await?;

    assert_eq!(out.len(), 40);
    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak in flight was {peak}");
    Ok(())
}

#[tokio::test]
async fn abort_waits_for_every_worker_to_exit() -> Result<()> {
    let gauge = Arc::new(Gauge::default());
    let (source, produced) = counting_source(u64::MAX, Duration::ZERO);
    let pipe = source.pipe(sleeper_pool(&gauge, 3)).pipe(VoidSink);

    let (abort, run) = Pipeline::new().buffer(4).allow_graceful_abort(true).spawn(pipe);

    tokio::time::sleep(Duration::from_millis(30)).await;
    abort.abort();
    run.await??;

    assert!(produced.load(Ordering::SeqCst) > 0);
    assert_eq!(gauge.alive.load(Ordering::SeqCst), 0, "a worker outlived the run");
    assert_eq!(gauge.running.load(Ordering::SeqCst), 0);
    Ok(())
}
