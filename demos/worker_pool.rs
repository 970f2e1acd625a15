//! CPU-bound work on a pool of worker threads.
//!
//! Run with:
//!   cargo run --example worker_pool
//!
//! Every worker owns its state (here a scratch buffer) and never shares it
//! with the pipeline. Output order is not preserved.

use async_trait::async_trait;
use flowline::error::Result;
use flowline::pipeline::chain::PipeExt;
use flowline::pipeline::runtime::Pipeline;
use flowline::source::ArraySource;
use flowline::worker::{Worker, WorkerOptions, WorkerPool};

struct Hasher {
    worker_index: usize,
    rounds: u32,
    scratch: Vec<u64>,
}

#[async_trait(?Send)]
impl Worker for Hasher {
    type In = u64;
    type Out = (u64, u64, usize);

    async fn process(&mut self, payload: u64, _index: u64) -> Result<(u64, u64, usize)> {
        self.scratch.clear();
        let mut h = payload ^ 0xcbf2_9ce4_8422_2325;
        for _ in 0..self.rounds {
            h = h.wrapping_mul(0x100_0000_01b3).rotate_left(7);
            self.scratch.push(h);
        }
        Ok((payload, h, self.worker_index))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter("flowline=debug")
        .init();

    let pool = WorkerPool::new("hasher", 200_000u32, |opts: WorkerOptions<u32>| {
        Ok(Hasher {
            worker_index: opts.worker_index,
            rounds: opts.data,
            scratch: Vec::new(),
        })
    })
    .pool_size(4);

    let out = Pipeline::new()
        .buffer(16)
        .collect(ArraySource::new((0..32u64).collect()).pipe(pool))
        .await?;

    for (input, hash, worker) in out.iter().take(8) {
        println!("item {input:>2} -> {hash:016x} (worker {worker})");
    }
    println!("{} items hashed", out.len());
    Ok(())
}
