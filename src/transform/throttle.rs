use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::pipeline::context::StageContext;
use crate::pipeline::pipe::{forward, Flow, Pipe};

/// Caps throughput at `throughput` items per `interval`.
///
/// A fixed window, not a token bucket: items pass straight through until
/// the window's count reaches `throughput`, then the stage stops pulling
/// until the free-running interval timer fires and resets the count.
pub struct ThrottlePipe {
    throughput: usize,
    interval: Duration,
}

impl ThrottlePipe {
    pub fn new(throughput: usize, interval: Duration) -> Self {
        Self {
            throughput: throughput.max(1),
            interval: if interval.is_zero() {
                Duration::from_millis(1)
            } else {
                interval
            },
        }
    }

    /// `throughput` items per second.
    pub fn per_second(throughput: usize) -> Self {
        Self::new(throughput, Duration::from_secs(1))
    }
}

#[async_trait]
impl<T> Pipe<T, T> for ThrottlePipe
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "throttle"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<T>,
        ctx: StageContext,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the window starts now.
        ticker.tick().await;

        let mut count = 0usize;
        let mut paused = false;

        loop {
            tokio::select! {
                _ = ctx.cancel().cancelled() => break,
                _ = ticker.tick() => {
                    if paused {
                        tracing::debug!(event = "flowline.throttle.resumed", stage = "throttle", "flowline.throttle.resumed");
                        paused = false;
                    }
                    count = 0;
                }
                msg = input.recv(), if count < self.throughput => {
                    let Some(v) = msg else { break; };
                    count += 1;
                    if count >= self.throughput {
                        tracing::debug!(
                            event = "flowline.throttle.paused",
                            stage = "throttle",
                            throughput = self.throughput,
                            interval_ms = self.interval.as_millis() as u64,
                            "flowline.throttle.paused"
                        );
                        paused = true;
                    }
                    if forward("throttle", &output, v).await == Flow::Stop {
                        break;
                    }
                }
            }
        }
        // Dropping the ticker here releases the timer.
        Ok(())
    }
}
