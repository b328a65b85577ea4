//! Dispatch loop: one pull, one submit, repeat
//!
//! The loop never waits for a task to finish. Each submitted unit runs the
//! pipeline and pushes its own result, so completions come back in any order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::pipeline::Pipeline;
use crate::pool::WorkerPool;
use crate::queue::TaskQueue;

pub struct Dispatcher {
    queue: Arc<dyn TaskQueue>,
    pipeline: Arc<Pipeline>,
    idle_delay: Duration,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn TaskQueue>, pipeline: Arc<Pipeline>, idle_delay: Duration) -> Self {
        Self {
            queue,
            pipeline,
            idle_delay,
        }
    }

    /// Pull once and submit what arrived. Returns whether a task was
    /// submitted; queue faults are logged, never returned.
    pub async fn step(&self, pool: &WorkerPool) -> bool {
        let data = match self.queue.pull().await {
            Ok(Some(data)) => data,
            Ok(None) => return false,
            Err(e) => {
                error!("Queue pull failed: {:#}", e);
                return false;
            }
        };

        info!(
            "Deal with task: {} (language={})",
            data.id(),
            data.language()
        );

        let queue = self.queue.clone();
        let pipeline = self.pipeline.clone();
        pool.submit(async move {
            let data = pipeline.execute(data).await;
            match queue.push(&data).await {
                Ok(()) => info!("Finish task: {}", data.id()),
                Err(e) => error!("Failed to push result for task {}: {:#}", data.id(), e),
            }
        });
        true
    }

    /// Dispatch until `shutdown` turns true. The flag is only checked
    /// between steps, so a task already popped is always submitted.
    pub async fn run(&self, pool: &WorkerPool, mut shutdown: watch::Receiver<bool>) {
        info!("Waiting for tasks...");
        while !*shutdown.borrow() {
            if self.step(pool).await {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.idle_delay) => {}
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Dispatcher stopped");
    }
}
