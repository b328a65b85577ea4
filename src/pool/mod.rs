//! Pool module - Elastic execution substrate
//!
//! - `WorkBranch`: the shared unbounded queue and the workers draining it
//! - `Supervisor`: a timer that resizes the branch within fixed bounds
//! - `WorkerPool`: owns both; this is what the dispatcher submits to

pub mod branch;
pub mod supervisor;

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

pub use branch::{BranchSnapshot, Unit, WorkBranch};
pub use supervisor::{PoolConfig, Supervisor};

pub struct WorkerPool {
    branch: Arc<WorkBranch>,
    supervisor: JoinHandle<()>,
}

impl WorkerPool {
    /// Create the branch and start supervising it. Must be called inside a
    /// Tokio runtime.
    pub fn start(config: PoolConfig) -> Self {
        info!(
            "Starting worker pool: min={} max={} interval={:?}",
            config.min_workers, config.max_workers, config.interval
        );
        let branch = Arc::new(WorkBranch::new());
        let supervisor = Supervisor::new(config).supervise(branch.clone());
        Self { branch, supervisor }
    }

    /// Queue a unit of work; returns immediately
    pub fn submit<F>(&self, unit: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.branch.submit(Box::pin(unit));
    }

    pub fn snapshot(&self) -> BranchSnapshot {
        self.branch.snapshot()
    }

    /// Stop scaling, then wait for every queued and running unit to finish
    pub async fn shutdown(self) {
        self.supervisor.abort();
        let pending = self.branch.num_tasks();
        info!("Shutting down worker pool ({} queued)", pending);
        // the branch may have no workers left if the supervisor never ran
        if self.branch.live_workers() == 0 && pending > 0 {
            self.branch.grow(1);
        }
        self.branch.close().await;
        info!("Worker pool stopped");
    }
}
