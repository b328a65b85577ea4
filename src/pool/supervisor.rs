//! Supervisor: periodically resizes a work branch within fixed bounds

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::branch::{BranchSnapshot, WorkBranch};

/// Scaling bounds and cadence, fixed at startup
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// How often the supervisor looks at the branch
    pub interval: Duration,
    /// Most workers added in one tick
    pub scale_step: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 5,
            max_workers: 10,
            interval: Duration::from_millis(1000),
            scale_step: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Grow(usize),
    Shrink(usize),
    Hold,
}

/// Decide one scaling step.
///
/// Grows while units wait with nobody idle to take them, shrinks by one
/// while workers sit idle on an empty queue. The result always keeps the
/// worker count inside `[min_workers, max_workers]`.
pub fn plan(config: &PoolConfig, snapshot: BranchSnapshot) -> Adjustment {
    let workers = snapshot.workers;
    if workers < config.min_workers {
        return Adjustment::Grow(config.min_workers - workers);
    }
    if workers > config.max_workers {
        return Adjustment::Shrink(workers - config.max_workers);
    }

    let backlog = snapshot.queued.saturating_sub(snapshot.idle);
    if backlog > 0 && workers < config.max_workers {
        let step = backlog
            .min(config.scale_step.max(1))
            .min(config.max_workers - workers);
        return Adjustment::Grow(step);
    }
    if snapshot.queued == 0 && snapshot.idle > 0 && workers > config.min_workers {
        return Adjustment::Shrink(1);
    }
    Adjustment::Hold
}

pub struct Supervisor {
    config: PoolConfig,
}

impl Supervisor {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    /// Start supervising `branch` on a background task. The first tick fires
    /// immediately and brings the branch up to `min_workers`.
    pub fn supervise(&self, branch: Arc<WorkBranch>) -> JoinHandle<()> {
        let config = self.config.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                apply(&config, &branch);
            }
        })
    }
}

fn apply(config: &PoolConfig, branch: &WorkBranch) {
    let snapshot = branch.snapshot();
    match plan(config, snapshot) {
        Adjustment::Grow(n) => {
            info!(
                "Scaling up by {} (workers={}, queued={}, idle={})",
                n, snapshot.workers, snapshot.queued, snapshot.idle
            );
            branch.grow(n);
        }
        Adjustment::Shrink(n) => {
            info!(
                "Scaling down by {} (workers={}, idle={})",
                n, snapshot.workers, snapshot.idle
            );
            branch.shrink(n);
        }
        Adjustment::Hold => {
            debug!("Pool steady: {:?}", snapshot);
        }
    }
}
