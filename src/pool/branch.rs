//! Work branch: a shared unbounded queue drained by a variable number of
//! worker tasks.
//!
//! Workers only ever remove themselves when the supervisor has asked for a
//! retirement; the supervisor is the only caller of `grow`/`shrink`.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// A fire-and-forget unit of work
pub type Unit = BoxFuture<'static, ()>;

/// Point-in-time view used for scaling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BranchSnapshot {
    /// Workers that will keep running (retirements already subtracted)
    pub workers: usize,
    /// Workers currently waiting for work
    pub idle: usize,
    /// Units waiting in the queue
    pub queued: usize,
}

#[derive(Debug, Default)]
struct Counts {
    /// Live worker tasks
    live: usize,
    /// Retirements requested but not yet taken by a worker
    retiring: usize,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<VecDeque<Unit>>,
    notify: Notify,
    counts: Mutex<Counts>,
    idle: AtomicUsize,
    closed: AtomicBool,
    next_id: AtomicUsize,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<Unit>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn counts(&self) -> MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim a pending retirement; the caller must exit
    fn take_retirement(&self) -> bool {
        let mut counts = self.counts();
        if counts.retiring == 0 {
            return false;
        }
        counts.retiring -= 1;
        counts.live -= 1;
        true
    }

    /// Next unit for a worker, or `None` when the worker should exit
    async fn next(&self) -> Option<Unit> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.take_retirement() {
                // the wakeup that reached us may have been meant for a unit
                if !self.queue().is_empty() {
                    self.notify.notify_one();
                }
                return None;
            }
            let unit = self.queue().pop_front();
            if unit.is_some() {
                return unit;
            }
            if self.closed.load(Ordering::Acquire) {
                self.counts().live -= 1;
                return None;
            }

            self.idle.fetch_add(1, Ordering::AcqRel);
            notified.await;
            self.idle.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

pub struct WorkBranch {
    shared: Arc<Shared>,
    handles: Mutex<JoinSet<()>>,
}

impl WorkBranch {
    /// An empty branch; workers are added by the supervisor
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            handles: Mutex::new(JoinSet::new()),
        }
    }

    /// Queue a unit. Never blocks and never rejects.
    pub fn submit(&self, unit: Unit) {
        self.shared.queue().push_back(unit);
        self.shared.notify.notify_one();
    }

    pub fn snapshot(&self) -> BranchSnapshot {
        let workers = {
            let counts = self.shared.counts();
            counts.live - counts.retiring
        };
        BranchSnapshot {
            workers,
            idle: self.shared.idle.load(Ordering::Acquire),
            queued: self.num_tasks(),
        }
    }

    /// Worker tasks currently alive, including ones about to retire
    pub fn live_workers(&self) -> usize {
        self.shared.counts().live
    }

    pub fn num_tasks(&self) -> usize {
        self.shared.queue().len()
    }

    /// Add `n` workers, first cancelling pending retirements
    pub(super) fn grow(&self, n: usize) {
        let spawn = {
            let mut counts = self.shared.counts();
            let reclaimed = n.min(counts.retiring);
            counts.retiring -= reclaimed;
            counts.live += n - reclaimed;
            n - reclaimed
        };

        let mut handles = self.handles.lock().unwrap_or_else(|p| p.into_inner());
        for _ in 0..spawn {
            let shared = self.shared.clone();
            let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
            handles.spawn(worker_loop(shared, id));
        }
    }

    /// Ask `n` workers to exit once they are between units
    pub(super) fn shrink(&self, n: usize) {
        if n == 0 {
            return;
        }
        {
            let mut counts = self.shared.counts();
            // never ask for more than there are workers left to retire
            let n = n.min(counts.live - counts.retiring);
            counts.retiring += n;
        }
        self.shared.notify.notify_waiters();
    }

    /// Let the workers drain the queue and finish their current units,
    /// then exit. Resolves once all of them are gone.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_waiters();

        let mut handles = std::mem::take(
            &mut *self.handles.lock().unwrap_or_else(|p| p.into_inner()),
        );
        while let Some(joined) = handles.join_next().await {
            if let Err(e) = joined {
                error!("Worker task ended abnormally: {}", e);
            }
        }
    }
}

impl Default for WorkBranch {
    fn default() -> Self {
        Self::new()
    }
}

async fn worker_loop(shared: Arc<Shared>, id: usize) {
    debug!("Worker {} started", id);
    while let Some(unit) = shared.next().await {
        if let Err(panic) = AssertUnwindSafe(unit).catch_unwind().await {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!("Worker {} recovered from a panicking unit: {}", id, reason);
        }
    }
    debug!("Worker {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_for(branch: &WorkBranch, pred: impl Fn(BranchSnapshot) -> bool) {
        for _ in 0..200 {
            if pred(branch.snapshot()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached: {:?}", branch.snapshot());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_runs_all_units_before_close() {
        let branch = WorkBranch::new();
        branch.grow(3);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let done = done.clone();
            branch.submit(Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        branch.close().await;

        assert_eq!(done.load(Ordering::SeqCst), 50);
        assert_eq!(branch.live_workers(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submit_without_workers_queues() {
        let branch = WorkBranch::new();
        branch.submit(Box::pin(async {}));
        branch.submit(Box::pin(async {}));
        assert_eq!(branch.snapshot().queued, 2);

        branch.grow(1);
        wait_for(&branch, |s| s.queued == 0).await;
        branch.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_unit_does_not_kill_worker() {
        let branch = WorkBranch::new();
        branch.grow(1);
        let done = Arc::new(AtomicUsize::new(0));

        branch.submit(Box::pin(async { panic!("unit blew up") }));
        let d = done.clone();
        branch.submit(Box::pin(async move {
            d.fetch_add(1, Ordering::SeqCst);
        }));
        branch.close().await;

        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shrink_retires_idle_workers() {
        let branch = WorkBranch::new();
        branch.grow(4);
        wait_for(&branch, |s| s.idle == 4).await;

        branch.shrink(3);
        assert_eq!(branch.snapshot().workers, 1);
        for _ in 0..200 {
            if branch.live_workers() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(branch.live_workers(), 1);

        // the remaining worker still serves
        let done = Arc::new(AtomicBool::new(false));
        let d = done.clone();
        branch.submit(Box::pin(async move { d.store(true, Ordering::SeqCst) }));
        branch.close().await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_grow_cancels_pending_retirements() {
        let branch = WorkBranch::new();
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        branch.grow(2);
        // keep both workers busy so retirements stay pending
        for _ in 0..2 {
            let gate = gate.clone();
            branch.submit(Box::pin(async move {
                let _permit = gate.acquire().await;
            }));
        }
        wait_for(&branch, |s| s.queued == 0 && s.idle == 0).await;

        branch.shrink(1);
        assert_eq!(branch.snapshot().workers, 1);
        branch.grow(1);
        assert_eq!(branch.snapshot().workers, 2);
        assert_eq!(branch.live_workers(), 2);

        gate.add_permits(2);
        branch.close().await;
    }
}
