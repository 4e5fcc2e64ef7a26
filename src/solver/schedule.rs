//! Task scheduler glue (C10): per-thread static dispatch over
//! `ttsktab`, atomic contribution counters that gate when a task
//! becomes runnable, a per-cblk spinlock guarding in-place updates, and
//! a cooperative abort flag checked at dequeue time. The pack carries no
//! standalone dispatch-loop source; `ctrbcnt`/`ftgtcnt` are declared on
//! `SolverCblk`/`solver_ftgt_e` in `original_source/blend/solver.h` and
//! populated per-task in `original_source/blend/simu_task.c`'s
//! `simuTaskBuild` — the wait-for-zero dispatch loop itself is this
//! crate's own design, built to satisfy those fields' contract. The
//! abort-flag pattern is grounded on the teacher's
//! `InterruptTerminator` (`terminators.rs`).

use crate::solver::SolverMatrix;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A cooperative cancellation flag checked between tasks, set by an
/// external signal handler (e.g. SIGINT) or explicit caller request.
#[derive(Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        AbortFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn signal(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Installs a `ctrlc` handler that signals this flag on SIGINT. The
    /// handler may only be installed once per process; a second call
    /// returns an error from the `ctrlc` crate, which this method
    /// surfaces rather than silently ignoring.
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let flag = self.clone();
        ctrlc::set_handler(move || flag.signal())
    }
}

/// Outstanding-contribution counters, one per task, decremented
/// atomically as updates land; a task is runnable once both its local
/// and fan-in counters reach zero.
pub struct ContribCounters {
    local: Vec<AtomicUsize>,
    ftgt: Vec<AtomicUsize>,
}

impl ContribCounters {
    pub fn from_solver(solver: &SolverMatrix) -> Self {
        ContribCounters {
            local: solver
                .tasktab
                .iter()
                .map(|t| AtomicUsize::new(t.ctrbcnt))
                .collect(),
            ftgt: solver
                .tasktab
                .iter()
                .map(|t| AtomicUsize::new(t.ftgtcnt))
                .collect(),
        }
    }

    /// Decrements the local counter for `task`, returning true if this
    /// was the contribution that made the task runnable (both counters
    /// now zero).
    pub fn contribute_local(&self, task: usize) -> bool {
        let prev = self.local[task].fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "contribution underflow on task {task}");
        prev == 1 && self.ftgt[task].load(Ordering::Acquire) == 0
    }

    pub fn contribute_ftgt(&self, task: usize) -> bool {
        let prev = self.ftgt[task].fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "fan-in contribution underflow on task {task}");
        prev == 1 && self.local[task].load(Ordering::Acquire) == 0
    }

    pub fn is_runnable(&self, task: usize) -> bool {
        self.local[task].load(Ordering::Acquire) == 0 && self.ftgt[task].load(Ordering::Acquire) == 0
    }
}

/// A simple test-and-set spinlock guarding one cblk's coefficient
/// storage against concurrent updates from sibling GEMM tasks.
pub struct CblkLock(AtomicBool);

impl Default for CblkLock {
    fn default() -> Self {
        CblkLock(AtomicBool::new(false))
    }
}

impl CblkLock {
    pub fn lock(&self) {
        while self
            .0
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    pub fn unlock(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drains one thread's static task queue in priority order. Each task
/// waits on `counters` until both its local and fan-in contribution
/// counts reach zero before `run_task(local_task_index)` is invoked —
/// the suspend/resume contract every task in the static schedule is
/// subject to — and checks `abort` both while waiting and between
/// tasks, stopping early (returning `false`) the moment it is set.
pub fn dispatch_thread(
    solver: &SolverMatrix,
    thread: usize,
    counters: &ContribCounters,
    abort: &AbortFlag,
    mut run_task: impl FnMut(usize),
) -> bool {
    for &task in solver.local_thread_for(thread) {
        while !counters.is_runnable(task) {
            if abort.is_set() {
                return false;
            }
            std::hint::spin_loop();
        }
        if abort.is_set() {
            return false;
        }
        run_task(task);
    }
    true
}
