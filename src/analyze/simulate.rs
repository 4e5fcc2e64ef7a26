//! Scheduling simulation (C7): a deterministic discrete-event simulation
//! over the (split, mapped) symbol matrix that assigns each cblk's
//! factorization task a priority and records, per contributing block,
//! how many other contributions must land before the target task can
//! run (`ctrbcnt`). The pack has no `simuRun`/full simulator source; the
//! much smaller `original_source/blend/simu_task.c`'s `simuTaskBuild`
//! establishes the `SimTask` field shape this builds (`prionum`,
//! `ctrbcnt`, `ftgtcnt`, `cblknum`, and the rule that a cblk inside
//! `IN_SCHUR` gets no task). The priority-queue discipline driving the
//! simulation itself is this crate's own design against that shape.

use crate::analyze::candidate::CandidateMap;
use crate::analyze::cost::CostMatrix;
use crate::analyze::elimtree::EliminTree;
use crate::error::BlendError;
use crate::symbol::SymbolMatrix;
use crate::CblkId;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimTask {
    pub cblknum: CblkId,
    /// Lower fires first; ties broken by ascending cblk id, matching the
    /// tree postorder's own tie-break so the simulation is reproducible.
    pub prionum: usize,
    /// Number of off-diagonal-block contributions this task's cblk must
    /// still receive from other processes before it can start (only
    /// non-zero for contributions crossing candidate-range boundaries;
    /// same-range contributions are assumed already resident).
    pub ctrbcnt: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimResult {
    pub tasks: Vec<SimTask>,
}

/// Runs the simulation: cblks become ready once every son in the
/// elimination tree has completed, and among ready cblks the one with
/// the larger subtree cost runs first (a static proxy for "this task
/// unblocks the most future work"), ties broken by ascending id.
pub fn run(
    symbol: &SymbolMatrix,
    tree: &EliminTree,
    cost: &CostMatrix,
    cand: &CandidateMap,
) -> Result<SimResult, BlendError> {
    let n = symbol.cblknbr();
    let mut remaining = vec![0usize; n];
    for i in 0..n {
        remaining[i] = tree.sons(i).len();
    }

    // Max-heap on (subtree cost, then -id for determinism): costs are
    // floats so wrap in a helper implementing a total order via bits.
    #[derive(PartialEq)]
    struct Key(f64, Reverse<CblkId>);
    impl Eq for Key {}
    impl PartialOrd for Key {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for Key {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            self.0
                .partial_cmp(&other.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.1.cmp(&other.1))
        }
    }

    let mut ready: BinaryHeap<Key> = (0..n)
        .filter(|&i| remaining[i] == 0)
        .map(|i| Key(cost.subtree_cost(i), Reverse(i)))
        .collect();

    let mut tasks = vec![
        SimTask {
            cblknum: 0,
            prionum: 0,
            ctrbcnt: 0,
        };
        n
    ];
    let mut prio = 0usize;
    while let Some(Key(_, Reverse(node))) = ready.pop() {
        tasks[node] = SimTask {
            cblknum: node,
            prionum: prio,
            ctrbcnt: contributor_count(symbol, cand, node),
        };
        prio += 1;
        if let Some(f) = tree.father(node) {
            remaining[f] -= 1;
            if remaining[f] == 0 {
                ready.push(Key(cost.subtree_cost(f), Reverse(f)));
            }
        }
    }

    if prio != n {
        return Err(BlendError::invariant(
            "simulator did not visit every cblk; elimination tree has a cycle",
        ));
    }

    Ok(SimResult { tasks })
}

/// Number of off-diagonal blocks in `browtab[node]` whose source cblk's
/// candidate range does not overlap `node`'s own, i.e. blocks whose
/// contribution genuinely crosses a process boundary and must be
/// tracked as an incoming fan-in (the rest are resolved locally).
fn contributor_count(symbol: &SymbolMatrix, cand: &CandidateMap, node: CblkId) -> usize {
    let dst = &cand.cand[node];
    symbol
        .brow_of(node)
        .iter()
        .filter(|&&blok_idx| {
            let src_cblk = symbol.bloktab[blok_idx].lcblknm;
            let src = &cand.cand[src_cblk];
            src.fcandnum > dst.lcandnum || src.lcandnum < dst.fcandnum
        })
        .count()
}
