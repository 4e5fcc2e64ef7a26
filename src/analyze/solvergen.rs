//! Solver-matrix generation (C8): compacts the split, mapped, and
//! simulated global state into the per-process local [`SolverMatrix`].
//!
//! This crate covers the single-process case (spec.md §1's Non-goals
//! place MPI transport and multi-process distribution out of scope as
//! external collaborators), so the "local numbering" pass the original
//! performs is the identity: every cblk, block, and task already *is*
//! local, and `ftgttab` stays empty. Grounded on `solverMatrixGenSeq` in
//! `original_source/blend/solver_matrix_gen.c`, trimmed to the
//! single-cluster branch (no `fcbklocalnum`/`pcbklocalnum` fan-in/recv
//! bookkeeping, which only matters once `clustnbr > 1`).

use crate::analyze::candidate::CandidateMap;
use crate::analyze::simulate::SimResult;
use crate::config::BlendCtrl;
use crate::error::BlendError;
use crate::symbol::{CblkType, SymbolMatrix};
use crate::solver::{IndEntry, SolverBlok, SolverCblk, SolverMatrix, Task};
use faer::Mat;

/// Produces the local [`SolverMatrix`] from the final (split, mapped)
/// `symbol` and `cand`, using `sim`'s per-cblk priorities and
/// contribution counts.
pub fn run(
    symbol: &SymbolMatrix,
    cand: &CandidateMap,
    sim: &SimResult,
    ctrl: &BlendCtrl,
) -> Result<SolverMatrix, BlendError> {
    let n = symbol.cblknbr();
    if sim.tasks.len() != n {
        return Err(BlendError::invariant(
            "simulation task count does not match symbol cblk count",
        ));
    }

    let (cblktab, bloktab, diagmax, gemmmax) = fill_cblk_and_blok_tabs(symbol, cand)?;
    let mut cblktab = cblktab;
    let browtab = reorder_browtab(symbol, cand, &mut cblktab);
    let (tasktab, indtab) = fill_tasktab_and_indtab(symbol, sim, ctrl)?;
    let ttsktab = build_ttsktab(cand, &tasktab, ctrl);

    Ok(SolverMatrix {
        cblktab,
        bloktab,
        browtab,
        tasktab,
        ftgttab: Vec::new(),
        indtab,
        ttsktab,
        diagmax,
        gemmmax,
    })
}

/// Pass 2 of spec.md §4.7: emits one [`SolverCblk`]/[`SolverBlok`] per
/// symbol entry, computing each block's `coefind` against the owning
/// cblk's row-stacked layout and tracking `diagmax`/`gemmmax`.
fn fill_cblk_and_blok_tabs(
    symbol: &SymbolMatrix,
    cand: &CandidateMap,
) -> Result<(Vec<SolverCblk>, Vec<SolverBlok>, usize, usize), BlendError> {
    let n = symbol.cblknbr();
    let mut cblktab = Vec::with_capacity(n);
    let mut bloktab = Vec::with_capacity(symbol.bloknbr());
    let mut diagmax = 0usize;
    let mut gemmmax = 0usize;

    for i in 0..n {
        let c = &symbol.cblktab[i];
        let width = c.colnbr();
        diagmax = diagmax.max(width * width);

        let bloks = symbol.bloks_of(i);
        let mut stride = 0usize;
        for b in bloks {
            bloktab.push(SolverBlok {
                frownum: b.frownum,
                lrownum: b.lrownum,
                lcblknm: b.lcblknm,
                fcblknm: b.fcblknm,
                coefind: stride,
            });
            stride += b.rownbr();
        }
        for (wi, bi) in bloks.iter().enumerate().skip(1) {
            for bj in bloks.iter().skip(wi) {
                gemmmax = gemmmax.max(bi.rownbr() * bj.rownbr());
            }
        }

        cblktab.push(SolverCblk {
            fcolnum: c.fcolnum,
            lcolnum: c.lcolnum,
            bloknum: c.bloknum,
            brownum: 0,
            brownbr: 0,
            brown2d: 0,
            cblktype: cand.cand[i].cblktype,
            ownerid: 0,
            procdiag: 0,
            coef: Mat::zeros(stride, width),
            lowrank: vec![None; bloks.len().saturating_sub(1)],
        });
    }

    Ok((cblktab, bloktab, diagmax, gemmmax))
}

/// Pass 3 of spec.md §4.7: rebuilds `browtab` as a flat array, per-cblk
/// slices reordered so that all 1D-source contributions precede
/// 2D-source ones, recording the split point in `brown2d`.
fn reorder_browtab(
    symbol: &SymbolMatrix,
    cand: &CandidateMap,
    cblktab: &mut [SolverCblk],
) -> Vec<usize> {
    let mut browtab = Vec::with_capacity(symbol.browtab.len());
    for i in 0..symbol.cblknbr() {
        let entries = symbol.brow_of(i);
        let (ones, twos): (Vec<usize>, Vec<usize>) = entries.iter().partition(|&&blok_idx| {
            let src = symbol.bloktab[blok_idx].lcblknm;
            !cand.cand[src].cblktype.has(CblkType::TASKS_2D)
        });

        cblktab[i].brownum = browtab.len();
        cblktab[i].brown2d = ones.len();
        cblktab[i].brownbr = ones.len() + twos.len();
        browtab.extend_from_slice(&ones);
        browtab.extend_from_slice(&twos);
    }
    browtab
}

/// Passes 4-5 of spec.md §4.7: one [`Task`] per cblk carrying the
/// simulator's priority and contribution count, and the `indtab` slice
/// describing where each off-diagonal block-pair update of that task
/// lands.
///
/// For off-diagonal blocks `(b, j)` with `j >= b` in the same source
/// cblk, the update's destination is the block of `j`'s facing cblk
/// whose row range contains `b`'s — found with
/// [`SymbolMatrix::facing_in`]; this mirrors `symbolGetFacingBloknum`
/// called once per `(b, j)` pair by the original's `updoCompute`-style
/// indtab builder.
fn fill_tasktab_and_indtab(
    symbol: &SymbolMatrix,
    sim: &SimResult,
    ctrl: &BlendCtrl,
) -> Result<(Vec<Task>, Vec<IndEntry>), BlendError> {
    let n = symbol.cblknbr();
    let mut tasktab = Vec::with_capacity(n);
    let mut indtab = Vec::new();

    for i in 0..n {
        let sim_task = &sim.tasks[i];
        if sim_task.cblknum != i {
            return Err(BlendError::invariant(format!(
                "simulation task {i} is out of order (cblknum {})",
                sim_task.cblknum
            )));
        }

        let indnum = indtab.len();
        let bloks = symbol.bloks_of(i);
        for (wi, b) in bloks.iter().enumerate().skip(1) {
            for j in bloks.iter().skip(wi) {
                let target_cblk = j.fcblknm;
                let base = symbol.cblktab[target_cblk].bloknum;
                let entry = match symbol.facing_in(target_cblk, b.frownum, b.lrownum, base, ctrl.incomplete) {
                    Some(_) => IndEntry::Local(target_cblk),
                    None => IndEntry::Missing,
                };
                indtab.push(entry);
            }
        }

        tasktab.push(Task {
            cblknum: i,
            prionum: sim_task.prionum,
            ctrbcnt: sim_task.ctrbcnt,
            ftgtcnt: 0,
            indnum,
        });
    }

    Ok((tasktab, indtab))
}

/// Pass 7 of spec.md §4.7: assigns each task to the thread implied by
/// the low end of its candidate core range, then sorts each thread's
/// queue by `prionum` ascending (property 6 of spec.md §8) — the static
/// schedule every thread drains in order.
fn build_ttsktab(cand: &CandidateMap, tasktab: &[Task], ctrl: &BlendCtrl) -> Vec<Vec<usize>> {
    let thread_nbr = ctrl.thread_nbr.max(1);
    let mut ttsktab = vec![Vec::new(); thread_nbr];
    for (i, task) in tasktab.iter().enumerate() {
        let thread = cand.cand[task.cblknum].fcandnum % thread_nbr;
        ttsktab[thread].push(i);
    }
    for queue in &mut ttsktab {
        queue.sort_by_key(|&t| tasktab[t].prionum);
    }
    ttsktab
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::candidate::Cand;
    use crate::analyze::simulate::SimTask;
    use crate::symbol::{SymbolBlok, SymbolCblk};

    fn chain_of_two() -> SymbolMatrix {
        SymbolMatrix {
            baseval: 0,
            dof: 1,
            nodenbr: 4,
            cblktab: vec![
                SymbolCblk { fcolnum: 0, lcolnum: 1, bloknum: 0, brownum: 0 },
                SymbolCblk { fcolnum: 2, lcolnum: 3, bloknum: 2, brownum: 1 },
            ],
            bloktab: vec![
                SymbolBlok { frownum: 0, lrownum: 1, lcblknm: 0, fcblknm: 0 },
                SymbolBlok { frownum: 2, lrownum: 3, lcblknm: 0, fcblknm: 1 },
                SymbolBlok { frownum: 2, lrownum: 3, lcblknm: 1, fcblknm: 1 },
            ],
            browtab: vec![1],
        }
    }

    fn flat_cand(n: usize) -> CandidateMap {
        CandidateMap {
            cand: vec![
                Cand {
                    fcandnum: 0,
                    lcandnum: 0,
                    fccandnum: 0,
                    lccandnum: 0,
                    cblktype: CblkType::empty(),
                    treelevel: 0,
                    costlevel: 0.0,
                };
                n
            ],
        }
    }

    #[test]
    fn builds_solver_matrix_with_expected_shapes() {
        let sym = chain_of_two();
        let cand = flat_cand(2);
        let sim = SimResult {
            tasks: vec![
                SimTask { cblknum: 0, prionum: 0, ctrbcnt: 0 },
                SimTask { cblknum: 1, prionum: 1, ctrbcnt: 1 },
            ],
        };
        let ctrl = BlendCtrl::default();
        let solver = run(&sym, &cand, &sim, &ctrl).unwrap();

        assert_eq!(solver.cblknbr(), 2);
        assert_eq!(solver.bloktab.len(), 3);
        assert_eq!(solver.cblktab[0].coef.nrows(), 4); // stride = 2 + 2
        assert_eq!(solver.cblktab[0].coef.ncols(), 2);
        assert_eq!(solver.tasktab[1].ctrbcnt, 1);
        // cblk 0's single off-diagonal block targets cblk 1 directly.
        assert_eq!(solver.indtab[solver.tasktab[0].indnum], IndEntry::Local(1));
        assert_eq!(solver.brow_of(1), &[1]);
    }

    #[test]
    fn thread_queues_are_sorted_by_priority() {
        let sym = chain_of_two();
        let cand = flat_cand(2);
        let sim = SimResult {
            tasks: vec![
                SimTask { cblknum: 0, prionum: 3, ctrbcnt: 0 },
                SimTask { cblknum: 1, prionum: 1, ctrbcnt: 0 },
            ],
        };
        let mut ctrl = BlendCtrl::default();
        ctrl.thread_nbr = 1;
        let solver = run(&sym, &cand, &sim, &ctrl).unwrap();
        let queue = solver.local_thread_for(0);
        let prios: Vec<usize> = queue.iter().map(|&t| solver.tasktab[t].prionum).collect();
        assert!(prios.windows(2).all(|w| w[0] <= w[1]));
    }
}
