//! Per-process solver matrix (C8 output) and the numerical kernels that
//! consume it.
//!
//! [`SolverMatrix`] is the compacted, locally-numbered structure the
//! analyze pipeline produces for one process: every cblk/block it owns
//! or receives contributions into, its task metadata, and the fan-in
//! targets ([`Ftgt`]) needed to apply updates that arrive from other
//! processes. The kernels in [`kernels`] factor it in place.

pub mod dense;
pub mod kernels;
pub mod lowrank;
pub mod schedule;

use crate::config::{CompressWhen, CompressionParams, Factorization, SolverParams};
use crate::error::BlendError;
use crate::symbol::CblkType;
use crate::{BlokId, CblkId, ThreadId};
use faer::Mat;

/// A locally-owned column-block's coefficients and bookkeeping.
#[derive(Debug, Clone)]
pub struct SolverCblk {
    pub fcolnum: usize,
    pub lcolnum: usize,
    pub bloknum: BlokId,
    /// First entry of this cblk's slice in [`SolverMatrix::browtab`].
    pub brownum: usize,
    /// Number of entries in this cblk's `browtab` slice.
    pub brownbr: usize,
    /// Offset within the slice where 2D-source contributions start;
    /// entries `[brownum, brownum+brown2d)` are 1D-source, the rest are
    /// 2D-source (spec.md §4.7 step 3).
    pub brown2d: usize,
    pub cblktype: CblkType,
    /// Process holding this cblk's primary data (always 0: multi-process
    /// distribution is an external collaborator, see `DESIGN.md`).
    pub ownerid: usize,
    /// Process owning the diagonal block.
    pub procdiag: usize,
    /// Dense storage for the diagonal block plus every off-diagonal
    /// panel, stacked row-wise: `rows = total row span, cols = width`.
    /// One owned allocation per cblk (see `DESIGN.md` for why this
    /// departs from the original's single shared arena).
    pub coef: Mat<f64>,
    /// Populated only once `cblktype` has `COMPRESSED` set, one entry
    /// per off-diagonal block beyond the diagonal, in block order.
    pub lowrank: Vec<Option<lowrank::LowRankBlock>>,
}

impl SolverCblk {
    pub fn colnbr(&self) -> usize {
        self.lcolnum - self.fcolnum + 1
    }
}

/// A block within a [`SolverCblk`]'s stacked row span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverBlok {
    pub frownum: usize,
    pub lrownum: usize,
    pub lcblknm: CblkId,
    pub fcblknm: CblkId,
    /// Row offset of this block within its owning cblk's stacked `coef`.
    pub coefind: usize,
}

impl SolverBlok {
    pub fn rownbr(&self) -> usize {
        self.lrownum - self.frownum + 1
    }
}

/// One factorization task: one per locally-owned cblk, ordered for
/// static or dynamic dispatch by `prionum`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Task {
    pub cblknum: CblkId,
    pub prionum: usize,
    /// Outstanding local contributions before this task may start.
    pub ctrbcnt: usize,
    /// Outstanding remote (fan-in target) contributions.
    pub ftgtcnt: usize,
    /// First entry of this task's slice in `indtab`.
    pub indnum: usize,
}

/// An indirection-table entry: where a GEMM update's result lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndEntry {
    /// Lands directly in a locally-owned cblk's block: carries the
    /// local task id of the facing cblk (`-tasklocalnum[target]` in the
    /// original's signed-integer encoding).
    Local(CblkId),
    /// Lands in a fan-in target buffer awaiting remote contributions.
    Ftgt(usize),
    /// No facing block exists for this pair (`ftgtnbr + 1` sentinel in
    /// the original); only reachable with a malformed or ILU(k) symbol
    /// matrix, since an exact factorization always produces fill-in for
    /// every such pair.
    Missing,
}

/// Fan-in target: an update destined for a block owned by another
/// process, accumulated locally until `ctrbcnt` contributions have
/// landed, then sent. Field names mirror `solver_ftgt_e` in
/// `original_source/blend/solver.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ftgt {
    pub ctrbnbr: usize,
    pub ctrbcnt: usize,
    pub procdst: usize,
    pub taskdst: usize,
    pub blokdst: BlokId,
    pub prionum: usize,
    pub fcolnum: usize,
    pub lcolnum: usize,
    pub frownum: usize,
    pub lrownum: usize,
}

/// Per-process solver matrix: the analyze pipeline's final product.
#[derive(Debug, Clone)]
pub struct SolverMatrix {
    pub cblktab: Vec<SolverCblk>,
    pub bloktab: Vec<SolverBlok>,
    /// Per-cblk list of all blocks contributing updates into it, sliced
    /// by `cblktab[i].brownum`/`brownbr`; reordered so 1D-source
    /// contributions precede 2D-source ones (see `brown2d`).
    pub browtab: Vec<BlokId>,
    pub tasktab: Vec<Task>,
    pub ftgttab: Vec<Ftgt>,
    pub indtab: Vec<IndEntry>,
    /// Per-thread task dispatch order (local indices into `tasktab`),
    /// sorted by `prionum` within a thread.
    pub ttsktab: Vec<Vec<usize>>,
    /// Largest diagonal-block byte footprint across `cblktab`, sized for
    /// a reusable scratch buffer in the panel kernel.
    pub diagmax: usize,
    /// Largest single GEMM update footprint across `bloktab` pairs,
    /// sized for a reusable scratch buffer in the update kernel.
    pub gemmmax: usize,
}

impl SolverMatrix {
    pub fn cblknbr(&self) -> usize {
        self.cblktab.len()
    }

    pub fn thread_count(&self) -> usize {
        self.ttsktab.len()
    }

    pub fn local_thread_for(&self, thread: ThreadId) -> &[usize] {
        &self.ttsktab[thread]
    }

    /// Range of `bloktab` indices belonging to cblk `i`.
    pub fn blok_range(&self, i: CblkId) -> std::ops::Range<BlokId> {
        let start = self.cblktab[i].bloknum;
        let end = self
            .cblktab
            .get(i + 1)
            .map(|c| c.bloknum)
            .unwrap_or(self.bloktab.len());
        start..end
    }

    pub fn bloks_of(&self, i: CblkId) -> &[SolverBlok] {
        &self.bloktab[self.blok_range(i)]
    }

    /// This cblk's full `browtab` slice (1D-source entries followed by
    /// 2D-source entries).
    pub fn brow_of(&self, i: CblkId) -> &[BlokId] {
        let cblk = &self.cblktab[i];
        &self.browtab[cblk.brownum..cblk.brownum + cblk.brownbr]
    }

    /// The 1D-source prefix of cblk `i`'s `browtab` slice.
    pub fn brow_1d(&self, i: CblkId) -> &[BlokId] {
        let cblk = &self.cblktab[i];
        &self.browtab[cblk.brownum..cblk.brownum + cblk.brown2d]
    }

    /// The 2D-source suffix of cblk `i`'s `browtab` slice.
    pub fn brow_2d(&self, i: CblkId) -> &[BlokId] {
        let cblk = &self.cblktab[i];
        &self.browtab[cblk.brownum + cblk.brown2d..cblk.brownum + cblk.brownbr]
    }

    /// Finds the block of `target_cblk` whose row range contains
    /// `[frownum, lrownum]`, mirroring
    /// [`crate::symbol::SymbolMatrix::facing_in`] over the local,
    /// identity-numbered `bloktab`. A factorization driver uses this,
    /// together with an `IndEntry::Local` destination cblk, to recover
    /// the exact `coefind`/column offset a GEMM update lands at.
    pub fn facing_in(
        &self,
        target_cblk: CblkId,
        frownum: usize,
        lrownum: usize,
    ) -> Option<BlokId> {
        self.bloks_of(target_cblk)
            .iter()
            .enumerate()
            .find(|(_, b)| b.frownum <= frownum && b.lrownum >= lrownum)
            .map(|(offset, _)| self.cblktab[target_cblk].bloknum + offset)
    }

    /// Factors every cblk in place, single-threaded, processing `0..n`
    /// in ascending id order.
    ///
    /// That order is a valid topological (sons-before-fathers) one: a
    /// block's facing cblk always has a strictly larger id than the cblk
    /// that owns it (checked by [`crate::analyze::elimtree::EliminTree::build`]),
    /// so by the time cblk `k` is processed every update targeting it
    /// from an earlier cblk has already landed.
    ///
    /// Implements spec.md §4.8 steps 1-2 (panel factor, update) for the
    /// symmetric factorization kinds; `Lu` is rejected because this
    /// crate's [`SolverCblk`] has no separate `ucoeftab` to hold `U` (see
    /// `DESIGN.md`'s open question). Low-rank compression, when
    /// `compression.compress_when != Never`, runs after a cblk's panel
    /// is fully factored (`CompressWhen::End`/`Begin` semantics — see
    /// `DESIGN.md`; `During`'s incremental `rradd` accumulation is
    /// exercised directly by `lowrank`'s own tests but not wired in
    /// here).
    pub fn factorize_sequential(
        &mut self,
        params: &SolverParams,
        compression: &CompressionParams,
    ) -> Result<kernels::PivotReport, BlendError> {
        if params.factorization == Factorization::Lu {
            return Err(BlendError::bad_parameter(
                "factorize_sequential supports only the symmetric factorization kinds (Llt/Ldlt/Llh/Ldlh)",
            ));
        }
        let uses_diagonal = matches!(
            params.factorization,
            Factorization::Ldlt | Factorization::Ldlh
        );

        let mut total = kernels::PivotReport::default();
        let n = self.cblknbr();

        for k in 0..n {
            let width = self.cblktab[k].colnbr();
            let mut diag = Mat::from_fn(width, width, |i, j| self.cblktab[k].coef[(i, j)]);
            let mut d = vec![0.0f64; width];
            let report = kernels::factor_diagonal(
                &mut diag.as_mut(),
                &mut d,
                params.factorization,
                params.epsilon_magn_ctrl,
            );
            total.nbpivot += report.nbpivot;
            for i in 0..width {
                for j in 0..width {
                    self.cblktab[k].coef[(i, j)] = diag[(i, j)];
                }
            }
            let d_opt = uses_diagonal.then(|| d.clone());

            let bloks = self.bloks_of(k).to_vec();
            for b in bloks.iter().skip(1) {
                let rownbr = b.rownbr();
                let mut panel =
                    Mat::from_fn(rownbr, width, |i, j| self.cblktab[k].coef[(b.coefind + i, j)]);
                kernels::apply_panel(&mut panel.as_mut(), diag.as_ref(), d_opt.as_deref());
                for i in 0..rownbr {
                    for j in 0..width {
                        self.cblktab[k].coef[(b.coefind + i, j)] = panel[(i, j)];
                    }
                }
            }

            if compression.compress_when != CompressWhen::Never
                && self.cblktab[k].cblktype.has(CblkType::COMPRESSED)
                && width >= compression.compress_min_width
            {
                for (idx, b) in bloks.iter().enumerate().skip(1) {
                    let rownbr = b.rownbr();
                    if rownbr < compression.compress_min_height {
                        continue;
                    }
                    let block = Mat::from_fn(rownbr, width, |i, j| {
                        self.cblktab[k].coef[(b.coefind + i, j)]
                    });
                    self.cblktab[k].lowrank[idx - 1] = lowrank::ge2lr(&block, compression);
                }
            }

            for (wi, bi) in bloks.iter().enumerate().skip(1) {
                for bj in bloks.iter().skip(wi) {
                    let target_cblk = bj.fcblknm;
                    let facing = self
                        .facing_in(target_cblk, bi.frownum, bi.lrownum)
                        .ok_or_else(|| {
                            BlendError::invariant(format!(
                                "no facing block in cblk {target_cblk} for update from cblk {k}"
                            ))
                        })?;
                    let facing_blok = self.bloktab[facing];
                    let row_off = facing_blok.coefind + (bi.frownum - facing_blok.frownum);
                    let col_off = bj.frownum - self.cblktab[target_cblk].fcolnum;
                    let m = bi.rownbr();
                    let nn = bj.rownbr();

                    let a_panel =
                        Mat::from_fn(m, width, |i, j| self.cblktab[k].coef[(bi.coefind + i, j)]);
                    let b_panel =
                        Mat::from_fn(nn, width, |i, j| self.cblktab[k].coef[(bj.coefind + i, j)]);
                    let mut dest = Mat::from_fn(m, nn, |i, j| {
                        self.cblktab[target_cblk].coef[(row_off + i, col_off + j)]
                    });
                    kernels::apply_update(
                        &mut dest.as_mut(),
                        a_panel.as_ref(),
                        b_panel.as_ref(),
                        d_opt.as_deref(),
                        kernels::UpdateVariant::OneDOneD,
                    );
                    for i in 0..m {
                        for j in 0..nn {
                            self.cblktab[target_cblk].coef[(row_off + i, col_off + j)] = dest[(i, j)];
                        }
                    }
                }
            }
        }

        Ok(total)
    }
}
