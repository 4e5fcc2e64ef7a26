//! `SymbolMatrix`: an immutable view of column-blocks and blocks over a
//! permuted index space, as produced by the (external) symbolic
//! factorization step.
//!
//! This is the analyze pipeline's input; it is mutated once, in place,
//! by [`crate::analyze::split`], and consumed by
//! [`crate::analyze::solvergen`].

mod persist;

pub use persist::{load, save};

use crate::error::BlendError;
use crate::{BlokId, CblkId};
use std::ops::Range;

/// Independent cblk-type flags, mirroring `CBLK_FANIN`, `CBLK_LAYOUT_2D`,
/// `CBLK_TASKS_2D`, `CBLK_COMPRESSED`, `CBLK_IN_SCHUR` in
/// `original_source/blend/solver.h`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CblkType(u8);

impl CblkType {
    pub const FANIN: u8 = 1 << 0;
    pub const LAYOUT_2D: u8 = 1 << 1;
    pub const TASKS_2D: u8 = 1 << 2;
    pub const COMPRESSED: u8 = 1 << 3;
    pub const IN_SCHUR: u8 = 1 << 4;

    pub const fn empty() -> Self {
        CblkType(0)
    }

    pub const fn has(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn set(&mut self, flag: u8, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        CblkType(bits)
    }
}

/// A column-block: a contiguous range of columns of the permuted matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolCblk {
    pub fcolnum: usize,
    pub lcolnum: usize,
    /// First block of this cblk in `bloktab` (the diagonal block).
    pub bloknum: BlokId,
    /// First entry of this cblk's slice in `browtab`.
    pub brownum: usize,
}

impl SymbolCblk {
    pub fn colnbr(&self) -> usize {
        self.lcolnum - self.fcolnum + 1
    }
}

/// A block: a rectangular row-range within one cblk, targeting a facing
/// cblk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolBlok {
    pub frownum: usize,
    pub lrownum: usize,
    pub lcblknm: CblkId,
    pub fcblknm: CblkId,
}

impl SymbolBlok {
    pub fn rownbr(&self) -> usize {
        self.lrownum - self.frownum + 1
    }
}

/// Immutable (to callers outside this crate) view of the block structure
/// of a permuted, symbolically-factorized matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMatrix {
    pub baseval: usize,
    /// Degrees of freedom per node (constant across the matrix).
    pub dof: usize,
    pub nodenbr: usize,
    pub cblktab: Vec<SymbolCblk>,
    pub bloktab: Vec<SymbolBlok>,
    /// Per-cblk list of all blocks that contribute updates into it
    /// (reverse adjacency of `fcblknm`); sliced by `cblktab[i].brownum`.
    pub browtab: Vec<BlokId>,
}

impl SymbolMatrix {
    pub fn cblknbr(&self) -> usize {
        self.cblktab.len()
    }

    pub fn bloknbr(&self) -> usize {
        self.bloktab.len()
    }

    /// Range of `bloktab` indices belonging to cblk `i`.
    pub fn blok_range(&self, i: CblkId) -> Range<BlokId> {
        let start = self.cblktab[i].bloknum;
        let end = self
            .cblktab
            .get(i + 1)
            .map(|c| c.bloknum)
            .unwrap_or(self.bloktab.len());
        start..end
    }

    pub fn bloks_of(&self, i: CblkId) -> &[SymbolBlok] {
        &self.bloktab[self.blok_range(i)]
    }

    /// Range of `browtab` indices belonging to cblk `i`.
    pub fn brow_range(&self, i: CblkId) -> Range<usize> {
        let start = self.cblktab[i].brownum;
        let end = self
            .cblktab
            .get(i + 1)
            .map(|c| c.brownum)
            .unwrap_or(self.browtab.len());
        start..end
    }

    pub fn brow_of(&self, i: CblkId) -> &[BlokId] {
        &self.browtab[self.brow_range(i)]
    }

    /// The diagonal block of cblk `i` (the first in its range).
    pub fn diag_blok(&self, i: CblkId) -> BlokId {
        self.cblktab[i].bloknum
    }

    /// Number of off-diagonal blocks belonging to cblk `i`.
    pub fn odb_count(&self, i: CblkId) -> usize {
        self.blok_range(i).len().saturating_sub(1)
    }

    /// Finds the block in the facing cblk whose row range matches
    /// `bloktab[blok_src]`, starting the search at block `start_search`
    /// (blocks within a cblk are row-ascending, so searches may resume
    /// from where a previous one left off).
    ///
    /// In the exact (non-ILU) mode the match must be a row-range
    /// containment: the facing block's range must fully contain the
    /// source block's range. In the lenient (ILU) mode, any facing block
    /// whose row range overlaps is accepted, and the search degrades
    /// gracefully to `None` when no facing block exists at all.
    pub fn facing_blok(
        &self,
        blok_src: BlokId,
        start_search: BlokId,
        lenient: bool,
    ) -> Option<BlokId> {
        let src = self.bloktab[blok_src];
        self.facing_in(src.fcblknm, src.frownum, src.lrownum, start_search, lenient)
    }

    /// As [`Self::facing_blok`], but searches an arbitrary `target_cblk`
    /// for a block matching row range `[frownum, lrownum]` rather than
    /// the source block's own facing cblk. Used by
    /// [`crate::analyze::solvergen`] to locate, for a pair of
    /// off-diagonal blocks `(b, j)` of the same source cblk, the block
    /// of `j`'s facing cblk that `b`'s contribution lands in.
    pub fn facing_in(
        &self,
        target_cblk: CblkId,
        frownum: usize,
        lrownum: usize,
        start_search: BlokId,
        lenient: bool,
    ) -> Option<BlokId> {
        let target = self.bloks_of(target_cblk);
        let base = self.cblktab[target_cblk].bloknum;
        let local_start = start_search.saturating_sub(base).min(target.len());

        for (offset, blok) in target.iter().enumerate().skip(local_start) {
            let matches = if lenient {
                blok.frownum <= lrownum && blok.lrownum >= frownum
            } else {
                blok.frownum <= frownum && blok.lrownum >= lrownum
            };
            if matches {
                return Some(base + offset);
            }
            if blok.frownum > lrownum {
                break;
            }
        }
        None
    }

    /// Validates the structural invariants required after every analyze
    /// step (spec.md §3/§8 properties 1-3).
    pub fn check(&self) -> Result<(), BlendError> {
        if self.cblktab.is_empty() {
            return Ok(());
        }
        for i in 0..self.cblknbr() {
            let cblk = &self.cblktab[i];
            let bloks = self.bloks_of(i);
            if bloks.is_empty() {
                return Err(BlendError::invariant(format!(
                    "cblk {i} has no diagonal block"
                )));
            }
            let diag = bloks[0];
            if diag.frownum != cblk.fcolnum || diag.lrownum != cblk.lcolnum {
                return Err(BlendError::invariant(format!(
                    "cblk {i} diagonal block range [{},{}] does not match column range [{},{}]",
                    diag.frownum, diag.lrownum, cblk.fcolnum, cblk.lcolnum
                )));
            }
            for w in bloks.windows(2) {
                if w[1].frownum < w[0].frownum {
                    return Err(BlendError::invariant(format!(
                        "cblk {i} blocks are not row-ascending"
                    )));
                }
            }
            for blok in bloks.iter().skip(1) {
                let facing = &self.cblktab[blok.fcblknm];
                if blok.frownum < facing.fcolnum || blok.lrownum > facing.lcolnum {
                    return Err(BlendError::invariant(format!(
                        "block [{},{}] in cblk {i} escapes facing cblk {} range [{},{}]",
                        blok.frownum, blok.lrownum, blok.fcblknm, facing.fcolnum, facing.lcolnum
                    )));
                }
            }
        }
        Ok(())
    }
}
