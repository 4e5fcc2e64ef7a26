//! Candidate processor/cluster sets per cblk (C4), grounded on the
//! `Cand` field layout and function prototypes in
//! `original_source/pastix/blend/cand.h` (the pack carries no `.c`
//! implementation of those prototypes; the top-down inheritance walk
//! and `check()` here are this crate's own design against that header's
//! contract).

use crate::analyze::elimtree::EliminTree;
use crate::config::BlendCtrl;
use crate::error::BlendError;
use crate::symbol::{CblkType, SymbolMatrix};
use crate::CblkId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cand {
    pub fcandnum: usize,
    pub lcandnum: usize,
    pub fccandnum: usize,
    pub lccandnum: usize,
    pub cblktype: CblkType,
    pub treelevel: usize,
    pub costlevel: f64,
}

impl Cand {
    pub fn core_count(&self) -> usize {
        self.lcandnum - self.fcandnum + 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMap {
    pub cand: Vec<Cand>,
}

impl CandidateMap {
    /// Builds the initial candidate sets: every root cblk owns the full
    /// `[0, total_nbcores - 1]` range; a son's range is the same as its
    /// father's unless `ctrl.allcand` forces the full range everywhere
    /// (a debug/reference mode per spec.md §9).
    pub fn build(
        symbol: &SymbolMatrix,
        tree: &EliminTree,
        ctrl: &BlendCtrl,
    ) -> Result<Self, BlendError> {
        let n = symbol.cblknbr();
        let full = 0..ctrl.total_nbcores.saturating_sub(1).max(0) + 1;
        let mut cand = vec![
            Cand {
                fcandnum: full.start,
                lcandnum: full.end.saturating_sub(1),
                fccandnum: 0,
                lccandnum: 0,
                cblktype: CblkType::empty(),
                treelevel: 0,
                costlevel: 0.0,
            };
            n
        ];

        if ctrl.allcand {
            for i in 0..n {
                cand[i].treelevel = tree.level(i);
            }
            return Ok(CandidateMap { cand });
        }

        // Top-down: a son inherits its father's candidate range (the
        // proportional mapper narrows it later); roots keep the full
        // range assigned above.
        let order: Vec<CblkId> = {
            let mut order = tree.postorder();
            order.reverse();
            order
        };
        for &i in &order {
            cand[i].treelevel = tree.level(i);
            if let Some(f) = tree.father(i) {
                cand[i].fcandnum = cand[f].fcandnum;
                cand[i].lcandnum = cand[f].lcandnum;
            }
        }

        Ok(CandidateMap { cand })
    }

    /// Maps each core's candidate range down to a cluster range using
    /// `core2clust`, populating `fccandnum`/`lccandnum` (candSetClusterCand).
    pub fn set_cluster_cand(&mut self, ctrl: &BlendCtrl) -> Result<(), BlendError> {
        if ctrl.core2clust.is_empty() {
            for c in &mut self.cand {
                c.fccandnum = 0;
                c.lccandnum = 0;
            }
            return Ok(());
        }
        for c in &mut self.cand {
            if c.lcandnum >= ctrl.core2clust.len() {
                return Err(BlendError::invariant(
                    "candidate core range exceeds core2clust length",
                ));
            }
            let clusters = &ctrl.core2clust[c.fcandnum..=c.lcandnum];
            c.fccandnum = *clusters.iter().min().unwrap();
            c.lccandnum = *clusters.iter().max().unwrap();
        }
        Ok(())
    }

    /// Validates that every son's candidate range is contained in its
    /// father's (candCheck), i.e. that mapping only ever narrows.
    pub fn check(&self, tree: &EliminTree) -> Result<(), BlendError> {
        for i in 0..self.cand.len() {
            if let Some(f) = tree.father(i) {
                let son = &self.cand[i];
                let dad = &self.cand[f];
                if son.fcandnum < dad.fcandnum || son.lcandnum > dad.lcandnum {
                    return Err(BlendError::invariant(format!(
                        "cblk {i} candidate range [{},{}] escapes father {f}'s [{},{}]",
                        son.fcandnum, son.lcandnum, dad.fcandnum, dad.lcandnum
                    )));
                }
            }
        }
        Ok(())
    }
}
