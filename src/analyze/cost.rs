//! Flop and communication cost model (C3), grounded on
//! `original_source/pastix/blend/cost.c`'s `costMatrixBuild`/
//! `cblkComputeCost`. Costs flow bottom-up over the elimination tree:
//! each cblk's subtree cost is its own compute cost plus the subtree
//! cost of every son.

use crate::analyze::elimtree::EliminTree;
use crate::symbol::SymbolMatrix;
use crate::CblkId;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostCblk {
    /// Flops to factor this cblk's diagonal block and apply the TRSMs to
    /// its own off-diagonal blocks.
    pub compute: f64,
    /// `compute` plus the GEMM cost of updates this cblk contributes to
    /// its ancestors.
    pub total: f64,
    /// Sum of `total` over the whole subtree rooted at this cblk
    /// (inclusive); drives proportional mapping.
    pub subtree: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostBlok {
    /// Flops of the rank-`colnbr` update this block contributes to its
    /// facing cblk.
    pub contrib: f64,
    /// Row count, cached for the communication-volume estimate.
    pub linenbr: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostMatrix {
    pub cblk: Vec<CostCblk>,
    pub blok: Vec<CostBlok>,
}

/// Per-byte communication cost used when a contribution crosses cluster
/// boundaries; PaStiX switches this by interconnect (shared memory,
/// Infiniband, Ethernet). A single figure suffices here since clustering
/// is out of scope (spec.md Non-goals); keeping it as a named constant
/// documents where the bandwidth table would plug in.
pub const COMM_BYTE_COST: f64 = 1.0e-9;

impl CostMatrix {
    pub fn build(symbol: &SymbolMatrix, tree: &EliminTree) -> Self {
        let n = symbol.cblknbr();
        let mut blok = vec![CostBlok::default(); symbol.bloknbr()];
        let mut cblk = vec![CostCblk::default(); n];

        for i in 0..n {
            let c = &symbol.cblktab[i];
            let width = c.colnbr() as f64;
            let bloks = symbol.bloks_of(i);
            let diag_rows = bloks[0].rownbr() as f64;

            // Diagonal factorization: ~n^3/3 for POTRF/LDLT on an
            // n x n block.
            let mut compute = diag_rows.powi(3) / 3.0;

            for (offset, b) in bloks.iter().enumerate().skip(1) {
                let idx = symbol.cblktab[i].bloknum + offset;
                let rows = b.rownbr() as f64;
                // TRSM applying the diagonal factor to this panel.
                compute += rows * width * width;
                // GEMM update this block contributes to its facing cblk.
                let contrib = rows * rows * width;
                blok[idx] = CostBlok {
                    contrib,
                    linenbr: b.rownbr(),
                };
            }

            cblk[i].compute = compute;
        }

        // total[i] = compute[i] + sum of contributions cblk i makes to
        // its ancestors (i.e. its own off-diagonal blocks' GEMM cost).
        for i in 0..n {
            let extra: f64 = symbol
                .bloks_of(i)
                .iter()
                .enumerate()
                .skip(1)
                .map(|(offset, _)| blok[symbol.cblktab[i].bloknum + offset].contrib)
                .sum();
            cblk[i].total = cblk[i].compute + extra;
        }

        // subtree[i] = total[i] + sum of subtree[son] over sons, computed
        // bottom-up via the tree's topological order.
        for i in tree.postorder() {
            let sons_subtree: f64 = tree.sons(i).iter().map(|&s| cblk[s].subtree).sum();
            cblk[i].subtree = cblk[i].total + sons_subtree;
        }

        CostMatrix { cblk, blok }
    }

    pub fn subtree_cost(&self, i: CblkId) -> f64 {
        self.cblk[i].subtree
    }
}
