//! Elimination tree over column-blocks (C2): each non-root cblk has
//! exactly one father, determined by the row range of its first
//! off-diagonal block. Storage mirrors `eTreeNode_t{sonsnbr,fathnum,
//! fsonnum}` plus a CSR `sonstab` array in
//! `original_source/blend/elimin.h`.

use crate::error::BlendError;
use crate::symbol::SymbolMatrix;
use crate::CblkId;

#[derive(Debug, Clone, PartialEq)]
pub struct EliminTree {
    father: Vec<Option<CblkId>>,
    son_start: Vec<usize>,
    sons: Vec<CblkId>,
    /// Depth from the root (roots are level 0), used by the candidate
    /// builder and the cost model's top-down passes.
    level: Vec<usize>,
    roots: Vec<CblkId>,
}

impl EliminTree {
    /// Builds the tree from `symbol`: the father of cblk `i` is the
    /// facing cblk of its first off-diagonal block, or `None` if `i`
    /// has no off-diagonal blocks (a root).
    pub fn build(symbol: &SymbolMatrix) -> Result<Self, BlendError> {
        let n = symbol.cblknbr();
        let mut father = vec![None; n];

        for i in 0..n {
            let bloks = symbol.bloks_of(i);
            if let Some(first_odb) = bloks.get(1) {
                if first_odb.fcblknm <= i {
                    return Err(BlendError::invariant(format!(
                        "cblk {i} off-diagonal block targets non-ascendant cblk {}",
                        first_odb.fcblknm
                    )));
                }
                father[i] = Some(first_odb.fcblknm);
            }
        }

        let mut son_count = vec![0usize; n];
        for f in father.iter().flatten() {
            son_count[*f] += 1;
        }
        let mut son_start = vec![0usize; n + 1];
        for i in 0..n {
            son_start[i + 1] = son_start[i] + son_count[i];
        }
        let mut cursor = son_start.clone();
        let mut sons = vec![0usize; son_start[n]];
        for i in 0..n {
            if let Some(f) = father[i] {
                sons[cursor[f]] = i;
                cursor[f] += 1;
            }
        }

        let roots: Vec<CblkId> = (0..n).filter(|&i| father[i].is_none()).collect();

        let mut level = vec![usize::MAX; n];
        let mut stack: Vec<(CblkId, usize)> = roots.iter().map(|&r| (r, 0)).collect();
        while let Some((node, lvl)) = stack.pop() {
            level[node] = lvl;
            for &son in &sons[son_start[node]..son_start[node + 1]] {
                stack.push((son, lvl + 1));
            }
        }

        Ok(EliminTree {
            father,
            son_start,
            sons,
            level,
            roots,
        })
    }

    pub fn cblknbr(&self) -> usize {
        self.father.len()
    }

    pub fn father(&self, i: CblkId) -> Option<CblkId> {
        self.father[i]
    }

    pub fn sons(&self, i: CblkId) -> &[CblkId] {
        &self.sons[self.son_start[i]..self.son_start[i + 1]]
    }

    pub fn level(&self, i: CblkId) -> usize {
        self.level[i]
    }

    pub fn roots(&self) -> &[CblkId] {
        &self.roots
    }

    /// Visits nodes in a single topological (sons-before-father) order,
    /// ties between ready siblings broken by ascending cblk id, matching
    /// the deterministic traversal spec.md requires of the cost model and
    /// the simulator.
    pub fn postorder(&self) -> Vec<CblkId> {
        let n = self.cblknbr();
        let mut remaining: Vec<usize> = (0..n)
            .map(|i| self.sons(i).len())
            .collect();
        let mut ready: std::collections::BinaryHeap<std::cmp::Reverse<CblkId>> = (0..n)
            .filter(|&i| remaining[i] == 0)
            .map(std::cmp::Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(std::cmp::Reverse(node)) = ready.pop() {
            order.push(node);
            if let Some(f) = self.father[node] {
                remaining[f] -= 1;
                if remaining[f] == 0 {
                    ready.push(std::cmp::Reverse(f));
                }
            }
        }
        order
    }
}
