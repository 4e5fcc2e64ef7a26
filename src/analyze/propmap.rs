//! Proportional mapping (C6): partitions a father's candidate core
//! range among its sons in proportion to each son's subtree cost,
//! top-down from the roots. The pack has no `propmap.c` implementation;
//! see `DESIGN.md` for what it does carry (the `propMappTree` prototype
//! and the `PASTIX_BLEND_PROPMAP_2STEPS` call-site ordering) and what is
//! this crate's own design against that contract.

use crate::analyze::candidate::CandidateMap;
use crate::analyze::cost::CostMatrix;
use crate::analyze::elimtree::EliminTree;
use crate::config::BlendCtrl;
use crate::error::BlendError;
use crate::CblkId;

/// Narrows `map`'s candidate ranges in place, top-down, splitting a
/// father's `[fcandnum, lcandnum]` range among its sons proportionally
/// to `cost.subtree_cost(son)`.
///
/// `ctrl.nocrossproc` (spec.md §4.5) selects between two partition
/// styles:
/// - `true` (hard partition): every core belongs to exactly one son's
///   range; each boundary is rounded once and reused as both the
///   previous son's end and the next son's start, so ranges tile the
///   father's range with no gap and no overlap.
/// - `false` (soft partition): each son's range is expanded outward to
///   the floor/ceil of its fractional cumulative-cost boundary, so a
///   core whose ideal split point falls strictly between two integers
///   is claimed by both neighbors instead of being hard-assigned to
///   one — smoothing the rounding error spec.md §4.5 describes, at the
///   cost of that core appearing in two candidate sets.
pub fn run(
    tree: &EliminTree,
    cost: &CostMatrix,
    map: &mut CandidateMap,
    ctrl: &BlendCtrl,
) -> Result<(), BlendError> {
    if ctrl.allcand {
        return Ok(());
    }

    let mut stack: Vec<CblkId> = tree.roots().to_vec();
    stack.sort_unstable();
    while let Some(node) = stack.pop() {
        let sons = tree.sons(node);
        if sons.is_empty() {
            continue;
        }

        let dad = map.cand[node];
        let total_cores = dad.core_count();
        let total_cost: f64 = sons.iter().map(|&s| cost.subtree_cost(s)).sum();

        if ctrl.nocrossproc {
            let mut cursor = dad.fcandnum;
            if total_cost <= 0.0 {
                // Degenerate (zero-cost subtrees): split cores evenly.
                let share = (total_cores / sons.len()).max(1);
                for (idx, &son) in sons.iter().enumerate() {
                    let lo = cursor;
                    let hi = if idx + 1 == sons.len() {
                        dad.lcandnum
                    } else {
                        (lo + share - 1).min(dad.lcandnum)
                    };
                    map.cand[son].fcandnum = lo;
                    map.cand[son].lcandnum = hi;
                    cursor = hi + 1;
                }
            } else {
                for (idx, &son) in sons.iter().enumerate() {
                    let lo = cursor;
                    let hi = if idx + 1 == sons.len() {
                        dad.lcandnum
                    } else {
                        let share = ((cost.subtree_cost(son) / total_cost)
                            * total_cores as f64)
                            .round() as usize;
                        (lo + share.max(1) - 1).min(dad.lcandnum)
                    };
                    map.cand[son].fcandnum = lo;
                    map.cand[son].lcandnum = hi;
                    cursor = hi + 1;
                }
            }
        } else {
            // Cumulative fractional boundary positions within
            // [dad.fcandnum, dad.lcandnum], proportional to subtree cost
            // (even split when every subtree is zero-cost).
            let mut bounds = Vec::with_capacity(sons.len() + 1);
            bounds.push(dad.fcandnum as f64);
            let mut acc = dad.fcandnum as f64;
            for &son in sons {
                let share = if total_cost > 0.0 {
                    cost.subtree_cost(son) / total_cost
                } else {
                    1.0 / sons.len() as f64
                };
                acc += share * total_cores as f64;
                bounds.push(acc);
            }

            for (idx, &son) in sons.iter().enumerate() {
                let lo = if idx == 0 {
                    dad.fcandnum
                } else {
                    (bounds[idx].floor() as usize).clamp(dad.fcandnum, dad.lcandnum)
                };
                let hi = if idx + 1 == sons.len() {
                    dad.lcandnum
                } else {
                    (bounds[idx + 1].ceil() as usize)
                        .saturating_sub(1)
                        .clamp(lo, dad.lcandnum)
                };
                map.cand[son].fcandnum = lo;
                map.cand[son].lcandnum = hi;
            }
        }

        stack.extend(sons.iter().copied());
    }

    map.check(tree)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{SymbolBlok, SymbolCblk};
    use crate::SymbolMatrix;

    fn two_sons_one_father() -> SymbolMatrix {
        // cblk0 (big), cblk1 (small) both feed into cblk2.
        SymbolMatrix {
            baseval: 0,
            dof: 1,
            nodenbr: 10,
            cblktab: vec![
                SymbolCblk { fcolnum: 0, lcolnum: 7, bloknum: 0, brownum: 0 },
                SymbolCblk { fcolnum: 8, lcolnum: 8, bloknum: 2, brownum: 0 },
                SymbolCblk { fcolnum: 9, lcolnum: 9, bloknum: 4, brownum: 0 },
            ],
            bloktab: vec![
                SymbolBlok { frownum: 0, lrownum: 7, lcblknm: 0, fcblknm: 0 },
                SymbolBlok { frownum: 9, lrownum: 9, lcblknm: 0, fcblknm: 2 },
                SymbolBlok { frownum: 8, lrownum: 8, lcblknm: 1, fcblknm: 1 },
                SymbolBlok { frownum: 9, lrownum: 9, lcblknm: 1, fcblknm: 2 },
                SymbolBlok { frownum: 9, lrownum: 9, lcblknm: 2, fcblknm: 2 },
            ],
            browtab: vec![],
        }
    }

    #[test]
    fn splits_cores_proportionally_to_subtree_cost() {
        let sym = two_sons_one_father();
        let tree = EliminTree::build(&sym).unwrap();
        let cost = CostMatrix::build(&sym, &tree);
        let mut ctrl = BlendCtrl::default();
        ctrl.total_nbcores = 8;
        let mut map = CandidateMap::build(&sym, &tree, &ctrl).unwrap();
        run(&tree, &cost, &mut map, &ctrl).unwrap();

        assert_eq!(map.cand[0].fcandnum, 0);
        assert_eq!(map.cand[1].lcandnum, 7);
        assert!(map.cand[0].core_count() >= map.cand[1].core_count());
        map.check(&tree).unwrap();
    }

    fn two_equal_sons_one_father() -> SymbolMatrix {
        // cblk0 and cblk1, equal width (hence equal subtree cost), both
        // feed into cblk2.
        SymbolMatrix {
            baseval: 0,
            dof: 1,
            nodenbr: 3,
            cblktab: vec![
                SymbolCblk { fcolnum: 0, lcolnum: 0, bloknum: 0, brownum: 0 },
                SymbolCblk { fcolnum: 1, lcolnum: 1, bloknum: 2, brownum: 0 },
                SymbolCblk { fcolnum: 2, lcolnum: 2, bloknum: 4, brownum: 0 },
            ],
            bloktab: vec![
                SymbolBlok { frownum: 0, lrownum: 0, lcblknm: 0, fcblknm: 0 },
                SymbolBlok { frownum: 2, lrownum: 2, lcblknm: 0, fcblknm: 2 },
                SymbolBlok { frownum: 1, lrownum: 1, lcblknm: 1, fcblknm: 1 },
                SymbolBlok { frownum: 2, lrownum: 2, lcblknm: 1, fcblknm: 2 },
                SymbolBlok { frownum: 2, lrownum: 2, lcblknm: 2, fcblknm: 2 },
            ],
            browtab: vec![],
        }
    }

    #[test]
    fn hard_partition_never_shares_a_core_between_siblings() {
        let sym = two_equal_sons_one_father();
        let tree = EliminTree::build(&sym).unwrap();
        let cost = CostMatrix::build(&sym, &tree);
        let mut ctrl = BlendCtrl::default();
        ctrl.total_nbcores = 3;
        ctrl.nocrossproc = true;
        let mut map = CandidateMap::build(&sym, &tree, &ctrl).unwrap();
        run(&tree, &cost, &mut map, &ctrl).unwrap();

        assert!(map.cand[0].lcandnum < map.cand[1].fcandnum);
    }

    #[test]
    fn soft_partition_shares_a_boundary_core_between_equal_cost_siblings() {
        let sym = two_equal_sons_one_father();
        let tree = EliminTree::build(&sym).unwrap();
        let cost = CostMatrix::build(&sym, &tree);
        let mut ctrl = BlendCtrl::default();
        ctrl.total_nbcores = 3;
        ctrl.nocrossproc = false;
        let mut map = CandidateMap::build(&sym, &tree, &ctrl).unwrap();
        run(&tree, &cost, &mut map, &ctrl).unwrap();

        // The ideal split point (1.5) sits strictly between cores 1 and 2,
        // so both siblings claim core 1 instead of one of them losing it
        // to rounding.
        assert_eq!(map.cand[0].fcandnum, 0);
        assert_eq!(map.cand[0].lcandnum, 1);
        assert_eq!(map.cand[1].fcandnum, 1);
        assert_eq!(map.cand[1].lcandnum, 2);
        map.check(&tree).unwrap();
    }
}
