//! Symbol splitter (C5): subdivides any cblk wider than `blcolmax` into
//! `k = ceil(width / blcolmax)` roughly-equal column blocks, so no task
//! produced downstream exceeds the configured granularity, and exposes
//! 2D tiling by re-splitting off-diagonal blocks against the new
//! boundaries. The pack carries no `symbolSplit` implementation file;
//! `blcolmin`/`blcolmax` only appear as `BlendCtrl` fields in
//! `original_source/blend/blendctrl.c` (see DESIGN.md) — the splitting
//! algorithm itself is this crate's own design built to their documented
//! meaning.

use crate::analyze::candidate::{Cand, CandidateMap};
use crate::config::BlendCtrl;
use crate::error::BlendError;
use crate::symbol::{CblkType, SymbolBlok, SymbolCblk, SymbolMatrix};
use crate::CblkId;

/// Result of splitting: the new symbol matrix, plus `old_of[new_id]`
/// mapping each new cblk back to the original it was split from, so
/// candidate/cost data can be replicated onto the fragments.
pub struct SplitResult {
    pub symbol: SymbolMatrix,
    pub old_of: Vec<CblkId>,
}

/// Column boundaries a cblk of width `width` is cut into, each bounded
/// above by `blcolmax` and, where possible, at least `blcolmin`.
fn cuts(width: usize, blcolmin: usize, blcolmax: usize) -> Vec<usize> {
    if width <= blcolmax {
        return vec![width];
    }
    let k = width.div_ceil(blcolmax);
    let base = width / k;
    let rem = width % k;
    let mut parts: Vec<usize> = (0..k)
        .map(|i| if i < rem { base + 1 } else { base })
        .collect();
    // Merge a final undersized fragment into its predecessor rather than
    // leaving a sliver narrower than blcolmin.
    if parts.len() > 1 && *parts.last().unwrap() < blcolmin {
        let last = parts.pop().unwrap();
        *parts.last_mut().unwrap() += last;
    }
    parts
}

pub fn run(
    symbol: &SymbolMatrix,
    cand: &CandidateMap,
    ctrl: &BlendCtrl,
) -> Result<(SplitResult, CandidateMap), BlendError> {
    let blcolmin = ctrl.solver.blcolmin;
    let blcolmax = ctrl.solver.blcolmax;

    // new_first[i] = first new cblk id the fragments of old cblk i start
    // at; new_count[i] = how many fragments it produced.
    let mut new_first = vec![0usize; symbol.cblknbr()];
    let mut new_count = vec![0usize; symbol.cblknbr()];
    let mut total_new = 0usize;
    for i in 0..symbol.cblknbr() {
        let width = symbol.cblktab[i].colnbr();
        let parts = cuts(width, blcolmin, blcolmax);
        new_first[i] = total_new;
        new_count[i] = parts.len();
        total_new += parts.len();
    }

    let mut new_cblktab = Vec::with_capacity(total_new);
    let mut old_of = Vec::with_capacity(total_new);
    // fragment column ranges, per old cblk, for facing-block re-split.
    let mut frag_ranges: Vec<Vec<(usize, usize, CblkId)>> = vec![Vec::new(); symbol.cblknbr()];

    for i in 0..symbol.cblknbr() {
        let old = &symbol.cblktab[i];
        let width = old.colnbr();
        let parts = cuts(width, blcolmin, blcolmax);
        let mut col = old.fcolnum;
        for part_width in &parts {
            let new_id = new_cblktab.len();
            let fcol = col;
            let lcol = col + part_width - 1;
            new_cblktab.push(SymbolCblk {
                fcolnum: fcol,
                lcolnum: lcol,
                bloknum: 0, // filled once bloktab is built
                brownum: 0,
            });
            old_of.push(i);
            frag_ranges[i].push((fcol, lcol, new_id));
            col = lcol + 1;
        }
    }

    // Remap old cblk id -> new cblk id given a column number within it.
    let frag_for_col = |old_cblk: CblkId, col: usize| -> CblkId {
        for &(fcol, lcol, new_id) in &frag_ranges[old_cblk] {
            if col >= fcol && col <= lcol {
                return new_id;
            }
        }
        unreachable!("column {col} not covered by any fragment of cblk {old_cblk}")
    };

    let mut new_bloktab: Vec<SymbolBlok> = Vec::new();
    let mut cblk_bloks: Vec<Vec<SymbolBlok>> = vec![Vec::new(); new_cblktab.len()];

    for i in 0..symbol.cblknbr() {
        let frags = &frag_ranges[i];
        // Diagonal + intra-cblk triangular part: fragment j's diagonal
        // block is itself; fragments after it see a block representing
        // the off-diagonal triangular remainder of fragment j's columns.
        for (j, &(_, _, new_j)) in frags.iter().enumerate() {
            let (fcol_j, lcol_j, _) = frags[j];
            cblk_bloks[new_j].push(SymbolBlok {
                frownum: fcol_j,
                lrownum: lcol_j,
                lcblknm: new_j,
                fcblknm: new_j,
            });
            for &(fcol_k, lcol_k, new_k) in frags.iter().skip(j + 1) {
                cblk_bloks[new_j].push(SymbolBlok {
                    frownum: fcol_k,
                    lrownum: lcol_k,
                    lcblknm: new_j,
                    fcblknm: new_k,
                });
            }
        }

        // External off-diagonal blocks: re-split each original block's
        // row range against the facing cblk's new fragment boundaries,
        // once per source fragment that the block's *column* range
        // (i.e. this cblk's own fragments) spans — a block belongs to
        // every fragment of `i` it was already attached to, which is
        // all of them, since original blocks apply to all of cblk i's
        // columns equally (triangular factor is applied whole).
        for blok in symbol.bloks_of(i).iter().skip(1) {
            let target_frags = &frag_ranges[blok.fcblknm];
            for &(tfcol, tlcol, new_target) in target_frags {
                let lo = blok.frownum.max(tfcol);
                let hi = blok.lrownum.min(tlcol);
                if lo > hi {
                    continue;
                }
                for &(_, _, new_j) in frags {
                    cblk_bloks[new_j].push(SymbolBlok {
                        frownum: lo,
                        lrownum: hi,
                        lcblknm: new_j,
                        fcblknm: new_target,
                    });
                }
            }
        }
    }

    for bloks in &mut cblk_bloks {
        bloks.sort_by_key(|b| (b.frownum, b.fcblknm));
        bloks.dedup();
    }

    for (new_id, bloks) in cblk_bloks.into_iter().enumerate() {
        new_cblktab[new_id].bloknum = new_bloktab.len();
        new_bloktab.extend(bloks);
    }

    // browtab: rebuild as reverse adjacency from the new bloktab.
    let mut brow_lists: Vec<Vec<usize>> = vec![Vec::new(); new_cblktab.len()];
    for (idx, b) in new_bloktab.iter().enumerate() {
        if b.fcblknm != b.lcblknm {
            brow_lists[b.fcblknm].push(idx);
        }
    }
    let mut new_browtab = Vec::new();
    for (new_id, list) in brow_lists.into_iter().enumerate() {
        new_cblktab[new_id].brownum = new_browtab.len();
        new_browtab.extend(list);
    }

    let new_symbol = SymbolMatrix {
        baseval: symbol.baseval,
        dof: symbol.dof,
        nodenbr: symbol.nodenbr,
        cblktab: new_cblktab,
        bloktab: new_bloktab,
        browtab: new_browtab,
    };
    new_symbol.check()?;

    let new_cand = cand
        .cand
        .iter()
        .enumerate()
        .flat_map(|(i, c)| std::iter::repeat(*c).take(new_count[i]))
        .collect::<Vec<Cand>>();

    Ok((
        SplitResult {
            symbol: new_symbol,
            old_of,
        },
        CandidateMap { cand: new_cand },
    ))
}

/// Flags cblks whose post-split width and tree level qualify for 2D
/// tile tasks (`CBLK_TASKS_2D`/`CBLK_LAYOUT_2D`), per
/// `SolverParams::tasks2d_level`/`tasks2d_width` (spec.md §6).
pub fn mark_2d_tasks(symbol: &SymbolMatrix, cand: &mut CandidateMap, ctrl: &BlendCtrl) {
    for i in 0..symbol.cblknbr() {
        let width = symbol.cblktab[i].colnbr();
        let odb = symbol.odb_count(i);
        if width >= ctrl.solver.tasks2d_width
            && cand.cand[i].treelevel >= ctrl.solver.tasks2d_level
            && odb > 0
        {
            cand.cand[i].cblktype.set(CblkType::TASKS_2D, true);
            cand.cand[i].cblktype.set(CblkType::LAYOUT_2D, true);
        }
    }
}

/// Flags cblks eligible for low-rank compression (`CBLK_COMPRESSED`): a
/// cblk qualifies once its own width clears
/// `CompressionParams::compress_min_width` and at least one of its
/// off-diagonal blocks is tall enough to clear
/// `CompressionParams::compress_min_height` — the same pair of
/// thresholds [`crate::solver::SolverMatrix::factorize_sequential`]
/// checks before calling `ge2lr` on a block. Without this pass no cblk
/// ever carries the bit, so compression never fires downstream
/// regardless of `compress_when`; with `compress_when == Never` nothing
/// is marked since there is no reason to pay the (harmless) bookkeeping.
pub fn mark_compressed(symbol: &SymbolMatrix, cand: &mut CandidateMap, ctrl: &BlendCtrl) {
    if ctrl.compression.compress_when == crate::config::CompressWhen::Never {
        return;
    }
    for i in 0..symbol.cblknbr() {
        let width = symbol.cblktab[i].colnbr();
        if width < ctrl.compression.compress_min_width {
            continue;
        }
        let qualifies = symbol
            .bloks_of(i)
            .iter()
            .skip(1)
            .any(|b| b.rownbr() >= ctrl.compression.compress_min_height);
        if qualifies {
            cand.cand[i].cblktype.set(CblkType::COMPRESSED, true);
        }
    }
}
