//! The analyze ("blend") pipeline glue (C2-C8): builds the elimination
//! tree, cost model, and candidate map; splits the symbol matrix to
//! the configured block-size bounds; proportionally maps cores over
//! the tree; runs the scheduling simulation; and compacts everything
//! into a local [`crate::solver::SolverMatrix`].
//!
//! Each stage is wrapped in a `tracing::info_span!` so a verbose caller
//! gets the per-step timings spec.md §7 asks for (`ORDER`/`SYMBFACT`
//! live upstream of this crate; `BLEND` is this pipeline, `FACT`/`SOLVE`
//! are the numerical phase in [`crate::solver`]).

pub mod candidate;
pub mod cost;
pub mod elimtree;
pub mod propmap;
pub mod simulate;
pub mod solvergen;
pub mod split;

use crate::config::BlendCtrl;
use crate::error::BlendError;
use crate::solver::SolverMatrix;
use crate::symbol::SymbolMatrix;
use tracing::info_span;

/// Summary counters produced alongside the [`SolverMatrix`], mirroring
/// the per-step statistics spec.md §7 asks for at verbose log levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzeStats {
    pub cblknbr: usize,
    pub bloknbr: usize,
    pub ftgtnbr: usize,
    /// Theoretical flop count (sum of every cblk's compute + contribution
    /// cost), in the dimensionless units of [`cost::CostMatrix`].
    pub flop_total: f64,
    /// Total factor storage divided by the dense triangle's area: a
    /// cheap proxy for the fill-in ratio relative to a dense Cholesky.
    pub fill_in_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct AnalyzeResult {
    pub solver: SolverMatrix,
    pub stats: AnalyzeStats,
}

/// Runs C2-C8 over `symbol`, producing the local [`SolverMatrix`] for a
/// single process per `ctrl`.
///
/// `ctrl.split_before_propmap` selects between the two orderings spec.md
/// §9's `PASTIX_BLEND_PROPMAP_2STEPS` open question leaves unresolved:
/// splitting first so the cost model and proportional mapper see
/// post-split granularity, or mapping the unsplit tree and replicating
/// the result onto the split fragments. See `DESIGN.md` for the
/// rationale behind defaulting to the split-first path.
pub fn run(symbol: &SymbolMatrix, ctrl: &BlendCtrl) -> Result<AnalyzeResult, BlendError> {
    ctrl.validate()?;
    symbol.check()?;

    let (final_symbol, mut final_cand) = {
        let _span = info_span!("blend_prepare").entered();
        let tree0 = elimtree::EliminTree::build(symbol)?;

        if ctrl.split_before_propmap {
            let cand0 = candidate::CandidateMap::build(symbol, &tree0, ctrl)?;
            let (split_result, cand1) = split::run(symbol, &cand0, ctrl)?;
            (split_result.symbol, cand1)
        } else {
            let cost0 = cost::CostMatrix::build(symbol, &tree0);
            let mut cand0 = candidate::CandidateMap::build(symbol, &tree0, ctrl)?;
            propmap::run(&tree0, &cost0, &mut cand0, ctrl)?;
            let (split_result, cand1) = split::run(symbol, &cand0, ctrl)?;
            (split_result.symbol, cand1)
        }
    };

    let tree = elimtree::EliminTree::build(&final_symbol)?;
    let cost = cost::CostMatrix::build(&final_symbol, &tree);

    // Splitting introduces new cblk ids with their own tree depth; the
    // pre-split `treelevel` every fragment inherited from its parent is
    // stale regardless of which path above ran, so refresh it against
    // the post-split tree before it drives 2D-task promotion or mapping.
    for i in 0..final_symbol.cblknbr() {
        final_cand.cand[i].treelevel = tree.level(i);
    }

    if ctrl.split_before_propmap {
        let _span = info_span!("blend_propmap").entered();
        propmap::run(&tree, &cost, &mut final_cand, ctrl)?;
    } else {
        final_cand.check(&tree)?;
    }

    split::mark_2d_tasks(&final_symbol, &mut final_cand, ctrl);
    split::mark_compressed(&final_symbol, &mut final_cand, ctrl);
    final_cand.set_cluster_cand(ctrl)?;

    tracing::info!(
        cblknbr = final_symbol.cblknbr(),
        bloknbr = final_symbol.bloknbr(),
        "blend: split and proportional mapping complete"
    );

    let sim = {
        let _span = info_span!("blend_simulate").entered();
        simulate::run(&final_symbol, &tree, &cost, &final_cand)?
    };

    let solver = {
        let _span = info_span!("blend_solvergen").entered();
        solvergen::run(&final_symbol, &final_cand, &sim, ctrl)?
    };

    let flop_total: f64 = cost.cblk.iter().map(|c| c.total).sum();
    let fill_in_ratio = if final_symbol.nodenbr > 0 {
        let factor_area: f64 = solver
            .cblktab
            .iter()
            .map(|c| (c.coef.nrows() * c.coef.ncols()) as f64)
            .sum();
        factor_area / (final_symbol.nodenbr as f64 * final_symbol.nodenbr as f64)
    } else {
        0.0
    };

    let stats = AnalyzeStats {
        cblknbr: solver.cblknbr(),
        bloknbr: solver.bloktab.len(),
        ftgtnbr: solver.ftgttab.len(),
        flop_total,
        fill_in_ratio,
    };
    tracing::info!(?stats, "blend: analyze complete");

    Ok(AnalyzeResult { solver, stats })
}
