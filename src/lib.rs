//! Analyze ("blend") and supernodal numerical factorization core for a
//! parallel sparse direct solver.
//!
//! The crate takes a permuted, symbolically-factorized matrix (a
//! [`symbol::SymbolMatrix`]) and runs it through the analyze pipeline —
//! elimination tree, cost model, candidate mapping, symbol splitting,
//! proportional mapping, scheduling simulation, and solver-matrix
//! generation — to produce a per-process [`solver::SolverMatrix`] ready
//! for numerical factorization by the kernels in [`solver::kernels`].
//!
//! Ordering, symbolic factorization, matrix ingestion, and the
//! triangular solve are external collaborators and are out of scope
//! here; see `SPEC_FULL.md` for the exact boundary.

pub type Flt = f64;
pub type CblkId = usize;
pub type BlokId = usize;
pub type ProcId = usize;
pub type ClusterId = usize;
pub type ThreadId = usize;

pub mod config;
pub mod error;
pub mod render;
pub mod symbol;

pub mod analyze;
pub mod solver;

#[cfg(test)]
pub mod tests;

pub use config::{BlendCtrl, CompressionParams, Factorization, SolverParams};
pub use error::BlendError;
pub use solver::SolverMatrix;
pub use symbol::SymbolMatrix;

/// Runs the full analyze pipeline on `symbol`, producing the local solver
/// matrix for the (single, in-process) cluster described by `ctrl`.
///
/// This ties together C2-C8 in the order the data flow in the module
/// overview requires: elimination tree and cost model are built once,
/// candidates are mapped, the symbol matrix is (optionally) split and
/// remapped, the schedule is simulated, and the local solver matrix is
/// generated from the result. The public entry point returns
/// [`problemo::Problem`], the same boundary convention the teacher crate
/// uses for its linear-solver traits; everything beneath it keeps using
/// the flat [`error::BlendError`] internally.
pub fn analyze(
    symbol: &symbol::SymbolMatrix,
    ctrl: &config::BlendCtrl,
) -> Result<analyze::AnalyzeResult, problemo::Problem> {
    Ok(analyze::run(symbol, ctrl)?)
}
