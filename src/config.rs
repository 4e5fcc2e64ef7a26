//! Explicit configuration records for the analyze pipeline and the
//! numerical kernels.
//!
//! Per the design notes (spec.md §9) these are plain `serde`-derived
//! structs rather than a global options registry — the teacher crate
//! already depends on `serde` with the `derive` feature for its own
//! option types, so this crate reuses that, without the teacher's
//! proc-macro option-registry machinery (see `DESIGN.md`).

use serde::{Deserialize, Serialize};

/// Factorization variant. Drives the diagonal-block kernel and the
/// arithmetic cost model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Factorization {
    /// Cholesky, `A = L L^T`, SPD matrices only.
    Llt,
    /// `A = L D L^T`.
    Ldlt,
    /// `A = L U`, general matrices.
    Lu,
    /// Hermitian Cholesky, `A = L L^H`.
    Llh,
    /// Hermitian `A = L D L^H`.
    Ldlh,
}

/// When to apply low-rank compression during the numerical phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressWhen {
    Never,
    Begin,
    End,
    During,
}

/// Which dense-to-low-rank compression kernel to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressMethod {
    Svd,
    Rrqr,
}

/// Scheduler back-end selecting how `ttsktab` is consumed. Only
/// `Sequential` and `Static` are implemented in-process here; `Dynamic`,
/// `Parsec`, and `StarPU` are external runtime back-ends reachable over
/// the same task/data contracts (spec.md §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheduler {
    Sequential,
    Static,
    Dynamic,
    Parsec,
    StarPu,
}

/// Low-rank compression thresholds and tolerance (spec.md §6's
/// `COMPRESS_*` parameters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionParams {
    pub compress_when: CompressWhen,
    pub compress_method: CompressMethod,
    /// Minimum cblk width to consider a supernode for compression.
    pub compress_min_width: usize,
    /// Minimum off-diagonal block height to consider compressing it.
    pub compress_min_height: usize,
    /// Absolute compression tolerance (relative to the block's Frobenius
    /// norm), used by `ge2lr`/`rradd`.
    pub tolerance: f64,
    /// Denominator of the rank promotion-to-dense rule: a compressed
    /// result with `rank > min(m, n) / minratio` is stored dense
    /// instead. PaStiX's default (`PASTIX_LR_MINRATIO`) is 2.
    pub minratio: usize,
}

impl Default for CompressionParams {
    fn default() -> Self {
        Self {
            compress_when: CompressWhen::Never,
            compress_method: CompressMethod::Svd,
            compress_min_width: 128,
            compress_min_height: 128,
            tolerance: 1e-8,
            minratio: 2,
        }
    }
}

/// Block-size bounds and 2D-task thresholds used by the symbol splitter
/// and candidate builder (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverParams {
    /// Lower bound on a cblk's column count after splitting.
    pub blcolmin: usize,
    /// Upper bound on a cblk's column count after splitting; cblks wider
    /// than this are subdivided by the symbol splitter.
    pub blcolmax: usize,
    /// Elimination-tree depth at or above which 2D tile tasks are
    /// considered (counted from the root).
    pub tasks2d_level: usize,
    /// Minimum cblk width to promote to 2D tile tasks.
    pub tasks2d_width: usize,
    /// Elimination-tree depth at or above which distribution favors 1D
    /// over 2D tasks (`DISTRIBUTION_LEVEL`).
    pub distribution_level: usize,
    /// Ratio limit controlling 1D/2D task promotion.
    pub ratiolimit: f64,
    /// Static pivoting threshold (`EPSILON_MAGN_CTRL`): diagonal entries
    /// with magnitude below this are replaced by this value.
    pub epsilon_magn_ctrl: f64,
    /// Factorization variant.
    pub factorization: Factorization,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            blcolmin: 8,
            blcolmax: 128,
            tasks2d_level: 0,
            tasks2d_width: 256,
            distribution_level: 0,
            ratiolimit: 0.0,
            epsilon_magn_ctrl: 1e-10,
            factorization: Factorization::Ldlt,
        }
    }
}

/// Top-level control structure threaded through the analyze pipeline,
/// grouping resource counts, mapping options, and the nested parameter
/// records above. Named after `BlendCtrl`, the control struct every
/// `original_source/pastix/blend/*.c` analyze routine takes by pointer
/// (e.g. `blendCtrlInit` in `blendctrl.c`, `eliminTreeBuild` in
/// `eliminfunc.c`); the pack carries no header defining its fields, so
/// only the name and role — one struct threaded through every analyze
/// stage — are grounded, not a field layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendCtrl {
    pub solver: SolverParams,
    pub compression: CompressionParams,
    /// Total number of cores across all processes/clusters.
    pub total_nbcores: usize,
    /// Number of computation threads in this process.
    pub thread_nbr: usize,
    /// Number of CUDA devices available (kernels dispatched here never
    /// target them; see spec.md §1).
    pub cuda_nbr: usize,
    pub scheduler: Scheduler,
    /// When true, a core never belongs to two sibling candidate sets
    /// (hard partition in proportional mapping); when false, rounding
    /// may share one core between adjacent siblings.
    pub nocrossproc: bool,
    /// Debug/reference configuration: every node inherits the full
    /// `[0, total_nbcores-1]` candidate set.
    pub allcand: bool,
    /// Map from local core id to local cluster id, used by
    /// `candSetClusterCand`.
    pub core2clust: Vec<usize>,
    /// Enables the lenient ILU(k) block-matching mode in
    /// `symbolGetFacingBloknum`.
    pub incomplete: bool,
    pub level_of_fill: usize,
    /// Resolves the `PASTIX_BLEND_PROPMAP_2STEPS` open question
    /// (spec.md §9): when true, [`crate::analyze::run`] splits the
    /// symbol matrix before proportional mapping, so the cost model and
    /// mapping see post-split granularity (the two-step path); when
    /// false, mapping runs on the unsplit tree first and is then
    /// replicated onto the split fragments. See `DESIGN.md` for the
    /// rationale.
    pub split_before_propmap: bool,
}

impl BlendCtrl {
    /// Sanity-checks cross-field constraints not expressible as types
    /// (spec.md §7 `BadParameter`).
    pub fn validate(&self) -> Result<(), crate::error::BlendError> {
        if self.solver.blcolmin > self.solver.blcolmax {
            return Err(crate::error::BlendError::bad_parameter(format!(
                "blcolmin ({}) > blcolmax ({})",
                self.solver.blcolmin, self.solver.blcolmax
            )));
        }
        if self.total_nbcores == 0 {
            return Err(crate::error::BlendError::bad_parameter(
                "total_nbcores must be positive",
            ));
        }
        if self.thread_nbr == 0 {
            return Err(crate::error::BlendError::bad_parameter(
                "thread_nbr must be positive",
            ));
        }
        if !self.core2clust.is_empty() && self.core2clust.len() != self.total_nbcores {
            return Err(crate::error::BlendError::bad_parameter(
                "core2clust length must equal total_nbcores",
            ));
        }
        Ok(())
    }
}

impl Default for BlendCtrl {
    fn default() -> Self {
        Self {
            solver: SolverParams::default(),
            compression: CompressionParams::default(),
            total_nbcores: 1,
            thread_nbr: 1,
            cuda_nbr: 0,
            scheduler: Scheduler::Static,
            nocrossproc: true,
            allcand: false,
            core2clust: Vec::new(),
            incomplete: false,
            level_of_fill: 0,
            split_before_propmap: true,
        }
    }
}
