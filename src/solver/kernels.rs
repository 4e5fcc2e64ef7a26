//! Supernodal numerical factorization kernels (C9): diagonal-block
//! panel factorization with static pivoting, the TRSM that propagates
//! the factor to the panel's off-diagonal blocks, and the GEMM update
//! variants that apply a block's contribution to a facing cblk.
//! Grounded on `core_zgetf2sp`/`core_zgemmsp` in
//! `original_source/kernels/core_zgetrfsp.c` and
//! `original_source/kernels/core_zgemmsp.c`.

use crate::config::Factorization;
use crate::solver::dense::{
    gemm_nt_sub, scale_columns, trsm_right_lower_transpose, trsm_right_unit_lower_transpose,
};
use faer::{Mat, MatMut};
use tracing::trace;

/// Outcome of factoring one diagonal block: how many entries were
/// clamped by static pivoting (spec.md's `NumericalPivot`, not a
/// failure — tracked as a counter the caller may report).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PivotReport {
    pub nbpivot: usize,
}

/// Factors the `n x n` diagonal block `a` in place per `kind`, clamping
/// any pivot with `|a_kk| < criteria` to `criteria` (same sign) rather
/// than exchanging rows — PaStiX's static pivoting, grounded on
/// `core_zgetf2sp`. For `Llt`/`Llh`, `a` becomes `L`; for `Ldlt`/`Ldlh`,
/// `a`'s strictly-lower part becomes `L` and `d` receives the diagonal;
/// for `Lu`, `a`'s lower/upper parts become `L`/`U` with unit diagonal
/// on `L`.
pub fn factor_diagonal(
    a: &mut MatMut<'_, f64>,
    d: &mut [f64],
    kind: Factorization,
    criteria: f64,
) -> PivotReport {
    let n = a.nrows();
    debug_assert_eq!(a.ncols(), n);
    let mut report = PivotReport::default();

    match kind {
        Factorization::Llt | Factorization::Llh => {
            for k in 0..n {
                let mut akk = a[(k, k)];
                if akk.abs() < criteria {
                    akk = criteria.copysign(if akk == 0.0 { 1.0 } else { akk });
                    report.nbpivot += 1;
                }
                let lkk = akk.max(criteria).sqrt();
                a[(k, k)] = lkk;
                for i in (k + 1)..n {
                    a[(i, k)] /= lkk;
                }
                for j in (k + 1)..n {
                    let ljk = a[(j, k)];
                    for i in j..n {
                        a[(i, j)] -= a[(i, k)] * ljk;
                    }
                }
            }
        }
        Factorization::Ldlt | Factorization::Ldlh => {
            for k in 0..n {
                let mut akk = a[(k, k)];
                if akk.abs() < criteria {
                    akk = criteria.copysign(if akk == 0.0 { 1.0 } else { akk });
                    report.nbpivot += 1;
                }
                d[k] = akk;
                for i in (k + 1)..n {
                    a[(i, k)] /= akk;
                }
                for j in (k + 1)..n {
                    let ljk = a[(j, k)] * akk;
                    for i in j..n {
                        a[(i, j)] -= a[(i, k)] * ljk;
                    }
                }
            }
        }
        Factorization::Lu => {
            for k in 0..n {
                let mut akk = a[(k, k)];
                if akk.abs() < criteria {
                    akk = criteria.copysign(if akk == 0.0 { 1.0 } else { akk });
                    report.nbpivot += 1;
                }
                d[k] = akk;
                for i in (k + 1)..n {
                    a[(i, k)] /= akk;
                }
                for j in (k + 1)..n {
                    let ujk = a[(k, j)];
                    for i in (k + 1)..n {
                        a[(i, j)] -= a[(i, k)] * ujk;
                    }
                }
            }
        }
    }

    if report.nbpivot > 0 {
        trace!(nbpivot = report.nbpivot, "static pivoting applied");
    }
    report
}

/// Applies the factored diagonal block to one off-diagonal panel.
///
/// For `Llt`/`Llh` (`d = None`), `a`'s diagonal already holds the true
/// (non-unit) Cholesky pivots, so a single `panel = panel * L^-T` solve
/// against it is the whole story. For `Ldlt`/`Ldlh` (`d = Some`), `a`'s
/// strictly-lower part holds `L` with an *implicit* unit diagonal — the
/// real pivots live in `d` — so the solve must treat `a`'s diagonal as
/// `1` and the `D^-1` column scale is applied as a separate step
/// afterward; folding the two into one non-unit solve against `a`
/// directly would divide by `d` twice.
pub fn apply_panel(panel: &mut MatMut<'_, f64>, l: faer::MatRef<'_, f64>, d: Option<&[f64]>) {
    match d {
        Some(d) => {
            trsm_right_unit_lower_transpose(panel, l);
            scale_columns(panel, d);
        }
        None => trsm_right_lower_transpose(panel, l),
    }
}

/// GEMM update variants, distinguished only by how the destination is
/// addressed (`solver::IndEntry`); the arithmetic is identical, grounded
/// on `core_zgemmsp`'s single compute path shared by its 1D/2D callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateVariant {
    /// Both source and destination cblks use 1D (column-major panel)
    /// storage.
    OneDOneD,
    /// Source is 1D, destination is a 2D-tiled cblk.
    OneDTwoD,
    /// Both source and destination are 2D-tiled.
    TwoDTwoD,
}

/// Computes one block-pair contribution, regardless of `variant` (which
/// only affects how callers have located `dest`/`src_a`/`src_b` in the
/// wider solver matrix).
///
/// For `Llt`/`Llh` (`d = None`) this is `dest -= src_a * src_b^T`. For
/// `Ldlt`/`Ldlh` (`d = Some`), `src_a`/`src_b` are the pure `L` panels
/// [`apply_panel`] produced, and the update must sandwich the diagonal
/// factor between them: `dest -= (src_a * D) * src_b^T`.
pub fn apply_update(
    dest: &mut MatMut<'_, f64>,
    src_a: faer::MatRef<'_, f64>,
    src_b: faer::MatRef<'_, f64>,
    d: Option<&[f64]>,
    _variant: UpdateVariant,
) {
    match d {
        None => gemm_nt_sub(dest, src_a, src_b),
        Some(d) => {
            let mut scaled = Mat::from_fn(src_a.nrows(), src_a.ncols(), |i, j| src_a[(i, j)]);
            scale_columns(&mut scaled.as_mut(), d);
            gemm_nt_sub(dest, scaled.as_ref(), src_b);
        }
    }
}

/// Scratch buffer sized to the solver matrix's `gemmmax`, reused across
/// update kernel calls within one thread to avoid per-task allocation.
pub fn scratch_buffer(gemmmax: usize) -> Mat<f64> {
    let side = (gemmmax as f64).sqrt().ceil().max(1.0) as usize;
    Mat::zeros(side, side)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cholesky_factor_reconstructs_spd_matrix() {
        let mut a = Mat::from_fn(3, 3, |i, j| {
            if i == j {
                4.0
            } else if (i as isize - j as isize).abs() == 1 {
                1.0
            } else {
                0.0
            }
        });
        let mut d = vec![0.0; 3];
        let report = factor_diagonal(&mut a.as_mut(), &mut d, Factorization::Llt, 1e-12);
        assert_eq!(report.nbpivot, 0);

        let mut recon = Mat::<f64>::zeros(3, 3);
        for i in 0..3 {
            for j in 0..3 {
                let mut acc = 0.0;
                for k in 0..=i.min(j) {
                    if i >= k && j >= k {
                        acc += a[(i, k)] * a[(j, k)];
                    }
                }
                recon[(i, j)] = acc;
            }
        }
        assert!((recon[(0, 0)] - 4.0).abs() < 1e-9);
        assert!((recon[(0, 1)] - 1.0).abs() < 1e-9);
        assert!((recon[(1, 1)] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn ldlt_panel_reconstructs_the_off_diagonal_block() {
        // A 4x4 SPD matrix split into a 2x2 diagonal block (rows/cols
        // 0..2) and a 2x2 off-diagonal panel (rows 2..4, cols 0..2).
        let vals = [
            [4.0, 1.0, 2.0, 0.0],
            [1.0, 3.0, 0.0, 1.0],
            [2.0, 0.0, 5.0, 1.0],
            [0.0, 1.0, 1.0, 4.0],
        ];
        let a_full = Mat::from_fn(4, 4, |i, j| vals[i][j]);

        let mut diag = Mat::from_fn(2, 2, |i, j| a_full[(i, j)]);
        let mut d = vec![0.0; 2];
        factor_diagonal(&mut diag.as_mut(), &mut d, Factorization::Ldlt, 1e-12);

        let mut panel = Mat::from_fn(2, 2, |i, j| a_full[(2 + i, j)]);
        apply_panel(&mut panel.as_mut(), diag.as_ref(), Some(&d));

        // A[2..4, 0..2] must equal L21 * D * L11^T, with L11 unit lower
        // triangular (`diag`'s strictly-lower part, implicit unit diag).
        for i in 0..2 {
            for j in 0..2 {
                let mut acc = 0.0;
                for k in 0..2 {
                    let l11_jk = if k == j {
                        1.0
                    } else if k < j {
                        diag[(j, k)]
                    } else {
                        0.0
                    };
                    acc += panel[(i, k)] * d[k] * l11_jk;
                }
                assert!(
                    (acc - a_full[(2 + i, j)]).abs() < 1e-9,
                    "L21 D L11^T[{i},{j}] = {acc}, expected {}",
                    a_full[(2 + i, j)]
                );
            }
        }
    }

    #[test]
    fn static_pivoting_clamps_small_diagonal() {
        let mut a = Mat::from_fn(1, 1, |_, _| 1e-20);
        let mut d = vec![0.0; 1];
        let report = factor_diagonal(&mut a.as_mut(), &mut d, Factorization::Ldlt, 1e-10);
        assert_eq!(report.nbpivot, 1);
        assert!(d[0].abs() >= 1e-10 - 1e-18);
    }
}
