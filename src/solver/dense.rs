//! Minimal dense kernels the factorization and update steps need,
//! implemented directly against `faer::Mat`'s indexing API rather than
//! `faer`'s higher-level BLAS/LAPACK-style entry points.

use faer::{Mat, MatMut, MatRef};

/// `c -= a * b^T` (the supernodal update GEMM: `a` is `m x k`, `b` is
/// `n x k`, `c` is `m x n`).
pub fn gemm_nt_sub(c: &mut MatMut<'_, f64>, a: MatRef<'_, f64>, b: MatRef<'_, f64>) {
    let m = a.nrows();
    let n = b.nrows();
    let k = a.ncols();
    debug_assert_eq!(b.ncols(), k);
    debug_assert_eq!(c.nrows(), m);
    debug_assert_eq!(c.ncols(), n);
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0f64;
            for p in 0..k {
                acc += a[(i, p)] * b[(j, p)];
            }
            c[(i, j)] -= acc;
        }
    }
}

/// Solves `x L^T = b` in place for `x` (lower-triangular right solve,
/// used to apply a factored diagonal block to an off-diagonal panel):
/// `panel` is `rows x n`, `l` is the `n x n` lower-triangular factor.
pub fn trsm_right_lower_transpose(panel: &mut MatMut<'_, f64>, l: MatRef<'_, f64>) {
    let rows = panel.nrows();
    let n = l.nrows();
    debug_assert_eq!(panel.ncols(), n);
    for col in 0..n {
        let pivot = l[(col, col)];
        for r in 0..rows {
            panel[(r, col)] /= pivot;
        }
        for k in (col + 1)..n {
            let lk = l[(k, col)];
            if lk == 0.0 {
                continue;
            }
            for r in 0..rows {
                let v = panel[(r, col)];
                panel[(r, k)] -= lk * v;
            }
        }
    }
}

/// As [`trsm_right_lower_transpose`], but treats `l`'s diagonal as an
/// implicit `1` rather than reading it: used for `Ldlt`/`Ldlh`/`Lu`,
/// where the true diagonal is a separate factor `D` applied afterward by
/// [`scale_columns`] (the `L`/`D` split of `L D L^T`, as opposed to
/// `Llt`/`Llh`'s plain non-unit-diagonal `L`).
pub fn trsm_right_unit_lower_transpose(panel: &mut MatMut<'_, f64>, l: MatRef<'_, f64>) {
    let rows = panel.nrows();
    let n = l.nrows();
    debug_assert_eq!(panel.ncols(), n);
    for col in 0..n {
        for k in (col + 1)..n {
            let lk = l[(k, col)];
            if lk == 0.0 {
                continue;
            }
            for r in 0..rows {
                let v = panel[(r, col)];
                panel[(r, k)] -= lk * v;
            }
        }
    }
}

/// Solves `x D = b` in place for `x`, for diagonal `d` (the LDLT scaling
/// step between the TRSM and the rank-k update).
pub fn scale_columns(panel: &mut MatMut<'_, f64>, d: &[f64]) {
    debug_assert_eq!(panel.ncols(), d.len());
    for col in 0..d.len() {
        let inv = 1.0 / d[col];
        for r in 0..panel.nrows() {
            panel[(r, col)] *= inv;
        }
    }
}

/// Frobenius norm, used by the low-rank compression tolerance.
pub fn frobenius_norm(a: &Mat<f64>) -> f64 {
    let mut acc = 0.0f64;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            acc += a[(i, j)] * a[(i, j)];
        }
    }
    acc.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemm_nt_sub_matches_manual_product() {
        let a = Mat::from_fn(2, 3, |i, j| (i + j) as f64);
        let b = Mat::from_fn(2, 3, |i, j| (i * j + 1) as f64);
        let mut c = Mat::from_fn(2, 2, |_, _| 10.0);
        gemm_nt_sub(&mut c.as_mut(), a.as_ref(), b.as_ref());
        for i in 0..2 {
            for j in 0..2 {
                let expect: f64 = 10.0 - (0..3).map(|p| a[(i, p)] * b[(j, p)]).sum::<f64>();
                assert!((c[(i, j)] - expect).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn trsm_solves_lower_triangular_right_system() {
        let l = Mat::from_fn(2, 2, |i, j| if i == j { 2.0 } else if i > j { 1.0 } else { 0.0 });
        let mut x = Mat::from_fn(1, 2, |_, j| if j == 0 { 2.0 } else { 3.0 });
        trsm_right_lower_transpose(&mut x.as_mut(), l.as_ref());
        // Reconstruct b = x * L^T and compare to the original rhs.
        let mut b = Mat::<f64>::zeros(1, 2);
        for i in 0..1 {
            for j in 0..2 {
                let mut acc = 0.0;
                for k in 0..2 {
                    acc += x[(i, k)] * l[(j, k)];
                }
                b[(i, j)] = acc;
            }
        }
        assert!((b[(0, 0)] - 2.0).abs() < 1e-9);
        assert!((b[(0, 1)] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn unit_trsm_ignores_the_diagonal_it_is_given() {
        // l's diagonal (5.0, 7.0) must have no effect on the result.
        let l = Mat::from_fn(2, 2, |i, j| {
            if i == j {
                5.0 + j as f64 * 2.0
            } else if i > j {
                3.0
            } else {
                0.0
            }
        });
        let unit = Mat::from_fn(2, 2, |i, j| {
            if i == j {
                1.0
            } else if i > j {
                3.0
            } else {
                0.0
            }
        });
        let mut x = Mat::from_fn(1, 2, |_, j| if j == 0 { 4.0 } else { -1.0 });
        let mut x_unit = x.clone();
        trsm_right_unit_lower_transpose(&mut x.as_mut(), l.as_ref());
        trsm_right_unit_lower_transpose(&mut x_unit.as_mut(), unit.as_ref());
        assert!((x[(0, 0)] - x_unit[(0, 0)]).abs() < 1e-12);
        assert!((x[(0, 1)] - x_unit[(0, 1)]).abs() < 1e-12);
    }
}
