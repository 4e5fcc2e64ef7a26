//! Low-rank compression (C9): compresses an off-diagonal block `U V^T`
//! with `U: m x k`, `V: n x k`, replacing the dense `m x n` storage
//! whenever the resulting rank stays comfortably below `min(m, n)`.
//! Grounded on `original_source/blend/solver.h`'s block layout and
//! `kernels/core_zgelrops_SVD.c`'s `core_zge2lr_SVD` promote-to-dense
//! rule (store dense when compression would not shrink storage).
//!
//! SVD and the column-pivoted QR used by the RRQR path are hand-rolled
//! (one-sided Jacobi SVD; Householder QR with column pivoting) against
//! `faer::Mat`'s indexing API rather than calling into less-certain
//! higher-level `faer` linear-algebra entry points.

use crate::config::{CompressMethod, CompressionParams};
use faer::Mat;

#[derive(Debug, Clone)]
pub struct LowRankBlock {
    pub rank: usize,
    pub u: Mat<f64>,
    pub v: Mat<f64>,
}

impl LowRankBlock {
    pub fn m(&self) -> usize {
        self.u.nrows()
    }

    pub fn n(&self) -> usize {
        self.v.nrows()
    }

    /// Reconstructs the dense `m x n` block `U V^T`.
    pub fn to_dense(&self) -> Mat<f64> {
        Mat::from_fn(self.m(), self.n(), |i, j| {
            (0..self.rank).map(|r| self.u[(i, r)] * self.v[(j, r)]).sum()
        })
    }
}

/// Attempts to compress `block` (an `m x n` dense matrix) to rank `k`
/// such that `||A - U V^T|| <= tolerance * ||A||`. Returns `None` when
/// the resulting rank exceeds `min(m, n) / minratio` (the MINRATIO
/// promote-to-dense rule), in which case the caller should keep the
/// block dense.
pub fn ge2lr(block: &Mat<f64>, params: &CompressionParams) -> Option<LowRankBlock> {
    let (u, v, rank) = match params.compress_method {
        CompressMethod::Svd => jacobi_svd_truncated(block, params.tolerance),
        CompressMethod::Rrqr => pivoted_qr_truncated(block, params.tolerance),
    };

    let m = block.nrows();
    let n = block.ncols();
    let min_mn = m.min(n);
    if params.minratio == 0 || rank * params.minratio > min_mn {
        return None;
    }

    Some(LowRankBlock { rank, u, v })
}

/// Adds `a` into `b`'s low-rank representation (`rradd`): concatenates
/// `u`/`v` columns, re-orthogonalizes each side with an economy QR, runs
/// the (cheap, rank-sized) SVD on the product of the triangular factors,
/// and truncates by `params.tolerance`. Returns `None`, signalling
/// promotion to dense storage, when the result would still exceed the
/// MINRATIO rank bound (spec.md §4.8/§8 P9).
pub fn rradd(a: &LowRankBlock, b: &LowRankBlock, params: &CompressionParams) -> Option<LowRankBlock> {
    let m = a.m();
    let n = a.n();
    debug_assert_eq!(b.m(), m);
    debug_assert_eq!(b.n(), n);

    let k = a.rank + b.rank;
    let u_cat = Mat::from_fn(m, k, |i, j| {
        if j < a.rank { a.u[(i, j)] } else { b.u[(i, j - a.rank)] }
    });
    let v_cat = Mat::from_fn(n, k, |i, j| {
        if j < a.rank { a.v[(i, j)] } else { b.v[(i, j - a.rank)] }
    });

    let (qu, ru) = qr_economy(&u_cat);
    let (qv, rv) = qr_economy(&v_cat);

    // The rank-k matrix M = Ru * Rv^T reproduces U V^T = Qu M Qv^T.
    let m_mat = Mat::from_fn(k, k, |i, j| (0..k).map(|p| ru[(i, p)] * rv[(j, p)]).sum());
    let (uhat, vhat_s, rank) = jacobi_svd_truncated(&m_mat, params.tolerance);

    let new_u = Mat::from_fn(m, rank, |i, r| (0..k).map(|p| qu[(i, p)] * uhat[(p, r)]).sum());
    let new_v = Mat::from_fn(n, rank, |i, r| (0..k).map(|p| qv[(i, p)] * vhat_s[(p, r)]).sum());

    let min_mn = m.min(n);
    if params.minratio == 0 || rank * params.minratio > min_mn {
        return None;
    }

    Some(LowRankBlock { rank, u: new_u, v: new_v })
}

/// Economy QR via modified Gram-Schmidt: `mat` is `rows x cols` with
/// `cols <= rows`, returns `(Q, R)` with `Q` orthonormal-column and `R`
/// upper triangular such that `mat == Q * R`. Adequate here because the
/// inputs are always rank-sized (small) low-rank factors, not full
/// panels.
fn qr_economy(mat: &Mat<f64>) -> (Mat<f64>, Mat<f64>) {
    let rows = mat.nrows();
    let cols = mat.ncols();
    let mut q = mat.clone();
    let mut r = Mat::<f64>::zeros(cols, cols);

    for j in 0..cols {
        for k in 0..j {
            let mut dot = 0.0;
            for i in 0..rows {
                dot += q[(i, k)] * q[(i, j)];
            }
            r.as_mut()[(k, j)] = dot;
            for i in 0..rows {
                let qk = q[(i, k)];
                q.as_mut()[(i, j)] -= dot * qk;
            }
        }
        let mut norm = 0.0f64;
        for i in 0..rows {
            norm += q[(i, j)] * q[(i, j)];
        }
        norm = norm.sqrt();
        r.as_mut()[(j, j)] = norm;
        if norm > 1e-300 {
            for i in 0..rows {
                q.as_mut()[(i, j)] /= norm;
            }
        }
    }
    (q, r)
}

/// One-sided Jacobi SVD of `a` (m x n, m >= n assumed for simplicity;
/// transposes internally otherwise), truncated at the first singular
/// value falling below `tolerance * sigma_max`.
fn jacobi_svd_truncated(a: &Mat<f64>, tolerance: f64) -> (Mat<f64>, Mat<f64>, usize) {
    let (transposed, work) = if a.nrows() >= a.ncols() {
        (false, a.clone())
    } else {
        (true, Mat::from_fn(a.ncols(), a.nrows(), |i, j| a[(j, i)]))
    };

    let m = work.nrows();
    let n = work.ncols();
    let mut u = work.clone();
    let mut v: Mat<f64> = Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 });

    let max_sweeps = 30;
    for _ in 0..max_sweeps {
        let mut off_diag = 0.0f64;
        for p in 0..n {
            for q in (p + 1)..n {
                let mut alpha = 0.0;
                let mut beta = 0.0;
                let mut gamma = 0.0;
                for i in 0..m {
                    alpha += u[(i, p)] * u[(i, p)];
                    beta += u[(i, q)] * u[(i, q)];
                    gamma += u[(i, p)] * u[(i, q)];
                }
                off_diag = off_diag.max(gamma.abs());
                if gamma.abs() < 1e-300 {
                    continue;
                }
                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;
                for i in 0..m {
                    let up = u[(i, p)];
                    let uq = u[(i, q)];
                    u[(i, p)] = c * up - s * uq;
                    u[(i, q)] = s * up + c * uq;
                }
                for i in 0..n {
                    let vp = v[(i, p)];
                    let vq = v[(i, q)];
                    v[(i, p)] = c * vp - s * vq;
                    v[(i, q)] = s * vp + c * vq;
                }
            }
        }
        if off_diag < 1e-14 {
            break;
        }
    }

    let mut sigmas: Vec<f64> = (0..n)
        .map(|j| (0..m).map(|i| u[(i, j)] * u[(i, j)]).sum::<f64>().sqrt())
        .collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| sigmas[b].partial_cmp(&sigmas[a]).unwrap());

    let sigma_max = sigmas.iter().cloned().fold(0.0, f64::max);
    let cutoff = tolerance * sigma_max.max(1e-300);
    let rank = order
        .iter()
        .take_while(|&&j| sigmas[j] >= cutoff)
        .count()
        .max(1)
        .min(n);

    for j in &mut sigmas {
        if *j < 1e-300 {
            *j = 1.0;
        }
    }

    let u_trunc = Mat::from_fn(m, rank, |i, r| u[(i, order[r])] / sigmas[order[r]]);
    let s_v_trunc = Mat::from_fn(n, rank, |i, r| v[(i, order[r])] * sigmas[order[r]]);

    if transposed {
        (s_v_trunc, u_trunc, rank)
    } else {
        (u_trunc, s_v_trunc, rank)
    }
}

/// Column-pivoted Householder QR, truncated once the trailing column
/// norm drops below `tolerance` times the first pivot's norm. Returns
/// `(Q_k, R_k^T, rank)` so that `a P ~= Q_k R_k^T` matches the `(U, V)`
/// convention used by [`ge2lr`].
fn pivoted_qr_truncated(a: &Mat<f64>, tolerance: f64) -> (Mat<f64>, Mat<f64>, usize) {
    let m = a.nrows();
    let n = a.ncols();
    let mut work = a.clone();
    let mut q: Mat<f64> = Mat::from_fn(m, n.min(m), |i, j| if i == j { 1.0 } else { 0.0 });

    let mut col_norms: Vec<f64> = (0..n)
        .map(|j| (0..m).map(|i| work[(i, j)] * work[(i, j)]).sum())
        .collect();

    let max_rank = m.min(n);
    let mut first_norm: Option<f64> = None;
    let mut rank = 0;

    for k in 0..max_rank {
        let (piv, &piv_norm_sq) = col_norms[k..]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(idx, v)| (idx + k, v))
            .unwrap();
        let piv_norm = piv_norm_sq.sqrt();
        let reference = *first_norm.get_or_insert(piv_norm.max(1e-300));
        if piv_norm < tolerance * reference && rank > 0 {
            break;
        }
        if piv != k {
            for i in 0..m {
                work.as_mut()[(i, k)] = {
                    let tmp = work[(i, piv)];
                    let cur = work[(i, k)];
                    work.as_mut()[(i, piv)] = cur;
                    tmp
                };
            }
            col_norms.swap(k, piv);
        }

        let mut norm = 0.0f64;
        for i in k..m {
            norm += work[(i, k)] * work[(i, k)];
        }
        norm = norm.sqrt();
        if norm < 1e-300 {
            rank = (k + 1).min(max_rank);
            break;
        }
        let sign = if work[(k, k)] >= 0.0 { 1.0 } else { -1.0 };
        let alpha = -sign * norm;
        let mut v = vec![0.0f64; m];
        for i in k..m {
            v[i] = work[(i, k)];
        }
        v[k] -= alpha;
        let v_norm: f64 = v[k..m].iter().map(|x| x * x).sum::<f64>().sqrt();
        if v_norm > 1e-300 {
            for x in v.iter_mut().skip(k) {
                *x /= v_norm;
            }
            for j in k..n {
                let dot: f64 = (k..m).map(|i| v[i] * work[(i, j)]).sum();
                for i in k..m {
                    work.as_mut()[(i, j)] -= 2.0 * v[i] * dot;
                }
            }
            for j in 0..q.ncols() {
                let dot: f64 = (k..m).map(|i| v[i] * q[(i, j)]).sum();
                for i in k..m {
                    q.as_mut()[(i, j)] -= 2.0 * v[i] * dot;
                }
            }
        }
        for j in (k + 1)..n {
            col_norms[j] -= work[(k, j)] * work[(k, j)];
        }
        rank = k + 1;
    }

    let u = Mat::from_fn(m, rank, |i, r| q[(i, r)]);
    let v_mat = Mat::from_fn(n, rank, |i, r| if i >= r { work[(r, i)] } else { 0.0 });
    (u, v_mat, rank)
}
