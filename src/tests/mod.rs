//! Integration tests exercising the full analyze pipeline end to end,
//! in the teacher crate's style of keeping scenario coverage in a
//! dedicated `tests` module rather than spread across unit tests.
//!
//! Fixtures here are hand-built column-block chains rather than real
//! sparse-matrix orderings (no ordering/symbolic-factorization stage
//! lives in this crate to produce one from a mesh) — small enough to
//! reason about by hand, large enough to exercise splitting,
//! proportional mapping across several cores, and the scheduling
//! simulation's priority order.

use crate::analyze;
use crate::config::{BlendCtrl, Factorization};
use crate::solver::kernels;
use crate::symbol::{persist, SymbolBlok, SymbolCblk, SymbolMatrix};
use faer::Mat;

/// A width-1 chain of `n` cblks, cblk `i` facing cblk `i+1`: the
/// elimination structure of a tridiagonal (path-graph) SPD matrix under
/// natural ordering, with zero fill-in.
fn tridiagonal_chain(n: usize) -> SymbolMatrix {
    let mut cblktab = Vec::with_capacity(n);
    let mut bloktab = Vec::with_capacity(2 * n - 1);
    let mut browtab = Vec::new();

    for i in 0..n {
        cblktab.push(SymbolCblk {
            fcolnum: i,
            lcolnum: i,
            bloknum: bloktab.len(),
            brownum: browtab.len(),
        });
        bloktab.push(SymbolBlok {
            frownum: i,
            lrownum: i,
            lcblknm: i,
            fcblknm: i,
        });
        if i + 1 < n {
            bloktab.push(SymbolBlok {
                frownum: i + 1,
                lrownum: i + 1,
                lcblknm: i,
                fcblknm: i + 1,
            });
            browtab.push(bloktab.len() - 1);
        }
    }

    SymbolMatrix {
        baseval: 0,
        dof: 1,
        nodenbr: n,
        cblktab,
        bloktab,
        browtab,
    }
}

/// A balanced binary elimination tree over `2^levels - 1` single-column
/// cblks (a nested-dissection-shaped separator tree), used to exercise
/// proportional mapping with branching and the simulator's
/// widest-subtree-first ordering.
fn balanced_binary_tree(levels: usize) -> SymbolMatrix {
    let n = (1usize << levels) - 1;
    // Heap layout: node `i`'s children are `2i+1`, `2i+2`, heap index 0
    // is the root. Cblk ids are assigned in reverse heap order so the
    // root gets id `n-1` and every father has a larger cblk id than its
    // sons, the convention the elimination tree builder requires.
    let father_of = |heap_i: usize| -> Option<usize> {
        if heap_i == 0 {
            None
        } else {
            Some((heap_i - 1) / 2)
        }
    };
    let cblk_id = |heap_i: usize| n - 1 - heap_i;

    let mut bloks_of_cblk: Vec<Vec<SymbolBlok>> = vec![Vec::new(); n];
    for heap_i in 0..n {
        let i = cblk_id(heap_i);
        bloks_of_cblk[i].push(SymbolBlok {
            frownum: i,
            lrownum: i,
            lcblknm: i,
            fcblknm: i,
        });
        if let Some(heap_f) = father_of(heap_i) {
            let f = cblk_id(heap_f);
            bloks_of_cblk[i].push(SymbolBlok {
                frownum: f,
                lrownum: f,
                lcblknm: i,
                fcblknm: f,
            });
        }
    }

    let mut cblktab = Vec::with_capacity(n);
    let mut bloktab = Vec::new();
    let mut brow_lists: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        cblktab.push(SymbolCblk {
            fcolnum: i,
            lcolnum: i,
            bloknum: bloktab.len(),
            brownum: 0,
        });
        for b in &bloks_of_cblk[i] {
            if b.fcblknm != i {
                brow_lists[b.fcblknm].push(bloktab.len());
            }
            bloktab.push(*b);
        }
    }
    let mut browtab = Vec::new();
    for i in 0..n {
        cblktab[i].brownum = browtab.len();
        browtab.extend_from_slice(&brow_lists[i]);
    }

    SymbolMatrix {
        baseval: 0,
        dof: 1,
        nodenbr: n,
        cblktab,
        bloktab,
        browtab,
    }
}

/// A chain of `num_cblks` cblks each `width` columns wide, cblk `i`
/// facing cblk `i+1` with a full-width off-diagonal block: a banded
/// matrix's elimination structure, wide enough to force the symbol
/// splitter to subdivide when `blcolmax < width`.
fn wide_chain(num_cblks: usize, width: usize) -> SymbolMatrix {
    let mut cblktab = Vec::with_capacity(num_cblks);
    let mut bloktab = Vec::new();
    let mut browtab = Vec::new();

    for i in 0..num_cblks {
        let fcol = i * width;
        let lcol = fcol + width - 1;
        cblktab.push(SymbolCblk {
            fcolnum: fcol,
            lcolnum: lcol,
            bloknum: bloktab.len(),
            brownum: browtab.len(),
        });
        bloktab.push(SymbolBlok {
            frownum: fcol,
            lrownum: lcol,
            lcblknm: i,
            fcblknm: i,
        });
        if i + 1 < num_cblks {
            let nfcol = (i + 1) * width;
            let nlcol = nfcol + width - 1;
            bloktab.push(SymbolBlok {
                frownum: nfcol,
                lrownum: nlcol,
                lcblknm: i,
                fcblknm: i + 1,
            });
            browtab.push(bloktab.len() - 1);
        }
    }

    SymbolMatrix {
        baseval: 0,
        dof: 1,
        nodenbr: num_cblks * width,
        cblktab,
        bloktab,
        browtab,
    }
}

#[test]
fn analyze_runs_end_to_end_on_a_tridiagonal_chain() {
    let sym = tridiagonal_chain(20);
    let mut ctrl = BlendCtrl::default();
    ctrl.total_nbcores = 2;
    ctrl.thread_nbr = 2;
    ctrl.solver.blcolmin = 1;
    ctrl.solver.blcolmax = 4;

    let result = analyze::run(&sym, &ctrl).expect("analyze should succeed");
    let solver = &result.solver;

    // No fan-in targets: this crate only ever analyzes a single process.
    assert_eq!(solver.ftgttab.len(), 0);
    // One task per final cblk, every thread queue priority-ordered.
    assert_eq!(solver.tasktab.len(), solver.cblknbr());
    for queue in &solver.ttsktab {
        assert!(queue
            .windows(2)
            .all(|w| solver.tasktab[w[0]].prionum <= solver.tasktab[w[1]].prionum));
    }
    // indtab length matches the off-diagonal pair count, Sum(odb*(odb+1)/2).
    let expected_pairs: usize = (0..solver.cblknbr())
        .map(|i| {
            let odb = solver.bloks_of(i).len().saturating_sub(1);
            odb * (odb + 1) / 2
        })
        .sum();
    assert_eq!(solver.indtab.len(), expected_pairs);
}

#[test]
fn analyze_is_deterministic_across_runs() {
    let sym = balanced_binary_tree(4);
    let mut ctrl = BlendCtrl::default();
    ctrl.total_nbcores = 6;
    ctrl.thread_nbr = 3;
    ctrl.solver.blcolmin = 1;
    ctrl.solver.blcolmax = 8;

    let a = analyze::run(&sym, &ctrl).unwrap();
    let b = analyze::run(&sym, &ctrl).unwrap();

    assert_eq!(a.solver.cblknbr(), b.solver.cblknbr());
    for i in 0..a.solver.cblknbr() {
        assert_eq!(a.solver.cblktab[i].fcolnum, b.solver.cblktab[i].fcolnum);
        assert_eq!(a.solver.cblktab[i].lcolnum, b.solver.cblktab[i].lcolnum);
        assert_eq!(a.solver.tasktab[i].prionum, b.solver.tasktab[i].prionum);
    }
}

#[test]
fn splitting_twice_with_the_same_bounds_is_a_no_op() {
    use crate::analyze::candidate::CandidateMap;
    use crate::analyze::elimtree::EliminTree;
    use crate::analyze::split;

    let sym = tridiagonal_chain(30);
    let mut ctrl = BlendCtrl::default();
    ctrl.total_nbcores = 4;
    ctrl.solver.blcolmin = 1;
    ctrl.solver.blcolmax = 4;

    let tree = EliminTree::build(&sym).unwrap();
    let cand = CandidateMap::build(&sym, &tree, &ctrl).unwrap();
    let (once, cand_once) = split::run(&sym, &cand, &ctrl).unwrap();
    let (twice, _cand_twice) = split::run(&once.symbol, &cand_once, &ctrl).unwrap();

    assert_eq!(once.symbol.cblknbr(), twice.symbol.cblknbr());
    assert_eq!(once.symbol.bloknbr(), twice.symbol.bloknbr());
    for i in 0..once.symbol.cblknbr() {
        assert_eq!(once.symbol.cblktab[i].fcolnum, twice.symbol.cblktab[i].fcolnum);
        assert_eq!(once.symbol.cblktab[i].lcolnum, twice.symbol.cblktab[i].lcolnum);
    }
}

#[test]
fn static_pivoting_clamps_an_exact_zero_diagonal_during_factorization() {
    // A 2x2 diagonal block with one exactly-zero pivot, factored with
    // LDLT and EPSILON_MAGN_CTRL = 1e-10 as in the static-pivoting
    // scenario: the zero entry must be replaced, not left to divide by
    // zero, and the replacement must be reported.
    let mut ctrl = BlendCtrl::default();
    ctrl.solver.epsilon_magn_ctrl = 1e-10;

    let mut a = Mat::from_fn(2, 2, |i, j| if i == j { if i == 0 { 0.0 } else { 4.0 } } else { 1.0 });
    let mut d = vec![0.0; 2];
    let report = kernels::factor_diagonal(
        &mut a.as_mut(),
        &mut d,
        Factorization::Ldlt,
        ctrl.solver.epsilon_magn_ctrl,
    );

    assert_eq!(report.nbpivot, 1);
    assert!((d[0] - ctrl.solver.epsilon_magn_ctrl).abs() < 1e-18);
}

#[test]
fn symbol_round_trips_through_save_and_load_after_splitting() {
    use crate::analyze::candidate::CandidateMap;
    use crate::analyze::elimtree::EliminTree;
    use crate::analyze::split;

    let sym = tridiagonal_chain(12);
    let mut ctrl = BlendCtrl::default();
    ctrl.solver.blcolmin = 1;
    ctrl.solver.blcolmax = 3;
    let tree = EliminTree::build(&sym).unwrap();
    let cand = CandidateMap::build(&sym, &tree, &ctrl).unwrap();
    let (split_result, _) = split::run(&sym, &cand, &ctrl).unwrap();

    let mut buf = Vec::new();
    persist::save(&split_result.symbol, &mut buf).unwrap();
    let loaded = persist::load(&mut buf.as_slice()).unwrap();
    assert_eq!(split_result.symbol, loaded);

    let mut buf2 = Vec::new();
    persist::save(&loaded, &mut buf2).unwrap();
    assert_eq!(buf, buf2);
}

#[test]
fn render_produces_a_well_formed_eps_document() {
    let sym = balanced_binary_tree(3);
    let mut ctrl = BlendCtrl::default();
    ctrl.total_nbcores = 2;
    ctrl.thread_nbr = 2;
    let result = analyze::run(&sym, &ctrl).unwrap();

    let mut buf = Vec::new();
    crate::render::write_eps(&result.solver, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.starts_with("%!PS-Adobe-2.0 EPSF-2.0"));
    assert!(text.trim_end().ends_with("showpage"));
    assert_eq!(text.matches("\tc\n").count(), result.solver.cblknbr());
}

#[test]
fn llt_factorization_reconstructs_a_tridiagonal_spd_matrix() {
    let n = 6;
    let sym = tridiagonal_chain(n);
    let mut ctrl = BlendCtrl::default();
    ctrl.solver.factorization = Factorization::Llt;
    let result = analyze::run(&sym, &ctrl).unwrap();
    let mut solver = result.solver;
    assert_eq!(solver.cblknbr(), n);

    // The classic 1D Laplacian: diagonal 2, off-diagonal -1, SPD.
    for i in 0..n {
        solver.cblktab[i].coef[(0, 0)] = 2.0;
        let bloks = solver.bloks_of(i).to_vec();
        if bloks.len() > 1 {
            solver.cblktab[i].coef[(bloks[1].coefind, 0)] = -1.0;
        }
    }

    let report = solver
        .factorize_sequential(&ctrl.solver, &ctrl.compression)
        .unwrap();
    assert_eq!(report.nbpivot, 0);

    // Reconstruct A = L L^T as the sum of each column's outer product
    // and compare against the original tridiagonal entries.
    let mut a = vec![vec![0.0f64; n]; n];
    for k in 0..n {
        let lkk = solver.cblktab[k].coef[(0, 0)];
        a[k][k] += lkk * lkk;
        let bloks = solver.bloks_of(k).to_vec();
        if bloks.len() > 1 {
            let l_next_k = solver.cblktab[k].coef[(bloks[1].coefind, 0)];
            a[k + 1][k + 1] += l_next_k * l_next_k;
            a[k][k + 1] += lkk * l_next_k;
            a[k + 1][k] += lkk * l_next_k;
        }
    }
    for i in 0..n {
        for j in 0..n {
            let expect = if i == j {
                2.0
            } else if (i as isize - j as isize).abs() == 1 {
                -1.0
            } else {
                0.0
            };
            assert!(
                (a[i][j] - expect).abs() < 1e-9,
                "(L L^T)[{i}][{j}] = {}, expected {expect}",
                a[i][j]
            );
        }
    }
}

#[test]
fn ldlt_factorization_reconstructs_a_tridiagonal_spd_matrix() {
    // Same scenario as the Llt case above, but exercising the L/D split
    // path (`apply_panel`/`apply_update`'s `d = Some` branch) instead of
    // the plain non-unit-diagonal Cholesky path.
    let n = 6;
    let sym = tridiagonal_chain(n);
    let mut ctrl = BlendCtrl::default();
    ctrl.solver.factorization = Factorization::Ldlt;
    let result = analyze::run(&sym, &ctrl).unwrap();
    let mut solver = result.solver;

    for i in 0..n {
        solver.cblktab[i].coef[(0, 0)] = 2.0;
        let bloks = solver.bloks_of(i).to_vec();
        if bloks.len() > 1 {
            solver.cblktab[i].coef[(bloks[1].coefind, 0)] = -1.0;
        }
    }

    let report = solver
        .factorize_sequential(&ctrl.solver, &ctrl.compression)
        .unwrap();
    assert_eq!(report.nbpivot, 0);

    // Reconstruct A = L D L^T (L's diagonal is the implicit 1, so the
    // diagonal column's own contribution is simply `d[k]`).
    let mut a = vec![vec![0.0f64; n]; n];
    for k in 0..n {
        let dk = solver.cblktab[k].coef[(0, 0)];
        a[k][k] += dk;
        let bloks = solver.bloks_of(k).to_vec();
        if bloks.len() > 1 {
            let l_next_k = solver.cblktab[k].coef[(bloks[1].coefind, 0)];
            a[k + 1][k + 1] += l_next_k * l_next_k * dk;
            a[k][k + 1] += dk * l_next_k;
            a[k + 1][k] += dk * l_next_k;
        }
    }
    for i in 0..n {
        for j in 0..n {
            let expect = if i == j {
                2.0
            } else if (i as isize - j as isize).abs() == 1 {
                -1.0
            } else {
                0.0
            };
            assert!(
                (a[i][j] - expect).abs() < 1e-9,
                "(L D L^T)[{i}][{j}] = {}, expected {expect}",
                a[i][j]
            );
        }
    }
}

#[test]
fn factorize_sequential_rejects_lu() {
    let n = 4;
    let sym = tridiagonal_chain(n);
    let mut ctrl = BlendCtrl::default();
    ctrl.solver.factorization = Factorization::Lu;
    let result = analyze::run(&sym, &ctrl).unwrap();
    let mut solver = result.solver;
    assert!(solver
        .factorize_sequential(&ctrl.solver, &ctrl.compression)
        .is_err());
}

#[test]
fn proportional_mapping_never_escapes_the_elimination_tree() {
    use crate::analyze::candidate::CandidateMap;
    use crate::analyze::cost::CostMatrix;
    use crate::analyze::elimtree::EliminTree;
    use crate::analyze::propmap;

    let sym = balanced_binary_tree(5);
    let tree = EliminTree::build(&sym).unwrap();
    let cost = CostMatrix::build(&sym, &tree);
    let mut ctrl = BlendCtrl::default();
    ctrl.total_nbcores = 16;
    let mut cand = CandidateMap::build(&sym, &tree, &ctrl).unwrap();
    propmap::run(&tree, &cost, &mut cand, &ctrl).unwrap();

    // candCheck already asserts containment; additionally every leaf's
    // range must be non-empty.
    cand.check(&tree).unwrap();
    for i in 0..sym.cblknbr() {
        assert!(cand.cand[i].lcandnum >= cand.cand[i].fcandnum);
    }
}
