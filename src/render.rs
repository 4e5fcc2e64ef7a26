//! EPS (PostScript) rendering of a [`crate::solver::SolverMatrix`]'s
//! block structure, for visual inspection of the factor's sparsity
//! pattern and low-rank compression gains.
//!
//! Grounded on `solverDraw` in
//! `original_source/blend/solver_draw.c`: the same 72-DPI canvas,
//! `c`/`b`/`r`/`g` PostScript macro shorthands, and Y-flip setup, but
//! the compression-ratio color ramp here follows spec.md's formula
//! (`2·m·n / (rk·(m+n))`) rather than the original's
//! `2·m·n / (rk·(m+n))`-per-side sum — the two agree when only one
//! triangular factor is stored (LLT/LDLT), which is the only case this
//! crate draws.

use crate::solver::SolverMatrix;
use std::io::{self, Write};

const PSDPI: f64 = 72.0;
const PSPICTSIZE: f64 = 6.6;

/// Writes an EPS picture of `solver`'s block structure to `out`: one
/// gray square per diagonal block, one colored rectangle per
/// off-diagonal block. Color encodes the compression gain
/// `2·m·n / (rk·(m+n))` of that block: exactly `1` (no compression, a
/// dense block) is black, gains below `5` ramp through red, and gains
/// at or above `5` ramp through green, saturating at a gain of `15`.
pub fn write_eps<W: Write>(solver: &SolverMatrix, out: &mut W) -> io::Result<()> {
    let nodenbr: usize = solver.cblktab.iter().map(|c| c.colnbr()).sum();
    let pictsize = (nodenbr + 1) as f64;

    writeln!(out, "%!PS-Adobe-2.0 EPSF-2.0")?;
    writeln!(
        out,
        "%%Title: solvermatrix ({},{},{})",
        solver.cblknbr(),
        solver.bloktab.len(),
        nodenbr
    )?;
    writeln!(out, "%%Creator: pastix-blend render::write_eps")?;
    writeln!(
        out,
        "%%BoundingBox: 0 0 {} {}",
        (PSPICTSIZE * PSDPI) as i64,
        (PSPICTSIZE * PSDPI) as i64
    )?;
    writeln!(out, "%%Pages: 0")?;
    writeln!(out, "%%EndComments")?;
    writeln!(
        out,
        "/c {{ 4 2 roll pop pop newpath 2 copy 2 copy moveto dup lineto dup lineto closepath fill }} bind def"
    )?;
    writeln!(
        out,
        "/b {{ 4 copy 2 index exch moveto lineto dup 3 index lineto exch lineto closepath fill pop }} bind def"
    )?;
    writeln!(out, "/r {{ setrgbcolor }} bind def")?;
    writeln!(out, "/g {{ setgray }} bind def")?;
    writeln!(out, "0 setlinecap")?;
    writeln!(out, "{} dup scale", PSDPI * PSPICTSIZE / pictsize)?;
    writeln!(out, "[ 1 0 0 -1 0 {} ] concat", nodenbr + 1)?;
    writeln!(out, "0 0")?;

    for (i, cblk) in solver.cblktab.iter().enumerate() {
        writeln!(out, "0.5 g")?;
        writeln!(out, "{}\t{}\tc", cblk.fcolnum, cblk.lcolnum + 1)?;

        let ncols = cblk.colnbr();
        for (offset, blok) in solver.bloks_of(i).iter().enumerate().skip(1) {
            let nrows = blok.rownbr();
            let rank = cblk
                .lowrank
                .get(offset - 1)
                .and_then(|lr| lr.as_ref())
                .map(|lr| lr.rank);
            let (r, g, b) = compression_color(nrows, ncols, rank);
            writeln!(out, "{:.2} {:.2} {:.2} r", r, g, b)?;
            writeln!(out, "{}\t{}\tb", blok.frownum, blok.lrownum + 1)?;
        }
    }

    writeln!(out, "pop pop")?;
    writeln!(out, "showpage")?;
    Ok(())
}

/// Maps an off-diagonal block's dense-vs-low-rank storage cost to an
/// RGB triple per spec.md §7's ramp. `rank = None` means the block is
/// stored dense (no compression attempted or it was promoted back):
/// gain is exactly `1`, rendered black.
fn compression_color(nrows: usize, ncols: usize, rank: Option<usize>) -> (f64, f64, f64) {
    let gain = match rank {
        None => 1.0,
        Some(0) => 1.0,
        Some(rk) => {
            (2 * nrows * ncols) as f64 / (rk * (nrows + ncols)) as f64
        }
    };

    if gain <= 1.0 {
        (0.0, 0.0, 0.0)
    } else if gain < 5.0 {
        (gain / 5.0, 0.0, 0.0)
    } else {
        let green = (0.5 + (gain - 5.0) / 10.0).min(1.0);
        (0.0, green, 0.0)
    }
}
