//! Binary (de)serialization of a [`SymbolMatrix`]. `symbolSave`/
//! `symbolLoad` are declared in `original_source/pastix/symbol/symbol.h`
//! but never implemented in any `.c` file the pack carries, so only the
//! function names and their `(SymbolMatrix, FILE *)` shape are grounded
//! on the original; the on-disk layout itself — a small fixed header
//! followed by flat `cblktab`/`bloktab`/`browtab` arrays, each integer
//! written little-endian — is this crate's own design.
//!
//! This is hand-rolled rather than built on a serialization crate: the
//! format must round-trip byte-for-byte (spec.md §8), and no example in
//! this workspace pulls in `bincode`/`rmp-serde` for this kind of fixed
//! binary layout.

use super::{SymbolBlok, SymbolCblk, SymbolMatrix};
use crate::error::BlendError;
use std::io::{self, Read, Write};

const MAGIC: u32 = 0x5359_4d42; // "SYMB"

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// Writes `symbol` to `out` in the fixed binary layout described above.
pub fn save<W: Write>(symbol: &SymbolMatrix, out: &mut W) -> Result<(), BlendError> {
    let io_err = |e: io::Error| BlendError::invariant(format!("symbol save failed: {e}"));

    write_u32(out, MAGIC).map_err(io_err)?;
    write_u64(out, symbol.baseval as u64).map_err(io_err)?;
    write_u64(out, symbol.dof as u64).map_err(io_err)?;
    write_u64(out, symbol.nodenbr as u64).map_err(io_err)?;
    write_u64(out, symbol.cblktab.len() as u64).map_err(io_err)?;
    write_u64(out, symbol.bloktab.len() as u64).map_err(io_err)?;
    write_u64(out, symbol.browtab.len() as u64).map_err(io_err)?;

    for c in &symbol.cblktab {
        write_u64(out, c.fcolnum as u64).map_err(io_err)?;
        write_u64(out, c.lcolnum as u64).map_err(io_err)?;
        write_u64(out, c.bloknum as u64).map_err(io_err)?;
        write_u64(out, c.brownum as u64).map_err(io_err)?;
    }
    for b in &symbol.bloktab {
        write_u64(out, b.frownum as u64).map_err(io_err)?;
        write_u64(out, b.lrownum as u64).map_err(io_err)?;
        write_u64(out, b.lcblknm as u64).map_err(io_err)?;
        write_u64(out, b.fcblknm as u64).map_err(io_err)?;
    }
    for &entry in &symbol.browtab {
        write_u64(out, entry as u64).map_err(io_err)?;
    }
    Ok(())
}

/// Reads a [`SymbolMatrix`] previously written by [`save`].
pub fn load<R: Read>(input: &mut R) -> Result<SymbolMatrix, BlendError> {
    let io_err = |e: io::Error| BlendError::invariant(format!("symbol load failed: {e}"));

    let magic = read_u32(input).map_err(io_err)?;
    if magic != MAGIC {
        return Err(BlendError::invariant(format!(
            "bad symbol file magic: {magic:#x}"
        )));
    }
    let baseval = read_u64(input).map_err(io_err)? as usize;
    let dof = read_u64(input).map_err(io_err)? as usize;
    let nodenbr = read_u64(input).map_err(io_err)? as usize;
    let cblknbr = read_u64(input).map_err(io_err)? as usize;
    let bloknbr = read_u64(input).map_err(io_err)? as usize;
    let brownbr = read_u64(input).map_err(io_err)? as usize;

    let mut cblktab = Vec::with_capacity(cblknbr);
    for _ in 0..cblknbr {
        cblktab.push(SymbolCblk {
            fcolnum: read_u64(input).map_err(io_err)? as usize,
            lcolnum: read_u64(input).map_err(io_err)? as usize,
            bloknum: read_u64(input).map_err(io_err)? as usize,
            brownum: read_u64(input).map_err(io_err)? as usize,
        });
    }
    let mut bloktab = Vec::with_capacity(bloknbr);
    for _ in 0..bloknbr {
        bloktab.push(SymbolBlok {
            frownum: read_u64(input).map_err(io_err)? as usize,
            lrownum: read_u64(input).map_err(io_err)? as usize,
            lcblknm: read_u64(input).map_err(io_err)? as usize,
            fcblknm: read_u64(input).map_err(io_err)? as usize,
        });
    }
    let mut browtab = Vec::with_capacity(brownbr);
    for _ in 0..brownbr {
        browtab.push(read_u64(input).map_err(io_err)? as usize);
    }

    Ok(SymbolMatrix {
        baseval,
        dof,
        nodenbr,
        cblktab,
        bloktab,
        browtab,
    })
}
