//! Binary chipdb serialization.
//!
//! Scalars are LEB128-style varints: 7 data bits per byte, high bit set on
//! continuation. Unsigned values stop once the remainder is zero and the
//! sign bit of the last byte is clear; signed values are sign-extended on
//! read. Strings, vectors and maps are length-prefixed.

use crate::db::ChipDB;
use crate::types::{BitCoord, ExtraCell, Location, Package, Switch, TileType};
use floe_common::{FatalError, Result};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Format marker written ahead of the payload.
const MAGIC: &[u8; 8] = b"floechdb";

/// Binary output stream with varint scalar encodings.
pub struct OBStream<W: Write> {
    w: W,
}

impl<W: Write> OBStream<W> {
    /// Wraps a writer.
    pub fn new(w: W) -> Self {
        Self { w }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.w
            .write_all(buf)
            .map_err(|e| FatalError::new(format!("write: {e}")))
    }

    /// Writes a raw byte.
    pub fn write_u8(&mut self, x: u8) -> Result<()> {
        self.write_all(&[x])
    }

    /// Writes a bool as one byte.
    pub fn write_bool(&mut self, x: bool) -> Result<()> {
        self.write_u8(u8::from(x))
    }

    /// Writes an unsigned varint.
    pub fn write_u64(&mut self, mut x: u64) -> Result<()> {
        loop {
            let mut b = (x & 0x7f) as u8;
            x >>= 7;
            if x == 0 && b & 0x40 == 0 {
                return self.write_u8(b);
            }
            b |= 0x80;
            self.write_u8(b)?;
        }
    }

    /// Writes a sign-extended varint.
    pub fn write_i64(&mut self, mut x: i64) -> Result<()> {
        loop {
            let mut b = (x & 0x7f) as u8;
            x >>= 7;
            let done = (x == 0 && b & 0x40 == 0) || (x == -1 && b & 0x40 == 0x40);
            if done {
                return self.write_u8(b);
            }
            b |= 0x80;
            self.write_u8(b)?;
        }
    }

    /// Writes a `usize` as an unsigned varint.
    pub fn write_usize(&mut self, x: usize) -> Result<()> {
        self.write_u64(x as u64)
    }

    /// Writes a length-prefixed string.
    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_usize(s.len())?;
        self.write_all(s.as_bytes())
    }
}

/// Binary input stream matching [`OBStream`].
pub struct IBStream<R: Read> {
    r: R,
}

impl<R: Read> IBStream<R> {
    /// Wraps a reader.
    pub fn new(r: R) -> Self {
        Self { r }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.r
            .read_exact(buf)
            .map_err(|e| FatalError::new(format!("read: {e}")))
    }

    /// Reads a raw byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    /// Reads a bool.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads an unsigned varint.
    pub fn read_u64(&mut self) -> Result<u64> {
        let mut x = 0u64;
        let mut shift = 0;
        loop {
            let b = self.read_u8()?;
            x |= u64::from(b & 0x7f) << shift;
            shift += 7;
            if b & 0x80 == 0 {
                return Ok(x);
            }
            if shift >= 64 {
                return Err(FatalError::new("varint too long"));
            }
        }
    }

    /// Reads a sign-extended varint.
    pub fn read_i64(&mut self) -> Result<i64> {
        let mut x = 0i64;
        let mut shift = 0;
        loop {
            let b = self.read_u8()?;
            x |= i64::from(b & 0x7f) << shift;
            shift += 7;
            if b & 0x80 == 0 {
                if shift < 64 && b & 0x40 != 0 {
                    x = (x << (64 - shift)) >> (64 - shift);
                }
                return Ok(x);
            }
            if shift >= 64 {
                return Err(FatalError::new("varint too long"));
            }
        }
    }

    /// Reads a `usize`.
    pub fn read_usize(&mut self) -> Result<usize> {
        Ok(self.read_u64()? as usize)
    }

    /// Reads a length-prefixed string.
    pub fn read_str(&mut self) -> Result<String> {
        let n = self.read_usize()?;
        let mut buf = vec![0u8; n];
        self.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| FatalError::new("invalid string in binary chipdb"))
    }
}

fn write_loc<W: Write>(o: &mut OBStream<W>, loc: Location) -> Result<()> {
    o.write_usize(loc.tile)?;
    o.write_usize(loc.pos)
}

fn read_loc<R: Read>(i: &mut IBStream<R>) -> Result<Location> {
    Ok(Location::new(i.read_usize()?, i.read_usize()?))
}

fn tile_type_tag(ty: TileType) -> u8 {
    match ty {
        TileType::Empty => 0,
        TileType::Io => 1,
        TileType::Logic => 2,
        TileType::Ramb => 3,
        TileType::Ramt => 4,
    }
}

fn tile_type_from_tag(tag: u8) -> Result<TileType> {
    Ok(match tag {
        0 => TileType::Empty,
        1 => TileType::Io,
        2 => TileType::Logic,
        3 => TileType::Ramb,
        4 => TileType::Ramt,
        _ => return Err(FatalError::new("invalid tile type in binary chipdb")),
    })
}

/// Serializes the parsed core of `db`; derived tables are rebuilt on read.
pub fn write_binary_chipdb<W: Write>(w: W, db: &ChipDB) -> Result<()> {
    let mut o = OBStream::new(w);
    o.write_all(MAGIC)?;
    o.write_str(&db.device)?;
    o.write_usize(db.width)?;
    o.write_usize(db.height)?;
    o.write_usize(db.n_nets)?;

    o.write_usize(db.packages.len())?;
    for pkg in db.packages.values() {
        o.write_str(&pkg.name)?;
        o.write_usize(pkg.pin_loc.len())?;
        for (pin, &loc) in &pkg.pin_loc {
            o.write_str(pin)?;
            write_loc(&mut o, loc)?;
        }
    }

    o.write_usize(db.loc_pin_glb_num.len())?;
    for (&loc, &g) in &db.loc_pin_glb_num {
        write_loc(&mut o, loc)?;
        o.write_usize(g)?;
    }

    o.write_usize(db.gbufin.len())?;
    for (&(x, y), &g) in &db.gbufin {
        o.write_usize(x)?;
        o.write_usize(y)?;
        o.write_usize(g)?;
    }

    o.write_usize(db.iolatch.len())?;
    for &t in &db.iolatch {
        o.write_usize(t)?;
    }

    o.write_usize(db.ieren.len())?;
    for (&pio, &ien) in &db.ieren {
        write_loc(&mut o, pio)?;
        write_loc(&mut o, ien)?;
    }

    o.write_usize(db.extra_bits.len())?;
    for (name, &(bank, ax, ay)) in &db.extra_bits {
        o.write_str(name)?;
        o.write_usize(bank)?;
        o.write_usize(ax)?;
        o.write_usize(ay)?;
    }

    o.write_usize(db.tile_colbuf_tile.len())?;
    for (&dst, &src) in &db.tile_colbuf_tile {
        o.write_usize(dst)?;
        o.write_usize(src)?;
    }

    for &ty in &db.tile_type {
        o.write_u8(tile_type_tag(ty))?;
    }

    for (t, name) in &db.net_tile_name {
        o.write_usize(*t)?;
        o.write_str(name)?;
    }

    for nets in &db.tile_nets {
        o.write_usize(nets.len())?;
        for (name, &n) in nets {
            o.write_str(name)?;
            o.write_usize(n)?;
        }
    }

    o.write_usize(db.tile_nonrouting_cbits.len())?;
    for (&ty, funcs) in &db.tile_nonrouting_cbits {
        o.write_u8(tile_type_tag(ty))?;
        o.write_usize(funcs.len())?;
        for (func, cbits) in funcs {
            o.write_str(func)?;
            o.write_usize(cbits.len())?;
            for cb in cbits {
                o.write_usize(cb.row)?;
                o.write_usize(cb.col)?;
            }
        }
    }

    o.write_usize(db.tile_cbits_block_size.len())?;
    for (&ty, &(cols, rows)) in &db.tile_cbits_block_size {
        o.write_u8(tile_type_tag(ty))?;
        o.write_usize(cols)?;
        o.write_usize(rows)?;
    }

    o.write_usize(db.switches.len())?;
    for sw in &db.switches {
        o.write_bool(sw.bidir)?;
        o.write_usize(sw.tile)?;
        o.write_usize(sw.out)?;
        o.write_usize(sw.cbits.len())?;
        for cb in &sw.cbits {
            o.write_usize(cb.row)?;
            o.write_usize(cb.col)?;
        }
        o.write_usize(sw.in_val.len())?;
        for (&n, val) in &sw.in_val {
            o.write_usize(n)?;
            for &b in val {
                o.write_bool(b)?;
            }
        }
    }

    o.write_usize(db.extra_cells.len())?;
    for ec in &db.extra_cells {
        o.write_str(&ec.name)?;
        o.write_usize(ec.tile)?;
        o.write_usize(ec.mfvs.len())?;
        for (func, (t, val)) in &ec.mfvs {
            o.write_str(func)?;
            o.write_usize(*t)?;
            o.write_str(val)?;
        }
    }

    Ok(())
}

/// Reads a binary chipdb and rebuilds the derived tables.
pub fn read_binary_chipdb<R: Read>(r: R) -> Result<ChipDB> {
    let mut i = IBStream::new(r);
    let mut magic = [0u8; 8];
    i.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(FatalError::new("not a binary chipdb"));
    }

    let device = i.read_str()?;
    let width = i.read_usize()?;
    let height = i.read_usize()?;
    let n_nets = i.read_usize()?;
    let mut db = ChipDB::default();
    db.set_device(&device, width, height, n_nets);

    for _ in 0..i.read_usize()? {
        let name = i.read_str()?;
        let mut pkg = Package {
            name: name.clone(),
            ..Package::default()
        };
        for _ in 0..i.read_usize()? {
            let pin = i.read_str()?;
            let loc = read_loc(&mut i)?;
            pkg.pin_loc.insert(pin.clone(), loc);
            pkg.loc_pin.insert(loc, pin);
        }
        db.packages.insert(name, pkg);
    }

    for _ in 0..i.read_usize()? {
        let loc = read_loc(&mut i)?;
        let g = i.read_usize()?;
        db.loc_pin_glb_num.insert(loc, g);
    }

    for _ in 0..i.read_usize()? {
        let x = i.read_usize()?;
        let y = i.read_usize()?;
        let g = i.read_usize()?;
        db.gbufin.insert((x, y), g);
    }

    for _ in 0..i.read_usize()? {
        let t = i.read_usize()?;
        db.iolatch.push(t);
    }

    for _ in 0..i.read_usize()? {
        let pio = read_loc(&mut i)?;
        let ien = read_loc(&mut i)?;
        db.ieren.insert(pio, ien);
    }

    for _ in 0..i.read_usize()? {
        let name = i.read_str()?;
        let bank = i.read_usize()?;
        let ax = i.read_usize()?;
        let ay = i.read_usize()?;
        db.extra_bits.insert(name, (bank, ax, ay));
    }

    for _ in 0..i.read_usize()? {
        let dst = i.read_usize()?;
        let src = i.read_usize()?;
        db.tile_colbuf_tile.insert(dst, src);
    }

    for t in 0..db.n_tiles {
        db.tile_type[t] = tile_type_from_tag(i.read_u8()?)?;
    }

    for n in 0..db.n_nets {
        let t = i.read_usize()?;
        let name = i.read_str()?;
        db.net_tile_name[n] = (t, name);
    }

    for t in 0..db.n_tiles {
        for _ in 0..i.read_usize()? {
            let name = i.read_str()?;
            let n = i.read_usize()?;
            db.tile_nets[t].insert(name, n);
        }
    }

    for _ in 0..i.read_usize()? {
        let ty = tile_type_from_tag(i.read_u8()?)?;
        let funcs = db.tile_nonrouting_cbits.entry(ty).or_default();
        for _ in 0..i.read_usize()? {
            let func = i.read_str()?;
            let mut cbits = Vec::new();
            for _ in 0..i.read_usize()? {
                let row = i.read_usize()?;
                let col = i.read_usize()?;
                cbits.push(BitCoord { row, col });
            }
            funcs.insert(func, cbits);
        }
    }

    for _ in 0..i.read_usize()? {
        let ty = tile_type_from_tag(i.read_u8()?)?;
        let cols = i.read_usize()?;
        let rows = i.read_usize()?;
        db.tile_cbits_block_size.insert(ty, (cols, rows));
    }

    for _ in 0..i.read_usize()? {
        let bidir = i.read_bool()?;
        let tile = i.read_usize()?;
        let out = i.read_usize()?;
        let mut cbits = Vec::new();
        for _ in 0..i.read_usize()? {
            let row = i.read_usize()?;
            let col = i.read_usize()?;
            cbits.push(BitCoord { row, col });
        }
        let mut in_val = BTreeMap::new();
        for _ in 0..i.read_usize()? {
            let n = i.read_usize()?;
            let mut val = Vec::with_capacity(cbits.len());
            for _ in 0..cbits.len() {
                val.push(i.read_bool()?);
            }
            in_val.insert(n, val);
        }

        let s = db.switches.len();
        db.out_switches[out].insert(s);
        for &n2 in in_val.keys() {
            db.in_switches[n2].insert(s);
        }
        db.switches.push(Switch {
            bidir,
            tile,
            out,
            in_val,
            cbits,
        });
    }

    for _ in 0..i.read_usize()? {
        let name = i.read_str()?;
        let tile = i.read_usize()?;
        let mut mfvs = BTreeMap::new();
        for _ in 0..i.read_usize()? {
            let func = i.read_str()?;
            let t = i.read_usize()?;
            let val = i.read_str()?;
            mfvs.insert(func, (t, val));
        }
        db.extra_cells.push(ExtraCell { name, tile, mfvs });
    }

    db.finalize()?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::parse_chipdb;

    #[test]
    fn varint_u64_roundtrip() {
        let values = [0u64, 1, 0x3f, 0x40, 0x7f, 0x80, 300, u32::MAX as u64, u64::MAX];
        let mut buf = Vec::new();
        let mut o = OBStream::new(&mut buf);
        for &v in &values {
            o.write_u64(v).unwrap();
        }
        let mut i = IBStream::new(&buf[..]);
        for &v in &values {
            assert_eq!(i.read_u64().unwrap(), v);
        }
    }

    #[test]
    fn varint_small_values_are_one_byte() {
        let mut buf = Vec::new();
        OBStream::new(&mut buf).write_u64(0x3f).unwrap();
        assert_eq!(buf.len(), 1);
        buf.clear();
        // 0x40 has the sign bit set in the low 7, so it spills a byte.
        OBStream::new(&mut buf).write_u64(0x40).unwrap();
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn varint_i64_sign_extends() {
        let values = [0i64, 1, -1, 63, 64, -64, -65, 1 << 20, -(1 << 20), i64::MIN, i64::MAX];
        let mut buf = Vec::new();
        let mut o = OBStream::new(&mut buf);
        for &v in &values {
            o.write_i64(v).unwrap();
        }
        let mut i = IBStream::new(&buf[..]);
        for &v in &values {
            assert_eq!(i.read_i64().unwrap(), v);
        }
    }

    #[test]
    fn string_roundtrip() {
        let mut buf = Vec::new();
        OBStream::new(&mut buf).write_str("glb_netwk_3").unwrap();
        assert_eq!(IBStream::new(&buf[..]).read_str().unwrap(), "glb_netwk_3");
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = b"notachdb\x00".to_vec();
        assert!(read_binary_chipdb(&buf[..]).is_err());
    }

    #[test]
    fn chipdb_roundtrip_is_isomorphic() {
        let db = parse_chipdb("tiny", crate::text::tests::tiny_text()).unwrap();
        let mut buf = Vec::new();
        write_binary_chipdb(&mut buf, &db).unwrap();
        let db2 = read_binary_chipdb(&buf[..]).unwrap();

        assert_eq!(db.device, db2.device);
        assert_eq!(db.width, db2.width);
        assert_eq!(db.height, db2.height);
        assert_eq!(db.n_nets, db2.n_nets);
        assert_eq!(db.packages, db2.packages);
        assert_eq!(db.loc_pin_glb_num, db2.loc_pin_glb_num);
        assert_eq!(db.gbufin, db2.gbufin);
        assert_eq!(db.iolatch, db2.iolatch);
        assert_eq!(db.ieren, db2.ieren);
        assert_eq!(db.extra_bits, db2.extra_bits);
        assert_eq!(db.tile_colbuf_tile, db2.tile_colbuf_tile);
        assert_eq!(db.tile_type, db2.tile_type);
        assert_eq!(db.net_tile_name, db2.net_tile_name);
        assert_eq!(db.tile_nets, db2.tile_nets);
        assert_eq!(db.tile_nonrouting_cbits, db2.tile_nonrouting_cbits);
        assert_eq!(db.tile_cbits_block_size, db2.tile_cbits_block_size);
        assert_eq!(db.switches, db2.switches);
        assert_eq!(db.extra_cells, db2.extra_cells);

        // Derived tables come out identical because finalize is
        // deterministic over the same core.
        assert_eq!(db.n_cells, db2.n_cells);
        assert_eq!(db.loc_cell_map, db2.loc_cell_map);
        assert_eq!(db.net_global, db2.net_global);
        let second = db2.cell_type_cells.clone();
        assert_eq!(db.cell_type_cells, second);
    }

    #[test]
    fn truncated_input_is_error() {
        let db = parse_chipdb("tiny", crate::text::tests::tiny_text()).unwrap();
        let mut buf = Vec::new();
        write_binary_chipdb(&mut buf, &db).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(read_binary_chipdb(&buf[..]).is_err());
    }
}
