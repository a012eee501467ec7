//! Configuration-bit accumulation and the textual bitstream writer.
//!
//! The placer and router deposit individual bits here; at the end the
//! accumulated image is serialized as bitstream text: `.device`, one block
//! per non-empty tile with a rows-by-columns bit matrix, `.extra_bit`
//! lines, `.ram_data` blocks for placed BRAMs, and `.sym` lines naming the
//! routed chip-nets.

use floe_chipdb::{BitCoord, ChipDB, TileType};
use floe_common::{hexdigit, FatalError, Result};
use floe_netlist::{Design, InstanceId, Models, NetId};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

/// Accumulator for every programmable bit of the device.
#[derive(Debug, Default, Clone)]
pub struct Configuration {
    /// `(tile, row, col)` to bit value.
    cbits: BTreeMap<(usize, usize, usize), bool>,
    /// `(bank, addr_x, addr_y)` extra bits.
    extra_cbits: BTreeSet<(usize, usize, usize)>,
}

impl Configuration {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets one bit; re-setting a bit to a conflicting value is a bug in
    /// the caller.
    pub fn set_cbit(&mut self, tile: usize, coord: BitCoord, value: bool) -> Result<()> {
        let key = (tile, coord.row, coord.col);
        if let Some(&old) = self.cbits.get(&key) {
            if old != value {
                return Err(FatalError::new(format!(
                    "conflicting value for config bit {coord} of tile {tile}"
                )));
            }
        }
        self.cbits.insert(key, value);
        Ok(())
    }

    /// Sets a group of bits from a pattern (one value per coordinate).
    pub fn set_cbits(&mut self, tile: usize, coords: &[BitCoord], value: &[bool]) -> Result<()> {
        debug_assert_eq!(coords.len(), value.len());
        for (coord, &bit) in coords.iter().zip(value) {
            self.set_cbit(tile, *coord, bit)?;
        }
        Ok(())
    }

    /// Sets a group of bits from the low bits of an integer value.
    pub fn set_cbits_value(
        &mut self,
        tile: usize,
        coords: &[BitCoord],
        value: u64,
    ) -> Result<()> {
        for (i, coord) in coords.iter().enumerate() {
            self.set_cbit(tile, *coord, value & (1 << i) != 0)?;
        }
        Ok(())
    }

    /// Reads a bit back (unset bits are zero).
    pub fn cbit(&self, tile: usize, coord: BitCoord) -> bool {
        self.cbits
            .get(&(tile, coord.row, coord.col))
            .copied()
            .unwrap_or(false)
    }

    /// Records an extra bit.
    pub fn set_extra_cbit(&mut self, bank: usize, ax: usize, ay: usize) {
        self.extra_cbits.insert((bank, ax, ay));
    }

    /// Writes the bitstream text.
    ///
    /// `cnet_net` maps each chip-net to the design net routed over it, for
    /// the `.sym` symbol table.
    pub fn write_txt(
        &self,
        w: &mut dyn Write,
        version: &str,
        chipdb: &ChipDB,
        d: &Design,
        placement: &BTreeMap<InstanceId, usize>,
        cnet_net: &[Option<NetId>],
    ) -> Result<()> {
        let io_err = |e: std::io::Error| FatalError::new(format!("write: {e}"));

        writeln!(w, ".comment {version}").map_err(io_err)?;
        writeln!(w, ".device {}", chipdb.device).map_err(io_err)?;

        for t in 0..chipdb.n_tiles {
            let ty = chipdb.tile_type[t];
            if ty == TileType::Empty {
                continue;
            }
            let x = chipdb.tile_x(t);
            let y = chipdb.tile_y(t);
            writeln!(w, ".{} {} {}", ty.name(), x, y).map_err(io_err)?;

            let Some(&(bw, bh)) = chipdb.tile_cbits_block_size.get(&ty) else {
                return Err(FatalError::new(format!(
                    "no configuration block size for {}",
                    ty.name()
                )));
            };
            for r in 0..bh {
                let mut line = String::with_capacity(bw);
                for c in 0..bw {
                    let bit = self.cbit(t, BitCoord { row: r, col: c });
                    line.push(if bit { '1' } else { '0' });
                }
                writeln!(w, "{line}").map_err(io_err)?;
            }
        }

        for &(bank, ax, ay) in &self.extra_cbits {
            writeln!(w, ".extra_bit {bank} {ax} {ay}").map_err(io_err)?;
        }

        let models = Models::new(d);
        for (&inst, &cell) in placement {
            if !models.is_ram(d, inst) {
                continue;
            }
            let loc = chipdb.cell_location[cell];
            debug_assert_eq!(chipdb.tile_type[loc.tile], TileType::Ramt);
            let x = chipdb.tile_x(loc.tile);
            let y = chipdb.tile_y(loc.tile);
            writeln!(w, ".ram_data {} {}", x, y - 1).map_err(io_err)?;
            for i in 0..16u32 {
                let param = format!("INIT_{}", hexdigit(i, 'A'));
                let mut init = d.get_param(inst, &param)?.as_bits()?.clone();
                init.resize(256);
                let mut line = String::with_capacity(64);
                for j in (0..64).rev() {
                    let v = (u32::from(init.get(j * 4 + 3)) << 3)
                        | (u32::from(init.get(j * 4 + 2)) << 2)
                        | (u32::from(init.get(j * 4 + 1)) << 1)
                        | u32::from(init.get(j * 4));
                    line.push(hexdigit(v, 'a'));
                }
                writeln!(w, "{line}").map_err(io_err)?;
            }
        }

        for (i, n) in cnet_net.iter().enumerate() {
            if let Some(n) = n {
                writeln!(w, ".sym {} {}", i, d.net(*n).name).map_err(io_err)?;
            }
        }

        Ok(())
    }
}
