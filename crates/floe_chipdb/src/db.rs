//! The device database aggregate and its derived tables.

use crate::types::{BitCoord, CellType, ExtraCell, Location, Package, Switch, TileType};
use floe_common::{fatal, BasedVec, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Immutable description of one device, shared read-only by every stage.
///
/// The parsed fields mirror the chipdb text format; `finalize` derives the
/// cell enumeration, per-bank and per-type indexes and the switch-graph
/// adjacency used by placement and routing.
#[derive(Debug, Default)]
pub struct ChipDB {
    /// Device name (`1k`, `8k`).
    pub device: String,
    /// Grid width in tiles.
    pub width: usize,
    /// Grid height in tiles.
    pub height: usize,
    /// `width * height`.
    pub n_tiles: usize,
    /// Number of chip-nets in the switch graph.
    pub n_nets: usize,
    /// The first `n_global_nets` chip-nets are the global networks.
    pub n_global_nets: usize,

    /// Packages by name.
    pub packages: BTreeMap<String, Package>,
    /// PIO/PLL output location to driven global index.
    pub loc_pin_glb_num: BTreeMap<Location, usize>,
    /// `(x, y)` of each GB input site to its global index.
    pub gbufin: BTreeMap<(usize, usize), usize>,
    /// Tiles holding IO latches, one per bank.
    pub iolatch: Vec<usize>,
    /// PIO location to its IE/REN control location.
    pub ieren: BTreeMap<Location, Location>,
    /// Extra bit name to `(bank, addr_x, addr_y)`.
    pub extra_bits: BTreeMap<String, (usize, usize, usize)>,
    /// Tile to the tile sourcing its column buffer.
    pub tile_colbuf_tile: BTreeMap<usize, usize>,

    /// Per-tile type, row-major.
    pub tile_type: Vec<TileType>,
    /// Representative `(tile, local name)` per chip-net, for diagnostics.
    pub net_tile_name: Vec<(usize, String)>,
    /// Per-tile local net name to chip-net.
    pub tile_nets: Vec<BTreeMap<String, usize>>,
    /// Per tile type, function name to configuration-bit coordinates.
    pub tile_nonrouting_cbits: BTreeMap<TileType, BTreeMap<String, Vec<BitCoord>>>,
    /// Per tile type, `(columns, rows)` of the configuration-bit block.
    pub tile_cbits_block_size: BTreeMap<TileType, (usize, usize)>,

    /// All switches.
    pub switches: Vec<Switch>,
    /// Per chip-net, switches whose output is that net.
    pub out_switches: Vec<BTreeSet<usize>>,
    /// Per chip-net, switches that can be driven from that net.
    pub in_switches: Vec<BTreeSet<usize>>,

    /// Raw `.extra_cell` blocks in file order.
    pub extra_cells: Vec<ExtraCell>,

    // Derived by `finalize`.
    /// Number of cells; cell ids are `1..=n_cells`.
    pub n_cells: usize,
    /// Cell id to type.
    pub cell_type: BasedVec<CellType, 1>,
    /// Cell id to site.
    pub cell_location: BasedVec<Location, 1>,
    /// Cell id to its `.extra_cell` function lookups.
    pub cell_mfvs: BTreeMap<usize, BTreeMap<String, (usize, String)>>,
    /// Cells of each type, indexed by `CellType::idx`.
    pub cell_type_cells: Vec<Vec<usize>>,
    /// IO cells per edge bank.
    pub bank_cells: [Vec<usize>; 4],
    /// Site to cell id.
    pub loc_cell_map: BTreeMap<Location, usize>,
    /// Chip-net to global index, for the `glb_netwk_*` nets.
    pub net_global: BTreeMap<usize, usize>,
}

impl ChipDB {
    /// Sets the device header and sizes the per-tile / per-net tables.
    pub fn set_device(&mut self, device: &str, width: usize, height: usize, n_nets: usize) {
        self.device = device.to_string();
        self.width = width;
        self.height = height;
        self.n_tiles = width * height;
        self.n_nets = n_nets;
        self.n_global_nets = 8;
        self.tile_type = vec![TileType::Empty; self.n_tiles];
        self.tile_nets = vec![BTreeMap::new(); self.n_tiles];
        self.net_tile_name = vec![(0, String::new()); n_nets];
        self.out_switches = vec![BTreeSet::new(); n_nets];
        self.in_switches = vec![BTreeSet::new(); n_nets];
    }

    /// Tile index of `(x, y)`.
    pub fn tile(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        x + self.width * y
    }

    /// X coordinate of tile `t`.
    pub fn tile_x(&self, t: usize) -> usize {
        t % self.width
    }

    /// Y coordinate of tile `t`.
    pub fn tile_y(&self, t: usize) -> usize {
        t / self.width
    }

    /// Fractional x position of tile `t` in `[0, 1]`.
    pub fn unit_x(&self, t: usize) -> f64 {
        self.tile_x(t) as f64 / (self.width - 1) as f64
    }

    /// Fractional y position of tile `t` in `[0, 1]`.
    pub fn unit_y(&self, t: usize) -> f64 {
        self.tile_y(t) as f64 / (self.height - 1) as f64
    }

    /// Edge bank of IO tile `t`: 0 top, 1 right, 2 bottom, 3 left.
    /// Corner tiles with `x == 0` report bank 3.
    pub fn tile_bank(&self, t: usize) -> usize {
        debug_assert_eq!(self.tile_type[t], TileType::Io);
        let x = self.tile_x(t);
        let y = self.tile_y(t);
        if x == 0 {
            3
        } else if y == 0 {
            2
        } else if x == self.width - 1 {
            1
        } else {
            debug_assert_eq!(y, self.height - 1);
            0
        }
    }

    /// Whether chip-net `n` is one of the global networks.
    pub fn is_global_net(&self, n: usize) -> bool {
        n < self.n_global_nets
    }

    /// The cell at `loc`, or 0 if the site hosts none.
    pub fn loc_cell(&self, loc: Location) -> usize {
        self.loc_cell_map.get(&loc).copied().unwrap_or(0)
    }

    /// The unique switch driving `out` from `in_`.
    ///
    /// The database invariant is that the ordered pair identifies exactly
    /// one switch; any other multiplicity is a database error.
    pub fn find_switch(&self, in_: usize, out: usize) -> Result<usize> {
        let mut found = None;
        for &s in self.out_switches[out].intersection(&self.in_switches[in_]) {
            if found.is_some() {
                fatal!("found multiple switches from net {in_} to net {out}");
            }
            found = Some(s);
        }
        let Some(s) = found else {
            fatal!("no switch from net {in_} to net {out}");
        };
        debug_assert_eq!(self.switches[s].out, out);
        debug_assert!(self.switches[s].in_val.contains_key(&in_));
        Ok(s)
    }

    /// The global index driven by an oscillator cell's output `fn_name`.
    ///
    /// The extra-cell table records the driven network as a `glb_netwk_<g>`
    /// value for the clock output function.
    pub fn oscillator_glb(&self, cell: usize, fn_name: &str) -> Result<usize> {
        let Some(mfvs) = self.cell_mfvs.get(&cell) else {
            fatal!("cell {cell} has no extra-cell functions");
        };
        let Some((_, val)) = mfvs.get(fn_name) else {
            fatal!("cell {cell} has no function `{fn_name}'");
        };
        match val.strip_prefix("glb_netwk_").and_then(|s| s.parse().ok()) {
            Some(g) => Ok(g),
            None => {
                fatal!("function `{fn_name}' of cell {cell} does not name a global network")
            }
        }
    }

    /// Derives the cell enumeration and lookup tables from the parsed data.
    ///
    /// Cells are numbered 1-based: grid tiles in row-major order contribute
    /// their fixed sites (8 logic, 2 PIO, 1 RAM on the RAMT half), then GB
    /// sites in `gbufin` order at position 2, then `.extra_cell` entries in
    /// file order (PLL at position 3, WARMBOOT at 4, further hard cells at
    /// the next free position of their tile).
    pub fn finalize(&mut self) -> Result<()> {
        self.n_cells = 0;
        self.cell_type = BasedVec::new();
        self.cell_location = BasedVec::new();
        self.cell_mfvs.clear();
        self.loc_cell_map.clear();
        self.cell_type_cells = vec![Vec::new(); CellType::ALL.len()];
        self.bank_cells = Default::default();
        self.net_global.clear();

        let add_cell = |db_type: &mut BasedVec<CellType, 1>,
                            db_loc: &mut BasedVec<Location, 1>,
                            loc_cell: &mut BTreeMap<Location, usize>,
                            n_cells: &mut usize,
                            ty: CellType,
                            loc: Location|
         -> Result<usize> {
            if loc_cell.contains_key(&loc) {
                fatal!("duplicate cell at {loc}");
            }
            *n_cells += 1;
            db_type.push(ty);
            db_loc.push(loc);
            loc_cell.insert(loc, *n_cells);
            Ok(*n_cells)
        };

        for t in 0..self.n_tiles {
            match self.tile_type[t] {
                TileType::Logic => {
                    for pos in 0..8 {
                        add_cell(
                            &mut self.cell_type,
                            &mut self.cell_location,
                            &mut self.loc_cell_map,
                            &mut self.n_cells,
                            CellType::Logic,
                            Location::new(t, pos),
                        )?;
                    }
                }
                TileType::Io => {
                    for pos in 0..2 {
                        add_cell(
                            &mut self.cell_type,
                            &mut self.cell_location,
                            &mut self.loc_cell_map,
                            &mut self.n_cells,
                            CellType::Io,
                            Location::new(t, pos),
                        )?;
                    }
                }
                TileType::Ramt => {
                    add_cell(
                        &mut self.cell_type,
                        &mut self.cell_location,
                        &mut self.loc_cell_map,
                        &mut self.n_cells,
                        CellType::Ram,
                        Location::new(t, 0),
                    )?;
                }
                TileType::Ramb | TileType::Empty => {}
            }
        }

        for (&(x, y), &g) in &self.gbufin {
            if g >= self.n_global_nets {
                fatal!("gbufin at ({x} {y}) names global {g} out of range");
            }
            let t = self.tile(x, y);
            if self.tile_type[t] != TileType::Io {
                fatal!("gbufin at ({x} {y}) is not an IO tile");
            }
            add_cell(
                &mut self.cell_type,
                &mut self.cell_location,
                &mut self.loc_cell_map,
                &mut self.n_cells,
                CellType::Gb,
                Location::new(t, 2),
            )?;
        }

        let extra_cells = std::mem::take(&mut self.extra_cells);
        for ec in &extra_cells {
            let Some(ty) = CellType::from_extra_name(&ec.name) else {
                fatal!("unknown extra cell `{}'", ec.name);
            };
            let pos = match ty {
                CellType::Pll => 3,
                CellType::Warmboot => 4,
                _ => {
                    let mut pos = 4;
                    while self.loc_cell_map.contains_key(&Location::new(ec.tile, pos)) {
                        pos += 1;
                    }
                    pos
                }
            };
            let c = add_cell(
                &mut self.cell_type,
                &mut self.cell_location,
                &mut self.loc_cell_map,
                &mut self.n_cells,
                ty,
                Location::new(ec.tile, pos),
            )?;
            self.cell_mfvs.insert(c, ec.mfvs.clone());
        }
        self.extra_cells = extra_cells;

        for (c, &ty) in self.cell_type.iter() {
            self.cell_type_cells[ty.idx()].push(c);
            if ty == CellType::Io {
                let b = self.tile_bank(self.cell_location[c].tile);
                self.bank_cells[b].push(c);
            }
        }

        for t in 0..self.n_tiles {
            for (name, &n) in &self.tile_nets[t] {
                if let Some(g) = name.strip_prefix("glb_netwk_") {
                    if let Ok(g) = g.parse::<usize>() {
                        self.net_global.entry(n).or_insert(g);
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal 4x4 device: IO ring (minus corners), one logic tile, one
    /// RAMB/RAMT pair.
    pub fn tiny_db() -> ChipDB {
        let mut db = ChipDB::default();
        db.set_device("1k", 4, 4, 32);
        for x in 1..3 {
            for &y in &[0usize, 3] {
                let t = db.tile(x, y);
                db.tile_type[t] = TileType::Io;
            }
        }
        for y in 1..3 {
            for &x in &[0usize, 3] {
                let t = db.tile(x, y);
                db.tile_type[t] = TileType::Io;
            }
        }
        let logic = db.tile(1, 1);
        db.tile_type[logic] = TileType::Logic;
        let ramb = db.tile(2, 1);
        db.tile_type[ramb] = TileType::Ramb;
        let ramt = db.tile(2, 2);
        db.tile_type[ramt] = TileType::Ramt;
        db.gbufin.insert((1, 0), 0);
        db.finalize().unwrap();
        db
    }

    #[test]
    fn tile_coordinates_roundtrip() {
        let db = tiny_db();
        let t = db.tile(2, 3);
        assert_eq!(db.tile_x(t), 2);
        assert_eq!(db.tile_y(t), 3);
    }

    #[test]
    fn corner_rule_bank3() {
        let db = tiny_db();
        // (0, 1) is on the left edge.
        assert_eq!(db.tile_bank(db.tile(0, 1)), 3);
        assert_eq!(db.tile_bank(db.tile(3, 1)), 1);
        assert_eq!(db.tile_bank(db.tile(1, 0)), 2);
        assert_eq!(db.tile_bank(db.tile(1, 3)), 0);
    }

    #[test]
    fn finalize_enumerates_cells() {
        let db = tiny_db();
        // 8 logic + 8 io * 2 + 1 ram + 1 gb
        assert_eq!(db.n_cells, 8 + 16 + 1 + 1);
        assert_eq!(db.cell_type_cells[CellType::Logic.idx()].len(), 8);
        assert_eq!(db.cell_type_cells[CellType::Io.idx()].len(), 16);
        assert_eq!(db.cell_type_cells[CellType::Ram.idx()].len(), 1);
        assert_eq!(db.cell_type_cells[CellType::Gb.idx()].len(), 1);
    }

    #[test]
    fn loc_cell_is_inverse_of_cell_location() {
        let db = tiny_db();
        for (c, loc) in db.cell_location.iter() {
            assert_eq!(db.loc_cell(*loc), c);
        }
        assert_eq!(db.loc_cell(Location::new(0, 0)), 0);
    }

    #[test]
    fn gb_cell_sits_at_pos2() {
        let db = tiny_db();
        let gb = db.cell_type_cells[CellType::Gb.idx()][0];
        let loc = db.cell_location[gb];
        assert_eq!(loc.tile, db.tile(1, 0));
        assert_eq!(loc.pos, 2);
    }

    #[test]
    fn bank_cells_cover_all_io() {
        let db = tiny_db();
        let total: usize = db.bank_cells.iter().map(Vec::len).sum();
        assert_eq!(total, 16);
        for (b, cells) in db.bank_cells.iter().enumerate() {
            for &c in cells {
                assert_eq!(db.tile_bank(db.cell_location[c].tile), b);
            }
        }
    }

    #[test]
    fn global_nets_are_low_indices() {
        let db = tiny_db();
        assert!(db.is_global_net(0));
        assert!(db.is_global_net(7));
        assert!(!db.is_global_net(8));
    }

    #[test]
    fn find_switch_singleton() {
        let mut db = tiny_db();
        let t = db.tile(1, 1);
        db.switches.push(Switch {
            bidir: false,
            tile: t,
            out: 10,
            in_val: BTreeMap::from([(9, vec![true])]),
            cbits: vec![BitCoord { row: 0, col: 0 }],
        });
        db.out_switches[10].insert(0);
        db.in_switches[9].insert(0);
        assert_eq!(db.find_switch(9, 10).unwrap(), 0);
        assert!(db.find_switch(10, 9).is_err());
    }

    #[test]
    fn find_switch_rejects_multiple() {
        let mut db = tiny_db();
        for s in 0..2 {
            db.switches.push(Switch {
                bidir: false,
                tile: 0,
                out: 11,
                in_val: BTreeMap::from([(9, vec![true])]),
                cbits: vec![BitCoord { row: 0, col: s }],
            });
            db.out_switches[11].insert(s);
            db.in_switches[9].insert(s);
        }
        assert!(db.find_switch(9, 11).is_err());
    }

    #[test]
    fn unit_coordinates_normalized() {
        let db = tiny_db();
        assert_eq!(db.unit_x(db.tile(0, 0)), 0.0);
        assert_eq!(db.unit_x(db.tile(3, 0)), 1.0);
        assert_eq!(db.unit_y(db.tile(0, 3)), 1.0);
    }
}
