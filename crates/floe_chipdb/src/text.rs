//! Parser for the text chipdb format.
//!
//! The format is a sequence of dot-directives, most of which open a block
//! of data lines that runs until the next directive: `.device`, `.pins`,
//! `.gbufpin`, `.{io,logic,ramb,ramt}_tile`, `.{...}_tile_bits`, `.net`,
//! `.buffer`/`.routing`, `.colbuf`, `.gbufin`, `.iolatch`, `.ieren`,
//! `.extra_bits`, `.extra_cell`.

use crate::db::ChipDB;
use crate::types::{BitCoord, ExtraCell, Location, Package, Switch, TileType};
use floe_common::{FatalError, Result};
use floe_diagnostics::LineReader;
use std::collections::BTreeMap;

/// Reads and parses a text chipdb from `path`.
pub fn read_chipdb(path: &str) -> Result<ChipDB> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| FatalError::new(format!("read_chipdb: failed to open `{path}': {e}")))?;
    parse_chipdb(path, &text)
}

/// Parses a text chipdb.
pub fn parse_chipdb(file: &str, text: &str) -> Result<ChipDB> {
    let mut p = Parser {
        r: LineReader::new(file, text),
        pending: false,
    };
    p.parse()
}

struct Parser<'a> {
    r: LineReader<'a>,
    /// A directive line was read by a block loop and awaits dispatch.
    pending: bool,
}

impl<'a> Parser<'a> {
    /// Advances to the next line unless one is already pending.
    fn advance(&mut self) -> Result<()> {
        if self.pending {
            self.pending = false;
        } else {
            self.r.read_line()?;
        }
        Ok(())
    }

    /// Reads the next data line of a block; returns `false` when the block
    /// ends (next directive or end of file).
    fn block_line(&mut self) -> Result<bool> {
        self.r.read_line()?;
        if self.r.eof() {
            return Ok(false);
        }
        if self.r.line.trim_start().starts_with('.') {
            self.pending = true;
            return Ok(false);
        }
        Ok(true)
    }

    fn int(&self, w: &str) -> Result<usize> {
        w.parse()
            .map_err(|_| self.r.fatal(format!("expected integer, got `{w}'")))
    }

    fn check_tile_x(&self, db: &ChipDB, x: usize) -> Result<()> {
        if x >= db.width {
            return Err(self.r.fatal("tile x out of range"));
        }
        Ok(())
    }

    fn check_tile_y(&self, db: &ChipDB, y: usize) -> Result<()> {
        if y >= db.height {
            return Err(self.r.fatal("tile y out of range"));
        }
        Ok(())
    }

    fn parse_cbit(&self, s: &str) -> Result<BitCoord> {
        let bad = || self.r.fatal("invalid cbit spec");
        let rest = s.strip_prefix('B').ok_or_else(bad)?;
        let lbr = rest.find('[').ok_or_else(bad)?;
        let rbr = rest.find(']').ok_or_else(bad)?;
        if rbr < lbr {
            return Err(bad());
        }
        let row = rest[..lbr].parse().map_err(|_| bad())?;
        let col = rest[lbr + 1..rbr].parse().map_err(|_| bad())?;
        Ok(BitCoord { row, col })
    }

    fn parse(&mut self) -> Result<ChipDB> {
        let mut db = ChipDB::default();

        loop {
            self.advance()?;
            if self.r.eof() {
                break;
            }
            let words = self.r.words.clone();
            let cmd = words[0].as_str();
            if !cmd.starts_with('.') {
                return Err(self.r.fatal(format!("expected directive, got `{cmd}'")));
            }

            match cmd {
                ".device" => {
                    if words.len() != 5 {
                        return Err(self.r.fatal("wrong number of arguments"));
                    }
                    let w = self.int(&words[2])?;
                    let h = self.int(&words[3])?;
                    let n = self.int(&words[4])?;
                    db.set_device(&words[1], w, h, n);
                }
                ".pins" => {
                    if words.len() != 2 {
                        return Err(self.r.fatal("wrong number of arguments"));
                    }
                    let mut package = Package {
                        name: words[1].clone(),
                        ..Package::default()
                    };
                    while self.block_line()? {
                        if self.r.words.len() != 4 {
                            return Err(self.r.fatal("invalid .pins entry"));
                        }
                        let pin = self.r.words[0].clone();
                        let x = self.int(&self.r.words[1])?;
                        let y = self.int(&self.r.words[2])?;
                        let pos = self.int(&self.r.words[3])?;
                        self.check_tile_x(&db, x)?;
                        self.check_tile_y(&db, y)?;
                        let loc = Location::new(db.tile(x, y), pos);
                        if package.pin_loc.insert(pin.clone(), loc).is_some() {
                            return Err(self.r.fatal(format!("duplicate pin `{pin}'")));
                        }
                        package.loc_pin.insert(loc, pin);
                    }
                    db.packages.insert(package.name.clone(), package);
                }
                ".gbufpin" => {
                    while self.block_line()? {
                        if self.r.words.len() != 4 {
                            return Err(self.r.fatal("invalid .gbufpin entry"));
                        }
                        let x = self.int(&self.r.words[0])?;
                        let y = self.int(&self.r.words[1])?;
                        let pos = self.int(&self.r.words[2])?;
                        let glb = self.int(&self.r.words[3])?;
                        self.check_tile_x(&db, x)?;
                        self.check_tile_y(&db, y)?;
                        db.loc_pin_glb_num
                            .insert(Location::new(db.tile(x, y), pos), glb);
                    }
                }
                ".io_tile" | ".logic_tile" | ".ramb_tile" | ".ramt_tile" => {
                    if words.len() != 3 {
                        return Err(self.r.fatal("wrong number of arguments"));
                    }
                    let x = self.int(&words[1])?;
                    let y = self.int(&words[2])?;
                    self.check_tile_x(&db, x)?;
                    self.check_tile_y(&db, y)?;
                    let t = db.tile(x, y);
                    db.tile_type[t] = match cmd {
                        ".io_tile" => TileType::Io,
                        ".logic_tile" => TileType::Logic,
                        ".ramb_tile" => TileType::Ramb,
                        _ => TileType::Ramt,
                    };
                }
                ".io_tile_bits" | ".logic_tile_bits" | ".ramb_tile_bits" | ".ramt_tile_bits" => {
                    if words.len() != 3 {
                        return Err(self.r.fatal("wrong number of arguments"));
                    }
                    let ty = match cmd {
                        ".io_tile_bits" => TileType::Io,
                        ".logic_tile_bits" => TileType::Logic,
                        ".ramb_tile_bits" => TileType::Ramb,
                        _ => TileType::Ramt,
                    };
                    let n_columns = self.int(&words[1])?;
                    let n_rows = self.int(&words[2])?;
                    db.tile_cbits_block_size.insert(ty, (n_columns, n_rows));

                    while self.block_line()? {
                        if self.r.words.len() < 2 {
                            return Err(self.r.fatal("invalid tile entry"));
                        }
                        let func = self.r.words[0].clone();
                        let mut cbits = Vec::with_capacity(self.r.words.len() - 1);
                        for w in &self.r.words[1..] {
                            cbits.push(self.parse_cbit(w)?);
                        }
                        db.tile_nonrouting_cbits
                            .entry(ty)
                            .or_default()
                            .insert(func, cbits);
                    }
                }
                ".net" => {
                    if words.len() != 2 {
                        return Err(self.r.fatal("wrong number of arguments"));
                    }
                    let n = self.int(&words[1])?;
                    if n >= db.n_nets {
                        return Err(self.r.fatal("invalid net index"));
                    }
                    let mut first = true;
                    while self.block_line()? {
                        if self.r.words.len() != 3 {
                            return Err(self.r.fatal("invalid .net entry"));
                        }
                        let x = self.int(&self.r.words[0])?;
                        let y = self.int(&self.r.words[1])?;
                        self.check_tile_x(&db, x)?;
                        self.check_tile_y(&db, y)?;
                        let t = db.tile(x, y);
                        let name = self.r.words[2].clone();
                        if first {
                            db.net_tile_name[n] = (t, name.clone());
                            first = false;
                        }
                        db.tile_nets[t].insert(name, n);
                    }
                }
                ".buffer" | ".routing" => {
                    if words.len() < 5 {
                        return Err(self.r.fatal("too few arguments"));
                    }
                    let x = self.int(&words[1])?;
                    let y = self.int(&words[2])?;
                    self.check_tile_x(&db, x)?;
                    self.check_tile_y(&db, y)?;
                    let t = db.tile(x, y);
                    let n = self.int(&words[3])?;
                    if n >= db.n_nets {
                        return Err(self.r.fatal("invalid net index"));
                    }
                    let mut cbits = Vec::with_capacity(words.len() - 4);
                    for w in &words[4..] {
                        cbits.push(self.parse_cbit(w)?);
                    }

                    let mut in_val: BTreeMap<usize, Vec<bool>> = BTreeMap::new();
                    while self.block_line()? {
                        if self.r.words.len() != 2 || self.r.words[0].len() != cbits.len() {
                            return Err(self.r.fatal("invalid .buffer/.routing entry"));
                        }
                        let mut val = Vec::with_capacity(cbits.len());
                        for c in self.r.words[0].bytes() {
                            match c {
                                b'1' => val.push(true),
                                b'0' => val.push(false),
                                _ => return Err(self.r.fatal("invalid binary string")),
                            }
                        }
                        let n2 = self.int(&self.r.words[1])?;
                        if n2 >= db.n_nets {
                            return Err(self.r.fatal("invalid net index"));
                        }
                        in_val.insert(n2, val);
                    }

                    let s = db.switches.len();
                    db.out_switches[n].insert(s);
                    for &n2 in in_val.keys() {
                        db.in_switches[n2].insert(s);
                    }
                    db.switches.push(Switch {
                        bidir: cmd == ".routing",
                        tile: t,
                        out: n,
                        in_val,
                        cbits,
                    });
                }
                ".colbuf" => {
                    while self.block_line()? {
                        if self.r.words.len() != 4 {
                            return Err(self.r.fatal("invalid .colbuf entry"));
                        }
                        let src_x = self.int(&self.r.words[0])?;
                        let src_y = self.int(&self.r.words[1])?;
                        let dst_x = self.int(&self.r.words[2])?;
                        let dst_y = self.int(&self.r.words[3])?;
                        db.tile_colbuf_tile
                            .insert(db.tile(dst_x, dst_y), db.tile(src_x, src_y));
                    }
                }
                ".gbufin" => {
                    while self.block_line()? {
                        if self.r.words.len() != 3 {
                            return Err(self.r.fatal("invalid .gbufin entry"));
                        }
                        let x = self.int(&self.r.words[0])?;
                        let y = self.int(&self.r.words[1])?;
                        let g = self.int(&self.r.words[2])?;
                        if g >= db.n_global_nets {
                            return Err(self.r.fatal("global index out of range"));
                        }
                        db.gbufin.insert((x, y), g);
                    }
                }
                ".iolatch" => {
                    while self.block_line()? {
                        if self.r.words.len() != 2 {
                            return Err(self.r.fatal("invalid .iolatch entry"));
                        }
                        let x = self.int(&self.r.words[0])?;
                        let y = self.int(&self.r.words[1])?;
                        let t = db.tile(x, y);
                        db.iolatch.push(t);
                    }
                }
                ".ieren" => {
                    while self.block_line()? {
                        if self.r.words.len() != 6 {
                            return Err(self.r.fatal("invalid .ieren entry"));
                        }
                        let px = self.int(&self.r.words[0])?;
                        let py = self.int(&self.r.words[1])?;
                        let ppos = self.int(&self.r.words[2])?;
                        let ix = self.int(&self.r.words[3])?;
                        let iy = self.int(&self.r.words[4])?;
                        let ipos = self.int(&self.r.words[5])?;
                        db.ieren.insert(
                            Location::new(db.tile(px, py), ppos),
                            Location::new(db.tile(ix, iy), ipos),
                        );
                    }
                }
                ".extra_bits" => {
                    while self.block_line()? {
                        if self.r.words.len() != 4 {
                            return Err(self.r.fatal("invalid .extra_bits entry"));
                        }
                        let name = self.r.words[0].clone();
                        let bank = self.int(&self.r.words[1])?;
                        let ax = self.int(&self.r.words[2])?;
                        let ay = self.int(&self.r.words[3])?;
                        db.extra_bits.insert(name, (bank, ax, ay));
                    }
                }
                ".extra_cell" => {
                    if words.len() != 4 {
                        return Err(self.r.fatal("wrong number of arguments to .extra_cell"));
                    }
                    let x = self.int(&words[1])?;
                    let y = self.int(&words[2])?;
                    self.check_tile_x(&db, x)?;
                    self.check_tile_y(&db, y)?;
                    let t = db.tile(x, y);
                    let name = words[3].clone();

                    let mut mfvs = BTreeMap::new();
                    while self.block_line()? {
                        if self.r.words.len() != 4 {
                            return Err(self.r.fatal("invalid .extra_cell entry"));
                        }
                        let func = self.r.words[0].clone();
                        let mx = self.int(&self.r.words[1])?;
                        let my = self.int(&self.r.words[2])?;
                        let mfv_t = db.tile(mx, my);
                        mfvs.insert(func, (mfv_t, self.r.words[3].clone()));
                    }
                    db.extra_cells.push(ExtraCell {
                        name,
                        tile: t,
                        mfvs,
                    });
                }
                _ => return Err(self.r.fatal(format!("unknown directive '{cmd}'"))),
            }
        }

        db.finalize()?;
        Ok(db)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::CellType;

    /// A textual 4x4 device exercising every directive.
    pub fn tiny_text() -> &'static str {
        "\
.device 1k 4 4 16

.pins tq144
1 1 0 0
2 1 0 1
3 0 1 0

.gbufpin
1 0 2 0

.io_tile 1 0
.io_tile 2 0
.io_tile 0 1
.io_tile 0 2
.io_tile 3 1
.io_tile 3 2
.io_tile 1 3
.io_tile 2 3
.logic_tile 1 1
.logic_tile 1 2
.ramb_tile 2 1
.ramt_tile 2 2

.logic_tile_bits 2 4
LC_0 B0[0] B0[1]
NegClk B1[0]

.io_tile_bits 2 2
IOB_0.PIN_TYPE_0 B0[0]

.net 0
1 0 glb_netwk_0
1 1 glb_netwk_0

.net 8
1 1 lutff_0/out

.net 9
1 1 lutff_0/in_0

.net 10
1 1 local_g0_0

.buffer 1 1 9 B0[0] B0[1]
01 10
10 8

.routing 1 1 10 B1[0]
1 8

.colbuf
1 0 1 1

.gbufin
1 0 0

.iolatch
0 1

.ieren
1 0 0 1 0 1

.extra_bits
padin_glb_netwk_0 0 1 2

.extra_cell 0 1 PLL
PLLOUT_A 1 0 0
PLLOUT_B 2 0 0
"
    }

    #[test]
    fn parses_device_header() {
        let db = parse_chipdb("tiny", tiny_text()).unwrap();
        assert_eq!(db.device, "1k");
        assert_eq!(db.width, 4);
        assert_eq!(db.height, 4);
        assert_eq!(db.n_nets, 16);
        assert_eq!(db.n_tiles, 16);
    }

    #[test]
    fn parses_pins_and_gbufpin() {
        let db = parse_chipdb("tiny", tiny_text()).unwrap();
        let pkg = &db.packages["tq144"];
        assert_eq!(pkg.pin_loc.len(), 3);
        let loc = pkg.pin_loc["2"];
        assert_eq!(pkg.loc_pin[&loc], "2");
        assert_eq!(db.loc_pin_glb_num[&Location::new(db.tile(1, 0), 2)], 0);
    }

    #[test]
    fn parses_tiles_and_bits() {
        let db = parse_chipdb("tiny", tiny_text()).unwrap();
        assert_eq!(db.tile_type[db.tile(1, 1)], TileType::Logic);
        assert_eq!(db.tile_type[db.tile(2, 2)], TileType::Ramt);
        assert_eq!(db.tile_cbits_block_size[&TileType::Logic], (2, 4));
        let lc0 = &db.tile_nonrouting_cbits[&TileType::Logic]["LC_0"];
        assert_eq!(lc0.len(), 2);
        assert_eq!(lc0[1], BitCoord { row: 0, col: 1 });
    }

    #[test]
    fn parses_nets_and_switches() {
        let db = parse_chipdb("tiny", tiny_text()).unwrap();
        let t = db.tile(1, 1);
        assert_eq!(db.tile_nets[t]["lutff_0/out"], 8);
        assert_eq!(db.switches.len(), 2);
        let s = db.find_switch(10, 9).unwrap();
        let sw = &db.switches[s];
        assert!(!sw.bidir);
        assert_eq!(sw.in_val[&10], vec![false, true]);
        assert_eq!(sw.in_val[&8], vec![true, false]);
        let s2 = db.find_switch(8, 10).unwrap();
        assert!(db.switches[s2].bidir);
    }

    #[test]
    fn parses_colbuf_gbufin_extra() {
        let db = parse_chipdb("tiny", tiny_text()).unwrap();
        assert_eq!(db.tile_colbuf_tile[&db.tile(1, 1)], db.tile(1, 0));
        assert_eq!(db.gbufin[&(1, 0)], 0);
        assert_eq!(db.iolatch, vec![db.tile(0, 1)]);
        assert_eq!(db.extra_bits["padin_glb_netwk_0"], (0, 1, 2));
    }

    #[test]
    fn pll_extra_cell_finalized_at_pos3() {
        let db = parse_chipdb("tiny", tiny_text()).unwrap();
        let plls = &db.cell_type_cells[CellType::Pll.idx()];
        assert_eq!(plls.len(), 1);
        let c = plls[0];
        assert_eq!(db.cell_location[c], Location::new(db.tile(0, 1), 3));
        assert_eq!(db.cell_mfvs[&c]["PLLOUT_A"].0, db.tile(1, 0));
    }

    #[test]
    fn net_global_derived_from_names() {
        let db = parse_chipdb("tiny", tiny_text()).unwrap();
        assert_eq!(db.net_global[&0], 0);
        assert!(!db.net_global.contains_key(&8));
    }

    #[test]
    fn unknown_directive_is_fatal() {
        let err = parse_chipdb("x", ".bogus 1\n").unwrap_err();
        assert!(err.to_string().contains("unknown directive"));
    }

    #[test]
    fn tile_out_of_range_is_fatal() {
        let err = parse_chipdb("x", ".device 1k 2 2 4\n.io_tile 5 0\n").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
