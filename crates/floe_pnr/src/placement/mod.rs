//! Simulated-annealing placement.
//!
//! Minimizes total half-perimeter wire length over random gate swaps and
//! chain relocations, under the hard architectural legality rules of each
//! tile (one CLK/CEN/SR trio and uniform clock polarity per logic tile,
//! bounded local inputs, PIO pairing rules, GB network masks, PLL output
//! path conflicts). Cost deltas are computed over changed nets only, with
//! undo journals to restore rejected moves.

pub mod configure;

pub use configure::configure_cells;

use crate::state::DesignState;
use floe_chipdb::{CellType, Location, TileType};
use floe_common::{fatal, BasedVec, Result, UllmanSet};
use floe_diagnostics::LogSink;
use floe_netlist::{Const, InstanceId, NodeRef};
use std::collections::BTreeSet;

/// Placer options, mirroring the `place` pass flags.
#[derive(Debug, Clone)]
pub struct PlaceOptions {
    /// Stop after the initial placement.
    pub place_random: bool,
    /// Optimize the quadratic-wirelength-position objective instead of
    /// HPWL.
    pub qwp: bool,
    /// Initial annealing temperature.
    pub init_temp: f64,
    /// Accept only cost-improving moves.
    pub improve_only: bool,
}

impl Default for PlaceOptions {
    fn default() -> Self {
        Self {
            place_random: false,
            qwp: false,
            init_temp: 10000.0,
            improve_only: false,
        }
    }
}

/// Places the design, filling `ds.placement`.
pub fn place(ds: &mut DesignState, opts: &PlaceOptions, sink: &LogSink) -> Result<()> {
    let mut placer = Placer::new(ds, opts)?;
    placer.place(sink)?;
    Ok(())
}

/// Rebuilds `ds.placement` from `loc` attributes (route-only mode).
pub fn placement_from_loc(ds: &mut DesignState) -> Result<()> {
    let insts: Vec<InstanceId> = ds.design.model(ds.top).instances.iter().copied().collect();
    for inst in insts {
        let loc_attr = ds.design.get_attr(inst, "loc")?.as_string()?.to_string();
        let Ok(cell) = loc_attr.parse::<usize>() else {
            fatal!("parse error in loc attribute: expected int, got `{loc_attr}'");
        };
        ds.placement.insert(inst, cell);
    }
    Ok(())
}

/// Stamps each placed instance with a `loc` attribute: the raw cell
/// number, or `x,y/pos` when `readable`.
pub fn loc_from_placement(ds: &mut DesignState, readable: bool) -> Result<()> {
    let placement: Vec<(InstanceId, usize)> =
        ds.placement.iter().map(|(&i, &c)| (i, c)).collect();
    for (inst, cell) in placement {
        let value = if readable {
            let loc = ds.chipdb.cell_location[cell];
            format!(
                "{},{}/{}",
                ds.chipdb.tile_x(loc.tile),
                ds.chipdb.tile_y(loc.tile),
                loc.pos
            )
        } else {
            cell.to_string()
        };
        ds.design.set_attr(inst, "loc", Const::str(value));
    }
    Ok(())
}

struct Placer<'a, 'b> {
    ds: &'a mut DesignState<'b>,

    qwp: bool,
    place_random: bool,
    improve_only: bool,

    logic_columns: Vec<usize>,
    n_logic_tiles: usize,
    n_ramt_tiles: usize,
    related_tiles: Vec<Vec<usize>>,

    n_nets: usize,
    net_global: Vec<bool>,
    net_gates: Vec<Vec<usize>>,
    net_length: Vec<i64>,

    n_gates: usize,
    gates: BasedVec<InstanceId, 1>,
    gate_idx: std::collections::BTreeMap<InstanceId, usize>,
    gate_ctype: BasedVec<CellType, 1>,
    gate_clk: BasedVec<usize, 1>,
    gate_sr: BasedVec<usize, 1>,
    gate_cen: BasedVec<usize, 1>,
    gate_latch: BasedVec<usize, 1>,
    gate_neg: BasedVec<bool, 1>,
    gate_lvds: BasedVec<bool, 1>,
    gate_is_gb_io: BasedVec<bool, 1>,
    gate_din_used: BasedVec<bool, 1>,
    gate_dual_pll: BasedVec<bool, 1>,
    gate_local_np: BasedVec<Vec<usize>, 1>,
    gate_nets: BasedVec<Vec<usize>, 1>,
    gate_chain: BasedVec<isize, 1>,
    gate_qwp_x: BasedVec<f64, 1>,
    gate_qwp_y: BasedVec<f64, 1>,
    gate_qwp_cost: BasedVec<f64, 1>,
    locked: BasedVec<bool, 1>,
    chained: BasedVec<bool, 1>,

    gate_cell: BasedVec<usize, 1>,
    cell_gate: BasedVec<usize, 1>,

    chain_x: Vec<usize>,
    chain_start: Vec<usize>,

    free_gates: Vec<usize>,

    tmp_local_np: UllmanSet,

    diameter: usize,
    temp: f64,
    improved: bool,
    n_move: usize,
    n_accept: usize,

    move_failed: bool,
    changed_tiles: UllmanSet,
    restore_cell: Vec<(usize, usize)>,
    restore_chain: Vec<(usize, usize, usize)>,
    restore_net_length: Vec<(usize, i64)>,
    restore_gate_qwp_cost: Vec<(usize, f64)>,
    recompute_gate: UllmanSet,
    recompute_net: UllmanSet,
}

impl<'a, 'b> Placer<'a, 'b> {
    fn new(ds: &'a mut DesignState<'b>, opts: &PlaceOptions) -> Result<Self> {
        let chipdb = ds.chipdb;

        let mut related_tiles = vec![Vec::new(); chipdb.n_tiles];
        for (c, &ty) in ds.chipdb.cell_type.iter() {
            if ty != CellType::Pll {
                continue;
            }
            let t = chipdb.cell_location[c].tile;
            let mut group = vec![t];
            if let Some(mfvs) = chipdb.cell_mfvs.get(&c) {
                for fn_name in ["PLLOUT_A", "PLLOUT_B"] {
                    if let Some(&(ft, _)) = mfvs.get(fn_name) {
                        group.push(ft);
                    }
                }
            }
            for &t2 in &group {
                related_tiles[t2] = group.clone();
            }
        }

        let mut logic_columns = Vec::new();
        for x in 0..chipdb.width {
            if chipdb.height > 1 && chipdb.tile_type[chipdb.tile(x, 1)] == TileType::Logic {
                logic_columns.push(x);
            }
        }
        let n_logic_tiles = chipdb
            .tile_type
            .iter()
            .filter(|&&ty| ty == TileType::Logic)
            .count();
        let n_ramt_tiles = chipdb
            .tile_type
            .iter()
            .filter(|&&ty| ty == TileType::Ramt)
            .count();

        let (all_nets, net_idx) = ds.design.index_nets(ds.top);
        let n_nets = all_nets.len();

        let (gates, gate_idx) = ds.design.index_instances(ds.top);
        let n_gates = gates.len();

        let mut p = Self {
            qwp: opts.qwp,
            place_random: opts.place_random,
            improve_only: opts.improve_only,
            logic_columns,
            n_logic_tiles,
            n_ramt_tiles,
            related_tiles,
            n_nets,
            net_global: vec![false; n_nets],
            net_gates: vec![Vec::new(); n_nets],
            net_length: vec![0; n_nets],
            n_gates,
            gates,
            gate_idx,
            gate_ctype: BasedVec::filled(n_gates, CellType::Logic),
            gate_clk: BasedVec::filled(n_gates, 0),
            gate_sr: BasedVec::filled(n_gates, 0),
            gate_cen: BasedVec::filled(n_gates, 0),
            gate_latch: BasedVec::filled(n_gates, 0),
            gate_neg: BasedVec::filled(n_gates, false),
            gate_lvds: BasedVec::filled(n_gates, false),
            gate_is_gb_io: BasedVec::filled(n_gates, false),
            gate_din_used: BasedVec::filled(n_gates, false),
            gate_dual_pll: BasedVec::filled(n_gates, false),
            gate_local_np: BasedVec::filled(n_gates, Vec::new()),
            gate_nets: BasedVec::filled(n_gates, Vec::new()),
            gate_chain: BasedVec::filled(n_gates, -1),
            gate_qwp_x: BasedVec::filled(n_gates, 0.5),
            gate_qwp_y: BasedVec::filled(n_gates, 0.5),
            gate_qwp_cost: BasedVec::filled(n_gates, 0.0),
            locked: BasedVec::filled(n_gates, false),
            chained: BasedVec::filled(n_gates, false),
            gate_cell: BasedVec::filled(n_gates, 0),
            cell_gate: BasedVec::filled(ds.chipdb.n_cells, 0),
            chain_x: vec![0; ds.chains.len()],
            chain_start: vec![0; ds.chains.len()],
            free_gates: Vec::new(),
            tmp_local_np: UllmanSet::new(n_nets * 2),
            diameter: chipdb.width.max(chipdb.height),
            temp: opts.init_temp,
            improved: false,
            n_move: 0,
            n_accept: 0,
            move_failed: false,
            changed_tiles: UllmanSet::new(chipdb.n_tiles),
            restore_cell: Vec::new(),
            restore_chain: Vec::new(),
            restore_net_length: Vec::new(),
            restore_gate_qwp_cost: Vec::new(),
            recompute_gate: UllmanSet::new(n_gates + 1),
            recompute_net: UllmanSet::new(n_nets),
            ds,
        };

        for g in 1..=n_gates {
            let inst = p.gates[g];
            let d = &p.ds.design;
            let models = &p.ds.models;

            p.gate_ctype[g] = gate_cell_type(d, models, inst)?;

            let net_of = |name: &str| {
                d.find_port(NodeRef::Instance(inst), name)
                    .and_then(|port| d.port(port).connection)
                    .map(|n| net_idx[&n])
            };

            if models.is_lc(d, inst) {
                if let Some(w) = net_of("CLK") {
                    p.gate_clk[g] = w;
                }
                if let Some(w) = net_of("SR") {
                    p.gate_sr[g] = w;
                }
                if let Some(w) = net_of("CEN") {
                    p.gate_cen[g] = w;
                }
                p.gate_neg[g] = d.get_param(inst, "NEG_CLK")?.get_bit(0)?;

                p.tmp_local_np.clear();
                for (j, name) in ["I0", "I1", "I2", "I3"].iter().enumerate() {
                    let port = d.find_port(NodeRef::Instance(inst), name).unwrap();
                    if let Some(n) = d.port(port).connection {
                        if !d.net(n).is_constant {
                            p.tmp_local_np.insert((net_idx[&n] << 1) | (j & 1));
                        }
                    }
                }
                for j in 0..p.tmp_local_np.len() {
                    let np = p.tmp_local_np.ith(j);
                    p.gate_local_np[g].push(np);
                }
            } else if models.is_io_family(d, inst) {
                if let Some(w) = net_of("LATCH_INPUT_VALUE") {
                    p.gate_latch[g] = w;
                }
                if let Some(w) = net_of("CLOCK_ENABLE") {
                    p.gate_cen[g] = w;
                }
                p.gate_neg[g] = d.get_param(inst, "NEG_TRIGGER")?.get_bit(0)?;
                p.gate_lvds[g] =
                    d.get_param(inst, "IO_STANDARD")?.as_string()? == "SB_LVDS_INPUT";
                p.gate_is_gb_io[g] = models.is_gb_io(d, inst);
                let din0 = net_of("D_IN_0");
                p.gate_din_used[g] = din0.is_some();
            } else if models.is_gb(d, inst) {
                if let Some(w) = net_of("GLOBAL_BUFFER_OUTPUT") {
                    p.net_global[w] = true;
                }
            } else if models.is_pll(d, inst) {
                p.gate_dual_pll[g] = models.is_dual_pll(d, inst);
            }
        }

        Ok(p)
    }

    fn chipdb(&self) -> &'b floe_chipdb::ChipDB {
        self.ds.chipdb
    }

    // ----- legality -----

    /// Architectural legality of tile `t` under the current assignment.
    fn valid(&mut self, t: usize) -> Result<bool> {
        let chipdb = self.chipdb();
        match chipdb.tile_type[t] {
            TileType::Logic => {
                let mut global_clk = 0usize;
                let mut global_sr = 0usize;
                let mut global_cen = 0usize;
                let mut neg_clk: Option<bool> = None;
                self.tmp_local_np.clear();
                for q in 0..8 {
                    let cell = chipdb.loc_cell(Location::new(t, q));
                    let g = self.cell_gate[cell];
                    if g == 0 {
                        continue;
                    }
                    let clk = self.gate_clk[g];
                    let sr = self.gate_sr[g];
                    let cen = self.gate_cen[g];

                    if clk != 0 {
                        if global_clk == 0 {
                            global_clk = clk;
                        } else if global_clk != clk {
                            return Ok(false);
                        }
                    }
                    if sr != 0 {
                        if global_sr == 0 {
                            global_sr = sr;
                        } else if global_sr != sr {
                            return Ok(false);
                        }
                    }
                    if cen != 0 {
                        if global_cen == 0 {
                            global_cen = cen;
                        } else if global_cen != cen {
                            return Ok(false);
                        }
                    }

                    match neg_clk {
                        None => neg_clk = Some(self.gate_neg[g]),
                        Some(nc) if nc != self.gate_neg[g] => return Ok(false),
                        _ => {}
                    }

                    for &np in &self.gate_local_np[g] {
                        self.tmp_local_np.insert(np ^ (q & 1));
                    }
                }

                if global_clk != 0 && !self.net_global[global_clk] {
                    self.tmp_local_np.insert(global_clk << 1);
                }
                if global_sr != 0 && !self.net_global[global_sr] {
                    self.tmp_local_np.insert(global_sr << 1);
                }
                if global_cen != 0 && !self.net_global[global_cen] {
                    self.tmp_local_np.insert(global_cen << 1);
                }

                // Two shared input muxes per position pair bound the
                // distinct local (net, parity) loads.
                if self.tmp_local_np.len() > 30 {
                    return Ok(false);
                }
                Ok(true)
            }
            TileType::Io => {
                let b = chipdb.tile_bank(t);

                let mut latch = 0usize;
                for &cell in &chipdb.bank_cells[b] {
                    let g = self.cell_gate[cell];
                    if g == 0 {
                        continue;
                    }
                    let n = self.gate_latch[g];
                    if n != 0 {
                        if latch == 0 {
                            latch = n;
                        } else if latch != n {
                            return Ok(false);
                        }
                    }
                }

                let mut global_cen = 0usize;
                let cell0 = chipdb.loc_cell(Location::new(t, 0));
                let cell1 = chipdb.loc_cell(Location::new(t, 1));
                let g0 = if cell0 != 0 { self.cell_gate[cell0] } else { 0 };
                let g1 = if cell1 != 0 { self.cell_gate[cell1] } else { 0 };

                if g0 != 0 {
                    if !self
                        .ds
                        .package
                        .loc_pin
                        .contains_key(&Location::new(t, 0))
                    {
                        return Ok(false);
                    }
                    if self.gate_lvds[g0] && (b != 3 || g1 != 0) {
                        return Ok(false);
                    }
                    let cen = self.gate_cen[g0];
                    if cen != 0 {
                        global_cen = cen;
                    }
                }
                if g1 != 0 {
                    if !self
                        .ds
                        .package
                        .loc_pin
                        .contains_key(&Location::new(t, 1))
                    {
                        return Ok(false);
                    }
                    if self.gate_lvds[g1] {
                        return Ok(false);
                    }
                    let cen = self.gate_cen[g1];
                    if cen != 0 {
                        if global_cen == 0 {
                            global_cen = cen;
                        } else if cen != global_cen {
                            return Ok(false);
                        }
                    }
                }
                if g0 != 0 && g1 != 0 && self.gate_neg[g0] != self.gate_neg[g1] {
                    return Ok(false);
                }

                let cell2 = chipdb.loc_cell(Location::new(t, 2));
                let g2 = if cell2 != 0 { self.cell_gate[cell2] } else { 0 };
                if g2 != 0 {
                    if (g0 != 0 && self.gate_is_gb_io[g0]) || (g1 != 0 && self.gate_is_gb_io[g1])
                    {
                        return Ok(false);
                    }
                    let inst = self.gates[g2];
                    let gc = self
                        .ds
                        .gb_inst_gc
                        .get(&inst)
                        .copied()
                        .unwrap_or(crate::global::GC_CLK);
                    let x = chipdb.tile_x(t);
                    let y = chipdb.tile_y(t);
                    let Some(&global) = chipdb.gbufin.get(&(x, y)) else {
                        return Ok(false);
                    };
                    if gc & (1 << global) == 0 {
                        return Ok(false);
                    }
                }

                let cell3 = chipdb.loc_cell(Location::new(t, 3));
                let g3 = if cell3 != 0 { self.cell_gate[cell3] } else { 0 };
                if g3 != 0 {
                    let Some(mfvs) = chipdb.cell_mfvs.get(&cell3) else {
                        return Ok(false);
                    };
                    let mut outs = vec!["PLLOUT_A"];
                    if self.gate_dual_pll[g3] {
                        outs.push("PLLOUT_B");
                    }
                    for fn_name in outs {
                        let Some((ft, fpos)) = mfvs.get(fn_name) else {
                            return Ok(false);
                        };
                        let Ok(fpos) = fpos.parse::<usize>() else {
                            return Ok(false);
                        };
                        let ca = chipdb.loc_cell(Location::new(*ft, fpos));
                        if ca == 0 {
                            continue;
                        }
                        let ga = self.cell_gate[ca];
                        if ga != 0 && self.gate_din_used[ga] {
                            return Ok(false);
                        }
                    }
                }
                Ok(true)
            }
            TileType::Ramt | TileType::Ramb | TileType::Empty => Ok(true),
        }
    }

    // ----- cost -----

    fn compute_net_length(&self, w: usize) -> i64 {
        if self.net_global[w] || self.net_gates[w].is_empty() {
            return 0;
        }
        let chipdb = self.chipdb();
        let w_gates = &self.net_gates[w];
        let t0 = chipdb.cell_location[self.gate_cell[w_gates[0]]].tile;
        let mut x_min = chipdb.tile_x(t0);
        let mut x_max = x_min;
        let mut y_min = chipdb.tile_y(t0);
        let mut y_max = y_min;
        for &g in &w_gates[1..] {
            let t = chipdb.cell_location[self.gate_cell[g]].tile;
            let x = chipdb.tile_x(t);
            let y = chipdb.tile_y(t);
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
        (x_max - x_min) as i64 + (y_max - y_min) as i64
    }

    fn compute_gate_qwp_cost(&self, g: usize) -> f64 {
        let chipdb = self.chipdb();
        let t = chipdb.cell_location[self.gate_cell[g]].tile;
        (chipdb.unit_x(t) - self.gate_qwp_x[g]).abs()
            + (chipdb.unit_y(t) - self.gate_qwp_y[g]).abs()
    }

    fn wire_length(&self) -> i64 {
        if self.qwp {
            (0..self.n_nets).map(|w| self.compute_net_length(w)).sum()
        } else {
            self.net_length.iter().sum()
        }
    }

    fn qwp_cost(&self) -> i64 {
        let cost: f64 = self.gate_qwp_cost.values().sum();
        (cost * 1000.0) as i64
    }

    // ----- moves -----

    fn gate_random_cell(&mut self, g: usize) -> usize {
        let chipdb = self.chipdb();
        let ct = self.gate_ctype[g];
        if ct == CellType::Logic {
            let cell = self.gate_cell[g];
            let t = chipdb.cell_location[cell].tile;
            let x = chipdb.tile_x(t) as i32;
            let y = chipdb.tile_y(t) as i32;
            let diameter = self.diameter as i32;
            loop {
                let new_x = self.ds.rg.random_int(
                    0.max(x - diameter),
                    (chipdb.width as i32 - 1).min(x + diameter),
                );
                let new_y = self.ds.rg.random_int(
                    0.max(y - diameter),
                    (chipdb.height as i32 - 1).min(y + diameter),
                );
                let new_t = chipdb.tile(new_x as usize, new_y as usize);
                if chipdb.tile_type[new_t] != TileType::Logic {
                    continue;
                }
                let pos = self.ds.rg.random_int(0, 7) as usize;
                return chipdb.loc_cell(Location::new(new_t, pos));
            }
        } else {
            let pool = &chipdb.cell_type_cells[ct.idx()];
            *self.ds.rg.random_element(pool)
        }
    }

    /// A random legal column and start row for chain `c`, or `None` if
    /// the draw collides with another chain.
    fn chain_random_loc(&mut self, c: usize) -> Option<(usize, usize)> {
        let chipdb = self.chipdb();
        let nt = self.ds.chains[c].len().div_ceil(8);

        let new_x = *self.ds.rg.random_element(&self.logic_columns);
        let max_start = chipdb.height as i32 - 2 - (nt as i32 - 1);
        if max_start < 1 {
            return None;
        }
        let new_start = self.ds.rg.random_int(1, max_start) as usize;
        let new_end = new_start + nt - 1;

        for e in 0..self.ds.chains.len() {
            if self.chain_x[e] != new_x {
                continue;
            }
            let e_nt = self.ds.chains[e].len().div_ceil(8);
            let e_start = self.chain_start[e];
            let e_end = e_start + e_nt - 1;
            if (new_start > e_start && new_start <= e_end)
                || (new_end >= e_start && new_end < e_end)
            {
                return None;
            }
        }
        Some((new_x, new_start))
    }

    fn save_set(&mut self, cell: usize, g: usize) {
        let chipdb = self.chipdb();
        let t = chipdb.cell_location[cell].tile;

        self.restore_cell.push((cell, self.cell_gate[cell]));
        if g != 0 {
            if self.qwp {
                self.recompute_gate.insert(g);
            } else {
                for i in 0..self.gate_nets[g].len() {
                    let w = self.gate_nets[g][i];
                    self.recompute_net.insert(w);
                }
            }
            self.gate_cell[g] = cell;

            let c = self.gate_chain[g];
            if c >= 0 {
                let x = chipdb.tile_x(t);
                let y = chipdb.tile_y(t);
                self.save_set_chain(c as usize, x, y);
            }
        }

        self.cell_gate[cell] = g;

        self.changed_tiles.insert(t);
        for i in 0..self.related_tiles[t].len() {
            let t2 = self.related_tiles[t][i];
            self.changed_tiles.insert(t2);
        }
    }

    fn save_set_chain(&mut self, c: usize, x: usize, start: usize) {
        self.restore_chain.push((c, self.chain_x[c], self.chain_start[c]));
        self.chain_x[c] = x;
        self.chain_start[c] = start;
    }

    fn move_gate(&mut self, g: usize, new_cell: usize) {
        debug_assert!(g != 0);
        if self.locked[g] {
            self.move_failed = true;
        }
        let cell = self.gate_cell[g];
        if new_cell == cell {
            return;
        }
        let new_g = self.cell_gate[new_cell];
        if new_g != 0 && self.locked[new_g] {
            self.move_failed = true;
        }
        self.save_set(new_cell, g);
        self.save_set(cell, new_g);
    }

    fn move_chain(&mut self, c: usize, new_x: usize, new_start: usize) {
        let chipdb = self.chipdb();
        let nt = self.ds.chains[c].len().div_ceil(8);

        let x = self.chain_x[c];
        let start = self.chain_start[c];
        if new_x == x && new_start == start {
            return;
        }

        for i in 0..nt {
            for k in 0..8 {
                let loc = Location::new(chipdb.tile(x, start + i), k);
                let new_loc = Location::new(chipdb.tile(new_x, new_start + i), k);
                let cell = chipdb.loc_cell(loc);
                let new_cell = chipdb.loc_cell(new_loc);
                if cell == 0 || new_cell == 0 {
                    self.move_failed = true;
                    continue;
                }
                let g = self.cell_gate[cell];
                let new_g = self.cell_gate[new_cell];
                if g != 0 {
                    self.move_gate(g, new_cell);
                }
                if new_g != 0 {
                    self.move_gate(new_g, cell);
                }
            }
        }
    }

    fn save_recompute_wire_length(&mut self) -> i64 {
        let mut delta = 0;
        for i in 0..self.recompute_net.len() {
            let w = self.recompute_net.ith(i);
            let new_length = self.compute_net_length(w);
            let old_length = self.net_length[w];
            self.restore_net_length.push((w, old_length));
            self.net_length[w] = new_length;
            delta += new_length - old_length;
        }
        delta
    }

    fn save_recompute_qwp_cost(&mut self) -> i64 {
        let mut delta = 0.0;
        for i in 0..self.recompute_gate.len() {
            let g = self.recompute_gate.ith(i);
            let new_cost = self.compute_gate_qwp_cost(g);
            let old_cost = self.gate_qwp_cost[g];
            self.restore_gate_qwp_cost.push((g, old_cost));
            self.gate_qwp_cost[g] = new_cost;
            delta += new_cost - old_cost;
        }
        (delta * 1000.0) as i64
    }

    fn restore(&mut self) {
        self.move_failed = false;
        for &(cell, g) in &self.restore_cell {
            self.cell_gate[cell] = g;
            if g != 0 {
                self.gate_cell[g] = cell;
            }
        }
        if self.qwp {
            for &(g, cost) in &self.restore_gate_qwp_cost {
                self.gate_qwp_cost[g] = cost;
            }
        } else {
            for &(w, len) in &self.restore_net_length {
                self.net_length[w] = len;
            }
        }
        for &(c, x, start) in &self.restore_chain {
            self.chain_x[c] = x;
            self.chain_start[c] = start;
        }
    }

    fn discard(&mut self) {
        self.changed_tiles.clear();
        self.restore_cell.clear();
        self.restore_chain.clear();
        if self.qwp {
            self.restore_gate_qwp_cost.clear();
            self.recompute_gate.clear();
        } else {
            self.restore_net_length.clear();
            self.recompute_net.clear();
        }
    }

    fn accept_or_restore(&mut self) -> Result<()> {
        let mut ok = !self.move_failed;
        if ok {
            for i in 0..self.changed_tiles.len() {
                let t = self.changed_tiles.ith(i);
                if !self.valid(t)? {
                    ok = false;
                    break;
                }
            }
        }

        if ok {
            let delta = if self.qwp {
                self.save_recompute_qwp_cost()
            } else {
                self.save_recompute_wire_length()
            };

            self.n_move += 1;
            let accept = delta < 0
                || (!self.improve_only
                    && self.temp > 1e-6
                    && self.ds.rg.random_real(0.0, 1.0)
                        <= (-(delta as f64) / self.temp).exp());
            if accept {
                if delta < 0 {
                    self.improved = true;
                }
                self.n_accept += 1;
            } else {
                self.restore();
            }
        } else {
            self.restore();
        }
        self.discard();
        Ok(())
    }

    // ----- initial placement -----

    fn place_initial(&mut self) -> Result<()> {
        let chipdb = self.chipdb();

        let locked_insts: Vec<InstanceId> = self.ds.locked.iter().copied().collect();
        for inst in locked_insts {
            if let Some(&g) = self.gate_idx.get(&inst) {
                self.locked[g] = true;
            }
        }

        let n_cell_types = CellType::ALL.len();
        let mut cell_type_n_placed = vec![0usize; n_cell_types];

        let preplaced: Vec<(InstanceId, usize)> =
            self.ds.placement.iter().map(|(&i, &c)| (i, c)).collect();
        for (inst, c) in preplaced {
            let Some(&g) = self.gate_idx.get(&inst) else {
                continue;
            };
            if self.cell_gate[c] != 0 {
                fatal!("cell {c} constrained twice");
            }
            self.cell_gate[c] = g;
            self.gate_cell[g] = c;
            cell_type_n_placed[self.gate_ctype[g].idx()] += 1;
        }

        // Chain placement: per-column fill pointers with the per-device
        // architectural reservations.
        let mut column_free = vec![1usize; self.logic_columns.len()];
        let mut column_last = vec![chipdb.height - 2; self.logic_columns.len()];
        for (k, &x) in self.logic_columns.iter().enumerate() {
            if chipdb.device == "1k" && (x == 1 || x == 12) {
                column_free[k] = 2;
            } else if chipdb.device == "8k" && (x == 1 || x == 32) {
                column_free[k] = 2;
                column_last[k] = 31;
            }
        }

        for ci in 0..self.ds.chains.len() {
            let v: Vec<InstanceId> = self.ds.chains[ci].clone();
            if v.is_empty() {
                continue;
            }
            let gate0 = self.gate_idx[&v[0]];
            debug_assert_eq!(self.gate_chain[gate0], -1);
            self.gate_chain[gate0] = ci as isize;

            let nt = v.len().div_ceil(8);
            for inst in &v {
                let g = self.gate_idx[inst];
                self.chained[g] = true;
            }

            let cell0 = self.gate_cell[gate0];
            if cell0 != 0 {
                let loc = chipdb.cell_location[cell0];
                debug_assert_eq!(loc.pos, 0);
                let x = chipdb.tile_x(loc.tile);
                let y = chipdb.tile_y(loc.tile);
                let k = self
                    .logic_columns
                    .iter()
                    .position(|&col| col == x)
                    .expect("constrained chain outside a logic column");
                self.chain_x[ci] = x;
                self.chain_start[ci] = y;
                if column_free[k] < y + nt {
                    column_free[k] = y + nt;
                }
                continue;
            }

            let mut placed = false;
            for k in 0..self.logic_columns.len() {
                if column_free[k] + nt - 1 > column_last[k] {
                    continue;
                }
                let x = self.logic_columns[k];
                let y = column_free[k];
                for (j, inst) in v.iter().enumerate() {
                    let g = self.gate_idx[inst];
                    let loc = Location::new(chipdb.tile(x, y + j / 8), j % 8);
                    let cell = chipdb.loc_cell(loc);
                    debug_assert_eq!(self.cell_gate[cell], 0);
                    self.cell_gate[cell] = g;
                    self.gate_cell[g] = cell;
                }
                self.chain_x[ci] = x;
                self.chain_start[ci] = y;
                column_free[k] += nt;
                placed = true;
                break;
            }
            if !placed {
                fatal!(
                    "failed to place: placed {ci} of {} carry chains",
                    self.ds.chains.len()
                );
            }
        }

        let mut cell_type_empty_cells = chipdb.cell_type_cells.clone();
        for pool in &mut cell_type_empty_cells {
            pool.retain(|&c| self.cell_gate[c] == 0);
        }

        let mut cell_type_n_gates = vec![0usize; n_cell_types];
        for g in 1..=self.n_gates {
            cell_type_n_gates[self.gate_ctype[g].idx()] += 1;
        }

        let mut io_q: BTreeSet<(u8, usize)> = BTreeSet::new();

        for g in 1..=self.n_gates {
            if self.locked[g] || self.chained[g] {
                continue;
            }
            self.free_gates.push(g);
            let ct = self.gate_ctype[g];

            if self.gate_cell[g] != 0 {
                cell_type_n_placed[ct.idx()] += 1;
                continue;
            }

            if ct == CellType::Gb {
                let inst = self.gates[g];
                let gc = self
                    .ds
                    .gb_inst_gc
                    .get(&inst)
                    .copied()
                    .unwrap_or(crate::global::GC_CLK);
                io_q.insert((gc, g));
                continue;
            }

            let mut placed = false;
            for j in 0..cell_type_empty_cells[ct.idx()].len() {
                let c = cell_type_empty_cells[ct.idx()][j];
                debug_assert_eq!(self.cell_gate[c], 0);
                self.cell_gate[c] = g;
                self.gate_cell[g] = c;
                let t = chipdb.cell_location[c].tile;
                if ct != CellType::Warmboot && !self.valid(t)? {
                    self.cell_gate[c] = 0;
                    continue;
                }
                cell_type_n_placed[ct.idx()] += 1;
                cell_type_empty_cells[ct.idx()].swap_remove(j);
                placed = true;
                break;
            }
            if !placed {
                fatal!(
                    "failed to place: placed {} {}s of {} / {}",
                    cell_type_n_placed[ct.idx()],
                    ct.name(),
                    cell_type_n_gates[ct.idx()],
                    chipdb.cell_type_cells[ct.idx()].len()
                );
            }
        }

        // GBs go last, rarest class first, so narrow masks still find a
        // compatible input site.
        let gb_idx = CellType::Gb.idx();
        while let Some(&(gc, g)) = io_q.iter().next() {
            io_q.remove(&(gc, g));
            let mut placed = false;
            for j in 0..cell_type_empty_cells[gb_idx].len() {
                let c = cell_type_empty_cells[gb_idx][j];
                debug_assert_eq!(self.cell_gate[c], 0);
                self.cell_gate[c] = g;
                self.gate_cell[g] = c;
                let t = chipdb.cell_location[c].tile;
                if !self.valid(t)? {
                    self.cell_gate[c] = 0;
                    continue;
                }
                cell_type_n_placed[gb_idx] += 1;
                cell_type_empty_cells[gb_idx].swap_remove(j);
                placed = true;
                break;
            }
            if !placed {
                fatal!(
                    "failed to place: placed {} GBs of {} / {}",
                    cell_type_n_placed[gb_idx],
                    cell_type_n_gates[gb_idx],
                    chipdb.cell_type_cells[gb_idx].len()
                );
            }
        }

        // Net adjacency for incremental cost updates.
        let (_, net_idx) = self.ds.design.index_nets(self.ds.top);
        for g in 1..=self.n_gates {
            let inst = self.gates[g];
            let ports: Vec<_> = self.ds.design.instance(inst).ports.clone();
            for p in ports {
                let Some(n) = self.ds.design.port(p).connection else {
                    continue;
                };
                if self.ds.design.net(n).is_constant {
                    continue; // constants are not routed
                }
                let w = net_idx[&n];
                self.net_gates[w].push(g);
                self.gate_nets[g].push(w);
            }
        }

        if self.qwp {
            for g in 1..=self.n_gates {
                let inst = self.gates[g];
                if self.ds.design.has_attr(inst, "qwp_position") {
                    let attr = self
                        .ds
                        .design
                        .get_attr(inst, "qwp_position")?
                        .as_string()?
                        .to_string();
                    let mut it = attr.split_whitespace();
                    let parsed = (
                        it.next().and_then(|s| s.parse::<f64>().ok()),
                        it.next().and_then(|s| s.parse::<f64>().ok()),
                    );
                    let (Some(x), Some(y)) = parsed else {
                        fatal!(
                            "parse error in qwp_position attribute: expected `<x> <y>', \
                             got `{attr}'"
                        );
                    };
                    self.gate_qwp_x[g] = x;
                    self.gate_qwp_y[g] = y;
                }
                self.gate_qwp_cost[g] = self.compute_gate_qwp_cost(g);
            }
        } else {
            for w in 0..self.n_nets {
                self.net_length[w] = self.compute_net_length(w);
            }
        }

        Ok(())
    }

    // ----- the annealing loop -----

    fn place(&mut self, sink: &LogSink) -> Result<()> {
        self.place_initial()?;

        sink.noteln(format!("  initial wire length = {}", self.wire_length()));
        if self.qwp {
            sink.noteln(format!("  initial qwp cost = {}", self.qwp_cost()));
        }

        if !self.place_random {
            let mut n_no_progress = 0;
            loop {
                self.n_move = 0;
                self.n_accept = 0;
                self.improved = false;

                for _ in 0..15 {
                    for i in 0..self.free_gates.len() {
                        let g = self.free_gates[i];
                        let new_cell = self.gate_random_cell(g);
                        let new_g = self.cell_gate[new_cell];
                        if new_g != 0 && self.chained[new_g] {
                            continue;
                        }
                        debug_assert!(!self.move_failed);
                        self.move_gate(g, new_cell);
                        self.accept_or_restore()?;
                    }

                    for c in 0..self.ds.chains.len() {
                        if let Some((new_x, new_start)) = self.chain_random_loc(c) {
                            debug_assert!(!self.move_failed);
                            self.move_chain(c, new_x, new_start);
                            self.accept_or_restore()?;
                        }
                    }
                }

                if self.improved {
                    n_no_progress = 0;
                } else {
                    n_no_progress += 1;
                }

                if self.improve_only {
                    if n_no_progress >= 5 {
                        break;
                    }
                    continue;
                }

                if self.temp <= 1e-3 && n_no_progress >= 5 {
                    break;
                }

                let r_accept = if self.n_move != 0 {
                    self.n_accept as f64 / self.n_move as f64
                } else {
                    0.0
                };
                let m = self.chipdb().width.max(self.chipdb().height);

                if r_accept >= 0.8 {
                    self.temp *= 0.5;
                } else if r_accept >= 0.6 {
                    if self.diameter < m {
                        self.diameter += 1;
                    } else {
                        self.temp *= 0.9;
                    }
                } else if r_accept >= 0.4 {
                    self.temp *= 0.95;
                } else if self.diameter > 1 {
                    self.diameter -= 1;
                } else {
                    self.temp *= 0.8;
                }
            }
        }

        sink.noteln(format!("  final wire length = {}", self.wire_length()));
        if self.qwp {
            sink.noteln(format!("  final qwp cost = {}", self.qwp_cost()));
        }

        for g in 1..=self.n_gates {
            let inst = self.gates[g];
            self.ds.placement.insert(inst, self.gate_cell[g]);
        }

        let chipdb = self.chipdb();
        let mut seen: BTreeSet<usize> = BTreeSet::new();
        for g in 1..=self.n_gates {
            seen.insert(chipdb.cell_location[self.gate_cell[g]].tile);
        }
        let mut n_pio = 0;
        let mut n_plb = 0;
        let mut n_bram = 0;
        for &t in &seen {
            match chipdb.tile_type[t] {
                TileType::Io => n_pio += 1,
                TileType::Logic => n_plb += 1,
                TileType::Ramt => n_bram += 1,
                _ => {}
            }
        }
        sink.note(format!(
            "\nAfter placement:\n\
             PIOs       {n_pio} / {}\n\
             PLBs       {n_plb} / {}\n\
             BRAMs      {n_bram} / {}\n\n",
            self.ds.package.pin_loc.len(),
            self.n_logic_tiles,
            self.n_ramt_tiles
        ));

        Ok(())
    }
}

/// The cell family an instance must be placed on.
fn gate_cell_type(
    d: &floe_netlist::Design,
    models: &floe_netlist::Models,
    inst: InstanceId,
) -> Result<CellType> {
    Ok(if models.is_lc(d, inst) {
        CellType::Logic
    } else if models.is_io_family(d, inst) {
        CellType::Io
    } else if models.is_gb(d, inst) {
        CellType::Gb
    } else if models.is_warmboot(d, inst) {
        CellType::Warmboot
    } else if models.is_pll(d, inst) {
        CellType::Pll
    } else if models.is_ram(d, inst) {
        CellType::Ram
    } else if models.is_mac16(d, inst) {
        CellType::Mac16
    } else if models.is_spram(d, inst) {
        CellType::Spram
    } else if models.is_hfosc(d, inst) {
        CellType::Hfosc
    } else if models.is_lfosc(d, inst) {
        CellType::Lfosc
    } else if models.is_rgba_drv(d, inst) {
        CellType::RgbaDrv
    } else if models.is_ledda_ip(d, inst) {
        CellType::LeddaIp
    } else if models.is_i2c(d, inst) {
        CellType::I2cIp
    } else if models.is_spi(d, inst) {
        CellType::SpiIp
    } else {
        fatal!(
            "cannot place instance of `{}'",
            d.model(d.instance(inst).instance_of).name
        )
    })
}
