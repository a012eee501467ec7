//! Negotiated-congestion routing over the device switch graph.
//!
//! Nodes are chip-nets; edges follow the switches. Every design net routes
//! from its driver's chip-net to all sink chip-nets, restarting the
//! Dijkstra expansion from the partial tree after each target is reached.
//! Between passes, per-node demand history accumulates so congested nodes
//! grow expensive; the final pass hard-avoids any occupied node.

use crate::placement::configure_cells;
use crate::state::DesignState;
use floe_chipdb::TileType;
use floe_common::{fatal, PriorityQ, Result, UllmanSet};
use floe_diagnostics::LogSink;
use floe_netlist::{InstanceId, NetId, NodeRef, PortId, Value};
use std::collections::BTreeMap;

/// Routes the design: emits cell configuration, occupies the switch
/// graph, and deposits the per-switch configuration bits.
pub fn route(ds: &mut DesignState, max_passes: usize, sink: &LogSink) -> Result<()> {
    configure_cells(ds)?;
    let mut router = Router::new(ds)?;
    router.route(max_passes, sink)?;
    Ok(())
}

struct Router<'a, 'b> {
    ds: &'a mut DesignState<'b>,

    /// Successor chip-nets of each chip-net.
    cnet_outs: Vec<Vec<usize>>,

    /// Port name translation for the BRAM family.
    ram_gate_chip: BTreeMap<String, String>,
    /// Port name translation for the PLL family.
    pll_gate_chip: BTreeMap<String, String>,

    n_nets: usize,
    net_source: Vec<usize>,
    net_targets: Vec<Vec<usize>>,
    net_route: Vec<Vec<(usize, usize)>>,

    n_shared: usize,
    demand: Vec<u32>,
    historical_demand: Vec<u32>,

    unrouted: UllmanSet,
    visited: UllmanSet,
    frontier: UllmanSet,
    frontierq: PriorityQ<(usize, i64), fn(&(usize, i64), &(usize, i64)) -> bool>,
    backptr: Vec<isize>,
    cost: Vec<i64>,

    passes: usize,
    max_passes: usize,
}

fn frontier_after(a: &(usize, i64), b: &(usize, i64)) -> bool {
    a.1 > b.1 || (a.1 == b.1 && a.0 > b.0)
}

impl<'a, 'b> Router<'a, 'b> {
    fn new(ds: &'a mut DesignState<'b>) -> Result<Self> {
        let chipdb = ds.chipdb;
        let n_cnets = chipdb.n_nets;

        ds.cnet_net = vec![None; n_cnets];

        let mut cnet_outs = vec![Vec::new(); n_cnets];
        for (i, outs) in cnet_outs.iter_mut().enumerate() {
            for &s in &chipdb.in_switches[i] {
                debug_assert!(chipdb.switches[s].in_val.contains_key(&i));
                let j = chipdb.switches[s].out;
                debug_assert_ne!(j, i);
                outs.push(j);
            }
        }

        let mut ram_gate_chip = BTreeMap::new();
        for i in 0..16 {
            ram_gate_chip.insert(format!("RDATA[{i}]"), format!("ram/RDATA_{i}"));
            ram_gate_chip.insert(format!("WDATA[{i}]"), format!("ram/WDATA_{i}"));
            ram_gate_chip.insert(format!("MASK[{i}]"), format!("ram/MASK_{i}"));
        }
        for i in 0..11 {
            ram_gate_chip.insert(format!("RADDR[{i}]"), format!("ram/RADDR_{i}"));
            ram_gate_chip.insert(format!("WADDR[{i}]"), format!("ram/WADDR_{i}"));
        }
        for (gate, chip) in [
            ("RCLKE", "ram/RCLKE"),
            ("RCLK", "ram/RCLK"),
            ("RCLKN", "ram/RCLK"),
            ("RE", "ram/RE"),
            ("WCLKE", "ram/WCLKE"),
            ("WCLK", "ram/WCLK"),
            ("WCLKN", "ram/WCLK"),
            ("WE", "ram/WE"),
        ] {
            ram_gate_chip.insert(gate.to_string(), chip.to_string());
        }

        let mut pll_gate_chip = BTreeMap::new();
        for i in 0..8 {
            pll_gate_chip.insert(format!("DYNAMICDELAY[{i}]"), format!("DYNAMICDELAY_{i}"));
        }
        pll_gate_chip.insert("PLLOUTCORE".into(), "PLLOUT_A".into());
        pll_gate_chip.insert("PLLOUTCOREA".into(), "PLLOUT_A".into());
        pll_gate_chip.insert("PLLOUTCOREB".into(), "PLLOUT_B".into());

        Ok(Self {
            ds,
            cnet_outs,
            ram_gate_chip,
            pll_gate_chip,
            n_nets: 0,
            net_source: Vec::new(),
            net_targets: Vec::new(),
            net_route: Vec::new(),
            n_shared: 0,
            demand: vec![0; n_cnets],
            historical_demand: vec![0; n_cnets],
            unrouted: UllmanSet::new(n_cnets),
            visited: UllmanSet::new(n_cnets),
            frontier: UllmanSet::new(n_cnets),
            frontierq: PriorityQ::new(frontier_after),
            backptr: vec![-1; n_cnets],
            cost: vec![0; n_cnets],
            passes: 0,
            max_passes: 0,
        })
    }

    /// Translates an `(instance, port)` endpoint to its chip-net, or
    /// `None` for the fixed intra-cell paths (an LC `CIN` above position
    /// 0, constant MAC16 chain inputs).
    fn port_cnet(&self, inst: InstanceId, p: PortId) -> Result<Option<usize>> {
        let d = &self.ds.design;
        let models = &self.ds.models;
        let chipdb = self.ds.chipdb;
        let p_name = d.port(p).name.clone();
        let Some(&cell) = self.ds.placement.get(&inst) else {
            fatal!("unplaced instance reached the router");
        };
        let loc = chipdb.cell_location[cell];
        let mut t = loc.tile;

        let tile_net_name: String;
        if models.is_lc(d, inst) {
            tile_net_name = match p_name.as_str() {
                "CLK" => "lutff_global/clk".to_string(),
                "CEN" => "lutff_global/cen".to_string(),
                "SR" => "lutff_global/s_r".to_string(),
                "I0" => format!("lutff_{}/in_0", loc.pos),
                "I1" => format!("lutff_{}/in_1", loc.pos),
                "I2" => format!("lutff_{}/in_2", loc.pos),
                "I3" => format!("lutff_{}/in_3", loc.pos),
                "CIN" => {
                    if loc.pos == 0 {
                        "carry_in_mux".to_string()
                    } else {
                        return Ok(None);
                    }
                }
                "COUT" => format!("lutff_{}/cout", loc.pos),
                "LO" => format!("lutff_{}/lout", loc.pos),
                "O" => format!("lutff_{}/out", loc.pos),
                _ => fatal!("unroutable LC port `{p_name}'"),
            };
            if !chipdb.tile_nets[t].contains_key(&tile_net_name) {
                fatal!("failed to route: {p_name} to {tile_net_name}");
            }
        } else if models.is_io_family(d, inst) {
            tile_net_name = match p_name.as_str() {
                "LATCH_INPUT_VALUE" => "io_global/latch".to_string(),
                "CLOCK_ENABLE" => "io_global/cen".to_string(),
                "INPUT_CLK" => "io_global/inclk".to_string(),
                "OUTPUT_CLK" => "io_global/outclk".to_string(),
                "OUTPUT_ENABLE" => format!("io_{}/OUT_ENB", loc.pos),
                "D_OUT_0" => format!("io_{}/D_OUT_0", loc.pos),
                "D_OUT_1" => format!("io_{}/D_OUT_1", loc.pos),
                "D_IN_0" => format!("io_{}/D_IN_0", loc.pos),
                "D_IN_1" => format!("io_{}/D_IN_1", loc.pos),
                "PU_ENB" | "WEAK_PU_ENB" if models.is_io_i3c(d, inst) => {
                    // Resolve through the I3C cell owning this PIO site.
                    let mut found = None;
                    for &c in
                        &chipdb.cell_type_cells[floe_chipdb::CellType::IoI3c.idx()]
                    {
                        let Some(pin) = chipdb
                            .cell_mfvs
                            .get(&c)
                            .and_then(|m| m.get("PACKAGE_PIN"))
                        else {
                            continue;
                        };
                        if pin.0 == loc.tile && pin.1.parse() == Ok(loc.pos) {
                            found = Some(c);
                            break;
                        }
                    }
                    let Some(i3c_cell) = found else {
                        fatal!("no I3C control cell for PIO at tile {t}");
                    };
                    let Some((ft, fname)) = chipdb
                        .cell_mfvs
                        .get(&i3c_cell)
                        .and_then(|m| m.get(p_name.as_str()))
                    else {
                        fatal!("I3C cell has no `{p_name}' function");
                    };
                    t = *ft;
                    fname.clone()
                }
                "GLOBAL_BUFFER_OUTPUT" if models.is_gb_io(d, inst) => {
                    let Some(&g) = chipdb.loc_pin_glb_num.get(&loc) else {
                        fatal!("GB_IO pin drives no global network");
                    };
                    format!("glb_netwk_{g}")
                }
                _ => fatal!("unroutable IO port `{p_name}'"),
            };
        } else if models.is_gb(d, inst) {
            tile_net_name = match p_name.as_str() {
                "USER_SIGNAL_TO_GLOBAL_BUFFER" => "fabout".to_string(),
                "GLOBAL_BUFFER_OUTPUT" => {
                    let x = chipdb.tile_x(t);
                    let y = chipdb.tile_y(t);
                    let Some(&g) = chipdb.gbufin.get(&(x, y)) else {
                        fatal!("GB cell outside a gbufin site");
                    };
                    format!("glb_netwk_{g}")
                }
                _ => fatal!("unroutable GB port `{p_name}'"),
            };
        } else if models.is_warmboot(d, inst) {
            let Some((ft, fname)) = chipdb
                .cell_mfvs
                .get(&cell)
                .and_then(|m| m.get(p_name.as_str()))
            else {
                fatal!("WARMBOOT cell has no `{p_name}' function");
            };
            t = *ft;
            tile_net_name = fname.clone();
        } else if models.is_ram(d, inst) {
            let Some(chip_name) = self.ram_gate_chip.get(p_name.as_str()) else {
                fatal!("unroutable RAM port `{p_name}'");
            };
            // The MASK halves swap between the RAMT and RAMB tiles by
            // device family; resolve against whichever tile knows the
            // name.
            tile_net_name = chip_name.clone();
            if !chipdb.tile_nets[t].contains_key(&tile_net_name) {
                t = chipdb.tile(chipdb.tile_x(loc.tile), chipdb.tile_y(loc.tile) - 1);
            }
        } else if models.is_pll(d, inst) {
            let r = self
                .pll_gate_chip
                .get(p_name.as_str())
                .cloned()
                .unwrap_or_else(|| p_name.clone());
            match r.as_str() {
                "PLLOUTGLOBAL" | "PLLOUTGLOBALA" | "PLLOUTGLOBALB" => {
                    let fn_name = if r == "PLLOUTGLOBALB" {
                        "PLLOUT_B"
                    } else {
                        "PLLOUT_A"
                    };
                    let Some((ft, fpos)) = chipdb
                        .cell_mfvs
                        .get(&cell)
                        .and_then(|m| m.get(fn_name))
                    else {
                        fatal!("PLL cell has no `{fn_name}' function");
                    };
                    let pos = fpos.parse::<usize>().map_err(|_| {
                        floe_common::FatalError::new("PLL output names no IO position")
                    })?;
                    let g_loc = floe_chipdb::Location::new(*ft, pos);
                    let Some(&g) = chipdb.loc_pin_glb_num.get(&g_loc) else {
                        fatal!("PLL output drives no global network");
                    };
                    tile_net_name = format!("glb_netwk_{g}");
                }
                "PLLOUT_A" | "PLLOUT_B" => {
                    let Some((ft, fpos)) = chipdb
                        .cell_mfvs
                        .get(&cell)
                        .and_then(|m| m.get(r.as_str()))
                    else {
                        fatal!("PLL cell has no `{r}' function");
                    };
                    t = *ft;
                    tile_net_name = format!("io_{fpos}/D_IN_0");
                }
                _ => {
                    let Some((ft, fname)) = chipdb
                        .cell_mfvs
                        .get(&cell)
                        .and_then(|m| m.get(r.as_str()))
                    else {
                        fatal!("PLL cell has no `{r}' function");
                    };
                    t = *ft;
                    tile_net_name = fname.clone();
                }
            }
        } else {
            // MAC16, SPRAM, oscillators, RGBA/LEDDA drivers, I2C, SPI:
            // resolved through the extra-cell function tables, with
            // bracketed bus bits flattened to `_i` names.
            if models.is_mac16(d, inst) && matches!(p_name.as_str(), "ACCUMCI" | "SIGNEXTIN") {
                let n = d.port(p).connection;
                debug_assert!(n.is_some_and(|n| d.net(n).is_constant
                    && d.net(n).constant == Value::Zero));
                return Ok(None);
            }
            let fabric = (models.is_hfosc(d, inst) || models.is_lfosc(d, inst))
                && d.is_attr_set(inst, "ROUTE_THROUGH_FABRIC");
            let db_name = if fabric && matches!(p_name.as_str(), "CLKHF" | "CLKLF") {
                format!("{p_name}_FABRIC")
            } else {
                p_name
                    .chars()
                    .filter(|&c| c != ']')
                    .map(|c| if c == '[' { '_' } else { c })
                    .collect()
            };
            let Some((ft, fname)) = chipdb
                .cell_mfvs
                .get(&cell)
                .and_then(|m| m.get(&db_name))
            else {
                fatal!("cell has no `{db_name}' function");
            };
            t = *ft;
            tile_net_name = fname.clone();
        }

        match chipdb.tile_nets[t].get(&tile_net_name) {
            Some(&n) => Ok(Some(n)),
            None => fatal!(
                "no chip-net `{tile_net_name}' in tile {} {}",
                chipdb.tile_x(t),
                chipdb.tile_y(t)
            ),
        }
    }

    /// Seeds the search: the source plus the partial tree at zero cost.
    fn start(&mut self, net: usize) {
        self.visited.clear();
        self.frontier.clear();
        self.frontierq.clear();

        let source = self.net_source[net];
        self.cost[source] = 0;
        self.backptr[source] = -1;
        self.visit(source);

        for i in 0..self.net_route[net].len() {
            let cn = self.net_route[net][i].1;
            self.frontier.erase(cn);
            self.cost[cn] = 0;
            self.backptr[cn] = -1;
            self.visit(cn);
        }
    }

    fn visit(&mut self, cn: usize) {
        debug_assert!(!self.frontier.contains(cn));
        self.visited.insert(cn);

        for i in 0..self.cnet_outs[cn].len() {
            let cn2 = self.cnet_outs[cn][i];
            if self.visited.contains(cn2) {
                continue;
            }

            let mut cn2_cost: i64 = 1;
            if self.passes == self.max_passes {
                if self.demand[cn2] > 0 {
                    cn2_cost = 1_000_000;
                }
            } else {
                cn2_cost += i64::from(self.historical_demand[cn2]);
                cn2_cost *= i64::from(1 + 3 * self.demand[cn2]);
            }

            let new_cost = self.cost[cn] + cn2_cost;

            if self.frontier.contains(cn2) {
                if new_cost < self.cost[cn2] {
                    self.cost[cn2] = new_cost;
                    self.backptr[cn2] = cn as isize;
                    self.frontierq.push((cn2, new_cost));
                }
            } else {
                self.cost[cn2] = new_cost;
                self.backptr[cn2] = cn as isize;
                self.frontier.insert(cn2);
                self.frontierq.push((cn2, new_cost));
            }
        }
    }

    /// Pops the cheapest live frontier node, skipping stale queue
    /// entries.
    fn pop(&mut self) -> usize {
        loop {
            debug_assert!(!self.frontierq.is_empty());
            let (cn, cn_cost) = self.frontierq.pop();
            if !self.frontier.contains(cn) {
                continue;
            }
            debug_assert_eq!(cn_cost, self.cost[cn]);
            self.frontier.erase(cn);
            return cn;
        }
    }

    fn ripup(&mut self, net: usize) {
        for i in 0..self.net_route[net].len() {
            let cn = self.net_route[net][i].1;
            self.demand[cn] -= 1;
            if self.demand[cn] == 1 {
                self.n_shared -= 1;
            }
        }
        self.net_route[net].clear();
    }

    fn traceback(&mut self, net: usize, target: usize) {
        let mut cn = target as isize;
        while cn >= 0 {
            let prev = self.backptr[cn as usize];
            if prev >= 0 {
                if self.demand[cn as usize] == 1 {
                    self.n_shared += 1;
                }
                self.demand[cn as usize] += 1;
                self.net_route[net].push((prev as usize, cn as usize));
            }
            cn = prev;
        }
    }

    fn collect_nets(&mut self) -> Result<()> {
        let top = self.ds.top;
        let boundary = self.ds.design.boundary_nets(&self.ds.models);
        let all_nets: Vec<NetId> = self.ds.design.model(top).nets.iter().copied().collect();

        for n in all_nets {
            if boundary.contains(&n) {
                continue;
            }

            let mut source: Option<usize> = None;
            let mut targets: Vec<usize> = Vec::new();

            let conns: Vec<PortId> = self
                .ds
                .design
                .net(n)
                .connections
                .iter()
                .copied()
                .collect();
            for p2 in conns {
                let NodeRef::Instance(inst) = self.ds.design.port(p2).owner else {
                    fatal!(
                        "net `{}' still reaches a model port",
                        self.ds.design.net(n).name
                    );
                };
                let Some(cn) = self.port_cnet(inst, p2)? else {
                    continue;
                };

                // Shared intra-tile nets (lutff_global/clk) legitimately
                // resolve to the same chip-net for several ports of the
                // same design net.
                match self.ds.cnet_net[cn] {
                    Some(existing) if existing != n => {
                        fatal!(
                            "chip-net {cn} claimed by both `{}' and `{}'",
                            self.ds.design.net(existing).name,
                            self.ds.design.net(n).name
                        );
                    }
                    _ => self.ds.cnet_net[cn] = Some(n),
                }

                if self.ds.design.port_is_output(p2) {
                    debug_assert!(source.is_none());
                    source = Some(cn);
                } else {
                    targets.push(cn);
                }
            }

            if let Some(source) = source {
                if !targets.is_empty() {
                    self.n_nets += 1;
                    self.net_source.push(source);
                    self.net_targets.push(targets);
                }
            }
        }
        self.net_route.resize(self.n_nets, Vec::new());
        Ok(())
    }

    fn route(&mut self, max_passes: usize, sink: &LogSink) -> Result<()> {
        self.max_passes = max_passes;
        self.collect_nets()?;

        self.passes = 1;
        while self.passes <= self.max_passes {
            for net in 0..self.n_nets {
                if self.passes > 1 {
                    debug_assert!(!self.net_route[net].is_empty());
                    let congested = self.net_route[net]
                        .iter()
                        .any(|&(_, cn)| self.demand[cn] > 1);
                    if !congested {
                        continue;
                    }
                }

                self.unrouted.clear();
                for i in 0..self.net_targets[net].len() {
                    let cn = self.net_targets[net][i];
                    // Duplicate targets collapse (lutff_global/clk).
                    self.unrouted.insert(cn);
                }

                self.ripup(net);

                'search: loop {
                    self.start(net);
                    while !self.frontier.is_empty() {
                        let cn = self.pop();
                        if self.unrouted.contains(cn) {
                            self.unrouted.erase(cn);
                            self.traceback(net, cn);
                            if self.unrouted.is_empty() {
                                break 'search;
                            }
                            continue 'search;
                        }
                        self.visit(cn);
                    }
                    break;
                }

                if !self.unrouted.is_empty() {
                    fatal!(
                        "failed to route: no path from {} to all sinks",
                        self.net_source[net]
                    );
                }
            }

            sink.noteln(format!("  pass {}, {} shared.", self.passes, self.n_shared));
            if self.n_shared == 0 {
                break;
            }

            if self.passes > 1 {
                for cn in 0..self.demand.len() {
                    if self.demand[cn] > 1 {
                        self.historical_demand[cn] += self.demand[cn];
                    }
                }
            }
            self.passes += 1;
        }

        if self.n_shared != 0 {
            fatal!("failed to route");
        }

        self.emit(sink)?;
        Ok(())
    }

    /// Sets the switch configuration bits of every routed edge, plus the
    /// column-buffer enables where a global enters local routing.
    fn emit(&mut self, sink: &LogSink) -> Result<()> {
        let chipdb = self.ds.chipdb;

        let mut is_span4 = vec![false; chipdb.n_nets];
        let mut is_span12 = vec![false; chipdb.n_nets];
        let mut n_span4 = 0usize;
        let mut n_span12 = 0usize;
        for t in 0..chipdb.n_tiles {
            for (name, &cn) in &chipdb.tile_nets[t] {
                if is_span4[cn] || is_span12[cn] {
                    continue;
                }
                if name.starts_with("span4_") || name.starts_with("sp4_") {
                    is_span4[cn] = true;
                    n_span4 += 1;
                } else if name.starts_with("span12_") || name.starts_with("sp12_") {
                    is_span12[cn] = true;
                    n_span12 += 1;
                }
            }
        }

        let mut n_span4_used = 0usize;
        let mut n_span12_used = 0usize;
        for net in 0..self.n_nets {
            for i in 0..self.net_route[net].len() {
                let (u, v) = self.net_route[net][i];
                if is_span4[v] {
                    n_span4_used += 1;
                } else if is_span12[v] {
                    n_span12_used += 1;
                }

                let s = chipdb.find_switch(u, v)?;
                let sw = &chipdb.switches[s];

                debug_assert!(!chipdb.net_global.contains_key(&v));
                if let Some(&g) = chipdb.net_global.get(&u) {
                    let Some(&cb_t) = chipdb.tile_colbuf_tile.get(&sw.tile) else {
                        fatal!("no column buffer for tile {}", sw.tile);
                    };
                    let mut cb_t = cb_t;
                    if chipdb.device == "1k" && chipdb.tile_type[cb_t] == TileType::Ramt {
                        cb_t = chipdb.tile(chipdb.tile_x(cb_t), chipdb.tile_y(cb_t) - 1);
                        debug_assert_eq!(chipdb.tile_type[cb_t], TileType::Ramb);
                    }
                    let Some(colbuf_cbit) = chipdb
                        .tile_nonrouting_cbits
                        .get(&chipdb.tile_type[cb_t])
                        .and_then(|m| m.get(&format!("ColBufCtrl.glb_netwk_{g}")))
                    else {
                        fatal!("no ColBufCtrl bits for global {g}");
                    };
                    self.ds.conf.set_cbit(cb_t, colbuf_cbit[0], true)?;
                }

                let val = &sw.in_val[&u];
                self.ds.conf.set_cbits(sw.tile, &sw.cbits, val)?;
            }
        }

        sink.note(format!(
            "\nAfter routing:\n\
             span_4     {n_span4_used} / {n_span4}\n\
             span_12    {n_span12_used} / {n_span12}\n\n"
        ));
        Ok(())
    }
}
