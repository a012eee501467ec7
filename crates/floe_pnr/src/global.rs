//! Global-net promotion.
//!
//! The eight global networks reach clock-like pins only, and not all
//! eight reach every pin class. Each candidate driver is assigned a
//! *global class*: a mask of the networks its sinks can consume. Hard
//! drivers (GB_IO pads, oscillators, PLL outputs) claim their fixed
//! network; high-fanout user nets are promoted through inserted `SB_GB`
//! buffers while per-class capacity remains.

use crate::state::DesignState;
use floe_common::{fatal, Result};
use floe_diagnostics::LogSink;
use floe_netlist::{Const, InstanceId, NetId, NodeRef, PortId, Value};
use std::collections::BTreeMap;

/// Any global network: clock inputs.
pub const GC_CLK: u8 = 0xff;
/// Globals 1, 3, 5, 7: clock enables.
pub const GC_CEN: u8 = 0xaa;
/// Globals 0, 2, 4, 6: set/reset.
pub const GC_SR: u8 = 0x55;
/// Globals 1, 3, 7: BRAM read clock enable.
pub const GC_RCLKE: u8 = 0x8a;
/// Globals 2, 4, 6: BRAM read enable.
pub const GC_RE: u8 = 0x54;
/// BRAM write clock enable, same networks as CEN.
pub const GC_WCLKE: u8 = GC_CEN;
/// BRAM write enable, same networks as SR.
pub const GC_WE: u8 = GC_SR;

/// The distinct classes, in priority order.
pub const GLOBAL_CLASSES: [u8; 5] = [GC_CLK, GC_CEN, GC_SR, GC_RCLKE, GC_RE];

/// Display name of a class mask.
pub fn global_class_name(gc: u8) -> &'static str {
    match gc {
        GC_CLK => "clk",
        GC_CEN => "cen/wclke",
        GC_SR => "sr/we",
        GC_RCLKE => "rclke",
        GC_RE => "re",
        _ => "?",
    }
}

/// Promotes nets onto the global networks; `do_promote` false restricts
/// the pass to accounting for hard drivers.
pub fn promote_globals(ds: &mut DesignState, do_promote: bool, sink: &LogSink) -> Result<()> {
    let mut promoter = Promoter::new(ds)?;
    promoter.promote(do_promote, sink)?;
    Ok(())
}

struct Promoter<'a, 'b> {
    ds: &'a mut DesignState<'b>,
    const0: NetId,
}

impl<'a, 'b> Promoter<'a, 'b> {
    fn new(ds: &'a mut DesignState<'b>) -> Result<Self> {
        let top = ds.top;
        let mut const0 = None;
        for &n in &ds.design.model(top).nets {
            if ds.design.net(n).is_constant && ds.design.net(n).constant == Value::Zero {
                const0 = Some(n);
                break;
            }
        }
        // Pruned again at the end if unused.
        let const0 = const0.unwrap_or_else(|| {
            let n = ds.design.add_net(top, "$false");
            ds.design.net_mut(n).is_constant = true;
            ds.design.net_mut(n).constant = Value::Zero;
            n
        });
        Ok(Self { ds, const0 })
    }

    /// The narrowest class `port` can consume through a global network;
    /// 0 if it cannot. With `indirect`, LUT inputs count as clock-class
    /// (reachable through the local-from-global muxes).
    fn port_gc(&self, port: PortId, indirect: bool) -> u8 {
        let d = &self.ds.design;
        let models = &self.ds.models;
        let NodeRef::Instance(inst) = d.port(port).owner else {
            return 0;
        };
        let name = d.port(port).name.as_str();

        if models.is_lc(d, inst) {
            match name {
                "CLK" => GC_CLK,
                "CEN" => GC_CEN,
                "SR" => GC_SR,
                "I0" | "I1" | "I2" | "I3" if indirect => GC_CLK,
                _ => 0,
            }
        } else if models.is_io_family(d, inst) {
            match name {
                "INPUT_CLK" | "OUTPUT_CLK" => GC_CLK,
                _ => 0,
            }
        } else if models.is_ram(d, inst) {
            match name {
                "WCLK" | "WCLKN" | "RCLK" | "RCLKN" => GC_CLK,
                "WCLKE" => GC_WCLKE,
                "WE" => GC_WE,
                "RCLKE" => GC_RCLKE,
                "RE" => GC_RE,
                _ => 0,
            }
        } else if models.is_mac16(d, inst) {
            match name {
                "CLK" => GC_CLK,
                "CE" => GC_CEN,
                "IRSTTOP" | "IRSTBOT" | "ORSTTOP" | "ORSTBOT" => GC_SR,
                _ => 0,
            }
        } else if models.is_spram(d, inst) {
            if name == "CLOCK" {
                GC_CLK
            } else {
                0
            }
        } else if models.is_i2c(d, inst) || models.is_spi(d, inst) {
            if name == "SBCLKI" {
                GC_CLK
            } else {
                0
            }
        } else if models.is_ledda_ip(d, inst) {
            if name == "LEDDCLK" {
                GC_CLK
            } else {
                0
            }
        } else {
            0
        }
    }

    fn routable(&self, gc: u8, p: PortId) -> bool {
        (self.port_gc(p, true) & gc) == gc
    }

    /// Splits sinks of `n` that cannot be reached through the global
    /// class `gc` onto a pass-through LC fed by `n`.
    fn make_routable(&mut self, n: NetId, gc: u8) {
        let conns: Vec<PortId> = self.ds.design.net(n).connections.iter().copied().collect();
        let mut internal: Option<NetId> = None;
        for p in conns {
            if !self.ds.design.port_is_input(p) {
                continue;
            }
            if self.routable(gc, p) {
                continue;
            }
            let internal = match internal {
                Some(i) => i,
                None => {
                    let top = self.ds.top;
                    let i = self.ds.design.add_net_like(top, n);
                    let pass = self.ds.design.add_instance(top, self.ds.models.lc);
                    self.connect(pass, "I0", n);
                    self.connect(pass, "I1", self.const0);
                    self.connect(pass, "I2", self.const0);
                    self.connect(pass, "I3", self.const0);
                    self.ds
                        .design
                        .set_param(pass, "LUT_INIT", Const::bits_of(2, 2));
                    self.connect(pass, "O", i);
                    internal = Some(i);
                    i
                }
            };
            self.ds.design.connect(p, internal);
        }
    }

    fn connect(&mut self, inst: InstanceId, port: &str, n: NetId) {
        let p = self
            .ds
            .design
            .find_port(NodeRef::Instance(inst), port)
            .expect("standard model port");
        self.ds.design.connect(p, n);
    }

    /// Re-drives a PLL output (`LOCK`, `SDO`) through a pass-through LC
    /// placed at position 0 of the function's neighbor tile.
    fn pll_pass_through(&mut self, inst: InstanceId, cell: usize, p_name: &str) -> Result<()> {
        let Some(p) = self.ds.design.find_port(NodeRef::Instance(inst), p_name) else {
            return Ok(());
        };
        let Some(n) = self.ds.design.port(p).connection else {
            return Ok(());
        };

        let top = self.ds.top;
        let t = self.ds.design.add_net_like(top, n);
        self.ds.design.connect(p, t);

        let pass = self.ds.design.add_instance(top, self.ds.models.lc);
        self.connect(pass, "I0", t);
        self.connect(pass, "I1", self.const0);
        self.connect(pass, "I2", self.const0);
        self.connect(pass, "I3", self.const0);
        self.ds
            .design
            .set_param(pass, "LUT_INIT", Const::bits_of(2, 2));
        self.connect(pass, "O", n);

        let mfvs = match self.ds.chipdb.cell_mfvs.get(&cell) {
            Some(m) => m,
            None => fatal!("PLL cell {cell} has no function table"),
        };
        let Some(&(fn_tile, _)) = mfvs.get(p_name) else {
            fatal!("PLL cell {cell} has no `{p_name}' function");
        };
        let pass_cell = self
            .ds
            .chipdb
            .loc_cell(floe_chipdb::Location::new(fn_tile, 0));
        if pass_cell == 0 {
            fatal!("no logic cell for PLL `{p_name}' pass-through");
        }
        self.ds.placement.insert(pass, pass_cell);
        self.ds.locked.insert(pass);
        Ok(())
    }

    fn promote(&mut self, do_promote: bool, sink: &LogSink) -> Result<()> {
        let top = self.ds.top;
        let (nets, _net_idx) = self.ds.design.index_nets(top);
        let n_nets = nets.len();

        let mut n_global = 0usize;
        let mut gc_global: BTreeMap<u8, usize> = BTreeMap::new();
        let mut gc_used: BTreeMap<u8, usize> = BTreeMap::new();
        for gc in GLOBAL_CLASSES {
            gc_global.insert(gc, 0);
            gc_used.insert(gc, 0);
        }

        // Hard drivers already bound to a specific network.
        let mut plls: Vec<(InstanceId, usize)> = Vec::new();
        let placements: Vec<(InstanceId, usize)> =
            self.ds.placement.iter().map(|(&i, &c)| (i, c)).collect();
        for (inst, c) in placements {
            let d = &self.ds.design;
            if self.ds.models.is_gb_io(d, inst) {
                let out = d.find_port(NodeRef::Instance(inst), "GLOBAL_BUFFER_OUTPUT").unwrap();
                if let Some(out_net) = d.port(out).connection {
                    let loc = self.ds.chipdb.cell_location[c];
                    let Some(&g) = self.ds.chipdb.loc_pin_glb_num.get(&loc) else {
                        fatal!(
                            "Not able to use pin {} for global buffer output",
                            self.ds
                                .package
                                .loc_pin
                                .get(&loc)
                                .map(String::as_str)
                                .unwrap_or("?")
                        );
                    };
                    for gc in GLOBAL_CLASSES {
                        if gc & (1 << g) != 0 {
                            *gc_used.get_mut(&gc).unwrap() += 1;
                        }
                    }
                    self.make_routable(out_net, 1 << g);
                }
            } else if self.ds.models.is_hfosc(d, inst) || self.ds.models.is_lfosc(d, inst) {
                let port = if self.ds.models.is_hfosc(d, inst) {
                    "CLKHF"
                } else {
                    "CLKLF"
                };
                let out = d.find_port(NodeRef::Instance(inst), port).unwrap();
                let connected = d.port(out).connection;
                if let Some(out_net) = connected {
                    if !d.is_attr_set(inst, "ROUTE_THROUGH_FABRIC") {
                        let g = self.ds.chipdb.oscillator_glb(c, port)?;
                        for gc in GLOBAL_CLASSES {
                            if gc & (1 << g) != 0 {
                                *gc_used.get_mut(&gc).unwrap() += 1;
                            }
                        }
                        self.make_routable(out_net, 1 << g);
                    }
                }
            } else if self.ds.models.is_pll(d, inst) {
                plls.push((inst, c));
                for (port, fn_name) in [
                    ("PLLOUTGLOBAL", "PLLOUT_A"),
                    ("PLLOUTGLOBALA", "PLLOUT_A"),
                    ("PLLOUTGLOBALB", "PLLOUT_B"),
                ] {
                    let Some(p) = self.ds.design.find_port(NodeRef::Instance(inst), port)
                    else {
                        continue;
                    };
                    let Some(out_net) = self.ds.design.port(p).connection else {
                        continue;
                    };
                    let mfvs = self.ds.chipdb.cell_mfvs.get(&c);
                    let Some((t, pos_str)) = mfvs.and_then(|m| m.get(fn_name)) else {
                        fatal!("PLL cell {c} has no `{fn_name}' function");
                    };
                    let pos = pos_str.parse::<usize>().map_err(|_| {
                        floe_common::FatalError::new("PLL output names no IO position")
                    })?;
                    let loc = floe_chipdb::Location::new(*t, pos);
                    let Some(&g) = self.ds.chipdb.loc_pin_glb_num.get(&loc) else {
                        fatal!("PLL `{fn_name}' site drives no global network");
                    };
                    for gc in GLOBAL_CLASSES {
                        if gc & (1 << g) != 0 {
                            *gc_used.get_mut(&gc).unwrap() += 1;
                        }
                    }
                    self.make_routable(out_net, 1 << g);
                }
            }
        }

        for (inst, c) in plls {
            self.pll_pass_through(inst, c, "LOCK")?;
            self.pll_pass_through(inst, c, "SDO")?;
        }

        let boundary = self.ds.design.boundary_nets(&self.ds.models);

        // Candidate scan. Skip index 0 (the reserved "no net" slot).
        let mut promote_q: std::collections::BTreeSet<(usize, usize)> =
            std::collections::BTreeSet::new();
        let mut net_gc: BTreeMap<usize, u8> = BTreeMap::new();
        for (i, slot) in nets.iter().enumerate().take(n_nets).skip(1) {
            let Some(n) = *slot else { continue };
            // Nets may have been restructured by make_routable.
            if !self.ds.design.model(top).nets.contains(&n) {
                continue;
            }
            if boundary.contains(&n) || self.ds.design.net(n).is_constant {
                continue;
            }

            let mut n_gc: BTreeMap<u8, usize> = BTreeMap::new();
            for gc in GLOBAL_CLASSES {
                n_gc.insert(gc, 0);
            }
            let mut driver: Option<PortId> = None;
            for &conn in &self.ds.design.net(n).connections {
                if self.ds.design.port_is_output(conn) {
                    driver = Some(conn);
                }
                let gc = self.port_gc(conn, false);
                if gc != 0 {
                    *n_gc.get_mut(&gc).unwrap() += 1;
                }
            }

            let mut max_gc = 0u8;
            let mut max_n = 0usize;
            for gc in GLOBAL_CLASSES {
                let count = n_gc[&gc];
                if count > max_n {
                    max_gc = gc;
                    max_n = count;
                }
            }

            let hard_driver = driver.filter(|&p| {
                let d = &self.ds.design;
                let NodeRef::Instance(di) = d.port(p).owner else {
                    return false;
                };
                let pname = d.port(p).name.as_str();
                (self.ds.models.is_gb_family(d, di) && pname == "GLOBAL_BUFFER_OUTPUT")
                    || (self.ds.models.is_pll(d, di)
                        && matches!(pname, "PLLOUTGLOBAL" | "PLLOUTGLOBALA" | "PLLOUTGLOBALB"))
                    || (self.ds.models.is_hfosc(d, di)
                        && pname == "CLKHF"
                        && !d.is_attr_set(di, "ROUTE_THROUGH_FABRIC"))
                    || (self.ds.models.is_lfosc(d, di)
                        && pname == "CLKLF"
                        && !d.is_attr_set(di, "ROUTE_THROUGH_FABRIC"))
            });

            if let Some(drv) = hard_driver {
                let NodeRef::Instance(gb_inst) = self.ds.design.port(drv).owner else {
                    unreachable!();
                };
                let gc = if max_gc != 0 { max_gc } else { GC_CLK };
                n_global += 1;
                *gc_global.get_mut(&gc).unwrap() += 1;

                let d = &self.ds.design;
                if self.ds.models.is_gb_family(d, gb_inst)
                    || self.ds.models.is_hfosc(d, gb_inst)
                    || self.ds.models.is_lfosc(d, gb_inst)
                {
                    self.make_routable(n, gc);
                    self.ds.gb_inst_gc.insert(gb_inst, gc);
                }
                for gc2 in GLOBAL_CLASSES {
                    if (gc2 & gc) == gc {
                        *gc_used.get_mut(&gc2).unwrap() += 1;
                    }
                }
            } else if do_promote && driver.is_some() && max_gc != 0 && max_n > 4 {
                net_gc.insert(i, max_gc);
                promote_q.insert((max_n, i));
            }
        }

        // Promote by descending (fanout, net), while capacity lasts.
        let mut n_promoted = 0usize;
        let mut gc_promoted: BTreeMap<u8, usize> = BTreeMap::new();
        for gc in GLOBAL_CLASSES {
            gc_promoted.insert(gc, 0);
        }

        while let Some(&(count, i)) = promote_q.iter().next_back() {
            promote_q.remove(&(count, i));

            let n = nets[i].unwrap();
            let gc = net_gc[&i];

            // Capacity: every superset class must have a free network.
            let mut fits = true;
            for gc2 in GLOBAL_CLASSES {
                if (gc2 & gc) == gc && gc_used[&gc2] >= (gc2.count_ones() as usize) {
                    fits = false;
                    break;
                }
            }
            if !fits {
                continue;
            }

            n_promoted += 1;
            *gc_promoted.get_mut(&gc).unwrap() += 1;

            let top = self.ds.top;
            let gb_inst = self.ds.design.add_instance(top, self.ds.models.gb);
            let t = self.ds.design.add_net_like(top, n);

            let mut n_conn = 0usize;
            let mut n_conn_promoted = 0usize;
            let conns: Vec<PortId> = self.ds.design.net(n).connections.iter().copied().collect();
            for conn in conns {
                if self.ds.design.port_is_output(conn) || self.ds.design.port_is_bidir(conn) {
                    continue;
                }
                n_conn += 1;
                let conn_gc = self.port_gc(conn, true);
                if (conn_gc & gc) == gc {
                    n_conn_promoted += 1;
                    self.ds.design.connect(conn, t);
                }
            }

            self.connect(gb_inst, "USER_SIGNAL_TO_GLOBAL_BUFFER", n);
            self.connect(gb_inst, "GLOBAL_BUFFER_OUTPUT", t);

            n_global += 1;
            *gc_global.get_mut(&gc).unwrap() += 1;
            self.ds.gb_inst_gc.insert(gb_inst, gc);
            for gc2 in GLOBAL_CLASSES {
                if (gc2 & gc) == gc {
                    *gc_used.get_mut(&gc2).unwrap() += 1;
                }
            }
            sink.noteln(format!(
                "  promoted {}, {} / {}",
                self.ds.design.net(n).name,
                n_conn_promoted,
                n_conn
            ));
        }

        sink.noteln(format!("  promoted {n_promoted} nets"));
        for (&gc, &count) in &gc_promoted {
            if count != 0 {
                sink.noteln(format!("    {} {}", count, global_class_name(gc)));
            }
        }
        sink.noteln(format!("  {n_global} globals"));
        for (&gc, &count) in &gc_global {
            if count != 0 {
                sink.noteln(format!("    {} {}", count, global_class_name(gc)));
            }
        }

        self.ds.design.prune();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_blif::parse_blif;
    use floe_chipdb::parse_chipdb;
    use floe_chipdb::ChipDB;
    use floe_common::RandomGenerator;
    use floe_netlist::Design;

    fn tiny_db() -> ChipDB {
        parse_chipdb(
            "tiny",
            ".device 1k 4 4 8\n.logic_tile 1 1\n.logic_tile 2 1\n.logic_tile 1 2\n.logic_tile 2 2\n",
        )
        .unwrap()
    }

    fn packed_state<'a>(db: &'a ChipDB, blif: &str) -> DesignState<'a> {
        let mut d = parse_blif("t", blif).unwrap();
        floe_pack::instantiate_io(&mut d).unwrap();
        let sink = LogSink::capture();
        let mut chains = floe_pack::pack::CarryChains::new();
        floe_pack::pack(db, &mut d, &mut chains, &sink).unwrap();
        // The tiny db carries no packages; an empty one is fine here.
        let package: &'static floe_chipdb::Package = Box::leak(Box::default());
        let mut ds = DesignState::new(db, package, d, RandomGenerator::new(1));
        ds.chains = chains;
        ds
    }

    fn dff_fanout_blif(n_dffs: usize) -> String {
        let mut blif = String::from(".model top\n.inputs clk d0\n.outputs");
        for i in 0..n_dffs {
            blif.push_str(&format!(" q{i}"));
        }
        blif.push('\n');
        for i in 0..n_dffs {
            blif.push_str(&format!(".gate SB_DFF C=clk D=d0 Q=q{i}\n"));
        }
        blif.push_str(".end\n");
        blif
    }

    #[test]
    fn high_fanout_clock_promoted() {
        let db = tiny_db();
        let mut ds = packed_state(&db, &dff_fanout_blif(6));
        let sink = LogSink::capture();
        promote_globals(&mut ds, true, &sink).unwrap();

        // One SB_GB was inserted and recorded with the clk class.
        let gbs: Vec<_> = ds
            .design
            .model(ds.top)
            .instances
            .iter()
            .copied()
            .filter(|&i| ds.models.is_gb(&ds.design, i))
            .collect();
        assert_eq!(gbs.len(), 1);
        assert_eq!(ds.gb_inst_gc[&gbs[0]], GC_CLK);
        assert!(sink.captured().contains("promoted 1 nets"));
    }

    #[test]
    fn low_fanout_stays_local() {
        let db = tiny_db();
        let mut ds = packed_state(&db, &dff_fanout_blif(3));
        let sink = LogSink::capture();
        promote_globals(&mut ds, true, &sink).unwrap();
        let gbs = ds
            .design
            .model(ds.top)
            .instances
            .iter()
            .filter(|&&i| ds.models.is_gb(&ds.design, i))
            .count();
        assert_eq!(gbs, 0);
    }

    #[test]
    fn no_promote_flag_inserts_nothing() {
        let db = tiny_db();
        let mut ds = packed_state(&db, &dff_fanout_blif(8));
        let sink = LogSink::capture();
        promote_globals(&mut ds, false, &sink).unwrap();
        let gbs = ds
            .design
            .model(ds.top)
            .instances
            .iter()
            .filter(|&&i| ds.models.is_gb(&ds.design, i))
            .count();
        assert_eq!(gbs, 0);
    }

    #[test]
    fn class_masks_are_sets() {
        // "A usable for B" is mask containment.
        assert_eq!(GC_CLK & GC_CEN, GC_CEN);
        assert_eq!(GC_CLK & GC_SR, GC_SR);
        assert_eq!(GC_CEN & GC_RCLKE, GC_RCLKE);
        assert_eq!(GC_SR & GC_RE, GC_RE);
        // cen and sr are disjoint.
        assert_eq!(GC_CEN & GC_SR, 0);
    }

    #[test]
    fn capacity_limits_promotions() {
        // Ten clock nets with fanout 5: only eight globals exist.
        let db = tiny_db();
        let mut blif = String::from(".model top\n.inputs");
        for c in 0..10 {
            blif.push_str(&format!(" clk{c}"));
        }
        blif.push_str(" d0\n.outputs");
        for c in 0..10 {
            for i in 0..5 {
                blif.push_str(&format!(" q{c}_{i}"));
            }
        }
        blif.push('\n');
        for c in 0..10 {
            for i in 0..5 {
                blif.push_str(&format!(".gate SB_DFF C=clk{c} D=d0 Q=q{c}_{i}\n"));
            }
        }
        blif.push_str(".end\n");

        let mut ds = packed_state(&db, &blif);
        let sink = LogSink::capture();
        promote_globals(&mut ds, true, &sink).unwrap();
        let gbs = ds
            .design
            .model(ds.top)
            .instances
            .iter()
            .filter(|&&i| ds.models.is_gb(&ds.design, i))
            .count();
        assert_eq!(gbs, 8, "exactly the eight global networks get drivers");
    }
}
