//! LC packing: fuse `SB_DFF*`, `SB_LUT4` and `SB_CARRY` primitives into
//! `ICESTORM_LC` instances and build carry chains.
//!
//! Runs three sub-passes in order: DFFs (absorbing single-fanout LUT
//! fan-ins), standalone LUTs, then carries. Carry packing walks each chain
//! from the instance whose `CI` is not fed by another carry, reusing the
//! already-packed LC that shares the carry's inputs when its CLK/CEN/SR
//! nets are compatible with the chain so far.

use floe_chipdb::ChipDB;
use floe_common::{FatalError, Result};
use floe_diagnostics::LogSink;
use floe_netlist::{Const, Design, InstanceId, Models, NetId, NodeRef, PortId};
use std::collections::BTreeSet;

/// Ordered carry chains; each chain occupies consecutive positions in one
/// logic column.
pub type CarryChains = Vec<Vec<InstanceId>>;

/// Packs the design; fills `chains` and logs the resource table.
pub fn pack(
    chipdb: &ChipDB,
    d: &mut Design,
    chains: &mut CarryChains,
    sink: &LogSink,
) -> Result<()> {
    let mut packer = Packer::new(chipdb, d, chains);
    packer.run()?;
    let (n_dff_pass, n_carry_pass) = (packer.n_dff_pass_through, packer.n_carry_pass_through);
    log_stats(chipdb, d, sink, n_dff_pass, n_carry_pass)?;
    Ok(())
}

struct Packer<'a> {
    chipdb: &'a ChipDB,
    d: &'a mut Design,
    models: Models,
    top: floe_netlist::ModelId,
    chains: &'a mut CarryChains,
    n_dff_pass_through: usize,
    n_carry_pass_through: usize,
    const0: NetId,
    const1: NetId,
    ready: BTreeSet<InstanceId>,
}

impl<'a> Packer<'a> {
    fn new(chipdb: &'a ChipDB, d: &'a mut Design, chains: &'a mut CarryChains) -> Self {
        let models = Models::new(d);
        let top = d.top();

        let mut const0 = None;
        let mut const1 = None;
        for &n in &d.model(top).nets {
            let net = d.net(n);
            if net.is_constant {
                match net.constant {
                    floe_netlist::Value::One => const1 = Some(n),
                    _ => const0 = Some(n),
                }
            }
            if const0.is_some() && const1.is_some() {
                break;
            }
        }
        // Unused constants are pruned again at the end of the pass.
        let const0 = const0.unwrap_or_else(|| {
            let n = d.add_net(top, "$false");
            d.net_mut(n).is_constant = true;
            d.net_mut(n).constant = floe_netlist::Value::Zero;
            n
        });
        let const1 = const1.unwrap_or_else(|| {
            let n = d.add_net(top, "$true");
            d.net_mut(n).is_constant = true;
            d.net_mut(n).constant = floe_netlist::Value::One;
            n
        });

        Self {
            chipdb,
            d,
            models,
            top,
            chains,
            n_dff_pass_through: 0,
            n_carry_pass_through: 0,
            const0,
            const1,
            ready: BTreeSet::new(),
        }
    }

    fn run(&mut self) -> Result<()> {
        self.pack_dffs()?;
        self.pack_luts()?;
        self.pack_carries()?;
        self.d.prune();
        Ok(())
    }

    fn port(&self, i: InstanceId, name: &str) -> PortId {
        self.d
            .find_port(NodeRef::Instance(i), name)
            .expect("standard model port")
    }

    fn port_net(&self, i: InstanceId, name: &str) -> Option<NetId> {
        self.d.port(self.port(i, name)).connection
    }

    fn connect_opt(&mut self, i: InstanceId, name: &str, n: Option<NetId>) {
        if let Some(n) = n {
            let p = self.port(i, name);
            self.d.connect(p, n);
        }
    }

    fn connect(&mut self, i: InstanceId, name: &str, n: NetId) {
        let p = self.port(i, name);
        self.d.connect(p, n);
    }

    /// Decodes the `SB_DFF{N?}{E?}{,SR,R,SS,S}` flavor onto an LC.
    fn lc_from_dff(&mut self, lc: InstanceId, dff: InstanceId) -> Result<()> {
        let dff_name = self
            .d
            .model(self.d.instance(dff).instance_of)
            .name
            .clone();
        let mut suffix = &dff_name[6..];

        let neg_clk = if let Some(rest) = suffix.strip_prefix('N') {
            suffix = rest;
            true
        } else {
            false
        };
        let cen = if let Some(rest) = suffix.strip_prefix('E') {
            suffix = rest;
            true
        } else {
            false
        };
        let (sr, set_noreset, async_sr) = match suffix {
            "S" => (true, true, true),
            "SS" => (true, true, false),
            "R" => (true, false, true),
            "SR" => (true, false, false),
            "" => (false, false, false),
            _ => return Err(FatalError::new(format!("unknown DFF flavor `{dff_name}'"))),
        };

        let q = self.port_net(dff, "Q");
        self.connect_opt(lc, "O", q);
        let c = self.port_net(dff, "C");
        self.connect_opt(lc, "CLK", c);

        if neg_clk {
            self.d.set_param_bit(lc, "NEG_CLK", true);
        }

        if cen {
            let e = self.port_net(dff, "E");
            self.connect_opt(lc, "CEN", e);
        } else {
            let c1 = self.const1;
            self.connect(lc, "CEN", c1);
        }

        if sr {
            if set_noreset {
                let s = self.port_net(dff, "S");
                self.connect_opt(lc, "SR", s);
                self.d.set_param_bit(lc, "SET_NORESET", true);
            } else {
                let r = self.port_net(dff, "R");
                self.connect_opt(lc, "SR", r);
            }
            if async_sr {
                self.d.set_param_bit(lc, "ASYNC_SR", true);
            }
        } else {
            let c0 = self.const0;
            self.connect(lc, "SR", c0);
        }

        self.d.set_param_bit(lc, "DFF_ENABLE", true);
        self.d.merge_attrs(lc, dff);
        Ok(())
    }

    fn lc_from_lut(&mut self, lc: InstanceId, lut: InstanceId) {
        for name in ["I0", "I1", "I2", "I3"] {
            let n = self.port_net(lut, name);
            self.connect_opt(lc, name, n);
        }
        if self.d.self_has_param(lut, "LUT_INIT") {
            let init = self.d.self_get_param(lut, "LUT_INIT").clone();
            self.d.set_param(lc, "LUT_INIT", init);
        }
        self.d.merge_attrs(lc, lut);
    }

    /// Configures `lc` as a buffer of the net on `input`.
    fn pass_through_lc(&mut self, lc: InstanceId, input: PortId) {
        let n = self.d.port(input).connection;
        self.connect_opt(lc, "I0", n);
        for name in ["I1", "I2", "I3"] {
            let c0 = self.const0;
            self.connect(lc, name, c0);
        }
        self.d.set_param(lc, "LUT_INIT", Const::bits_of(2, 2));
        self.n_dff_pass_through += 1;
    }

    /// Splices `lc` behind `cout`: the carry output moves to a fresh net
    /// feeding `lc.I3`, and `lc.O` takes over the original net.
    fn carry_pass_through_lc(&mut self, lc: InstanceId, cout: PortId) {
        let n = self.d.port(cout).connection.expect("COUT driven");
        let t = self.d.add_net_like(self.top, n);
        self.d.connect(cout, t);

        self.connect(lc, "I3", t);
        self.connect(lc, "O", n);
        self.d
            .set_param(lc, "LUT_INIT", Const::bits_of(16, 0xff00));
        self.n_carry_pass_through += 1;
    }

    fn lc_from_carry(&mut self, lc: InstanceId, carry: InstanceId) {
        debug_assert_eq!(self.port_net(lc, "I1"), self.port_net(carry, "I0"));
        debug_assert_eq!(self.port_net(lc, "I2"), self.port_net(carry, "I1"));

        let ci = self.port_net(carry, "CI");
        self.connect_opt(lc, "CIN", ci);
        let co = self.port_net(carry, "CO");
        self.connect_opt(lc, "COUT", co);
        self.d.set_param_bit(lc, "CARRY_ENABLE", true);
    }

    fn driver(&self, n: NetId) -> Option<PortId> {
        self.d
            .net(n)
            .connections
            .iter()
            .copied()
            .find(|&p| self.d.port_is_output(p) || self.d.port_is_bidir(p))
    }

    fn pack_dffs(&mut self) -> Result<()> {
        let insts: Vec<InstanceId> = self.d.model(self.top).instances.iter().copied().collect();
        let mut consumed: BTreeSet<InstanceId> = BTreeSet::new();
        for inst in insts {
            if consumed.contains(&inst) || !self.models.is_dff(self.d, inst) {
                continue;
            }
            let lc = self.d.add_instance(self.top, self.models.lc);

            let d_port = self.port(inst, "D");
            let d_driver = self.d.connection_other_port(d_port);

            let lut = d_driver.and_then(|q| match self.d.port(q).owner {
                NodeRef::Instance(qi)
                    if self.models.is_lut4(self.d, qi) && self.d.port(q).name == "O" =>
                {
                    Some(qi)
                }
                _ => None,
            });

            self.lc_from_dff(lc, inst)?;

            if let Some(lut) = lut {
                self.lc_from_lut(lc, lut);
            } else {
                self.pass_through_lc(lc, d_port);
            }

            self.d.remove_instance(inst);
            if let Some(lut) = lut {
                self.d.remove_instance(lut);
                consumed.insert(lut);
            }
        }
        Ok(())
    }

    fn pack_luts(&mut self) -> Result<()> {
        let insts: Vec<InstanceId> = self.d.model(self.top).instances.iter().copied().collect();
        for inst in insts {
            if !self.models.is_lut4(self.d, inst) {
                continue;
            }
            let lc = self.d.add_instance(self.top, self.models.lc);
            self.lc_from_lut(lc, inst);
            let o = self.port_net(inst, "O");
            self.connect_opt(lc, "O", o);
            self.d.remove_instance(inst);
        }
        Ok(())
    }

    /// The already-packed LC sharing this carry's operand nets on I1/I2
    /// and consuming its `CI` net on I3, if there is exactly one other
    /// consumer pair.
    fn find_carry_lc(&self, c: InstanceId) -> Option<InstanceId> {
        let ci_conn = self.port_net(c, "CI")?;
        if self.d.net(ci_conn).is_constant || self.d.net(ci_conn).connections.len() != 3 {
            return None;
        }

        let i0_conn = self.port_net(c, "I0");
        let i1_conn = self.port_net(c, "I1");

        for &p in &self.d.net(ci_conn).connections {
            let NodeRef::Instance(p_inst) = self.d.port(p).owner else {
                continue;
            };
            if self.models.is_lc(self.d, p_inst)
                && self.d.port(p).name == "I3"
                && i0_conn == self.port_net(p_inst, "I1")
                && i1_conn == self.port_net(p_inst, "I2")
            {
                return Some(p_inst);
            }
        }
        None
    }

    fn pack_carries(&mut self) -> Result<()> {
        let insts: Vec<InstanceId> = self.d.model(self.top).instances.iter().copied().collect();
        for inst in &insts {
            if !self.models.is_carry(self.d, *inst) {
                continue;
            }
            let chain_head = match self.port_net(*inst, "CI") {
                Some(ci) => match self.driver(ci) {
                    Some(p) => !matches!(self.d.port(p).owner, NodeRef::Instance(pi)
                        if self.models.is_carry(self.d, pi)),
                    None => true,
                },
                None => true,
            };
            if chain_head {
                self.ready.insert(*inst);
            }
        }

        while let Some(&inst) = self.ready.iter().next() {
            self.ready.remove(&inst);
            self.pack_carries_from(inst)?;
        }

        for inst in insts {
            if self.d.model(self.top).instances.contains(&inst)
                && self.models.is_carry(self.d, inst)
            {
                return Err(FatalError::new("carry chain loop"));
            }
        }
        Ok(())
    }

    fn pack_carries_from(&mut self, f: InstanceId) -> Result<()> {
        let max_chain_length = (self.chipdb.height - 2) * 8;

        let mut chain: Vec<InstanceId> = Vec::new();
        let mut global_clk: Option<NetId> = None;
        let mut global_cen: Option<NetId> = None;
        let mut global_sr: Option<NetId> = None;

        let mut cur = Some(f);
        while let Some(c) = cur {
            let out_conn = self.port_net(c, "CO");
            if out_conn.is_some() && chain.len() == max_chain_length - 1 {
                let out_lc = self.d.add_instance(self.top, self.models.lc);
                let back_cout = self.port(*chain.last().unwrap(), "COUT");
                self.carry_pass_through_lc(out_lc, back_cout);
                chain.push(out_lc);
                self.chains.push(std::mem::take(&mut chain));
            }

            let mut in_conn = self.port_net(c, "CI");

            if chain.len() % 8 == 0 {
                global_clk = None;
                global_cen = None;
                global_sr = None;
            }

            if chain.is_empty() {
                if let Some(ci) = in_conn {
                    if !self.d.net(ci).is_constant {
                        // External carry-in enters through a pass-through
                        // LC whose own CIN is constant one.
                        let in_lc = self.d.add_instance(self.top, self.models.lc);
                        let t = self.d.add_net_like(self.top, ci);

                        self.connect(in_lc, "COUT", t);
                        let c0 = self.const0;
                        self.connect(in_lc, "I0", c0);
                        self.connect(in_lc, "I1", ci);
                        self.connect(in_lc, "I2", c0);
                        self.connect(in_lc, "I3", c0);
                        let c1 = self.const1;
                        self.connect(in_lc, "CIN", c1);
                        self.d.set_param_bit(in_lc, "CARRY_ENABLE", true);

                        chain.push(in_lc);
                        let ci_port = self.port(c, "CI");
                        self.d.connect(ci_port, t);
                        in_conn = Some(t);
                        self.n_carry_pass_through += 1;
                    }
                }
            }

            let mut lc_inst = self.find_carry_lc(c);

            if let Some(l) = lc_inst {
                let clk = self.port_net(l, "CLK");
                let cen = self.port_net(l, "CEN");
                let sr = self.port_net(l, "SR");
                if (global_clk.is_some() && global_clk != clk)
                    || (global_cen.is_some() && global_cen != cen)
                    || (global_sr.is_some() && global_sr != sr)
                {
                    lc_inst = None;
                } else {
                    global_clk = global_clk.or(clk);
                    global_cen = global_cen.or(cen);
                    global_sr = global_sr.or(sr);
                }
            }

            let lc_inst = match lc_inst {
                Some(l) => l,
                None => {
                    let l = self.d.add_instance(self.top, self.models.lc);
                    let i0 = self.port_net(c, "I0");
                    self.connect_opt(l, "I1", i0);
                    let i1 = self.port_net(c, "I1");
                    self.connect_opt(l, "I2", i1);

                    let shared_cin = match in_conn {
                        Some(ci) => {
                            !self.d.net(ci).is_constant
                                && self.d.net(ci).connections.len() != 2
                        }
                        None => false,
                    };
                    if shared_cin {
                        // CIN fans out elsewhere: splice a pass-through so
                        // the hardware carry path stays point to point.
                        let back_cout = self.port(*chain.last().unwrap(), "COUT");
                        debug_assert_eq!(self.d.port(back_cout).connection, in_conn);
                        self.carry_pass_through_lc(l, back_cout);
                        let new_t = self.d.port(back_cout).connection;
                        let ci_port = self.port(c, "CI");
                        if let Some(t) = new_t {
                            self.d.connect(ci_port, t);
                        }
                    }
                    l
                }
            };

            self.lc_from_carry(lc_inst, c);
            chain.push(lc_inst);

            let mut next_c = None;
            if let Some(oc) = out_conn {
                let conns: Vec<PortId> = self.d.net(oc).connections.iter().copied().collect();
                for p in conns {
                    let NodeRef::Instance(pi) = self.d.port(p).owner else {
                        continue;
                    };
                    if self.models.is_carry(self.d, pi) && self.d.port(p).name == "CI" {
                        if next_c.is_some() {
                            self.ready.insert(pi);
                        } else {
                            next_c = Some(pi);
                        }
                    }
                }
            }

            self.d.remove_instance(c);

            if next_c.is_none() {
                if let Some(oc) = out_conn {
                    debug_assert!(chain.len() < max_chain_length);

                    let back_cout = self.port(*chain.last().unwrap(), "COUT");
                    debug_assert_eq!(self.d.port(back_cout).connection, Some(oc));

                    // The carry out may feed an existing LC's I3 directly.
                    let mut lc2 = None;
                    if self.d.net(oc).connections.len() == 2 {
                        if let Some(consumer) = self.d.connection_other_port(back_cout) {
                            if self.d.port(consumer).name == "I3" {
                                if let NodeRef::Instance(ci) = self.d.port(consumer).owner {
                                    if self.models.is_lc(self.d, ci) {
                                        lc2 = Some(ci);
                                    }
                                }
                            }
                        }
                    }

                    let mut break_chain = false;
                    if let Some(l2) = lc2 {
                        let clk = self.port_net(l2, "CLK");
                        let cen = self.port_net(l2, "CEN");
                        let sr = self.port_net(l2, "SR");
                        if (global_clk.is_some() && global_clk != clk)
                            || (global_cen.is_some() && global_cen != cen)
                            || (global_sr.is_some() && global_sr != sr)
                        {
                            break_chain = true;
                        }
                        global_clk = global_clk.or(clk);
                        global_cen = global_cen.or(cen);
                        global_sr = global_sr.or(sr);
                    }

                    let lc2 = match lc2 {
                        Some(l2) => l2,
                        None => {
                            let l2 = self.d.add_instance(self.top, self.models.lc);
                            self.carry_pass_through_lc(l2, back_cout);
                            l2
                        }
                    };

                    if break_chain {
                        let out_lc = self.d.add_instance(self.top, self.models.lc);
                        let back_cout = self.port(*chain.last().unwrap(), "COUT");
                        self.carry_pass_through_lc(out_lc, back_cout);
                        chain.push(out_lc);
                        self.chains.push(std::mem::take(&mut chain));
                        chain.push(lc2);
                    } else {
                        chain.push(lc2);
                    }
                }
            }

            cur = next_c;
        }

        self.chains.push(chain);
        Ok(())
    }
}

/// Logs the "After packing" resource table.
fn log_stats(
    chipdb: &ChipDB,
    d: &Design,
    sink: &LogSink,
    n_dff_pass: usize,
    n_carry_pass: usize,
) -> Result<()> {
    use floe_chipdb::{CellType, TileType};

    let models = Models::new(d);
    let top = d.top();

    let n_ramt_tiles = chipdb
        .tile_type
        .iter()
        .filter(|&&t| t == TileType::Ramt)
        .count();
    let n_logic_tiles = chipdb
        .tile_type
        .iter()
        .filter(|&&t| t == TileType::Logic)
        .count();
    let n_warmboot_cells = chipdb.cell_type_cells[CellType::Warmboot.idx()].len();
    let n_pll_cells = chipdb.cell_type_cells[CellType::Pll.idx()].len();

    let mut n_io = 0;
    let mut n_lc = 0;
    let mut n_lc_carry = 0;
    let mut n_lc_dff = 0;
    let mut n_lc_carry_dff = 0;
    let mut n_gb = 0;
    let mut n_gb_io = 0;
    let mut n_bram = 0;
    let mut n_pll = 0;
    let mut n_warmboot = 0;
    let mut n_other = 0;

    for &inst in &d.model(top).instances {
        if models.is_lc(d, inst) {
            n_lc += 1;
            let dff = d.get_param(inst, "DFF_ENABLE")?.get_bit(0)?;
            let carry = d.get_param(inst, "CARRY_ENABLE")?.get_bit(0)?;
            match (dff, carry) {
                (true, true) => n_lc_carry_dff += 1,
                (true, false) => n_lc_dff += 1,
                (false, true) => n_lc_carry += 1,
                (false, false) => {}
            }
        } else if models.is_io(d, inst) || models.is_io_i3c(d, inst) || models.is_io_od(d, inst) {
            n_io += 1;
        } else if models.is_gb(d, inst) {
            n_gb += 1;
        } else if models.is_gb_io(d, inst) {
            n_io += 1;
            n_gb_io += 1;
        } else if models.is_warmboot(d, inst) {
            n_warmboot += 1;
        } else if models.is_pll(d, inst) {
            n_pll += 1;
        } else if models.is_ram(d, inst) {
            n_bram += 1;
        } else {
            n_other += 1;
        }
    }
    let _ = n_other;

    let package_pins = chipdb
        .packages
        .values()
        .next()
        .map(|p| p.pin_loc.len())
        .unwrap_or(0);

    sink.note(format!(
        "\nAfter packing:\n\
         IOs          {n_io} / {package_pins}\n\
         GBs          {n_gb} / {}\n\
         \x20 GB_IOs     {n_gb_io} / {}\n\
         LCs          {n_lc} / {}\n\
         \x20 DFF        {n_lc_dff}\n\
         \x20 CARRY      {n_lc_carry}\n\
         \x20 CARRY, DFF {n_lc_carry_dff}\n\
         \x20 DFF PASS   {n_dff_pass}\n\
         \x20 CARRY PASS {n_carry_pass}\n\
         BRAMs        {n_bram} / {n_ramt_tiles}\n\
         WARMBOOTs    {n_warmboot} / {n_warmboot_cells}\n\
         PLLs         {n_pll} / {n_pll_cells}\n\n",
        chipdb.n_global_nets, chipdb.n_global_nets, n_logic_tiles * 8
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_blif::parse_blif;
    use floe_chipdb::parse_chipdb;

    fn tiny_db() -> ChipDB {
        // A 4x6 grid: enough height for chains of up to 32 LCs.
        let mut text = String::from(".device 1k 4 6 16\n");
        for y in 1..5 {
            text.push_str(&format!(".logic_tile 1 {y}\n.logic_tile 2 {y}\n"));
        }
        parse_chipdb("tiny", &text).unwrap()
    }

    fn packed(blif: &str) -> (Design, CarryChains) {
        let mut d = parse_blif("t", blif).unwrap();
        crate::instantiate_io(&mut d).unwrap();
        let mut chains = CarryChains::new();
        let db = tiny_db();
        let sink = LogSink::capture();
        pack(&db, &mut d, &mut chains, &sink).unwrap();
        (d, chains)
    }

    fn lcs(d: &Design) -> Vec<InstanceId> {
        let models = Models::new(d);
        d.model(d.top())
            .instances
            .iter()
            .copied()
            .filter(|&i| models.is_lc(d, i))
            .collect()
    }

    #[test]
    fn lut_becomes_standalone_lc() {
        let (d, _) = packed(
            ".model top\n.inputs a b\n.outputs y\n\
             .gate SB_LUT4 O=y I0=a I1=b\n.param LUT_INIT 1000\n.end\n",
        );
        let lcs = lcs(&d);
        assert_eq!(lcs.len(), 1);
        let lc = lcs[0];
        assert!(!d.get_param(lc, "DFF_ENABLE").unwrap().get_bit(0).unwrap());
        assert_eq!(
            d.get_param(lc, "LUT_INIT")
                .unwrap()
                .as_bits()
                .unwrap()
                .low_u64(),
            0b1000
        );
    }

    #[test]
    fn dff_absorbs_single_fanout_lut() {
        let (d, _) = packed(
            ".model top\n.inputs a b clk\n.outputs q\n\
             .gate SB_LUT4 O=t I0=a I1=b\n.param LUT_INIT 1000\n\
             .gate SB_DFF C=clk D=t Q=q\n.end\n",
        );
        let lcs = lcs(&d);
        assert_eq!(lcs.len(), 1, "LUT should be absorbed into the DFF's LC");
        let lc = lcs[0];
        assert!(d.get_param(lc, "DFF_ENABLE").unwrap().get_bit(0).unwrap());
        assert_eq!(
            d.get_param(lc, "LUT_INIT")
                .unwrap()
                .as_bits()
                .unwrap()
                .low_u64(),
            0b1000
        );
        // The intermediate net is gone.
        assert_eq!(d.find_net(d.top(), "t"), None);
    }

    #[test]
    fn dff_with_shared_lut_gets_pass_through() {
        let (d, _) = packed(
            ".model top\n.inputs a b clk\n.outputs q y\n\
             .gate SB_LUT4 O=t I0=a I1=b\n.param LUT_INIT 1000\n\
             .gate SB_DFF C=clk D=t Q=q\n\
             .gate SB_LUT4 O=y I0=t\n.param LUT_INIT 10\n.end\n",
        );
        // The shared LUT cannot be absorbed: the DFF's LC becomes a
        // pass-through with LUT_INIT = 0b10 and the LUT packs standalone.
        let lcs = lcs(&d);
        assert_eq!(lcs.len(), 3);
        let models = Models::new(&d);
        let _ = models;
        let dff_lc = lcs
            .iter()
            .copied()
            .find(|&i| d.get_param(i, "DFF_ENABLE").unwrap().get_bit(0).unwrap())
            .unwrap();
        assert_eq!(
            d.get_param(dff_lc, "LUT_INIT")
                .unwrap()
                .as_bits()
                .unwrap()
                .low_u64(),
            0b10
        );
    }

    #[test]
    fn dff_flavors_decode() {
        let (d, _) = packed(
            ".model top\n.inputs a clk en rst\n.outputs q\n\
             .gate SB_DFFNESR C=clk E=en R=rst D=a Q=q\n.end\n",
        );
        let lcs = lcs(&d);
        assert_eq!(lcs.len(), 1);
        let lc = lcs[0];
        assert!(d.get_param(lc, "NEG_CLK").unwrap().get_bit(0).unwrap());
        assert!(!d.get_param(lc, "SET_NORESET").unwrap().get_bit(0).unwrap());
        assert!(!d.get_param(lc, "ASYNC_SR").unwrap().get_bit(0).unwrap());
        // CEN and SR are wired to the enable and reset nets.
        let models = Models::new(&d);
        let _ = models;
        let cen = d.find_port(NodeRef::Instance(lc), "CEN").unwrap();
        let sr = d.find_port(NodeRef::Instance(lc), "SR").unwrap();
        assert!(d.port(cen).connection.is_some());
        assert!(d.port(sr).connection.is_some());
    }

    #[test]
    fn async_set_flavor_sets_both_params() {
        let (d, _) = packed(
            ".model top\n.inputs a clk s\n.outputs q\n\
             .gate SB_DFFS C=clk S=s D=a Q=q\n.end\n",
        );
        let lc = lcs(&d)[0];
        assert!(d.get_param(lc, "SET_NORESET").unwrap().get_bit(0).unwrap());
        assert!(d.get_param(lc, "ASYNC_SR").unwrap().get_bit(0).unwrap());
    }

    #[test]
    fn no_primitives_remain_after_packing() {
        let (d, _) = packed(
            ".model top\n.inputs a b c clk\n.outputs s q\n\
             .gate SB_CARRY CO=co CI=ci0 I0=a I1=b\n\
             .gate SB_LUT4 O=ci0 I0=c\n.param LUT_INIT 10\n\
             .gate SB_LUT4 O=s I0=a I1=b I2=co\n.param LUT_INIT 10010110\n\
             .gate SB_DFF C=clk D=s Q=q\n.end\n",
        );
        let models = Models::new(&d);
        for &i in &d.model(d.top()).instances {
            assert!(
                !models.is_lut4(&d, i) && !models.is_carry(&d, i) && !models.is_dff(&d, i),
                "unpacked primitive remains"
            );
        }
        // The packed netlist satisfies the single-driver invariants.
        d.check(&models).unwrap();
    }

    #[test]
    fn ripple_chain_packs_in_order() {
        // An 8-bit ripple carry: head CI is driven by an input net, so a
        // head pass-through is prepended; total chain length 9.
        let mut blif = String::from(".model top\n.inputs cin");
        for i in 0..8 {
            blif.push_str(&format!(" a{i} b{i}"));
        }
        blif.push_str("\n.outputs cout\n");
        let mut prev = "cin".to_string();
        for i in 0..8 {
            let out = if i == 7 {
                "cout".to_string()
            } else {
                format!("c{i}")
            };
            blif.push_str(&format!(
                ".gate SB_CARRY CO={out} CI={prev} I0=a{i} I1=b{i}\n"
            ));
            prev = out;
        }
        blif.push_str(".end\n");

        let (d, chains) = packed(&blif);
        assert_eq!(chains.len(), 1);
        // Head pass-through + 8 carries + tail pass-through driving the
        // output pad.
        assert_eq!(chains[0].len(), 10);
        let models = Models::new(&d);
        for &lc in &chains[0] {
            assert!(models.is_lc(&d, lc));
        }
        for &lc in &chains[0][..9] {
            assert!(d.get_param(lc, "CARRY_ENABLE").unwrap().get_bit(0).unwrap());
        }
        // The head pass-through takes constant one on CIN.
        let head = chains[0][0];
        let cin = d.find_port(NodeRef::Instance(head), "CIN").unwrap();
        let cin_net = d.port(cin).connection.unwrap();
        assert!(d.net(cin_net).is_constant);
        assert_eq!(d.net(cin_net).constant, floe_netlist::Value::One);
    }

    #[test]
    fn carry_cycle_is_fatal() {
        let mut d = parse_blif(
            "t",
            ".model top\n.inputs a b\n\
             .gate SB_CARRY CO=x CI=y I0=a I1=b\n\
             .gate SB_CARRY CO=y CI=x I0=a I1=b\n.end\n",
        )
        .unwrap();
        crate::instantiate_io(&mut d).unwrap();
        let mut chains = CarryChains::new();
        let db = tiny_db();
        let sink = LogSink::capture();
        let err = pack(&db, &mut d, &mut chains, &sink).unwrap_err();
        assert!(err.to_string().contains("carry chain loop"));
    }

    #[test]
    fn carry_reuses_matching_lut_lc() {
        // The second adder bit's sum LUT shares the carry's operands on
        // I1/I2 and consumes the chain on I3, so its LC absorbs the carry.
        let (d, chains) = packed(
            ".model top\n.inputs a b x\n.outputs s co2\n\
             .gate SB_CARRY CO=co1 CI= I0=a I1=b\n\
             .gate SB_LUT4 O=s I0=x I1=a I2=b I3=co1\n.param LUT_INIT 1001011010010110\n\
             .gate SB_CARRY CO=co2 CI=co1 I0=a I1=b\n.end\n",
        );
        assert_eq!(chains.len(), 1);
        let carry_lcs: Vec<_> = lcs(&d)
            .into_iter()
            .filter(|&i| d.get_param(i, "CARRY_ENABLE").unwrap().get_bit(0).unwrap())
            .collect();
        // First carry's LC plus the reused sum LC; the tail pass-through
        // carries no CARRY_ENABLE.
        assert_eq!(carry_lcs.len(), 2);
        assert!(carry_lcs.iter().any(|&lc| {
            d.get_param(lc, "LUT_INIT")
                .unwrap()
                .as_bits()
                .unwrap()
                .low_u64()
                == 0b1001011010010110
        }));
    }

    #[test]
    fn packing_logs_resource_table() {
        let mut d = parse_blif(
            "t",
            ".model top\n.inputs a\n.outputs y\n\
             .gate SB_LUT4 O=y I0=a\n.param LUT_INIT 10\n.end\n",
        )
        .unwrap();
        crate::instantiate_io(&mut d).unwrap();
        let mut chains = CarryChains::new();
        let db = tiny_db();
        let sink = LogSink::capture();
        pack(&db, &mut d, &mut chains, &sink).unwrap();
        let log = sink.captured();
        assert!(log.contains("After packing:"));
        assert!(log.contains("LCs          1 / 64"));
    }
}
