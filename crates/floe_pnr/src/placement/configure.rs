//! Emission of non-routing configuration bits for placed cells.
//!
//! Runs ahead of routing (so route-only flows produce identical
//! bitstreams): LC LUT tables and flip-flop flavor, PIO pin types and
//! input-enable/pullup control, BRAM read/write modes and power-up,
//! GB_IO pad-to-global enables, and PLL function bits addressed through
//! the extra-cell function tables.

use crate::state::DesignState;
use floe_chipdb::{BitCoord, CellType, ChipDB, Location, TileType};
use floe_common::{fatal, BitVec, FatalError, Result};
use floe_netlist::{Design, InstanceId, NodeRef, Value};

/// The LC configuration block: 16 permuted LUT bits plus control bits.
///
/// `LC_<pos>` carries 20 bits; logical LUT bit `i` lands at index
/// `LUT_PERM[i]`, carry enable at 8, DFF enable at 9, Set_NoReset at 18
/// and AsyncSetReset at 19.
const LUT_PERM: [usize; 16] = [4, 14, 15, 5, 6, 16, 17, 7, 3, 13, 12, 2, 1, 11, 10, 0];
const LC_CARRY_ENABLE: usize = 8;
const LC_DFF_ENABLE: usize = 9;
const LC_SET_NORESET: usize = 18;
const LC_ASYNC_SR: usize = 19;

/// Writes the configuration bits of every placed cell into `ds.conf`.
pub fn configure_cells(ds: &mut DesignState) -> Result<()> {
    let chipdb = ds.chipdb;
    let placement: Vec<(InstanceId, usize)> =
        ds.placement.iter().map(|(&i, &c)| (i, c)).collect();

    for (inst, cell) in placement {
        let loc = chipdb.cell_location[cell];
        let d = &ds.design;
        if ds.models.is_lc(d, inst) {
            configure_lc(ds, inst, loc)?;
        } else if ds.models.is_io_family(d, inst) {
            configure_io(ds, inst, loc)?;
        } else if ds.models.is_ram(d, inst) {
            configure_ram(ds, inst, loc)?;
        } else if ds.models.is_pll(d, inst) {
            configure_pll(ds, inst, cell)?;
        }
        // GBs and WARMBOOT carry no non-routing bits.
    }

    // Unused package pins are input-disabled with the pullup left on.
    let pins: Vec<Location> = ds.package.pin_loc.values().copied().collect();
    for loc in pins {
        let cell = chipdb.loc_cell(loc);
        if cell == 0 {
            continue;
        }
        let used = ds.placement.values().any(|&c| c == cell);
        if !used {
            configure_io_control(chipdb, &mut ds.conf, loc, false, true)?;
        }
    }

    Ok(())
}

fn func_cbits<'a>(
    chipdb: &'a ChipDB,
    ty: TileType,
    func: &str,
) -> Result<&'a [BitCoord]> {
    chipdb
        .tile_nonrouting_cbits
        .get(&ty)
        .and_then(|m| m.get(func))
        .map(Vec::as_slice)
        .ok_or_else(|| {
            FatalError::new(format!("chipdb has no `{func}' bits for {}", ty.name()))
        })
}

fn configure_lc(ds: &mut DesignState, inst: InstanceId, loc: Location) -> Result<()> {
    let chipdb = ds.chipdb;
    let d = &ds.design;
    let t = loc.tile;
    let cbits = func_cbits(chipdb, TileType::Logic, &format!("LC_{}", loc.pos))?.to_vec();
    if cbits.len() < 20 {
        fatal!("malformed LC_{} bit block", loc.pos);
    }

    let mut lut_init = d.get_param(inst, "LUT_INIT")?.as_bits()?.clone();
    lut_init.resize(16);
    for (i, &pi) in LUT_PERM.iter().enumerate() {
        ds.conf.set_cbit(t, cbits[pi], lut_init.get(i))?;
    }

    let d = &ds.design;
    if d.get_param(inst, "CARRY_ENABLE")?.get_bit(0)? {
        ds.conf.set_cbit(t, cbits[LC_CARRY_ENABLE], true)?;
        let d = &ds.design;
        if loc.pos == 0 {
            let cin = d
                .find_port(NodeRef::Instance(inst), "CIN")
                .and_then(|p| d.port(p).connection);
            if let Some(cin) = cin {
                if d.net(cin).is_constant && d.net(cin).constant == Value::One {
                    let carry_in_set = func_cbits(chipdb, TileType::Logic, "CarryInSet")?[0];
                    ds.conf.set_cbit(t, carry_in_set, true)?;
                }
            }
        }
    }

    let d = &ds.design;
    if d.get_param(inst, "DFF_ENABLE")?.get_bit(0)? {
        ds.conf.set_cbit(t, cbits[LC_DFF_ENABLE], true)?;
        let d = &ds.design;
        let neg_clk = d.get_param(inst, "NEG_CLK")?.get_bit(0)?;
        let neg_clk_cbit = func_cbits(chipdb, TileType::Logic, "NegClk")?[0];
        ds.conf.set_cbit(t, neg_clk_cbit, neg_clk)?;

        let d = &ds.design;
        if d.get_param(inst, "SET_NORESET")?.get_bit(0)? {
            ds.conf.set_cbit(t, cbits[LC_SET_NORESET], true)?;
        }
        let d = &ds.design;
        if d.get_param(inst, "ASYNC_SR")?.get_bit(0)? {
            ds.conf.set_cbit(t, cbits[LC_ASYNC_SR], true)?;
        }
    }
    Ok(())
}

fn configure_io(ds: &mut DesignState, inst: InstanceId, loc: Location) -> Result<()> {
    let chipdb = ds.chipdb;
    let t = loc.tile;

    let pin_type = ds.design.get_param(inst, "PIN_TYPE")?.as_bits()?.clone();
    for i in 0..6 {
        let cbit = func_cbits(
            chipdb,
            TileType::Io,
            &format!("IOB_{}.PIN_TYPE_{}", loc.pos, i),
        )?[0];
        ds.conf.set_cbit(t, cbit, pin_type.get(i))?;
    }

    let neg_trigger = ds.design.get_param(inst, "NEG_TRIGGER")?.get_bit(0)?;
    let neg_clk = func_cbits(chipdb, TileType::Io, "NegClk")?[0];
    ds.conf.set_cbit(t, neg_clk, neg_trigger)?;

    let d = &ds.design;
    let enable_input = ["D_IN_0", "D_IN_1"].iter().any(|p| {
        d.find_port(NodeRef::Instance(inst), p)
            .and_then(|p| d.port(p).connection)
            .is_some()
    });
    let pullup = ds.design.get_param(inst, "PULLUP")?.get_bit(0)?;
    configure_io_control(chipdb, &mut ds.conf, loc, enable_input, pullup)?;

    if ds.models.is_gb_io(&ds.design, inst) {
        let out_connected = ds
            .design
            .find_port(NodeRef::Instance(inst), "GLOBAL_BUFFER_OUTPUT")
            .and_then(|p| ds.design.port(p).connection)
            .is_some();
        if out_connected {
            let Some(&g) = chipdb.loc_pin_glb_num.get(&loc) else {
                fatal!("GB_IO placed on a pin with no global path");
            };
            let Some(&(bank, ax, ay)) =
                chipdb.extra_bits.get(&format!("padin_glb_netwk_{g}"))
            else {
                fatal!("chipdb has no padin extra bit for global {g}");
            };
            ds.conf.set_extra_cbit(bank, ax, ay);
        }
    }
    Ok(())
}

/// Input-enable and pullup control through the IE/REN site of a PIO.
/// The IE polarity is inverted on the 1k parts.
fn configure_io_control(
    chipdb: &ChipDB,
    conf: &mut floe_bitstream::Configuration,
    loc: Location,
    enable_input: bool,
    pullup: bool,
) -> Result<()> {
    let Some(&ieren) = chipdb.ieren.get(&loc) else {
        return Ok(());
    };
    let ie = func_cbits(chipdb, TileType::Io, &format!("IoCtrl.IE_{}", ieren.pos))?[0];
    let ren = func_cbits(chipdb, TileType::Io, &format!("IoCtrl.REN_{}", ieren.pos))?[0];
    let ie_value = if chipdb.device == "1k" {
        enable_input
    } else {
        !enable_input
    };
    conf.set_cbit(ieren.tile, ie, ie_value)?;
    conf.set_cbit(ieren.tile, ren, !pullup)?;
    Ok(())
}

fn configure_ram(ds: &mut DesignState, inst: InstanceId, loc: Location) -> Result<()> {
    let chipdb = ds.chipdb;
    let ramt_t = loc.tile;
    debug_assert_eq!(chipdb.tile_type[ramt_t], TileType::Ramt);
    let ramb_t = chipdb.tile(chipdb.tile_x(ramt_t), chipdb.tile_y(ramt_t) - 1);

    let wm = ds.design.get_param(inst, "WRITE_MODE")?.as_bits()?.clone();
    let rm = ds.design.get_param(inst, "READ_MODE")?.as_bits()?.clone();
    for (i, bit) in [wm.get(0), wm.get(1), rm.get(0), rm.get(1)]
        .into_iter()
        .enumerate()
    {
        let cbit = func_cbits(chipdb, TileType::Ramt, &format!("RamConfig.CBIT_{i}"))?[0];
        ds.conf.set_cbit(ramt_t, cbit, bit)?;
    }

    // PowerUp is active low on the 1k parts.
    let powerup = func_cbits(chipdb, TileType::Ramb, "RamConfig.PowerUp")?[0];
    ds.conf.set_cbit(ramb_t, powerup, chipdb.device != "1k")?;

    let d = &ds.design;
    if ds.models.is_ram_neg_rclk(d, inst) {
        let neg = func_cbits(chipdb, TileType::Ramt, "NegClk")?[0];
        ds.conf.set_cbit(ramt_t, neg, true)?;
    }
    let d = &ds.design;
    if ds.models.is_ram_neg_wclk(d, inst) {
        let neg = func_cbits(chipdb, TileType::Ramb, "NegClk")?[0];
        ds.conf.set_cbit(ramb_t, neg, true)?;
    }
    Ok(())
}

/// PLL feedback path encoding.
fn feedback_path_value(s: &str) -> Result<u64> {
    Ok(match s {
        "DELAY" => 0,
        "SIMPLE" => 1,
        "PHASE_AND_DELAY" => 2,
        "EXTERNAL" => 6,
        _ => fatal!("unknown FEEDBACK_PATH `{s}'"),
    })
}

/// PLL output select encoding.
fn pllout_select_value(s: &str) -> Result<u64> {
    Ok(match s {
        "GENCLK" => 0,
        "GENCLK_HALF" => 1,
        "SHIFTREG_90deg" => 2,
        "SHIFTREG_0deg" => 3,
        _ => fatal!("unknown PLLOUT_SELECT `{s}'"),
    })
}

/// PLLTYPE encoding by primitive flavor.
fn pll_type_value(model_name: &str) -> Result<u64> {
    Ok(match model_name {
        "SB_PLL40_PAD" => 2,
        "SB_PLL40_CORE" => 3,
        "SB_PLL40_2_PAD" => 4,
        "SB_PLL40_2F_PAD" => 6,
        "SB_PLL40_2F_CORE" => 7,
        _ => fatal!("unknown PLL flavor `{model_name}'"),
    })
}

fn parse_mfv_cbit(value: &str) -> Result<BitCoord> {
    let bad = || FatalError::new(format!("PLL function value `{value}' is not a cbit"));
    let rest = value.strip_prefix('B').ok_or_else(bad)?;
    let lbr = rest.find('[').ok_or_else(bad)?;
    let rbr = rest.find(']').ok_or_else(bad)?;
    let row = rest[..lbr].parse().map_err(|_| bad())?;
    let col = rest[lbr + 1..rbr].parse().map_err(|_| bad())?;
    Ok(BitCoord { row, col })
}

/// Writes one multi-bit PLL function through the cell's mfv table.
fn set_pll_function(
    ds: &mut DesignState,
    cell: usize,
    func: &str,
    value: &BitVec,
) -> Result<()> {
    for i in 0..value.len() {
        let name = if value.len() == 1 {
            func.to_string()
        } else {
            format!("{func}_{i}")
        };
        let Some(&(t, ref v)) = ds.chipdb.cell_mfvs.get(&cell).and_then(|m| {
            m.get(&name)
                .or_else(|| if value.len() == 1 { m.get(&format!("{func}_0")) } else { None })
        }) else {
            // Databases differ in which functions they expose.
            continue;
        };
        let cbit = parse_mfv_cbit(v)?;
        ds.conf.set_cbit(t, cbit, value.get(i))?;
    }
    Ok(())
}

fn configure_pll(ds: &mut DesignState, inst: InstanceId, cell: usize) -> Result<()> {
    debug_assert_eq!(ds.chipdb.cell_type[cell], CellType::Pll);
    let d: &Design = &ds.design;
    let model_name = d.model(d.instance(inst).instance_of).name.clone();
    let dual = ds.models.is_dual_pll(d, inst);

    let pll_type = BitVec::from_u64(3, pll_type_value(&model_name)?);
    set_pll_function(ds, cell, "PLLTYPE", &pll_type)?;

    let fb = ds.design.get_param(inst, "FEEDBACK_PATH")?.as_string()?.to_string();
    let fb = BitVec::from_u64(3, feedback_path_value(&fb)?);
    set_pll_function(ds, cell, "FEEDBACK_PATH", &fb)?;

    for (param, func, width) in [
        ("DIVR", "DIVR", 4usize),
        ("DIVF", "DIVF", 7),
        ("DIVQ", "DIVQ", 3),
        ("FILTER_RANGE", "FILTER_RANGE", 3),
        ("FDA_FEEDBACK", "FDA_FEEDBACK", 4),
        ("FDA_RELATIVE", "FDA_RELATIVE", 4),
        ("SHIFTREG_DIV_MODE", "SHIFTREG_DIV_MODE", 1),
    ] {
        let mut bv = ds.design.get_param(inst, param)?.as_bits()?.clone();
        bv.resize(width);
        set_pll_function(ds, cell, func, &bv)?;
    }

    for (param, func) in [
        ("DELAY_ADJUSTMENT_MODE_FEEDBACK", "DELAY_ADJMODE_FB"),
        ("DELAY_ADJUSTMENT_MODE_RELATIVE", "DELAY_ADJMODE_REL"),
    ] {
        let mode = ds.design.get_param(inst, param)?.as_string()?.to_string();
        let bit = match mode.as_str() {
            "FIXED" => false,
            "DYNAMIC" => true,
            _ => fatal!("unknown {param} `{mode}'"),
        };
        set_pll_function(ds, cell, func, &BitVec::from_u64(1, u64::from(bit)))?;
    }

    if dual {
        for (param, func) in [
            ("PLLOUT_SELECT_PORTA", "PLLOUT_SELECT_A"),
            ("PLLOUT_SELECT_PORTB", "PLLOUT_SELECT_B"),
        ] {
            let sel = ds.design.get_param(inst, param)?.as_string()?.to_string();
            let bv = BitVec::from_u64(2, pllout_select_value(&sel)?);
            set_pll_function(ds, cell, func, &bv)?;
        }
    } else {
        let sel = ds
            .design
            .get_param(inst, "PLLOUT_SELECT")?
            .as_string()?
            .to_string();
        let bv = BitVec::from_u64(2, pllout_select_value(&sel)?);
        set_pll_function(ds, cell, "PLLOUT_SELECT_A", &bv)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_blif::parse_blif;
    use floe_chipdb::parse_chipdb;
    use floe_common::RandomGenerator;
    use floe_diagnostics::LogSink;

    fn db_with_bits() -> floe_chipdb::ChipDB {
        let mut text = String::from(
            ".device 1k 4 4 8\n\
             .pins tq144\n1 1 0 0\n2 1 0 1\n3 2 0 0\n\
             .io_tile 1 0\n.io_tile 2 0\n\
             .logic_tile 1 1\n.logic_tile 2 1\n\
             .logic_tile_bits 20 16\nNegClk B0[0]\nCarryInSet B1[0]\n",
        );
        for pos in 0..8 {
            text.push_str(&format!("LC_{pos}"));
            for i in 0..20 {
                text.push_str(&format!(" B{}[{}]", 2 + pos, i));
            }
            text.push('\n');
        }
        text.push_str(".io_tile_bits 10 4\nNegClk B0[0]\n");
        for pos in 0..2 {
            for i in 0..6 {
                text.push_str(&format!("IOB_{pos}.PIN_TYPE_{i} B{}[{}]\n", 1 + pos, i));
            }
            text.push_str(&format!("IoCtrl.IE_{pos} B3[{pos}]\n"));
            text.push_str(&format!("IoCtrl.REN_{pos} B3[{}]\n", 2 + pos));
        }
        text.push_str(".ieren\n1 0 0 1 0 0\n1 0 1 1 0 1\n2 0 0 2 0 0\n2 0 1 2 0 1\n");
        parse_chipdb("bits", &text).unwrap()
    }

    fn configured(blif: &str, pcf: &str) -> (floe_chipdb::ChipDB, DesignState<'static>) {
        let db = Box::leak(Box::new(db_with_bits()));
        let mut d = parse_blif("t", blif).unwrap();
        floe_pack::instantiate_io(&mut d).unwrap();
        let sink = LogSink::capture();
        let mut chains = floe_pack::pack::CarryChains::new();
        floe_pack::pack(db, &mut d, &mut chains, &sink).unwrap();
        let package = &db.packages["tq144"];
        let constraints = floe_pcf::parse_pcf("t.pcf", pcf, &d, package, &sink).unwrap();
        let mut ds = DesignState::new(db, package, d, RandomGenerator::new(1));
        ds.constraints = constraints;
        ds.chains = chains;
        crate::place_constraints(&mut ds).unwrap();
        crate::promote_globals(&mut ds, true, &sink).unwrap();
        floe_pack::realize_constants(&mut ds.design, &sink).unwrap();
        crate::place(&mut ds, &crate::PlaceOptions::default(), &sink).unwrap();
        configure_cells(&mut ds).unwrap();
        (db_with_bits(), ds)
    }

    #[test]
    fn lut_bits_follow_the_permutation() {
        let (db, ds) = configured(
            ".model top\n.inputs a b\n.outputs y\n\
             .gate SB_LUT4 O=y I0=a I1=b\n.param LUT_INIT 1000\n.end\n",
            "",
        );
        // Find the placed LC and check bit 3 (the only set LUT bit) at
        // its permuted coordinate.
        let (lc_inst, &cell) = ds
            .placement
            .iter()
            .find(|(&i, _)| ds.models.is_lc(&ds.design, i))
            .unwrap();
        let _ = lc_inst;
        let loc = db.cell_location[cell];
        let cbits = db.tile_nonrouting_cbits[&TileType::Logic][&format!("LC_{}", loc.pos)]
            .clone();
        assert!(ds.conf.cbit(loc.tile, cbits[LUT_PERM[3]]));
        assert!(!ds.conf.cbit(loc.tile, cbits[LUT_PERM[0]]));
        assert!(!ds.conf.cbit(loc.tile, cbits[LC_DFF_ENABLE]));
    }

    #[test]
    fn dff_bits_set_enable_and_polarity() {
        let (db, ds) = configured(
            ".model top\n.inputs a clk\n.outputs q\n\
             .gate SB_DFFN C=clk D=a Q=q\n.end\n",
            "",
        );
        let (_, &cell) = ds
            .placement
            .iter()
            .find(|(&i, _)| ds.models.is_lc(&ds.design, i))
            .unwrap();
        let loc = db.cell_location[cell];
        let cbits = db.tile_nonrouting_cbits[&TileType::Logic][&format!("LC_{}", loc.pos)]
            .clone();
        assert!(ds.conf.cbit(loc.tile, cbits[LC_DFF_ENABLE]));
        let neg_clk = db.tile_nonrouting_cbits[&TileType::Logic]["NegClk"][0];
        assert!(ds.conf.cbit(loc.tile, neg_clk));
    }

    #[test]
    fn io_pin_type_bits_written() {
        let (db, ds) = configured(
            ".model top\n.inputs a\n.outputs y\n\
             .gate SB_LUT4 O=y I0=a\n.param LUT_INIT 10\n.end\n",
            "set_io a 1\n",
        );
        let pin_loc = db.packages["tq144"].pin_loc["1"];
        let io_cell = db.loc_cell(pin_loc);
        assert!(ds.placement.values().any(|&c| c == io_cell));
        // Input pin type 000001: PIN_TYPE_0 set, others clear.
        let pt0 = db.tile_nonrouting_cbits[&TileType::Io]
            [&format!("IOB_{}.PIN_TYPE_0", pin_loc.pos)][0];
        let pt1 = db.tile_nonrouting_cbits[&TileType::Io]
            [&format!("IOB_{}.PIN_TYPE_1", pin_loc.pos)][0];
        assert!(ds.conf.cbit(pin_loc.tile, pt0));
        assert!(!ds.conf.cbit(pin_loc.tile, pt1));
        // Input is enabled: on the 1k, IE reads true.
        let ieren = db.ieren[&pin_loc];
        let ie = db.tile_nonrouting_cbits[&TileType::Io]
            [&format!("IoCtrl.IE_{}", ieren.pos)][0];
        assert!(ds.conf.cbit(ieren.tile, ie));
    }
}
