//! Constraint placement: pin constraints to forced cell bindings, plus
//! greedy placement of unconstrained PLLs.

use crate::state::DesignState;
use floe_chipdb::{CellType, Location, TileType};
use floe_common::{fatal, BasedVec, Result};
use floe_netlist::{InstanceId, NetId, NodeRef};

/// Applies the PCF constraints and pre-places PLLs.
pub fn place_constraints(ds: &mut DesignState) -> Result<()> {
    debug_assert!(ds.placement.is_empty());
    let chipdb = ds.chipdb;
    let mut cell_gate: BasedVec<Option<InstanceId>, 1> =
        BasedVec::filled(chipdb.n_cells, None);

    let mut bank_latch: [Option<NetId>; 4] = [None; 4];
    let constraints: Vec<(String, Location)> = ds
        .constraints
        .net_pin_loc
        .iter()
        .map(|(n, &l)| (n.clone(), l))
        .collect();

    for (net_name, loc) in constraints {
        let inst = top_port_io_gate(ds, &net_name)?;
        let d = &ds.design;

        let t = loc.tile;
        debug_assert_eq!(chipdb.tile_type[t], TileType::Io);
        let b = chipdb.tile_bank(t);

        let c;
        if ds.models.is_io_family(d, inst) {
            let latch_port = d
                .find_port(NodeRef::Instance(inst), "LATCH_INPUT_VALUE")
                .unwrap();
            if let Some(latch) = d.port(latch_port).connection {
                match bank_latch[b] {
                    Some(existing) if existing != latch => {
                        fatal!("pcf error: multiple LATCH_INPUT_VALUE drivers in bank {b}")
                    }
                    _ => bank_latch[b] = Some(latch),
                }
            }

            if d.get_param(inst, "IO_STANDARD")?.as_string()? == "SB_LVDS_INPUT" && b != 3 {
                fatal!("pcf error: LVDS port `{net_name}' not in bank 3");
            }

            let loc_other = Location::new(t, if loc.pos != 0 { 0 } else { 1 });
            let cell_other = chipdb.loc_cell(loc_other);
            if cell_other != 0 {
                if let Some(other) = cell_gate[cell_other] {
                    if d.get_param(inst, "NEG_TRIGGER")?.get_bit(0)?
                        != d.get_param(other, "NEG_TRIGGER")?.get_bit(0)?
                    {
                        let x = chipdb.tile_x(t);
                        let y = chipdb.tile_y(t);
                        fatal!(
                            "pcf error: incompatible NEG_TRIGGER parameters in PIO \
                             at ({x}, {y})"
                        );
                    }
                }
            }

            c = chipdb.loc_cell(loc);
            if c == 0 {
                fatal!("no PIO at constrained pin for `{net_name}'");
            }
        } else {
            debug_assert!(ds.models.is_pll(d, inst));
            let pll_loc = Location::new(loc.tile, 3);
            c = chipdb.loc_cell(pll_loc);
            if c == 0 || chipdb.cell_type[c] != CellType::Pll {
                let pin = ds
                    .package
                    .loc_pin
                    .get(&loc)
                    .map(String::as_str)
                    .unwrap_or("?");
                fatal!("bad constraint on `{net_name}': no PLL at pin {pin}");
            }
        }

        cell_gate[c] = Some(inst);
        ds.placement.insert(inst, c);
        ds.locked.insert(inst);
    }

    // Constrained PLLs must not collide with the input paths of the PIOs
    // their outputs surface through.
    for &c in &chipdb.cell_type_cells[CellType::Pll.idx()] {
        let Some(pll) = cell_gate[c] else { continue };
        debug_assert!(ds.models.is_pll(&ds.design, pll));
        for io_cell in ds.pll_out_io_cells(pll, c)? {
            let Some(io) = cell_gate[io_cell] else {
                continue;
            };
            if io_input_used(ds, io)? {
                let pll_loc = chipdb.cell_location[c];
                let io_pin = ds
                    .package
                    .loc_pin
                    .get(&chipdb.cell_location[io_cell])
                    .map(String::as_str)
                    .unwrap_or("?");
                fatal!(
                    "PLL at `{} {}' conflicts with pin {io_pin} input path",
                    chipdb.tile_x(pll_loc.tile),
                    chipdb.tile_y(pll_loc.tile)
                );
            }
        }
    }

    // Greedy placement for the rest; GB_IO cannot be inferred.
    let mut n_pll = 0usize;
    let mut n_pll_placed = 0usize;
    let insts: Vec<InstanceId> = ds.design.model(ds.top).instances.iter().copied().collect();
    for inst in insts {
        if ds.placement.contains_key(&inst) {
            continue;
        }
        if ds.models.is_gb_io(&ds.design, inst) {
            fatal!("physical constraint required for GB_IO");
        }
        if !ds.models.is_pll(&ds.design, inst) {
            continue;
        }
        n_pll += 1;

        let mut placed = false;
        for &c in &chipdb.cell_type_cells[CellType::Pll.idx()] {
            if cell_gate[c].is_some() {
                continue;
            }
            let mut good = true;
            for io_cell in ds.pll_out_io_cells(inst, c)? {
                if let Some(io) = cell_gate[io_cell] {
                    if io_input_used(ds, io)? {
                        good = false;
                        break;
                    }
                }
            }
            if good {
                cell_gate[c] = Some(inst);
                ds.placement.insert(inst, c);
                ds.locked.insert(inst);
                n_pll_placed += 1;
                placed = true;
                break;
            }
        }
        if !placed {
            fatal!(
                "failed to place: placed {n_pll_placed} PLLs of {n_pll} / {}",
                chipdb.cell_type_cells[CellType::Pll.idx()].len()
            );
        }
    }

    Ok(())
}

/// The IO or PLL instance hanging off the named top-level port.
fn top_port_io_gate(ds: &DesignState, net_name: &str) -> Result<InstanceId> {
    let d = &ds.design;
    let Some(p) = d.find_port(NodeRef::Model(ds.top), net_name) else {
        fatal!("no port `{net_name}' in top-level module");
    };
    let Some(q) = d.connection_other_port(p) else {
        fatal!("port `{net_name}' is not attached to an IO cell");
    };
    let NodeRef::Instance(inst) = d.port(q).owner else {
        fatal!("port `{net_name}' is not attached to an IO cell");
    };
    if !ds.models.is_io_family(d, inst) && !ds.models.is_pll(d, inst) {
        fatal!("port `{net_name}' is not attached to an IO cell");
    }
    Ok(inst)
}

/// Whether an IO instance uses its input path (data inputs connected, or
/// a pin type other than simple registered output).
fn io_input_used(ds: &DesignState, io: InstanceId) -> Result<bool> {
    let d = &ds.design;
    let din0 = d.find_port(NodeRef::Instance(io), "D_IN_0").unwrap();
    let din1 = d.find_port(NodeRef::Instance(io), "D_IN_1").unwrap();
    let pin_type = d.get_param(io, "PIN_TYPE")?.as_bits()?.clone();
    Ok(d.port(din0).connection.is_some()
        || d.port(din1).connection.is_some()
        || !pin_type.get(0)
        || pin_type.get(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_blif::parse_blif;
    use floe_chipdb::{parse_chipdb, ChipDB, Package};
    use floe_common::RandomGenerator;
    use floe_diagnostics::LogSink;

    fn io_db() -> ChipDB {
        parse_chipdb(
            "tiny",
            ".device 1k 4 4 8\n\
             .pins tq144\n\
             1 1 0 0\n\
             2 1 0 1\n\
             3 2 0 0\n\
             .io_tile 1 0\n.io_tile 2 0\n.io_tile 0 1\n.io_tile 3 1\n\
             .logic_tile 1 1\n.logic_tile 2 1\n",
        )
        .unwrap()
    }

    fn state<'a>(db: &'a ChipDB, blif: &str, pcf: &str) -> Result<DesignState<'a>> {
        let mut d = parse_blif("t", blif).unwrap();
        floe_pack::instantiate_io(&mut d).unwrap();
        let sink = LogSink::capture();
        let mut chains = floe_pack::pack::CarryChains::new();
        floe_pack::pack(db, &mut d, &mut chains, &sink).unwrap();
        let package: &'a Package = &db.packages["tq144"];
        let constraints = floe_pcf::parse_pcf("t.pcf", pcf, &d, package, &sink)?;
        let mut ds = DesignState::new(db, package, d, RandomGenerator::new(1));
        ds.constraints = constraints;
        ds.chains = chains;
        Ok(ds)
    }

    const BUF_BLIF: &str = ".model top\n.inputs a\n.outputs y\n\
                            .gate SB_LUT4 O=y I0=a\n.param LUT_INIT 10\n.end\n";

    #[test]
    fn constrained_io_lands_on_pin() {
        let db = io_db();
        let mut ds = state(&db, BUF_BLIF, "set_io a 1\nset_io y 3\n").unwrap();
        place_constraints(&mut ds).unwrap();
        assert_eq!(ds.placement.len(), 2);
        for (&inst, &cell) in &ds.placement {
            assert!(ds.models.is_io(&ds.design, inst));
            assert!(ds.locked.contains(&inst));
            assert_eq!(db.cell_type[cell], CellType::Io);
        }
        let locs: Vec<Location> = ds.placement.values().map(|&c| db.cell_location[c]).collect();
        assert!(locs.contains(&Location::new(db.tile(1, 0), 0)));
        assert!(locs.contains(&Location::new(db.tile(2, 0), 0)));
    }

    #[test]
    fn unconstrained_design_places_nothing() {
        let db = io_db();
        let mut ds = state(&db, BUF_BLIF, "").unwrap();
        place_constraints(&mut ds).unwrap();
        assert!(ds.placement.is_empty());
    }

    #[test]
    fn lvds_outside_bank3_rejected() {
        let db = io_db();
        let blif = ".model top\n.inputs a\n.outputs y\n\
                    .gate SB_IO PACKAGE_PIN=a D_IN_0=t\n\
                    .param PIN_TYPE 000001\n.param IO_STANDARD \"SB_LVDS_INPUT\"\n\
                    .gate SB_LUT4 O=y I0=t\n.param LUT_INIT 10\n.end\n";
        // Pin 1 is at (1, 0): bank 2.
        let mut ds = state(&db, blif, "set_io a 1\n").unwrap();
        let err = place_constraints(&mut ds).unwrap_err();
        assert!(err.to_string().contains("not in bank 3"));
    }

    #[test]
    fn neg_trigger_mismatch_on_pio_pair_rejected() {
        let db = io_db();
        let blif = ".model top\n.inputs a b\n.outputs y\n\
                    .gate SB_IO PACKAGE_PIN=a D_IN_0=t\n\
                    .param PIN_TYPE 000001\n.param NEG_TRIGGER 1\n\
                    .gate SB_IO PACKAGE_PIN=b D_IN_0=u\n\
                    .param PIN_TYPE 000001\n.param NEG_TRIGGER 0\n\
                    .gate SB_LUT4 O=y I0=t I1=u\n.param LUT_INIT 1000\n.end\n";
        // Pins 1 and 2 are the PIO pair of tile (1, 0).
        let mut ds = state(&db, blif, "set_io a 1\nset_io b 2\n").unwrap();
        let err = place_constraints(&mut ds).unwrap_err();
        assert!(err.to_string().contains("incompatible NEG_TRIGGER"));
    }

    #[test]
    fn gb_io_requires_constraint() {
        let db = io_db();
        let blif = ".model top\n.inputs clk\n.outputs q\n\
                    .gate SB_GB_IO PACKAGE_PIN=clk GLOBAL_BUFFER_OUTPUT=g\n\
                    .param PIN_TYPE 000001\n\
                    .gate SB_DFF C=g D=g Q=q\n.end\n";
        let mut ds = state(&db, blif, "").unwrap();
        let err = place_constraints(&mut ds).unwrap_err();
        assert!(err
            .to_string()
            .contains("physical constraint required for GB_IO"));
    }
}
