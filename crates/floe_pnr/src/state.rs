//! Shared state of the place-and-route pipeline.

use floe_bitstream::Configuration;
use floe_chipdb::{CellType, ChipDB, Location, Package};
use floe_common::{fatal, RandomGenerator, Result};
use floe_netlist::{Design, InstanceId, Models, ModelId, NetId};
use floe_pack::pack::CarryChains;
use floe_pcf::Constraints;
use std::collections::{BTreeMap, BTreeSet};

/// Everything the pipeline stages share: the device, the mutable netlist,
/// and the accumulated placement and configuration.
pub struct DesignState<'a> {
    /// The device database.
    pub chipdb: &'a ChipDB,
    /// The selected package.
    pub package: &'a Package,
    /// The seeded random generator driving placement.
    pub rg: RandomGenerator,
    /// The netlist under transformation.
    pub design: Design,
    /// Standard model ids.
    pub models: Models,
    /// The top model.
    pub top: ModelId,
    /// Pin constraints from the PCF.
    pub constraints: Constraints,
    /// Carry chains built by packing.
    pub chains: CarryChains,
    /// Instances pinned to their placement (constraints, PLL plumbing).
    pub locked: BTreeSet<InstanceId>,
    /// Instance to cell id.
    pub placement: BTreeMap<InstanceId, usize>,
    /// Global-buffer instances' permitted global-network masks.
    pub gb_inst_gc: BTreeMap<InstanceId, u8>,
    /// Chip-net to routed design net, filled by the router.
    pub cnet_net: Vec<Option<NetId>>,
    /// The configuration-bit accumulator.
    pub conf: Configuration,
}

impl<'a> DesignState<'a> {
    /// Creates the pipeline state around a parsed design.
    pub fn new(
        chipdb: &'a ChipDB,
        package: &'a Package,
        design: Design,
        rg: RandomGenerator,
    ) -> Self {
        let models = Models::new(&design);
        let top = design.top();
        Self {
            chipdb,
            package,
            rg,
            design,
            models,
            top,
            constraints: Constraints::default(),
            chains: CarryChains::new(),
            locked: BTreeSet::new(),
            placement: BTreeMap::new(),
            gb_inst_gc: BTreeMap::new(),
            cnet_net: Vec::new(),
            conf: Configuration::new(),
        }
    }

    /// The IO cells a PLL's outputs pass through: `PLLOUT_A`, plus
    /// `PLLOUT_B` for dual-output flavors.
    pub fn pll_out_io_cells(&self, inst: InstanceId, cell: usize) -> Result<Vec<usize>> {
        debug_assert!(self.models.is_pll(&self.design, inst));
        debug_assert_eq!(self.chipdb.cell_type[cell], CellType::Pll);

        let mfvs = match self.chipdb.cell_mfvs.get(&cell) {
            Some(m) => m,
            None => fatal!("PLL cell {cell} has no function table"),
        };
        let mut out = Vec::with_capacity(2);
        for fn_name in ["PLLOUT_A", "PLLOUT_B"] {
            if fn_name == "PLLOUT_B" && !self.models.is_dual_pll(&self.design, inst) {
                break;
            }
            let Some((t, pos_str)) = mfvs.get(fn_name) else {
                fatal!("PLL cell {cell} has no `{fn_name}' function");
            };
            let Ok(pos) = pos_str.parse::<usize>() else {
                fatal!("PLL `{fn_name}' does not name an IO position");
            };
            let io_cell = self.chipdb.loc_cell(Location::new(*t, pos));
            if io_cell == 0 {
                fatal!("PLL `{fn_name}' names an empty site");
            }
            out.push(io_cell);
        }
        Ok(out)
    }
}
