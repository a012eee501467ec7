//! Device database for iCE40-class FPGAs.
//!
//! An immutable description of one chip: the tile grid, the enumerated
//! physical cells, the switch graph over chip-nets, configuration-bit
//! coordinates, package pin maps, global-network pins and column-buffer
//! relations. Loaded from the text chipdb format or the binary form, then
//! finalized into the derived lookup tables the placer and router use.

pub mod binary;
pub mod db;
pub mod text;
pub mod types;

pub use binary::{read_binary_chipdb, write_binary_chipdb};
pub use db::ChipDB;
pub use text::{parse_chipdb, read_chipdb};
pub use types::{BitCoord, CellType, ExtraCell, Location, Package, Switch, TileType};
