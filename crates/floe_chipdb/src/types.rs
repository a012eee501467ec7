//! Plain data types of the device database.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What a grid tile is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TileType {
    /// No fabric at this grid position.
    Empty,
    /// IO tile: a PIO pair plus optional GB/PLL sub-cells.
    Io,
    /// Logic tile: eight logic cells.
    Logic,
    /// Block-RAM bottom half.
    Ramb,
    /// Block-RAM top half (hosts the RAM cell).
    Ramt,
}

impl TileType {
    /// The `.foo_tile` name used in the chipdb and bitstream text formats.
    pub fn name(self) -> &'static str {
        match self {
            TileType::Empty => "no_tile",
            TileType::Io => "io_tile",
            TileType::Logic => "logic_tile",
            TileType::Ramb => "ramb_tile",
            TileType::Ramt => "ramt_tile",
        }
    }
}

/// The kind of physical cell a site can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum CellType {
    /// A logic cell (LUT + flip-flop + carry).
    #[default]
    Logic,
    /// A PIO.
    Io,
    /// A global buffer input site.
    Gb,
    /// The warmboot controller.
    Warmboot,
    /// A PLL.
    Pll,
    /// A 4K block RAM.
    Ram,
    /// An I3C-capable PIO.
    IoI3c,
    /// A 16x16 multiply-accumulate block.
    Mac16,
    /// A 256Kbit single-port RAM.
    Spram,
    /// The high-frequency oscillator.
    Hfosc,
    /// The low-frequency oscillator.
    Lfosc,
    /// The RGB LED driver.
    RgbaDrv,
    /// The LED PWM IP.
    LeddaIp,
    /// The hard I2C IP.
    I2cIp,
    /// The hard SPI IP.
    SpiIp,
}

impl CellType {
    /// Every cell type, in index order.
    pub const ALL: [CellType; 15] = [
        CellType::Logic,
        CellType::Io,
        CellType::Gb,
        CellType::Warmboot,
        CellType::Pll,
        CellType::Ram,
        CellType::IoI3c,
        CellType::Mac16,
        CellType::Spram,
        CellType::Hfosc,
        CellType::Lfosc,
        CellType::RgbaDrv,
        CellType::LeddaIp,
        CellType::I2cIp,
        CellType::SpiIp,
    ];

    /// Dense index for per-type tables.
    pub fn idx(self) -> usize {
        Self::ALL.iter().position(|&t| t == self).unwrap()
    }

    /// Display name used in capacity error messages.
    pub fn name(self) -> &'static str {
        match self {
            CellType::Logic => "LC",
            CellType::Io => "IO",
            CellType::Gb => "GB",
            CellType::Warmboot => "WARMBOOT",
            CellType::Pll => "PLL",
            CellType::Ram => "BRAM",
            CellType::IoI3c => "IO_I3C",
            CellType::Mac16 => "MAC16",
            CellType::Spram => "SPRAM",
            CellType::Hfosc => "HFOSC",
            CellType::Lfosc => "LFOSC",
            CellType::RgbaDrv => "RGBA_DRV",
            CellType::LeddaIp => "LEDDA_IP",
            CellType::I2cIp => "I2C",
            CellType::SpiIp => "SPI",
        }
    }

    /// Maps an `.extra_cell` name to its cell type.
    pub fn from_extra_name(name: &str) -> Option<CellType> {
        Some(match name {
            "PLL" => CellType::Pll,
            "WARMBOOT" => CellType::Warmboot,
            "MAC16" => CellType::Mac16,
            "SPRAM" => CellType::Spram,
            "HFOSC" => CellType::Hfosc,
            "LFOSC" => CellType::Lfosc,
            "RGBA_DRV" => CellType::RgbaDrv,
            "LEDDA_IP" => CellType::LeddaIp,
            "I2C" | "I2C_IP" => CellType::I2cIp,
            "SPI" | "SPI_IP" => CellType::SpiIp,
            "IO_I3C" => CellType::IoI3c,
            _ => return None,
        })
    }
}

/// A cell site: a tile index plus a small in-tile position.
///
/// Positions 0-7 are logic cells, 0-1 the PIO pair; position 2 holds a
/// tile's GB site, 3 its PLL site, and synthesized auxiliary cells follow.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Location {
    /// Tile index (`x + width*y`).
    pub tile: usize,
    /// In-tile position.
    pub pos: usize,
}

impl Location {
    /// Creates a location.
    pub fn new(tile: usize, pos: usize) -> Self {
        Self { tile, pos }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tile, self.pos)
    }
}

/// A configuration-bit coordinate within a tile's bit block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BitCoord {
    /// Block row.
    pub row: usize,
    /// Block column.
    pub col: usize,
}

impl fmt::Display for BitCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}[{}]", self.row, self.col)
    }
}

/// A configurable junction: driving `out` from one of the `in_val` nets
/// sets the listed configuration bits to that net's pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Switch {
    /// `.routing` switches are bidirectional, `.buffer` switches are not.
    pub bidir: bool,
    /// Tile the configuration bits live in.
    pub tile: usize,
    /// The driven chip-net.
    pub out: usize,
    /// Input chip-net to bit pattern (one bool per entry of `cbits`).
    pub in_val: BTreeMap<usize, Vec<bool>>,
    /// The configuration bits, in pattern order.
    pub cbits: Vec<BitCoord>,
}

/// A package: the pin name to site maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package name (e.g. `tq144`).
    pub name: String,
    /// Pin name to PIO location.
    pub pin_loc: BTreeMap<String, Location>,
    /// PIO location to pin name.
    pub loc_pin: BTreeMap<Location, String>,
}

/// An `.extra_cell` block as parsed: a named hard cell and its
/// per-function `(tile, value)` lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraCell {
    /// Cell kind name (`PLL`, `WARMBOOT`, ...).
    pub name: String,
    /// Home tile.
    pub tile: usize,
    /// Function name to `(tile, value)`; the value is a tile-net name, an
    /// in-tile position, or a global index depending on the function.
    pub mfvs: BTreeMap<String, (usize, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_type_names() {
        assert_eq!(TileType::Io.name(), "io_tile");
        assert_eq!(TileType::Ramt.name(), "ramt_tile");
    }

    #[test]
    fn cell_type_indices_are_dense() {
        for (i, t) in CellType::ALL.iter().enumerate() {
            assert_eq!(t.idx(), i);
        }
    }

    #[test]
    fn extra_cell_names_map() {
        assert_eq!(CellType::from_extra_name("PLL"), Some(CellType::Pll));
        assert_eq!(
            CellType::from_extra_name("WARMBOOT"),
            Some(CellType::Warmboot)
        );
        assert_eq!(CellType::from_extra_name("NOPE"), None);
    }

    #[test]
    fn location_ordering_is_tile_then_pos() {
        let a = Location::new(3, 1);
        let b = Location::new(3, 2);
        let c = Location::new(4, 0);
        assert!(a < b && b < c);
    }

    #[test]
    fn bitcoord_display() {
        let cb = BitCoord { row: 3, col: 17 };
        assert_eq!(cb.to_string(), "B3[17]");
    }

    #[test]
    fn location_serde_roundtrip() {
        let loc = Location::new(42, 7);
        let json = serde_json::to_string(&loc).unwrap();
        assert_eq!(serde_json::from_str::<Location>(&json).unwrap(), loc);
    }
}
