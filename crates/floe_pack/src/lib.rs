//! Packing: from technology-mapped primitives to placed-and-routable LCs.
//!
//! Three passes run between reading and placement:
//! 1. [`instantiate_io`] wraps bare top-level ports in `SB_IO` cells.
//! 2. [`pack`] fuses LUTs, flip-flops and carries into `ICESTORM_LC`
//!    instances and materializes carry chains.
//! 3. [`realize_constants`] drives remaining constant inputs from
//!    synthesized constant LCs.

pub mod constants;
pub mod io;
pub mod pack;

pub use constants::realize_constants;
pub use io::instantiate_io;
pub use pack::pack;
