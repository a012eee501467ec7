//! Place and route for iCE40-class devices.
//!
//! The pipeline mutates a shared [`DesignState`]: constraint placement
//! binds pin-constrained IO and PLL cells, global promotion moves
//! high-fanout control nets onto the dedicated global networks, the
//! annealing placer assigns every remaining instance to a physical cell,
//! and the negotiated-congestion router occupies the switch graph and
//! deposits the configuration bits.

pub mod constrain;
pub mod global;
pub mod placement;
pub mod routing;
pub mod state;

pub use constrain::place_constraints;
pub use global::promote_globals;
pub use placement::{loc_from_placement, place, placement_from_loc, PlaceOptions};
pub use routing::route;
pub use state::DesignState;
