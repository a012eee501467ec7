//! The mutable netlist the place-and-route pipeline rewrites.
//!
//! A [`Design`] owns models, instances, ports and nets in flat arenas keyed
//! by monotone ids; member sets are id-ordered, so every iteration follows
//! creation order. This ordering is load-bearing: it fixes random-number
//! consumption and tie-breaks, making the whole pipeline reproducible from
//! a seed.

pub mod constant;
pub mod design;
pub mod ids;
pub mod models;
pub mod write;

pub use constant::{Const, Value};
pub use design::{Design, Direction, Instance, Model, Net, NodeRef, Port};
pub use ids::{InstanceId, ModelId, NetId, PortId};
pub use models::Models;
