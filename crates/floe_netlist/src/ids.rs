//! Opaque id newtypes for netlist entities.
//!
//! Ids are dense `u32` arena indices. They are totally ordered; ordered
//! containers of ids therefore iterate in creation order.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
        )]
        pub struct $name(u32);

        impl $name {
            /// Creates an id from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Id of a model (a cell type or the top module).
    ModelId
);

define_id!(
    /// Id of an instance of a model.
    InstanceId
);

define_id!(
    /// Id of a port on a model or instance.
    PortId
);

define_id!(
    /// Id of a net within a model.
    NetId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn roundtrip() {
        assert_eq!(NetId::from_raw(7).as_raw(), 7);
        assert_eq!(InstanceId::from_raw(0).as_raw(), 0);
    }

    #[test]
    fn ordering_follows_creation() {
        let mut s = BTreeSet::new();
        s.insert(PortId::from_raw(5));
        s.insert(PortId::from_raw(1));
        s.insert(PortId::from_raw(3));
        let order: Vec<u32> = s.iter().map(|p| p.as_raw()).collect();
        assert_eq!(order, vec![1, 3, 5]);
    }

    #[test]
    fn display_is_raw_index() {
        assert_eq!(ModelId::from_raw(12).to_string(), "12");
    }

    #[test]
    fn serde_roundtrip() {
        let id = NetId::from_raw(33);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(serde_json::from_str::<NetId>(&json).unwrap(), id);
    }
}
