//! Strongly-typed identifiers used across the compiler.
//!
//! Downstream crates should *not* use raw integers for node or party ids.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! new_id {
    ($name:ident, $prefix:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

// Arena slot of an operator node inside one `OpDag`. Ids are never reused.
new_id!(NodeId, "#");
// A participant in the workflow.
new_id!(PartyId, "p");

impl NodeId {
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes() {
        assert_eq!(NodeId::new(4).to_string(), "#4");
        assert_eq!(PartyId::from(2).to_string(), "p2");
    }

    #[test]
    fn ids_serialize_as_bare_numbers() {
        assert_eq!(serde_json::to_string(&PartyId::new(7)).unwrap(), "7");
    }
}
