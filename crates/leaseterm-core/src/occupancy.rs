//! Occupation of rentable units by a lease.
//!
//! Every unit has its own timeline. Occupancies of one unit never overlap
//! but may leave vacancies between them.

use serde::{Deserialize, Serialize};

use crate::chain::ChainMember;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    /// Reference of the occupied unit
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

impl Occupancy {
    pub fn new(unit: impl Into<String>) -> Self {
        Occupancy {
            unit: unit.into(),
            brand: None,
        }
    }
}

impl ChainMember for Occupancy {
    type Group = String;
    const CONTIGUOUS: bool = false;

    fn group(&self) -> String {
        self.unit.clone()
    }
}
