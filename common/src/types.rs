//! Common Types for the Radio Link Control Workspace
//! 
//! Defines the identifiers used to name a radio bearer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }
    
    /// Get the RNTI value
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Logical Channel Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lcid(pub u8);

impl Lcid {
    /// Highest LCID usable by a dedicated logical channel (TS 38.321 Table 6.2.1-1)
    pub const MAX: u8 = 32;
    
    /// Create a new LCID with validation
    pub fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }
}

/// Direction of a radio link, seen from the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDirection {
    /// gNodeB towards UE
    #[default]
    Downlink,
    /// UE towards gNodeB
    Uplink,
}

impl LinkDirection {
    /// The opposite direction
    pub fn reverse(&self) -> Self {
        match self {
            LinkDirection::Downlink => LinkDirection::Uplink,
            LinkDirection::Uplink => LinkDirection::Downlink,
        }
    }
}

impl fmt::Display for LinkDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkDirection::Downlink => write!(f, "DL"),
            LinkDirection::Uplink => write!(f, "UL"),
        }
    }
}

/// Identity of one radio bearer: the UE it belongs to and its logical channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BearerId {
    /// UE the bearer belongs to
    pub rnti: Rnti,
    /// Logical channel carrying the bearer
    pub lcid: Lcid,
}

impl BearerId {
    /// Create a new bearer identity
    pub fn new(rnti: Rnti, lcid: Lcid) -> Self {
        Self { rnti, lcid }
    }
}

impl fmt::Display for BearerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rnti={:#06x} lcid={}", self.rnti.0, self.lcid.0)
    }
}
