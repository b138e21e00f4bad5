//! Security association and policy databases backing a VRF's IPsec
//! state.

use std::fmt;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};

use vswitch_types::FiveTuple;

/// One security association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityAssociation {
    pub spi: u32,
    pub src: IpAddr,
    pub dst: IpAddr,
}

impl fmt::Display for SecurityAssociation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SA spi={} {} -> {}", self.spi, self.src, self.dst)
    }
}

/// One security policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityPolicy {
    pub policy_id: u32,
    pub selector: FiveTuple,
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SP id={}", self.policy_id)
    }
}

/// The SAD/SPD pair owned by one VRF.
///
/// Created on first access through [`Vrf::sadb`](crate::Vrf::sadb) and
/// shared with the key-exchange path afterwards.
#[derive(Debug, Default)]
pub struct SaDatabases {
    sad: Mutex<Vec<SecurityAssociation>>,
    spd: Mutex<Vec<SecurityPolicy>>,
}

impl SaDatabases {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn add_sa(&self, sa: SecurityAssociation) {
        self.sad
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sa);
    }

    pub fn add_sp(&self, sp: SecurityPolicy) {
        self.spd
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sp);
    }

    /// Snapshot of the security association database.
    pub fn sad(&self) -> Vec<SecurityAssociation> {
        self.sad
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the security policy database.
    pub fn spd(&self) -> Vec<SecurityPolicy> {
        self.spd
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
