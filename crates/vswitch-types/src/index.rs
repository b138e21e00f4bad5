//! Slot identifiers for the VRF and global VIF index spaces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a VRF in the registry's fixed slot space.
///
/// Unique among live VRFs; released and reusable after destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VrfIndex(u32);

impl VrfIndex {
    pub const fn new(raw: u32) -> Self {
        VrfIndex(raw)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }

    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VrfIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for VrfIndex {
    fn from(raw: u32) -> Self {
        VrfIndex(raw)
    }
}

/// Index in the global VIF space.
///
/// Both VIFs and VRFs occupy slots here: a VRF's own slot identifies it
/// when it appears as an inter-VRF next hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VifIndex(u32);

impl VifIndex {
    pub const fn new(raw: u32) -> Self {
        VifIndex(raw)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VifIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for VifIndex {
    fn from(raw: u32) -> Self {
        VifIndex(raw)
    }
}
