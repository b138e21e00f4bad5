//! Validated VRF name.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::ParseError;

static VRF_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^vrf\d+$").expect("valid regex"));

/// A VRF name, validated against the `vrf<digits>` pattern at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VrfName(String);

impl VrfName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for VrfName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if VRF_NAME_RE.is_match(s) {
            Ok(VrfName(s.to_string()))
        } else {
            Err(ParseError::InvalidVrfName(s.to_string()))
        }
    }
}

impl fmt::Display for VrfName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for VrfName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
