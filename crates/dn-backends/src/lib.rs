//! Backends for the DN regulation engine.
//!
//! A backend turns a domain process into the two normalized signals the
//! engine reads, and turns engine controls back into domain knobs. This crate
//! holds the contract ([`Backend`], [`TickMetrics`]), two toy simulators used
//! to exercise the loop, and distribution helpers for building ΔD.

pub mod contract;
pub mod decoding;
pub mod search_stress;
pub mod signals;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use contract::{Backend, ControlMode, Observation, ParamsError, TickMetrics};
pub use decoding::{DecodingBackend, DecodingMetrics, DecodingParams};
pub use search_stress::{SearchMetrics, SearchParams, SearchStressBackend};
pub use signals::{SignalError, entropy_normalized, normalized_kl};

/// The built-in toy backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Decoding,
    Search,
}

impl BackendKind {
    pub const ALL: [Self; 2] = [Self::Decoding, Self::Search];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decoding => "decoding",
            Self::Search => "search",
        }
    }

    /// Loop cap used when a caller does not pick one.
    #[must_use]
    pub const fn default_max_iter(self) -> u32 {
        match self {
            Self::Decoding => 200,
            Self::Search => 400,
        }
    }

    /// Accepts the canonical names plus a few aliases, case-insensitively.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "decoding" | "decode" | "beam" => Some(Self::Decoding),
            "search" | "search_stress" | "search-stress" => Some(Self::Search),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_loose(s).ok_or_else(|| format!("unknown backend `{s}` (decoding|search)"))
    }
}
