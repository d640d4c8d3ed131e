//! Backend contract.
//!
//! A backend is any process the engine can regulate. The run loop drives it in
//! a fixed order each tick:
//!
//! ```text
//! observe() -> engine.step(ΔN, ΔD) -> apply_controls(controls) -> step()
//! ```
//!
//! until a returned metrics record reports `done`.

use std::collections::BTreeMap;

use dn_engine::Controls;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a backend exposes to the engine before each tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    /// Distance from goal, intended in [0, 1].
    #[serde(rename = "deltaN")]
    pub delta_n: f64,
    /// Diversity pressure, intended in [0, 1].
    #[serde(rename = "deltaD")]
    pub delta_d: f64,
    /// Domain-specific readings, for logging only.
    #[serde(flatten)]
    pub extras: BTreeMap<&'static str, f64>,
}

impl Observation {
    #[must_use]
    pub fn new(delta_n: f64, delta_d: f64) -> Self {
        Self {
            delta_n,
            delta_d,
            extras: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, key: &'static str, value: f64) -> Self {
        self.extras.insert(key, value);
        self
    }
}

/// Whether a backend listens to engine controls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Controls adjust the backend's knobs.
    #[default]
    Regulated,
    /// Controls are ignored; knobs stay at their initial values.
    Baseline,
}

impl ControlMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regulated => "dn",
            Self::Baseline => "baseline",
        }
    }

    /// Accepts `dn`/`regulated` and `baseline`/`off`, case-insensitively.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dn" | "regulated" | "on" => Some(Self::Regulated),
            "baseline" | "off" | "none" => Some(Self::Baseline),
            _ => None,
        }
    }

    #[must_use]
    pub const fn listens(self) -> bool {
        matches!(self, Self::Regulated)
    }
}

/// Per-tick metrics every backend must report.
pub trait TickMetrics: Clone + Serialize {
    /// 1-based tick index.
    fn tick(&self) -> u32;
    /// True once the backend has finished.
    fn done(&self) -> bool;
    /// ΔN observed before the tick ran.
    fn delta_n(&self) -> f64;
    /// ΔD observed before the tick ran.
    fn delta_d(&self) -> f64;
    /// Cumulative work spent so far (model calls, nodes expanded, ...).
    fn cost(&self) -> u64;
}

/// A process the engine can regulate.
pub trait Backend {
    type Metrics: TickMetrics;

    /// Short identifier used in logs and reports.
    fn name(&self) -> &'static str;

    /// Whether [`Backend::apply_controls`] has any effect.
    fn control(&self) -> ControlMode;

    /// Reinitialize every counter and the backend's RNG from `seed`.
    fn reset(&mut self, seed: u64);

    fn observe(&self) -> Observation;

    /// Adjust internal knobs from engine controls. No-op in
    /// [`ControlMode::Baseline`].
    fn apply_controls(&mut self, controls: &Controls);

    /// Advance exactly one tick and record its metrics.
    fn step(&mut self) -> Self::Metrics;

    /// Metrics recorded since the last [`Backend::reset`], in tick order.
    fn get_logs(&self) -> &[Self::Metrics];
}

/// Signed knob adjustment: `round(up * explore - down * exploit)`.
///
/// Ties round to even so that a residual of exactly ±0.5 leaves the knob alone.
#[must_use]
pub fn knob_delta(controls: &Controls, up: f64, down: f64) -> i64 {
    (up * controls.explore - down * controls.exploit).round_ties_even() as i64
}

/// Add `delta` to `value` and clamp into `[lo, hi]`.
///
/// Total for every input: with `lo > hi` the upper bound wins.
#[must_use]
pub fn nudge(value: u32, delta: i64, lo: u32, hi: u32) -> u32 {
    let moved = i64::from(value).saturating_add(delta);
    moved.max(i64::from(lo)).min(i64::from(hi)) as u32
}

/// Rejected backend parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamsError {
    #[error("knob `{knob}` has min {min} above max {max}")]
    InvertedRange {
        knob: &'static str,
        min: u32,
        max: u32,
    },
    #[error("knob `{knob}` starts at {init}, outside [{min}, {max}]")]
    InitOutOfRange {
        knob: &'static str,
        init: u32,
        min: u32,
        max: u32,
    },
    #[error("`{name}` must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },
}

/// Check that a knob's bounds are ordered and its start lies inside them.
pub fn check_knob(knob: &'static str, init: u32, min: u32, max: u32) -> Result<(), ParamsError> {
    if min > max {
        return Err(ParamsError::InvertedRange { knob, min, max });
    }
    if !(min..=max).contains(&init) {
        return Err(ParamsError::InitOutOfRange {
            knob,
            init,
            min,
            max,
        });
    }
    Ok(())
}

/// Fraction of the knob range in use: `(v - lo) / max(hi - lo, 1)`.
#[must_use]
pub fn knob_fraction(value: u32, lo: u32, hi: u32) -> f64 {
    f64::from(value.saturating_sub(lo)) / f64::from(hi.saturating_sub(lo).max(1))
}
