//! # Bifurcation Gate
//!
//! Regime switch over the observation pair (ΔN, ΔD): ON while the process is
//! far from its goal (ΔN high) yet diversity pressure is still low (ΔD low).
//!
//! Entry and exit use separate thresholds (a Schmitt trigger), so an input
//! hovering near a raw threshold cannot make the regime flicker:
//!
//! ```text
//! OFF -> ON   when  ΔN >= n_crit             AND  ΔD <= d_bif
//! ON  -> OFF  when  ΔN <  n_crit - hysteresis OR  ΔD >  d_bif + hysteresis
//! ```
//!
//! Anything between the two bands keeps the current state.

use serde::{Deserialize, Serialize};

use crate::config::BifurcationParams;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum GateState {
    #[default]
    Off = 0,
    On = 1,
}

impl GateState {
    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Two-threshold hysteretic switch.
#[derive(Debug, Clone)]
pub struct BifurcationGate {
    /// ΔN threshold, taken from the drift law at construction.
    delta_n_crit: f64,
    params: BifurcationParams,
    state: GateState,
    /// OFF -> ON transitions seen.
    entries: u32,
    /// ON -> OFF transitions seen.
    exits: u32,
}

impl BifurcationGate {
    /// New gate in the OFF state.
    #[must_use]
    pub fn new(delta_n_crit: f64, params: BifurcationParams) -> Self {
        Self::with_state(delta_n_crit, params, GateState::Off)
    }

    /// New gate starting in `state`.
    #[must_use]
    pub fn with_state(delta_n_crit: f64, params: BifurcationParams, state: GateState) -> Self {
        Self {
            delta_n_crit,
            params,
            state,
            entries: 0,
            exits: 0,
        }
    }

    /// Evaluate the guard for the current state, apply at most one
    /// transition, and return whether the gate is ON.
    pub fn update(&mut self, delta_n: f64, delta_d: f64) -> bool {
        match self.state {
            GateState::Off => {
                if delta_n >= self.delta_n_crit && delta_d <= self.params.delta_d_bif {
                    self.state = GateState::On;
                    self.entries = self.entries.saturating_add(1);
                }
            }
            GateState::On => {
                if delta_n < self.exit_delta_n() || delta_d > self.exit_delta_d() {
                    self.state = GateState::Off;
                    self.exits = self.exits.saturating_add(1);
                }
            }
        }
        self.state.is_on()
    }

    /// ΔN below which an ON gate exits.
    #[must_use]
    pub fn exit_delta_n(&self) -> f64 {
        self.delta_n_crit - self.params.hysteresis
    }

    /// ΔD above which an ON gate exits.
    #[must_use]
    pub fn exit_delta_d(&self) -> f64 {
        self.params.delta_d_bif + self.params.hysteresis
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_on(&self) -> bool {
        self.state.is_on()
    }

    pub fn delta_n_crit(&self) -> f64 {
        self.delta_n_crit
    }

    pub fn entries(&self) -> u32 {
        self.entries
    }

    pub fn exits(&self) -> u32 {
        self.exits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BifurcationParams {
        BifurcationParams {
            delta_d_bif: 0.25,
            hysteresis: 0.05,
        }
    }

    fn on_gate() -> BifurcationGate {
        BifurcationGate::with_state(0.6, params(), GateState::On)
    }

    #[test]
    fn starts_off() {
        let g = BifurcationGate::new(0.6, params());
        assert_eq!(g.state(), GateState::Off);
        assert!(!g.is_on());
    }

    #[test]
    fn enters_on_high_n_low_d() {
        let mut g = BifurcationGate::new(0.6, params());
        assert!(g.update(0.99, 0.01));
        assert_eq!(g.entries(), 1);
    }

    #[test]
    fn entry_thresholds_are_inclusive() {
        let mut g = BifurcationGate::new(0.6, params());
        assert!(g.update(0.6, 0.25));
    }

    #[test]
    fn no_entry_when_d_too_high() {
        let mut g = BifurcationGate::new(0.6, params());
        assert!(!g.update(0.99, 0.26));
        assert!(!g.update(0.59, 0.0));
        assert_eq!(g.entries(), 0);
    }

    #[test]
    fn stays_on_inside_hysteresis_band() {
        let mut g = on_gate();
        assert!(g.update(0.58, 0.26));
        assert!(g.update(0.555, 0.295));
        assert_eq!(g.exits(), 0);
    }

    #[test]
    fn exits_when_n_drops_below_band() {
        let mut g = on_gate();
        assert!(!g.update(0.50, 0.26));
        assert_eq!(g.exits(), 1);
    }

    #[test]
    fn exits_when_d_rises_above_band() {
        let mut g = on_gate();
        assert!(!g.update(0.9, 0.31));
    }

    #[test]
    fn off_gate_holds_inside_band() {
        // The band only matters on the way out: an OFF gate fed band values
        // does not switch on.
        let mut g = BifurcationGate::new(0.6, params());
        assert!(!g.update(0.58, 0.26));
    }

    #[test]
    fn no_flicker_on_oscillating_input() {
        let mut g = BifurcationGate::new(0.6, params());
        assert!(g.update(0.62, 0.2));
        for i in 0..200 {
            let dn = if i % 2 == 0 { 0.59 } else { 0.61 };
            assert!(g.update(dn, 0.24), "flipped off at iteration {i}");
        }
        assert_eq!(g.entries(), 1);
        assert_eq!(g.exits(), 0);
    }

    #[test]
    fn at_most_one_transition_per_update() {
        // An input that satisfies the exit guard and the entry guard at once
        // is impossible with hysteresis >= 0, but a single update must still
        // only move one step from ON.
        let mut g = on_gate();
        assert!(!g.update(0.0, 1.0));
        assert_eq!(g.state(), GateState::Off);
        assert_eq!(g.entries(), 0);
    }

    #[test]
    fn exit_thresholds_reported() {
        let g = on_gate();
        assert!((g.exit_delta_n() - 0.55).abs() < 1e-12);
        assert!((g.exit_delta_d() - 0.30).abs() < 1e-12);
        assert_eq!(g.delta_n_crit(), 0.6);
    }
}
