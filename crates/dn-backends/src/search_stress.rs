//! Toy search stress backend.
//!
//! Emulates combinatorial explosion with a branching process. Each tick
//! expands `branch` nodes; a narrow branching factor makes steady progress,
//! a wide one makes slow progress with rare large jumps. Stalls under wide
//! branching feed an internal duality signal.
//!
//! - ΔN = 1 - progress / target
//! - ΔD = 0.6 · (branch fraction) + 0.4 · duality
//! - cost = cumulative nodes expanded
//!
//! In baseline mode `branch` stays at `base_branch`.

use dn_engine::{Controls, clamp01};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::contract::{
    Backend, ControlMode, Observation, ParamsError, TickMetrics, check_knob, knob_delta,
    knob_fraction, nudge,
};

const JUMP_PROBABILITY: f64 = 0.15;
const STAGNATION_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub max_steps: u32,
    /// Initial branching factor (and the fixed one in baseline mode).
    pub base_branch: u32,
    pub branch_min: u32,
    pub branch_max: u32,
    pub target_progress: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_steps: 80,
            base_branch: 14,
            branch_min: 1,
            branch_max: 20,
            target_progress: 1.0,
        }
    }
}

impl SearchParams {
    /// Reject inverted knob bounds, a start value outside them, or a
    /// non-finite target.
    pub fn validate(&self) -> Result<(), ParamsError> {
        check_knob("branch", self.base_branch, self.branch_min, self.branch_max)?;
        if !self.target_progress.is_finite() {
            return Err(ParamsError::NonFinite {
                name: "target_progress",
                value: self.target_progress,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMetrics {
    pub t: u32,
    pub done: bool,
    pub nodes_expanded: u64,
    pub progress: f64,
    pub branch: u32,
    #[serde(rename = "deltaN")]
    pub delta_n: f64,
    #[serde(rename = "deltaD")]
    pub delta_d: f64,
}

impl TickMetrics for SearchMetrics {
    fn tick(&self) -> u32 {
        self.t
    }

    fn done(&self) -> bool {
        self.done
    }

    fn delta_n(&self) -> f64 {
        self.delta_n
    }

    fn delta_d(&self) -> f64 {
        self.delta_d
    }

    fn cost(&self) -> u64 {
        self.nodes_expanded
    }
}

pub struct SearchStressBackend {
    params: SearchParams,
    control: ControlMode,
    rng: ChaCha8Rng,
    t: u32,
    progress: f64,
    branch: u32,
    nodes_expanded: u64,
    duality: f64,
    logs: Vec<SearchMetrics>,
}

impl SearchStressBackend {
    /// New backend, already reset with seed 0.
    pub fn new(params: SearchParams, control: ControlMode) -> Result<Self, ParamsError> {
        params.validate()?;
        Ok(Self::build(params, control))
    }

    fn build(params: SearchParams, control: ControlMode) -> Self {
        let mut backend = Self {
            params,
            control,
            rng: ChaCha8Rng::seed_from_u64(0),
            t: 0,
            progress: 0.0,
            branch: params.base_branch,
            nodes_expanded: 0,
            duality: 0.0,
            logs: Vec::new(),
        };
        backend.reset(0);
        backend
    }

    pub fn branch(&self) -> u32 {
        self.branch
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    fn branch_fraction(&self) -> f64 {
        knob_fraction(self.branch, self.params.branch_min, self.params.branch_max)
    }
}

impl Default for SearchStressBackend {
    fn default() -> Self {
        Self::build(SearchParams::default(), ControlMode::Regulated)
    }
}

impl Backend for SearchStressBackend {
    type Metrics = SearchMetrics;

    fn name(&self) -> &'static str {
        "search"
    }

    fn control(&self) -> ControlMode {
        self.control
    }

    fn reset(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.t = 0;
        self.progress = 0.0;
        self.branch = self.params.base_branch;
        self.nodes_expanded = 0;
        self.duality = 0.0;
        self.logs.clear();
    }

    fn observe(&self) -> Observation {
        let delta_n = clamp01(1.0 - self.progress / self.params.target_progress.max(1e-9));
        let delta_d = clamp01(0.6 * self.branch_fraction() + 0.4 * self.duality);
        Observation::new(delta_n, delta_d)
            .with_extra("branch", f64::from(self.branch))
            .with_extra("progress", self.progress)
    }

    fn apply_controls(&mut self, controls: &Controls) {
        if !self.control.listens() {
            return;
        }
        let delta = knob_delta(controls, 5.0, 4.0);
        self.branch = nudge(
            self.branch,
            delta,
            self.params.branch_min,
            self.params.branch_max,
        );
    }

    fn step(&mut self) -> SearchMetrics {
        let obs = self.observe();

        self.nodes_expanded = self.nodes_expanded.saturating_add(u64::from(self.branch));

        let explore_factor = self.branch_fraction();
        let exploit_factor = 1.0 - explore_factor;

        let base = 0.01 + 0.03 * exploit_factor;
        let jump = if self.rng.gen_bool(JUMP_PROBABILITY) {
            0.05 * explore_factor
        } else {
            0.0
        };
        let z: f64 = self.rng.sample(StandardNormal);
        let noise = 0.005 * z;

        let dprog = (base + jump + noise).max(0.0);
        self.progress = (self.progress + dprog).min(self.params.target_progress);

        let stagnation = if dprog < STAGNATION_THRESHOLD { 1.0 } else { 0.0 };
        self.duality = clamp01(0.85 * self.duality + 0.2 * explore_factor * stagnation);

        self.t += 1;
        let done = self.progress >= self.params.target_progress || self.t >= self.params.max_steps;

        let metrics = SearchMetrics {
            t: self.t,
            done,
            nodes_expanded: self.nodes_expanded,
            progress: self.progress,
            branch: self.branch,
            delta_n: obs.delta_n,
            delta_d: obs.delta_d,
        };
        self.logs.push(metrics.clone());
        metrics
    }

    fn get_logs(&self) -> &[SearchMetrics] {
        &self.logs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dn_engine::Regime;

    fn exploit_all() -> Controls {
        Controls {
            mode: Regime::Normal,
            explore: 0.0,
            exploit: 1.0,
            dsdt_target: 1.0,
        }
    }

    #[test]
    fn initial_observation() {
        let b = SearchStressBackend::default();
        let obs = b.observe();
        assert_eq!(obs.delta_n, 1.0);
        // 0.6 * 13/19
        assert!((obs.delta_d - 0.6 * 13.0 / 19.0).abs() < 1e-12);
        assert_eq!(obs.extras["branch"], 14.0);
    }

    #[test]
    fn exploit_narrows_branching() {
        let mut b = SearchStressBackend::default();
        b.apply_controls(&exploit_all());
        assert_eq!(b.branch(), 10);
        for _ in 0..10 {
            b.apply_controls(&exploit_all());
        }
        assert_eq!(b.branch(), 1);
    }

    #[test]
    fn baseline_keeps_base_branch() {
        let mut b = SearchStressBackend::new(SearchParams::default(), ControlMode::Baseline).unwrap();
        b.reset(3);
        for _ in 0..20 {
            b.apply_controls(&exploit_all());
            let m = b.step();
            assert_eq!(m.branch, 14);
        }
    }

    #[test]
    fn nodes_expanded_is_monotone() {
        let mut b = SearchStressBackend::default();
        b.reset(8);
        let mut prev = 0;
        loop {
            let m = b.step();
            assert!(m.nodes_expanded > prev);
            prev = m.nodes_expanded;
            if m.done {
                break;
            }
        }
        assert!(b.get_logs().last().map(|m| m.t).unwrap_or(0) <= 80);
    }

    #[test]
    fn reset_replays_identically() {
        let mut a = SearchStressBackend::default();
        let mut b = SearchStressBackend::default();
        a.reset(17);
        b.reset(17);
        for _ in 0..30 {
            assert_eq!(a.step(), b.step());
        }
    }

    #[test]
    fn different_seeds_differ() {
        let mut a = SearchStressBackend::default();
        let mut b = SearchStressBackend::default();
        a.reset(1);
        b.reset(2);
        let differs = (0..30).any(|_| a.step().progress != b.step().progress);
        assert!(differs);
    }

    #[test]
    fn inverted_branch_range_is_rejected() {
        let params = SearchParams {
            branch_min: 20,
            branch_max: 1,
            ..SearchParams::default()
        };
        let err = SearchStressBackend::new(params, ControlMode::Regulated)
            .err()
            .unwrap();
        assert!(matches!(err, ParamsError::InvertedRange { knob: "branch", .. }));

        let params = SearchParams {
            base_branch: 0,
            ..SearchParams::default()
        };
        assert!(matches!(
            SearchStressBackend::new(params, ControlMode::Baseline).err(),
            Some(ParamsError::InitOutOfRange { init: 0, .. })
        ));
    }
}
