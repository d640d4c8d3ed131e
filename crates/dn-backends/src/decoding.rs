//! Toy decoding backend.
//!
//! Stands in for a token-decoding loop whose single knob is the beam width
//! `k`. A wider beam costs `k` model calls per tick and occasionally produces
//! a large jump in score; a narrow beam makes steady small progress. When a
//! wide beam stalls, an internal duality signal builds up and feeds ΔD.
//!
//! - ΔN = 1 - score / target
//! - ΔD = 0.7 · (beam fraction) + 0.3 · duality
//! - cost = cumulative model calls
//!
//! In baseline mode `k` stays at `k_init` for the whole run.

use dn_engine::{Controls, clamp01};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::contract::{
    Backend, ControlMode, Observation, ParamsError, TickMetrics, check_knob, knob_delta,
    knob_fraction, nudge,
};

/// Probability that a tick with a wide beam lands a jump.
const JUMP_PROBABILITY: f64 = 0.20;

/// Score gain below which a tick counts as stagnant.
const STAGNATION_THRESHOLD: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingParams {
    pub max_steps: u32,
    pub k_min: u32,
    pub k_max: u32,
    pub k_init: u32,
    pub target_score: f64,
}

impl Default for DecodingParams {
    fn default() -> Self {
        Self {
            max_steps: 40,
            k_min: 1,
            k_max: 8,
            k_init: 1,
            target_score: 1.0,
        }
    }
}

impl DecodingParams {
    /// Reject inverted knob bounds, a start value outside them, or a
    /// non-finite target.
    pub fn validate(&self) -> Result<(), ParamsError> {
        check_knob("k", self.k_init, self.k_min, self.k_max)?;
        if !self.target_score.is_finite() {
            return Err(ParamsError::NonFinite {
                name: "target_score",
                value: self.target_score,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodingMetrics {
    pub t: u32,
    pub done: bool,
    pub calls: u64,
    pub score: f64,
    pub k: u32,
    #[serde(rename = "deltaN")]
    pub delta_n: f64,
    #[serde(rename = "deltaD")]
    pub delta_d: f64,
}

impl TickMetrics for DecodingMetrics {
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
        self.calls
    }
}

pub struct DecodingBackend {
    params: DecodingParams,
    control: ControlMode,
    rng: ChaCha8Rng,
    t: u32,
    k: u32,
    calls: u64,
    score: f64,
    duality: f64,
    logs: Vec<DecodingMetrics>,
}

impl DecodingBackend {
    /// New backend, already reset with seed 0.
    pub fn new(params: DecodingParams, control: ControlMode) -> Result<Self, ParamsError> {
        params.validate()?;
        Ok(Self::build(params, control))
    }

    fn build(params: DecodingParams, control: ControlMode) -> Self {
        let mut backend = Self {
            params,
            control,
            rng: ChaCha8Rng::seed_from_u64(0),
            t: 0,
            k: params.k_init,
            calls: 0,
            score: 0.0,
            duality: 0.0,
            logs: Vec::new(),
        };
        backend.reset(0);
        backend
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn params(&self) -> &DecodingParams {
        &self.params
    }

    fn beam_fraction(&self) -> f64 {
        knob_fraction(self.k, self.params.k_min, self.params.k_max)
    }
}

impl Default for DecodingBackend {
    fn default() -> Self {
        Self::build(DecodingParams::default(), ControlMode::Regulated)
    }
}

impl Backend for DecodingBackend {
    type Metrics = DecodingMetrics;

    fn name(&self) -> &'static str {
        "decoding"
    }

    fn control(&self) -> ControlMode {
        self.control
    }

    fn reset(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.t = 0;
        self.k = self.params.k_init;
        self.calls = 0;
        self.score = 0.0;
        self.duality = 0.0;
        self.logs.clear();
    }

    fn observe(&self) -> Observation {
        let delta_n = clamp01(1.0 - self.score / self.params.target_score.max(1e-9));
        let delta_d = clamp01(0.7 * self.beam_fraction() + 0.3 * self.duality);
        Observation::new(delta_n, delta_d)
            .with_extra("k", f64::from(self.k))
            .with_extra("score", self.score)
            .with_extra("calls", self.calls as f64)
    }

    fn apply_controls(&mut self, controls: &Controls) {
        if !self.control.listens() {
            return;
        }
        let delta = knob_delta(controls, 3.0, 3.0);
        self.k = nudge(self.k, delta, self.params.k_min, self.params.k_max);
    }

    fn step(&mut self) -> DecodingMetrics {
        let obs = self.observe();

        self.calls = self.calls.saturating_add(u64::from(self.k));

        let explore_factor = self.beam_fraction();
        let base = 0.02 + 0.02 * (1.0 - explore_factor);
        let jump = if self.rng.gen_bool(JUMP_PROBABILITY) {
            0.07 * explore_factor
        } else {
            0.0
        };
        let z: f64 = self.rng.sample(StandardNormal);
        let noise = 0.005 * z;

        let dscore = (base + jump + noise).max(0.0);
        self.score = (self.score + dscore).min(self.params.target_score);

        let stagnation = if dscore < STAGNATION_THRESHOLD { 1.0 } else { 0.0 };
        self.duality = clamp01(0.9 * self.duality + 0.25 * explore_factor * stagnation);

        self.t += 1;
        let done = self.score >= self.params.target_score || self.t >= self.params.max_steps;

        let metrics = DecodingMetrics {
            t: self.t,
            done,
            calls: self.calls,
            score: self.score,
            k: self.k,
            delta_n: obs.delta_n,
            delta_d: obs.delta_d,
        };
        self.logs.push(metrics.clone());
        metrics
    }

    fn get_logs(&self) -> &[DecodingMetrics] {
        &self.logs
    }
}
