//! # Perturbation Process
//!
//! Supplies the ε·ξ(t) term of the drift law: a minimal fluctuation that keeps
//! the regulated quantity from settling into an absorbing, stagnant fixed
//! point.
//!
//! ```text
//! sample() = eps * z,   z ~ N(0, 1)      (mode = white, enabled)
//! sample() = 0.0                           (disabled or mode = none)
//! ```
//!
//! The generator is a `ChaCha8Rng` owned by the process and seeded once at
//! construction, so a seed fixes the whole sample sequence on every platform.
//! Each active call consumes exactly one Gaussian draw; a muted call consumes
//! nothing.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::config::{NoiseMode, PerturbationParams};

pub struct PerturbationProcess {
    params: PerturbationParams,
    rng: ChaCha8Rng,
    /// Number of Gaussian draws consumed so far.
    draws: u64,
}

impl PerturbationProcess {
    #[must_use]
    pub fn new(params: PerturbationParams) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(params.seed),
            params,
            draws: 0,
        }
    }

    /// True when [`Self::sample`] draws from the generator.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.params.enabled && self.params.mode == NoiseMode::White
    }

    /// Next perturbation value. Unbounded, scaled by `eps`.
    pub fn sample(&mut self) -> f64 {
        if !self.is_active() {
            return 0.0;
        }
        self.draws = self.draws.saturating_add(1);
        let z: f64 = self.rng.sample(StandardNormal);
        self.params.eps * z
    }

    pub fn params(&self) -> &PerturbationParams {
        &self.params
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }
}
