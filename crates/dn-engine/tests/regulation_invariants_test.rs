//! Integration test: regulation invariants over long pseudo-random input streams.
//!
//! Run: cargo test -p dn-engine --test regulation_invariants_test

use dn_engine::{
    BifurcationGate, BifurcationParams, DnEngine, EngineConfig, GateState, PerturbationParams,
};

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform in [lo, hi).
    fn next_f64(&mut self, lo: f64, hi: f64) -> f64 {
        let unit = (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        lo + unit * (hi - lo)
    }
}

const STEPS: usize = 20_000;

#[test]
fn clamped_inputs_always_in_unit_interval() {
    let mut engine = DnEngine::default();
    let mut rng = XorShift64::new(0xDEAD_BEEF);
    for _ in 0..STEPS {
        let dn = rng.next_f64(-3.0, 4.0);
        let dd = rng.next_f64(-3.0, 4.0);
        let out = engine.step(dn, dd);
        assert!((0.0..=1.0).contains(&out.delta_n), "deltaN={}", out.delta_n);
        assert!((0.0..=1.0).contains(&out.delta_d), "deltaD={}", out.delta_d);
    }
}

#[test]
fn alpha_strictly_positive_and_finite() {
    let mut engine = DnEngine::default();
    let mut rng = XorShift64::new(7);
    for _ in 0..STEPS {
        let out = engine.step(rng.next_f64(-1.0, 2.0), rng.next_f64(-1.0, 2.0));
        assert!(out.alpha > 0.0, "alpha={}", out.alpha);
        assert!(out.alpha.is_finite(), "alpha={}", out.alpha);
    }
}

#[test]
fn controls_bounded_and_exclusive() {
    let mut engine = DnEngine::default();
    let mut rng = XorShift64::new(99);
    for _ in 0..STEPS {
        let out = engine.step(rng.next_f64(0.0, 1.0), rng.next_f64(0.0, 1.0));
        let c = out.controls;
        assert!((0.0..=1.0).contains(&c.explore));
        assert!((0.0..=1.0).contains(&c.exploit));
        assert_eq!(c.explore.min(c.exploit), 0.0, "controls={c:?}");
    }
}

#[test]
fn identical_config_and_seed_replay_bit_identically() {
    let cfg = EngineConfig {
        perturbation: PerturbationParams {
            seed: 0xC0FFEE,
            eps: 0.05,
            ..PerturbationParams::default()
        },
        ..EngineConfig::default()
    };
    let mut a = DnEngine::new(cfg).unwrap();
    let mut b = DnEngine::new(cfg).unwrap();
    let mut rng = XorShift64::new(31337);
    for step in 0..STEPS {
        let dn = rng.next_f64(-0.5, 1.5);
        let dd = rng.next_f64(-0.5, 1.5);
        let x = a.step(dn, dd);
        let y = b.step(dn, dd);
        assert_eq!(x.dsdt.to_bits(), y.dsdt.to_bits(), "dsdt diverged at {step}");
        assert_eq!(x.alpha.to_bits(), y.alpha.to_bits(), "alpha diverged at {step}");
        assert_eq!(x.noise.to_bits(), y.noise.to_bits(), "noise diverged at {step}");
        assert_eq!(x.controls, y.controls, "controls diverged at {step}");
    }
    assert_eq!(a.summary(), b.summary());
}

#[test]
fn disabled_noise_reduces_to_closed_form() {
    let cfg = EngineConfig {
        perturbation: PerturbationParams {
            enabled: false,
            ..PerturbationParams::default()
        },
        ..EngineConfig::default()
    };
    let mut engine = DnEngine::new(cfg).unwrap();
    let drift = *engine.drift_params();
    let mut rng = XorShift64::new(4242);
    for _ in 0..STEPS {
        let out = engine.step(rng.next_f64(0.0, 1.0), rng.next_f64(0.0, 1.0));
        assert_eq!(out.noise, 0.0);
        let beta = if out.bifurcation {
            drift.beta_bif
        } else {
            drift.beta
        };
        let expected = out.alpha * out.delta_n + beta * out.delta_d;
        assert_eq!(out.dsdt.to_bits(), expected.to_bits());
    }
}

#[test]
fn gate_band_never_turns_on_gate_off() {
    let params = BifurcationParams::default();
    let crit = 0.6;
    let mut gate = BifurcationGate::with_state(crit, params, GateState::On);
    let mut rng = XorShift64::new(5);
    for _ in 0..STEPS {
        // Stay strictly inside the extended OFF guard.
        let dn = rng.next_f64(crit - params.hysteresis + 1e-9, 1.0);
        let dd = rng.next_f64(0.0, params.delta_d_bif + params.hysteresis - 1e-9);
        assert!(gate.update(dn, dd), "gate turned off at ({dn}, {dd})");
    }
    assert_eq!(gate.exits(), 0);
}

#[test]
fn gate_hysteresis_scenarios() {
    let params = BifurcationParams {
        delta_d_bif: 0.25,
        hysteresis: 0.05,
    };
    let mut gate = BifurcationGate::with_state(0.6, params, GateState::On);
    assert!(gate.update(0.58, 0.26), "inside the band the gate holds ON");
    assert!(!gate.update(0.50, 0.26), "below the ΔN exit guard the gate turns OFF");
    assert_eq!(gate.state(), GateState::Off);
}

#[test]
fn regime_flips_track_gate_entries() {
    let mut engine = DnEngine::default();
    for cycle in 0..10 {
        let on = engine.step(0.95, 0.05);
        assert!(on.bifurcation, "cycle {cycle} should enter");
        let off = engine.step(0.1, 0.9);
        assert!(!off.bifurcation, "cycle {cycle} should exit");
    }
    let s = engine.summary();
    assert_eq!(s.bifurcation_entries, 10);
    assert_eq!(s.bifurcation_ticks, 10);
    assert_eq!(s.ticks, 20);
}
