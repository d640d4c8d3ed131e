//! # Regulation Engine
//!
//! Converts one (ΔN, ΔD) observation per tick into a drift rate and a pair of
//! normalized control signals.
//!
//! ## Drift law
//!
//! ```text
//! dS/dt    = α(ΔN, ΔD) · ΔN + β · ΔD + ε · ξ(t)
//! α(ΔN,ΔD) = A / [ (1 + exp(-k (ΔN - ΔN_crit))) · (ΔD^p + eps_floor) ]
//! ```
//!
//! The logistic factor keeps α small while ΔN is below the critical band and
//! lets it rise sharply once ΔN crosses it. ΔD acts as an inverse-power
//! damper: low diversity pressure amplifies α, high pressure suppresses it.
//! While the bifurcation gate is ON the law swaps (A, β) for (A_bif, β_bif).
//!
//! ## Controls
//!
//! ```text
//! err     = dS/dt - target
//! explore = clamp(-err, 0, 1)    drift undershoots: explore more
//! exploit = clamp( err, 0, 1)    drift overshoots:  exploit more
//! ```
//!
//! Both come from one signed residual, so at most one of them is nonzero.
//!
//! Every input is clamped and the denominator is floored, so `step` is total:
//! there is no runtime error path. Misconfiguration is rejected once, in
//! [`DnEngine::new`].

use serde::{Deserialize, Serialize};

use crate::bifurcation::BifurcationGate;
use crate::config::{ConfigError, DriftParams, EngineConfig};
use crate::norms::clamp01;
use crate::perturbation::PerturbationProcess;

/// Floor applied to the α denominator.
pub const DENOM_FLOOR: f64 = 1e-12;

/// Regime label carried in [`Controls`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    #[default]
    Normal,
    Bifurcation,
}

impl Regime {
    #[must_use]
    pub const fn from_gate(on: bool) -> Self {
        if on { Self::Bifurcation } else { Self::Normal }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Bifurcation => "bifurcation",
        }
    }
}

/// Control record handed to a backend each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Controls {
    pub mode: Regime,
    /// In [0, 1]; nonzero only when the drift undershoots the target.
    pub explore: f64,
    /// In [0, 1]; nonzero only when the drift overshoots the target.
    pub exploit: f64,
    /// Echo of the configured target.
    pub dsdt_target: f64,
}

impl Controls {
    /// Split the signed residual `dsdt - target` into explore/exploit.
    #[must_use]
    pub fn from_residual(mode: Regime, dsdt: f64, dsdt_target: f64) -> Self {
        let err = dsdt - dsdt_target;
        Self {
            mode,
            explore: clamp01(-err),
            exploit: clamp01(err),
            dsdt_target,
        }
    }
}

/// Everything computed for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    #[serde(rename = "deltaN")]
    pub delta_n: f64,
    #[serde(rename = "deltaD")]
    pub delta_d: f64,
    pub alpha: f64,
    pub dsdt: f64,
    pub bifurcation: bool,
    pub noise: f64,
    pub controls: Controls,
}

/// Tick counters for reporting. Never read by the law itself.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSummary {
    pub ticks: u64,
    /// Ticks that ran with the bifurcation gains.
    pub bifurcation_ticks: u64,
    /// OFF -> ON gate transitions.
    pub bifurcation_entries: u32,
    pub regime: Regime,
}

/// The DN regulation engine.
///
/// Owns one bifurcation gate and one perturbation process for its whole
/// lifetime; neither is shared with any other engine.
pub struct DnEngine {
    drift: DriftParams,
    gate: BifurcationGate,
    noise: PerturbationProcess,
    ticks: u64,
    bifurcation_ticks: u64,
}

impl DnEngine {
    /// Build an engine after validating `config`.
    ///
    /// The gate takes its ΔN threshold from `config.drift.delta_n_crit`.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: EngineConfig) -> Self {
        Self {
            drift: config.drift,
            gate: BifurcationGate::new(config.drift.delta_n_crit, config.bifurcation),
            noise: PerturbationProcess::new(config.perturbation),
            ticks: 0,
            bifurcation_ticks: 0,
        }
    }

    /// Gain α for the given observation and regime gain `gain`.
    ///
    /// Inputs are clamped to [0, 1]. Pure: touches neither the gate nor the
    /// noise generator.
    #[must_use]
    pub fn alpha(&self, delta_n: f64, delta_d: f64, gain: f64) -> f64 {
        let dn = clamp01(delta_n);
        let dd = clamp01(delta_d);
        let d = &self.drift;
        let gate = 1.0 + (-d.k * (dn - d.delta_n_crit)).exp();
        let denom = gate * (dd.powf(d.p) + d.eps_floor);
        gain / denom.max(DENOM_FLOOR)
    }

    /// Advance one tick.
    pub fn step(&mut self, delta_n: f64, delta_d: f64) -> EngineOutput {
        let dn = clamp01(delta_n);
        let dd = clamp01(delta_d);

        let bifurcation = self.gate.update(dn, dd);
        let (gain, beta) = if bifurcation {
            (self.drift.gain_bif, self.drift.beta_bif)
        } else {
            (self.drift.gain, self.drift.beta)
        };

        let alpha = self.alpha(dn, dd, gain);
        let noise = self.noise.sample();
        let dsdt = alpha * dn + beta * dd + noise;

        let regime = Regime::from_gate(bifurcation);
        let controls = Controls::from_residual(regime, dsdt, self.drift.dsdt_target);

        self.ticks = self.ticks.saturating_add(1);
        if bifurcation {
            self.bifurcation_ticks = self.bifurcation_ticks.saturating_add(1);
        }

        EngineOutput {
            delta_n: dn,
            delta_d: dd,
            alpha,
            dsdt,
            bifurcation,
            noise,
            controls,
        }
    }

    pub fn drift_params(&self) -> &DriftParams {
        &self.drift
    }

    pub fn gate(&self) -> &BifurcationGate {
        &self.gate
    }

    pub fn perturbation(&self) -> &PerturbationProcess {
        &self.noise
    }

    pub fn regime(&self) -> Regime {
        Regime::from_gate(self.gate.is_on())
    }

    pub fn summary(&self) -> EngineSummary {
        EngineSummary {
            ticks: self.ticks,
            bifurcation_ticks: self.bifurcation_ticks,
            bifurcation_entries: self.gate.entries(),
            regime: self.regime(),
        }
    }
}

impl Default for DnEngine {
    fn default() -> Self {
        Self::from_validated(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NoiseMode, PerturbationParams};

    fn quiet_config() -> EngineConfig {
        EngineConfig {
            perturbation: PerturbationParams {
                enabled: false,
                ..PerturbationParams::default()
            },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn high_n_low_d_enters_bifurcation() {
        let mut e = DnEngine::default();
        let out = e.step(0.99, 0.01);
        assert!(out.bifurcation);
        assert_eq!(out.controls.mode, Regime::Bifurcation);

        let normal_alpha = e.alpha(0.99, 0.01, e.drift_params().gain);
        assert!(out.alpha > 0.0);
        assert!(
            out.alpha > 1.9 * normal_alpha,
            "bifurcation alpha {} should be ~2x normal alpha {}",
            out.alpha,
            normal_alpha
        );
    }

    #[test]
    fn in_range_inputs_pass_through() {
        let mut e = DnEngine::default();
        let out = e.step(0.8, 0.2);
        assert_eq!(out.delta_n, 0.8);
        assert_eq!(out.delta_d, 0.2);
        assert!(out.alpha.is_finite() && out.alpha > 0.0);
        assert!(out.dsdt.is_finite());
        assert_eq!(out.controls.dsdt_target, 1.0);

        let json = serde_json::to_value(out).unwrap();
        let controls = json["controls"].as_object().unwrap();
        for key in ["mode", "explore", "exploit", "dsdt_target"] {
            assert!(controls.contains_key(key), "controls missing {key}");
        }
        assert!(json.get("deltaN").is_some());
        assert!(json.get("deltaD").is_some());
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        let mut e = DnEngine::default();
        let out = e.step(3.5, -2.0);
        assert_eq!(out.delta_n, 1.0);
        assert_eq!(out.delta_d, 0.0);
        let out = e.step(f64::NAN, f64::INFINITY);
        assert_eq!(out.delta_n, 0.0);
        assert_eq!(out.delta_d, 1.0);
    }

    #[test]
    fn alpha_matches_closed_form() {
        let e = DnEngine::default();
        let (dn, dd) = (0.7_f64, 0.3_f64);
        let gate = 1.0 + (-10.0 * (dn - 0.6)).exp();
        let expected = 1.0 / (gate * (dd + 1e-3));
        assert!((e.alpha(dn, dd, 1.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn alpha_rises_sharply_past_critical() {
        let e = DnEngine::default();
        let below = e.alpha(0.3, 0.5, 1.0);
        let above = e.alpha(0.9, 0.5, 1.0);
        assert!(above > 10.0 * below, "below={below} above={above}");
    }

    #[test]
    fn diversity_pressure_damps_alpha() {
        let e = DnEngine::default();
        assert!(e.alpha(0.7, 0.05, 1.0) > e.alpha(0.7, 0.9, 1.0));
    }

    #[test]
    fn denominator_floor_keeps_alpha_finite() {
        let cfg = EngineConfig {
            drift: DriftParams {
                eps_floor: 1e-300,
                k: 0.0,
                ..DriftParams::default()
            },
            ..quiet_config()
        };
        let e = DnEngine::new(cfg).unwrap();
        let a = e.alpha(0.5, 0.0, 1.0);
        assert!(a.is_finite());
        assert!((a - 1.0 / DENOM_FLOOR).abs() / a < 1e-9);
    }

    #[test]
    fn noise_off_gives_closed_form_dsdt() {
        let mut e = DnEngine::new(quiet_config()).unwrap();
        for &(dn, dd) in &[(0.8, 0.2), (0.1, 0.9), (0.99, 0.01), (0.5, 0.5)] {
            let out = e.step(dn, dd);
            assert_eq!(out.noise, 0.0);
            let beta = if out.bifurcation { 0.15 } else { 0.1 };
            let expected = out.alpha * out.delta_n + beta * out.delta_d;
            assert_eq!(out.dsdt.to_bits(), expected.to_bits());
        }
    }

    #[test]
    fn muted_mode_behaves_like_disabled() {
        let mut cfg = EngineConfig::default();
        cfg.perturbation.mode = NoiseMode::Muted;
        let mut muted = DnEngine::new(cfg).unwrap();
        let mut off = DnEngine::new(quiet_config()).unwrap();
        for i in 0..50 {
            let x = f64::from(i) / 50.0;
            let a = muted.step(x, 1.0 - x);
            let b = off.step(x, 1.0 - x);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn controls_are_exclusive() {
        let c = Controls::from_residual(Regime::Normal, 0.4, 1.0);
        assert!((c.explore - 0.6).abs() < 1e-12);
        assert_eq!(c.exploit, 0.0);
        let c = Controls::from_residual(Regime::Normal, 5.0, 1.0);
        assert_eq!(c.explore, 0.0);
        assert_eq!(c.exploit, 1.0);
        let c = Controls::from_residual(Regime::Normal, 1.0, 1.0);
        assert_eq!(c.explore, 0.0);
        assert_eq!(c.exploit, 0.0);
    }

    #[test]
    fn identical_engines_are_bit_identical() {
        let mut a = DnEngine::default();
        let mut b = DnEngine::default();
        for i in 0..500u32 {
            let dn = f64::from((i * 37) % 101) / 100.0;
            let dd = f64::from((i * 53) % 97) / 96.0;
            let x = a.step(dn, dd);
            let y = b.step(dn, dd);
            assert_eq!(x.dsdt.to_bits(), y.dsdt.to_bits());
            assert_eq!(x.alpha.to_bits(), y.alpha.to_bits());
            assert_eq!(x.controls, y.controls);
        }
    }

    #[test]
    fn summary_counts_bifurcation_ticks() {
        let mut e = DnEngine::default();
        e.step(0.99, 0.01);
        e.step(0.99, 0.01);
        e.step(0.1, 0.9);
        let s = e.summary();
        assert_eq!(s.ticks, 3);
        assert_eq!(s.bifurcation_ticks, 2);
        assert_eq!(s.bifurcation_entries, 1);
        assert_eq!(s.regime, Regime::Normal);
    }

    #[test]
    fn gate_shares_drift_threshold() {
        let mut cfg = EngineConfig::default();
        cfg.drift.delta_n_crit = 0.4;
        let e = DnEngine::new(cfg).unwrap();
        assert_eq!(e.gate().delta_n_crit(), 0.4);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.drift.p = -0.5;
        assert!(DnEngine::new(cfg).is_err());
    }

    #[test]
    fn regime_labels() {
        assert_eq!(Regime::Bifurcation.as_str(), "bifurcation");
        assert_eq!(
            serde_json::to_string(&Regime::Normal).unwrap(),
            "\"normal\""
        );
    }
}
