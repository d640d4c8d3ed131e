//! Engine configuration.
//!
//! Three parameter bundles make up an [`EngineConfig`]:
//! - [`DriftParams`]: shape of the drift law and the control target.
//! - [`BifurcationParams`]: ON-side ΔD ceiling and exit hysteresis. The ΔN
//!   threshold is deliberately absent; the gate always takes the drift law's
//!   `delta_n_crit` so the two cannot disagree.
//! - [`PerturbationParams`]: noise magnitude, mode and seed.
//!
//! Every field is optional when loading JSON (`#[serde(default)]`), so a file
//! only needs to name what it overrides. Two environment variables are
//! honoured on top of that by [`EngineConfig::with_env_overrides`]:
//! - `DN_ENGINE_NOISE`: `white` | `gaussian` | `on` or `none` | `off` | `muted`.
//! - `DN_ENGINE_SEED`: perturbation seed, decimal or `0x` hex.
//!
//! Values are checked once, by [`EngineConfig::validate`], when an engine is
//! built. Nothing is re-checked per tick.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable selecting the perturbation mode.
pub const NOISE_ENV: &str = "DN_ENGINE_NOISE";

/// Environment variable overriding the perturbation seed.
pub const SEED_ENV: &str = "DN_ENGINE_SEED";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parameter `{name}` must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },
    #[error("parameter `{name}` must be {bound}, got {value}")]
    OutOfRange {
        name: &'static str,
        bound: &'static str,
        value: f64,
    },
    #[error("invalid value {value:?} for {var}")]
    BadEnv { var: &'static str, value: String },
    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Drift-law shape and control target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftParams {
    /// Gain in the normal regime.
    #[serde(rename = "A")]
    pub gain: f64,
    /// Logistic steepness.
    pub k: f64,
    /// Critical ΔN; shared with the bifurcation gate.
    #[serde(rename = "deltaN_crit")]
    pub delta_n_crit: f64,
    /// Exponent on ΔD.
    pub p: f64,
    /// Added to `ΔD^p` so the damper never reaches zero.
    pub eps_floor: f64,
    /// Linear ΔD coefficient in the normal regime.
    pub beta: f64,
    /// Gain in the bifurcation regime.
    #[serde(rename = "A_bif")]
    pub gain_bif: f64,
    /// Linear ΔD coefficient in the bifurcation regime.
    pub beta_bif: f64,
    /// Drift rate the controls steer toward. Does not enter the drift itself.
    pub dsdt_target: f64,
}

impl Default for DriftParams {
    fn default() -> Self {
        Self {
            gain: 1.0,
            k: 10.0,
            delta_n_crit: 0.6,
            p: 1.0,
            eps_floor: 1e-3,
            beta: 0.1,
            gain_bif: 2.0,
            beta_bif: 0.15,
            dsdt_target: 1.0,
        }
    }
}

/// Bifurcation gate thresholds (the ΔN threshold comes from [`DriftParams`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BifurcationParams {
    /// Highest ΔD at which the gate may switch ON.
    #[serde(rename = "deltaD_bif")]
    pub delta_d_bif: f64,
    /// Margin widening both exit guards.
    pub hysteresis: f64,
}

impl Default for BifurcationParams {
    fn default() -> Self {
        Self {
            delta_d_bif: 0.25,
            hysteresis: 0.05,
        }
    }
}

/// Perturbation noise mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseMode {
    /// Independent Gaussian draw every tick.
    #[default]
    White,
    /// Suppressed: every sample is exactly zero.
    #[serde(rename = "none")]
    Muted,
}

impl NoiseMode {
    /// Parse from string (case-insensitive). Returns `None` for unknown input.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" | "gaussian" | "on" => Some(Self::White),
            "none" | "off" | "muted" => Some(Self::Muted),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Muted => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbationParams {
    /// Noise magnitude.
    pub eps: f64,
    pub enabled: bool,
    pub mode: NoiseMode,
    pub seed: u64,
}

impl Default for PerturbationParams {
    fn default() -> Self {
        Self {
            eps: 1e-3,
            enabled: true,
            mode: NoiseMode::White,
            seed: 42,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub drift: DriftParams,
    pub bifurcation: BifurcationParams,
    pub perturbation: PerturbationParams,
}

impl EngineConfig {
    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `DN_ENGINE_NOISE` / `DN_ENGINE_SEED` when they are set.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        let noise = std::env::var(NOISE_ENV).ok();
        let seed = std::env::var(SEED_ENV).ok();
        self.with_overrides(noise.as_deref(), seed.as_deref())
    }

    /// Apply raw override strings (the environment-free core of
    /// [`Self::with_env_overrides`]).
    pub fn with_overrides(
        mut self,
        noise: Option<&str>,
        seed: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = noise {
            self.perturbation.mode =
                NoiseMode::from_str_loose(raw).ok_or_else(|| ConfigError::BadEnv {
                    var: NOISE_ENV,
                    value: raw.to_string(),
                })?;
        }
        if let Some(raw) = seed {
            self.perturbation.seed = parse_seed(raw).ok_or_else(|| ConfigError::BadEnv {
                var: SEED_ENV,
                value: raw.to_string(),
            })?;
        }
        Ok(self)
    }

    /// Reject configurations the drift law cannot evaluate sensibly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.drift;
        let b = &self.bifurcation;
        let e = &self.perturbation;
        for (name, value) in [
            ("A", d.gain),
            ("k", d.k),
            ("deltaN_crit", d.delta_n_crit),
            ("p", d.p),
            ("eps_floor", d.eps_floor),
            ("beta", d.beta),
            ("A_bif", d.gain_bif),
            ("beta_bif", d.beta_bif),
            ("dsdt_target", d.dsdt_target),
            ("deltaD_bif", b.delta_d_bif),
            ("hysteresis", b.hysteresis),
            ("eps", e.eps),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value });
            }
        }
        if d.eps_floor <= 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "eps_floor",
                bound: "> 0",
                value: d.eps_floor,
            });
        }
        // A negative exponent makes ΔD^p diverge as ΔD -> 0.
        for (name, value) in [
            ("p", d.p),
            ("k", d.k),
            ("hysteresis", b.hysteresis),
            ("eps", e.eps),
        ] {
            if value < 0.0 {
                return Err(ConfigError::OutOfRange {
                    name,
                    bound: ">= 0",
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Parse a seed written in decimal or `0x` hex, with optional `_` separators.
#[must_use]
pub fn parse_seed(raw: &str) -> Option<u64> {
    let cleaned: String = raw.trim().chars().filter(|&c| c != '_').collect();
    if let Some(hex) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()
    } else {
        cleaned.parse().ok()
    }
}
