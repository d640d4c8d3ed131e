//! DN regulation engine.
//!
//! A domain-agnostic closed-loop regulator. Each tick it reads two normalized
//! signals from some process (ΔN, distance from goal; ΔD, diversity pressure)
//! and returns a drift rate plus explore/exploit controls for that process to
//! interpret however it likes.
//!
//! # Architecture
//!
//! - **Normalization** (`norms`): `clamp01`, `safe_div`
//! - **Perturbation** (`perturbation`): seeded Gaussian ε-process, can be muted
//! - **Bifurcation gate** (`bifurcation`): two-threshold hysteretic regime switch
//! - **Engine** (`engine`): sigmoid-gated drift law and control derivation
//! - **Configuration** (`config`): parameter bundles, JSON/env loading, validation
//!
//! The crate does no I/O and keeps no history of observations. Everything is
//! single-threaded and deterministic for a fixed seed and input sequence.

pub mod bifurcation;
pub mod config;
pub mod engine;
pub mod norms;
pub mod perturbation;

pub use bifurcation::{BifurcationGate, GateState};
pub use config::{
    BifurcationParams, ConfigError, DriftParams, EngineConfig, NoiseMode, PerturbationParams,
};
pub use engine::{Controls, DnEngine, EngineOutput, EngineSummary, Regime};
pub use norms::{clamp01, safe_div};
pub use perturbation::PerturbationProcess;
