//! Harness for the DN regulation engine.
//!
//! This crate provides:
//! - Run loop: drive any [`dn_backends::Backend`] with a [`dn_engine::DnEngine`]
//! - Comparisons: baseline vs regulated cost on the same seed, and seed batches
//! - Reports: CSV / JSON / Markdown batch tables and ΔN/ΔD pulse series
//! - Determinism proofs: bit-identical replay plus invariant checks with a digest
//! - Structured logging: JSONL records and a validator for them

#![forbid(unsafe_code)]

pub mod determinism_proofs;
pub mod error;
pub mod report;
pub mod runner;
pub mod structured_log;

pub use error::HarnessError;
pub use report::{BatchReport, BatchRow, BatchSummary, PulsePair, PulseSeries, compression_ratio};
pub use runner::{
    Comparison, MAX_BATCH_SEEDS, RunOutcome, RunReport, compare, compare_with, parse_seeds,
    run_backend, run_backend_traced, run_batch, run_kind,
};
