//! Engine determinism + invariant proof gate.
//!
//! Goal:
//! - Drive two engines built from the same configuration with one
//!   pseudo-random observation stream and require bit-identical outputs.
//! - Check the regulation invariants on every tick of that stream.
//! - Publish a SHA-256 digest of the output stream so separate runs (and
//!   separate machines) can be compared by a single string.
//!
//! The stream deliberately leaves [0, 1]: values are drawn from [-0.5, 1.5]
//! and every 97th tick feeds NaN to exercise clamping.

use std::path::Path;

use dn_engine::{DnEngine, EngineConfig, EngineOutput};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::HarnessError;
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, now_utc};

pub const GATE: &str = "determinism_proofs";
const RUN_ID: &str = "dn-determinism";

pub const DEFAULT_SEED: u64 = 0xDEAD_BEEF;
pub const DEFAULT_STEPS: u32 = 4096;

const NAN_EVERY: u32 = 97;

#[derive(Debug, Clone, Serialize)]
pub struct InvariantCheckResult {
    pub invariant_id: &'static str,
    pub ok: bool,
    /// Ticks on which the invariant did not hold.
    pub violations: u32,
    /// First few failure messages.
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeterminismProofSummary {
    pub checks: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeterminismProofReport {
    pub schema_version: &'static str,
    pub generated_at: String,
    pub seed: u64,
    pub steps: u32,
    pub config: EngineConfig,
    /// Ticks where the two engines disagreed.
    pub replay_mismatches: u32,
    pub summary_equal: bool,
    /// Hex SHA-256 over the first engine's output stream.
    pub digest: String,
    pub invariant_checks: Vec<InvariantCheckResult>,
    pub summary: DeterminismProofSummary,
    pub failures: Vec<String>,
}

impl DeterminismProofReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run the gate in memory, optionally logging to `log`.
pub fn run(
    config: &EngineConfig,
    seed: u64,
    steps: u32,
    mut log: Option<&mut LogEmitter>,
) -> Result<DeterminismProofReport, HarnessError> {
    let mut left = DnEngine::new(*config)?;
    let mut right = DnEngine::new(*config)?;
    let mut closed_form_cfg = *config;
    closed_form_cfg.perturbation.enabled = false;
    let mut closed = DnEngine::new(closed_form_cfg)?;

    if let Some(log) = log.as_deref_mut() {
        log.emit_entry(
            LogEntry::new("", LogLevel::Info, "determinism.start")
                .with_seed(seed)
                .with_details(serde_json::json!({ "steps": steps, "config": config })),
        )?;
    }

    let mut checks = [
        Tracker::new("inputs_clamped_to_unit_interval"),
        Tracker::new("alpha_positive_and_finite"),
        Tracker::new("controls_bounded_and_exclusive"),
        Tracker::new("noise_off_closed_form"),
    ];

    let mut failures = Vec::new();
    let mut replay_mismatches = 0u32;
    let mut hasher = Sha256::new();
    let mut rng = seed;

    for i in 0..steps {
        let (dn, dd) = if i % NAN_EVERY == NAN_EVERY - 1 {
            (f64::NAN, f64::NAN)
        } else {
            (unit_span(next_u64(&mut rng)), unit_span(next_u64(&mut rng)))
        };

        let a = left.step(dn, dd);
        let b = right.step(dn, dd);
        if !bit_identical(&a, &b) {
            replay_mismatches += 1;
            if replay_mismatches == 1 {
                failures.push(format!("replay mismatch at step {i}: {a:?} != {b:?}"));
                if let Some(log) = log.as_deref_mut() {
                    log.emit_entry(
                        LogEntry::new("", LogLevel::Error, "determinism.replay_mismatch")
                            .with_seed(seed)
                            .with_tick(i)
                            .with_outcome(Outcome::Fail)
                            .with_details(serde_json::json!({
                                "input": [dn, dd],
                                "left": a,
                                "right": b,
                            })),
                    )?;
                }
            }
        }
        hash_output(&mut hasher, &a);

        checks[0].record(
            i,
            (0.0..=1.0).contains(&a.delta_n) && (0.0..=1.0).contains(&a.delta_d),
            || format!("deltaN={} deltaD={}", a.delta_n, a.delta_d),
        );
        checks[1].record(i, a.alpha > 0.0 && a.alpha.is_finite(), || {
            format!("alpha={}", a.alpha)
        });
        let c = a.controls;
        checks[2].record(
            i,
            (0.0..=1.0).contains(&c.explore)
                && (0.0..=1.0).contains(&c.exploit)
                && c.explore.min(c.exploit) == 0.0,
            || format!("explore={} exploit={}", c.explore, c.exploit),
        );

        let z = closed.step(dn, dd);
        let d = closed.drift_params();
        let beta = if z.bifurcation { d.beta_bif } else { d.beta };
        let expected = z.alpha * z.delta_n + beta * z.delta_d;
        checks[3].record(
            i,
            z.noise == 0.0 && z.dsdt.to_bits() == expected.to_bits(),
            || format!("dsdt={} expected={} noise={}", z.dsdt, expected, z.noise),
        );
    }

    let summary_equal = left.summary() == right.summary();
    if !summary_equal {
        failures.push("engine summaries differ after identical replay".to_string());
    }

    let invariant_checks: Vec<InvariantCheckResult> =
        checks.into_iter().map(Tracker::finish).collect();
    for check in &invariant_checks {
        if let Some(log) = log.as_deref_mut() {
            log.emit_entry(
                LogEntry::new("", LogLevel::Info, "determinism.invariant_check")
                    .with_seed(seed)
                    .with_outcome(Outcome::from_ok(check.ok))
                    .with_details(serde_json::json!({
                        "invariant_id": check.invariant_id,
                        "violations": check.violations,
                        "failures": check.failures,
                    })),
            )?;
        }
        if !check.ok {
            failures.push(format!("invariant failed: {}", check.invariant_id));
        }
    }

    let passed = invariant_checks.iter().filter(|c| c.ok).count();
    let digest = format!("{:x}", hasher.finalize());

    if let Some(log) = log {
        log.emit_entry(
            LogEntry::new("", LogLevel::Info, "determinism.finish")
                .with_seed(seed)
                .with_outcome(Outcome::from_ok(failures.is_empty()))
                .with_details(serde_json::json!({
                    "replay_mismatches": replay_mismatches,
                    "summary_equal": summary_equal,
                    "digest": digest,
                    "failure_count": failures.len(),
                })),
        )?;
    }

    Ok(DeterminismProofReport {
        schema_version: "v1",
        generated_at: now_utc(),
        seed,
        steps,
        config: *config,
        replay_mismatches,
        summary_equal,
        digest,
        summary: DeterminismProofSummary {
            checks: invariant_checks.len(),
            passed,
            failed: invariant_checks.len() - passed,
        },
        invariant_checks,
        failures,
    })
}

/// Run the gate, writing JSONL logs to `log_path` and the report to
/// `report_path`. Parent directories are created as needed.
pub fn run_and_write(
    config: &EngineConfig,
    seed: u64,
    steps: u32,
    log_path: &Path,
    report_path: &Path,
) -> Result<DeterminismProofReport, HarnessError> {
    for path in [log_path, report_path] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut emitter = LogEmitter::to_file(log_path, GATE, RUN_ID)?;
    let report = run(config, seed, steps, Some(&mut emitter))?;
    emitter.flush()?;

    std::fs::write(report_path, serde_json::to_string_pretty(&report)?)?;
    Ok(report)
}

struct Tracker {
    id: &'static str,
    violations: u32,
    failures: Vec<String>,
}

impl Tracker {
    const MAX_MESSAGES: usize = 8;

    fn new(id: &'static str) -> Self {
        Self {
            id,
            violations: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, step: u32, ok: bool, describe: impl FnOnce() -> String) {
        if ok {
            return;
        }
        self.violations += 1;
        if self.failures.len() < Self::MAX_MESSAGES {
            self.failures.push(format!("step {step}: {}", describe()));
        }
    }

    fn finish(self) -> InvariantCheckResult {
        InvariantCheckResult {
            invariant_id: self.id,
            ok: self.violations == 0,
            violations: self.violations,
            failures: self.failures,
        }
    }
}

fn bit_identical(a: &EngineOutput, b: &EngineOutput) -> bool {
    a.delta_n.to_bits() == b.delta_n.to_bits()
        && a.delta_d.to_bits() == b.delta_d.to_bits()
        && a.alpha.to_bits() == b.alpha.to_bits()
        && a.dsdt.to_bits() == b.dsdt.to_bits()
        && a.noise.to_bits() == b.noise.to_bits()
        && a.bifurcation == b.bifurcation
        && a.controls.mode == b.controls.mode
        && a.controls.explore.to_bits() == b.controls.explore.to_bits()
        && a.controls.exploit.to_bits() == b.controls.exploit.to_bits()
}

fn hash_output(hasher: &mut Sha256, out: &EngineOutput) {
    for v in [
        out.delta_n,
        out.delta_d,
        out.alpha,
        out.dsdt,
        out.noise,
        out.controls.explore,
        out.controls.exploit,
    ] {
        hasher.update(v.to_bits().to_le_bytes());
    }
    hasher.update([u8::from(out.bifurcation)]);
}

/// Map a raw draw into [-0.5, 1.5).
fn unit_span(r: u64) -> f64 {
    let unit = (r >> 11) as f64 / (1u64 << 53) as f64;
    -0.5 + 2.0 * unit
}

fn next_u64(state: &mut u64) -> u64 {
    // PCG-style LCG.
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state
}
