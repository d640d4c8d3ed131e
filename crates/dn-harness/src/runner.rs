//! Closed-loop run driver.
//!
//! Every tick follows the same order:
//!
//! ```text
//! obs = backend.observe()
//! out = engine.step(obs.ΔN, obs.ΔD)
//! backend.apply_controls(out.controls)
//! m   = backend.step()          // stop when m.done
//! ```
//!
//! Baseline runs still step the engine; the backend simply ignores the
//! controls. A comparison pairs one baseline and one regulated run on the same
//! seed, each with a fresh engine built from the same configuration.

use dn_backends::{
    Backend, BackendKind, ControlMode, DecodingBackend, DecodingParams, ParamsError, SearchParams,
    SearchStressBackend, TickMetrics,
};
use dn_engine::config::parse_seed;
use dn_engine::{DnEngine, EngineConfig, EngineSummary, Regime};
use serde::Serialize;

use crate::error::HarnessError;
use crate::report::{
    BatchReport, BatchRow, BatchSummary, PulsePair, PulseSeries, compression_ratio,
};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, now_utc};

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome<M> {
    pub backend: &'static str,
    pub control: ControlMode,
    pub seed: u64,
    pub max_iter: u32,
    pub logs: Vec<M>,
    pub last: M,
    pub engine: EngineSummary,
}

impl<M: TickMetrics> RunOutcome<M> {
    pub fn ticks(&self) -> u32 {
        self.last.tick()
    }

    pub fn cost(&self) -> u64 {
        self.last.cost()
    }

    pub fn pulse(&self) -> PulseSeries {
        PulseSeries::from_logs(&self.logs)
    }
}

/// Reset `backend` with `seed` and drive it for at most `max_iter` ticks.
pub fn run_backend<B: Backend>(
    engine: &mut DnEngine,
    backend: &mut B,
    seed: u64,
    max_iter: u32,
) -> Result<RunOutcome<B::Metrics>, HarnessError> {
    run_backend_traced(engine, backend, seed, max_iter, None)
}

/// [`run_backend`] that also writes per-tick records to `log`.
pub fn run_backend_traced<B: Backend>(
    engine: &mut DnEngine,
    backend: &mut B,
    seed: u64,
    max_iter: u32,
    mut log: Option<&mut LogEmitter>,
) -> Result<RunOutcome<B::Metrics>, HarnessError> {
    let name = backend.name();
    let control = backend.control().as_str();
    backend.reset(seed);

    if let Some(log) = log.as_deref_mut() {
        log.emit_entry(
            LogEntry::new("", LogLevel::Info, "run.start")
                .with_backend(name, control)
                .with_seed(seed)
                .with_details(serde_json::json!({ "max_iter": max_iter })),
        )?;
    }

    let mut regime = engine.regime();
    for _ in 0..max_iter {
        let obs = backend.observe();
        let out = engine.step(obs.delta_n, obs.delta_d);
        backend.apply_controls(&out.controls);
        let m = backend.step();

        if let Some(log) = log.as_deref_mut() {
            let now = out.controls.mode;
            if now != regime {
                let event = match now {
                    Regime::Bifurcation => "regime.enter",
                    Regime::Normal => "regime.exit",
                };
                log.emit_entry(
                    LogEntry::new("", LogLevel::Info, event)
                        .with_backend(name, control)
                        .with_seed(seed)
                        .with_tick(m.tick())
                        .with_regime(now.as_str()),
                )?;
            }
            log.emit_entry(
                LogEntry::new("", LogLevel::Debug, "tick")
                    .with_backend(name, control)
                    .with_seed(seed)
                    .with_tick(m.tick())
                    .with_regime(now.as_str())
                    .with_details(serde_json::json!({
                        "observation": obs,
                        "alpha": out.alpha,
                        "dsdt": out.dsdt,
                        "noise": out.noise,
                        "explore": out.controls.explore,
                        "exploit": out.controls.exploit,
                        "cost": m.cost(),
                    })),
            )?;
        }
        regime = out.controls.mode;

        if m.done() {
            break;
        }
    }

    let logs = backend.get_logs().to_vec();
    let Some(last) = logs.last().cloned() else {
        if let Some(log) = log.as_deref_mut() {
            log.emit_entry(
                LogEntry::new("", LogLevel::Error, "run.empty")
                    .with_backend(name, control)
                    .with_seed(seed)
                    .with_outcome(Outcome::Error),
            )?;
        }
        return Err(HarnessError::EmptyRun {
            backend: name,
            seed,
            max_iter,
        });
    };

    let summary = engine.summary();
    if let Some(log) = log.as_deref_mut() {
        log.emit_entry(
            LogEntry::new("", LogLevel::Info, "run.finish")
                .with_backend(name, control)
                .with_seed(seed)
                .with_tick(last.tick())
                .with_outcome(Outcome::from_ok(last.done()))
                .with_details(serde_json::json!({
                    "cost": last.cost(),
                    "done": last.done(),
                    "engine": summary,
                })),
        )?;
    }

    Ok(RunOutcome {
        backend: name,
        control: backend.control(),
        seed,
        max_iter,
        logs,
        last,
        engine: summary,
    })
}

/// Serializable view of one run, independent of the backend's metrics type.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub backend: &'static str,
    pub control: ControlMode,
    pub seed: u64,
    pub max_iter: u32,
    pub ticks: u32,
    pub cost: u64,
    pub done: bool,
    pub engine: EngineSummary,
    pub pulse: PulseSeries,
    pub logs: serde_json::Value,
}

impl<M: TickMetrics> RunOutcome<M> {
    pub fn to_report(&self) -> Result<RunReport, HarnessError> {
        Ok(RunReport {
            backend: self.backend,
            control: self.control,
            seed: self.seed,
            max_iter: self.max_iter,
            ticks: self.ticks(),
            cost: self.cost(),
            done: self.last.done(),
            engine: self.engine,
            pulse: self.pulse(),
            logs: serde_json::to_value(&self.logs)?,
        })
    }
}

/// Baseline vs regulated result for one seed.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub backend: &'static str,
    pub seed: u64,
    pub max_iter: u32,
    pub baseline_cost: u64,
    pub dn_cost: u64,
    /// `baseline_cost / max(dn_cost, 1)`.
    pub cr: f64,
    pub baseline_ticks: u32,
    pub dn_ticks: u32,
    pub dn_engine: EngineSummary,
    pub baseline_pulse: PulseSeries,
    pub dn_pulse: PulseSeries,
}

impl Comparison {
    #[must_use]
    pub fn row(&self) -> BatchRow {
        BatchRow {
            seed: self.seed,
            baseline_cost: self.baseline_cost,
            dn_cost: self.dn_cost,
            cr: self.cr,
        }
    }
}

/// Run a single backend of `kind` in `control` mode.
pub fn run_kind(
    kind: BackendKind,
    control: ControlMode,
    seed: u64,
    max_iter: u32,
    config: &EngineConfig,
    log: Option<&mut LogEmitter>,
) -> Result<RunReport, HarnessError> {
    let mut engine = DnEngine::new(*config)?;
    match kind {
        BackendKind::Decoding => {
            let mut backend = DecodingBackend::new(DecodingParams::default(), control)?;
            run_backend_traced(&mut engine, &mut backend, seed, max_iter, log)?.to_report()
        }
        BackendKind::Search => {
            let mut backend = SearchStressBackend::new(SearchParams::default(), control)?;
            run_backend_traced(&mut engine, &mut backend, seed, max_iter, log)?.to_report()
        }
    }
}

/// One baseline and one regulated run on `seed`, each with a fresh engine.
pub fn compare(
    kind: BackendKind,
    seed: u64,
    max_iter: u32,
    config: &EngineConfig,
    log: Option<&mut LogEmitter>,
) -> Result<Comparison, HarnessError> {
    match kind {
        BackendKind::Decoding => compare_with(
            |control| DecodingBackend::new(DecodingParams::default(), control),
            seed,
            max_iter,
            config,
            log,
        ),
        BackendKind::Search => compare_with(
            |control| SearchStressBackend::new(SearchParams::default(), control),
            seed,
            max_iter,
            config,
            log,
        ),
    }
}

/// [`compare`] for any backend built by `make`. Parameter errors from `make`
/// abort the comparison before any tick runs.
pub fn compare_with<B: Backend>(
    make: impl Fn(ControlMode) -> Result<B, ParamsError>,
    seed: u64,
    max_iter: u32,
    config: &EngineConfig,
    mut log: Option<&mut LogEmitter>,
) -> Result<Comparison, HarnessError> {
    let mut baseline = make(ControlMode::Baseline)?;
    let mut engine = DnEngine::new(*config)?;
    let b = run_backend_traced(&mut engine, &mut baseline, seed, max_iter, log.as_deref_mut())?;

    let mut regulated = make(ControlMode::Regulated)?;
    let mut engine = DnEngine::new(*config)?;
    let d = run_backend_traced(&mut engine, &mut regulated, seed, max_iter, log.as_deref_mut())?;

    let cmp = Comparison {
        backend: d.backend,
        seed,
        max_iter,
        baseline_cost: b.cost(),
        dn_cost: d.cost(),
        cr: compression_ratio(b.cost(), d.cost()),
        baseline_ticks: b.ticks(),
        dn_ticks: d.ticks(),
        dn_engine: d.engine,
        baseline_pulse: b.pulse(),
        dn_pulse: d.pulse(),
    };

    if let Some(log) = log {
        log.emit_entry(
            LogEntry::new("", LogLevel::Info, "compare.result")
                .with_seed(seed)
                .with_outcome(Outcome::Pass)
                .with_details(serde_json::json!({
                    "backend": cmp.backend,
                    "baseline_cost": cmp.baseline_cost,
                    "dn_cost": cmp.dn_cost,
                    "cr": cmp.cr,
                })),
        )?;
    }
    Ok(cmp)
}

/// One comparison per seed plus summary statistics.
pub fn run_batch(
    kind: BackendKind,
    seeds: &[u64],
    max_iter: u32,
    config: &EngineConfig,
    mut log: Option<&mut LogEmitter>,
) -> Result<BatchReport, HarnessError> {
    let mut rows = Vec::with_capacity(seeds.len());
    let mut example = None;
    for &seed in seeds {
        let cmp = compare(kind, seed, max_iter, config, log.as_deref_mut())?;
        rows.push(cmp.row());
        example = Some(PulsePair {
            seed,
            baseline: cmp.baseline_pulse,
            dn: cmp.dn_pulse,
        });
    }

    let ratios: Vec<f64> = rows.iter().map(|r| r.cr).collect();
    let (Some(summary), Some(example)) = (BatchSummary::from_ratios(&ratios), example) else {
        return Err(HarnessError::EmptyBatch);
    };

    if let Some(log) = log {
        log.emit_entry(
            LogEntry::new("", LogLevel::Info, "batch.summary")
                .with_outcome(Outcome::Pass)
                .with_details(serde_json::json!({
                    "backend": kind.as_str(),
                    "summary": summary,
                })),
        )?;
    }

    Ok(BatchReport {
        schema_version: "v1",
        backend: kind.as_str(),
        max_iter,
        generated_at: now_utc(),
        rows,
        summary,
        example,
    })
}

/// Longest seed range [`parse_seeds`] will expand.
pub const MAX_BATCH_SEEDS: u64 = 100_000;

/// Parse a seed list: `a..b` (inclusive), `a..=b`, or comma-separated
/// values. Each value is decimal or `0x` hex. Ranges longer than
/// [`MAX_BATCH_SEEDS`] are rejected.
pub fn parse_seeds(raw: &str) -> Result<Vec<u64>, HarnessError> {
    let bad = || HarnessError::BadSeedList(raw.to_string());
    let raw_trim = raw.trim();
    if let Some((lo, hi)) = raw_trim.split_once("..") {
        let hi = hi.strip_prefix('=').unwrap_or(hi);
        let lo = parse_seed(lo).ok_or_else(bad)?;
        let hi = parse_seed(hi).ok_or_else(bad)?;
        if lo > hi || hi - lo >= MAX_BATCH_SEEDS {
            return Err(bad());
        }
        return Ok((lo..=hi).collect());
    }
    let seeds = raw_trim
        .split(',')
        .map(|s| parse_seed(s).ok_or_else(bad))
        .collect::<Result<Vec<_>, _>>()?;
    if seeds.is_empty() {
        return Err(bad());
    }
    Ok(seeds)
}
