//! CLI entrypoint for the DN engine harness.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use dn_backends::{BackendKind, ControlMode};
use dn_engine::EngineConfig;
use dn_engine::config::parse_seed;
use dn_harness::determinism_proofs::{self, DEFAULT_SEED, DEFAULT_STEPS};
use dn_harness::structured_log::LogEmitter;
use dn_harness::{compare, parse_seeds, run_batch, run_kind};

/// Closed-loop experiments for the DN regulation engine.
#[derive(Debug, Parser)]
#[command(name = "dn-harness")]
#[command(about = "Run, compare and verify the DN regulation engine")]
struct Cli {
    /// Engine configuration JSON (defaults apply to missing fields).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Write structured JSONL logs here.
    #[arg(long, global = true)]
    log: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one backend and print its per-tick log as JSON.
    Run {
        /// Backend to drive (`decoding` or `search`).
        #[arg(long, default_value = "decoding")]
        backend: BackendKind,
        /// `dn` (regulated) or `baseline`.
        #[arg(long, default_value = "dn", value_parser = parse_control)]
        control: ControlMode,
        /// Backend seed (decimal or 0x...).
        #[arg(long, default_value = "2", value_parser = parse_seed_arg)]
        seed: u64,
        /// Loop cap (backend default when omitted).
        #[arg(long)]
        max_iter: Option<u32>,
        /// Output JSON path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Baseline vs regulated cost on one seed.
    Compare {
        #[arg(long, default_value = "decoding")]
        backend: BackendKind,
        #[arg(long, default_value = "2", value_parser = parse_seed_arg)]
        seed: u64,
        #[arg(long)]
        max_iter: Option<u32>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// One comparison per seed, written as CSV, JSON and Markdown.
    Batch {
        #[arg(long, default_value = "search")]
        backend: BackendKind,
        /// `a..b` (inclusive) or comma-separated list.
        #[arg(long, default_value = "1..30")]
        seeds: String,
        #[arg(long)]
        max_iter: Option<u32>,
        /// Output directory for the batch artifacts.
        #[arg(long, default_value = "target/dn-harness")]
        out_dir: PathBuf,
    },
    /// Export the ΔN/ΔD pulse of one run.
    Pulse {
        #[arg(long, default_value = "decoding")]
        backend: BackendKind,
        #[arg(long, default_value = "dn", value_parser = parse_control)]
        control: ControlMode,
        #[arg(long, default_value = "2", value_parser = parse_seed_arg)]
        seed: u64,
        #[arg(long)]
        max_iter: Option<u32>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Bit-identical replay and invariant checks over a synthetic stream.
    DeterminismProofs {
        #[arg(long, default_value_t = DEFAULT_SEED, value_parser = parse_seed_arg)]
        seed: u64,
        #[arg(long, default_value_t = DEFAULT_STEPS)]
        steps: u32,
        #[arg(
            long,
            default_value = "target/dn-harness/determinism_proofs.log.jsonl"
        )]
        proof_log: PathBuf,
        #[arg(
            long,
            default_value = "target/dn-harness/determinism_proofs.report.json"
        )]
        report: PathBuf,
    },
}

fn parse_control(raw: &str) -> Result<ControlMode, String> {
    ControlMode::from_str_loose(raw).ok_or_else(|| format!("unknown control `{raw}` (dn|baseline)"))
}

fn parse_seed_arg(raw: &str) -> Result<u64, String> {
    parse_seed(raw).ok_or_else(|| format!("invalid seed `{raw}`"))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let cfg = match path {
        Some(path) => {
            eprintln!("Loading engine config from {}", path.display());
            EngineConfig::from_json_str(&std::fs::read_to_string(path)?)?
        }
        None => EngineConfig::default(),
    };
    Ok(cfg.with_env_overrides()?)
}

fn open_log(path: Option<&Path>, gate: &str) -> Result<Option<LogEmitter>, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(None);
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    eprintln!("Writing structured log to {}", path.display());
    Ok(Some(LogEmitter::to_file(path, gate, "cli")?))
}

fn close_log(log: Option<&mut LogEmitter>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(log) = log {
        log.flush()?;
        eprintln!("Structured log: {} records", log.emitted());
    }
    Ok(())
}

fn write_or_print(output: Option<&Path>, body: &str) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, body)?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{body}"),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            backend,
            control,
            seed,
            max_iter,
            output,
        } => {
            let mut log = open_log(cli.log.as_deref(), "run")?;
            let max_iter = max_iter.unwrap_or(backend.default_max_iter());
            let report = run_kind(backend, control, seed, max_iter, &config, log.as_mut())?;
            eprintln!(
                "{backend} [{}] seed={seed}: ticks={} cost={} bifurcation_ticks={}",
                control.as_str(),
                report.ticks,
                report.cost,
                report.engine.bifurcation_ticks
            );
            close_log(log.as_mut())?;
            write_or_print(output.as_deref(), &serde_json::to_string_pretty(&report)?)?;
        }
        Command::Compare {
            backend,
            seed,
            max_iter,
            output,
        } => {
            let mut log = open_log(cli.log.as_deref(), "compare")?;
            let max_iter = max_iter.unwrap_or(backend.default_max_iter());
            let cmp = compare(backend, seed, max_iter, &config, log.as_mut())?;
            eprintln!("=== {backend} (seed={seed}) ===");
            eprintln!("Baseline cost: {}", cmp.baseline_cost);
            eprintln!("DN cost:       {}", cmp.dn_cost);
            eprintln!("CR:            {:.3}", cmp.cr);
            close_log(log.as_mut())?;
            write_or_print(output.as_deref(), &serde_json::to_string_pretty(&cmp)?)?;
        }
        Command::Batch {
            backend,
            seeds,
            max_iter,
            out_dir,
        } => {
            let seeds = parse_seeds(&seeds)?;
            let mut log = open_log(cli.log.as_deref(), "batch")?;
            let max_iter = max_iter.unwrap_or(backend.default_max_iter());
            eprintln!("Running {backend} batch over {} seeds", seeds.len());
            let report = run_batch(backend, &seeds, max_iter, &config, log.as_mut())?;
            for row in &report.rows {
                eprintln!(
                    "seed={:02}  baseline={:5}  dn={:5}  CR={:7.3}",
                    row.seed, row.baseline_cost, row.dn_cost, row.cr
                );
            }
            let s = &report.summary;
            eprintln!(
                "Runs: {}  mean CR {:.3}  median {:.3}  min {:.3}  max {:.3}",
                s.runs, s.mean_cr, s.median_cr, s.min_cr, s.max_cr
            );
            let index = report.write_to_dir(&out_dir)?;
            for artifact in &index.artifacts {
                eprintln!("Wrote {}", out_dir.join(&artifact.path).display());
            }
            close_log(log.as_mut())?;
        }
        Command::Pulse {
            backend,
            control,
            seed,
            max_iter,
            output,
        } => {
            let mut log = open_log(cli.log.as_deref(), "pulse")?;
            let max_iter = max_iter.unwrap_or(backend.default_max_iter());
            let report = run_kind(backend, control, seed, max_iter, &config, log.as_mut())?;
            close_log(log.as_mut())?;
            write_or_print(output.as_deref(), &serde_json::to_string_pretty(&report.pulse)?)?;
        }
        Command::DeterminismProofs {
            seed,
            steps,
            proof_log,
            report,
        } => {
            eprintln!("Running determinism proofs: seed={seed:#x} steps={steps}");
            let result =
                determinism_proofs::run_and_write(&config, seed, steps, &proof_log, &report)?;
            eprintln!(
                "checks: {} passed, {} failed; replay mismatches: {}; digest {}",
                result.summary.passed,
                result.summary.failed,
                result.replay_mismatches,
                result.digest
            );
            eprintln!("Wrote {} and {}", proof_log.display(), report.display());
            if !result.passed() {
                return Err(format!("determinism proofs failed: {:?}", result.failures).into());
            }
        }
    }

    Ok(())
}
