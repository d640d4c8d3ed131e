//! Report types for comparisons and seed batches.
//!
//! A batch renders three ways: CSV (one row per seed), pretty JSON (rows,
//! summary and an example pulse pair), and a Markdown table for humans.

use std::fmt::Write as _;
use std::path::Path;

use dn_backends::TickMetrics;
use serde::Serialize;

use crate::error::HarnessError;
use crate::structured_log::ArtifactIndex;

pub const CSV_HEADER: &str = "seed,baseline_cost,dn_cost,cr";

/// ΔN/ΔD trace of one run, as observed before each tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PulseSeries {
    pub t: Vec<u32>,
    #[serde(rename = "deltaN")]
    pub delta_n: Vec<f64>,
    #[serde(rename = "deltaD")]
    pub delta_d: Vec<f64>,
}

impl PulseSeries {
    #[must_use]
    pub fn from_logs<M: TickMetrics>(logs: &[M]) -> Self {
        let mut pulse = Self {
            t: Vec::with_capacity(logs.len()),
            delta_n: Vec::with_capacity(logs.len()),
            delta_d: Vec::with_capacity(logs.len()),
        };
        for m in logs {
            pulse.t.push(m.tick());
            pulse.delta_n.push(m.delta_n());
            pulse.delta_d.push(m.delta_d());
        }
        pulse
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}

/// `baseline / max(dn, 1)`.
#[must_use]
pub fn compression_ratio(baseline_cost: u64, dn_cost: u64) -> f64 {
    baseline_cost as f64 / dn_cost.max(1) as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchRow {
    pub seed: u64,
    pub baseline_cost: u64,
    pub dn_cost: u64,
    pub cr: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchSummary {
    pub runs: usize,
    pub mean_cr: f64,
    pub median_cr: f64,
    pub min_cr: f64,
    pub max_cr: f64,
}

impl BatchSummary {
    /// `None` for an empty slice.
    #[must_use]
    pub fn from_ratios(crs: &[f64]) -> Option<Self> {
        if crs.is_empty() {
            return None;
        }
        let mut sorted = crs.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        Some(Self {
            runs: n,
            mean_cr: sorted.iter().sum::<f64>() / n as f64,
            median_cr: median,
            min_cr: sorted[0],
            max_cr: sorted[n - 1],
        })
    }
}

/// Baseline and regulated pulse traces for one seed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PulsePair {
    pub seed: u64,
    pub baseline: PulseSeries,
    pub dn: PulseSeries,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub schema_version: &'static str,
    pub backend: &'static str,
    pub max_iter: u32,
    pub generated_at: String,
    pub rows: Vec<BatchRow>,
    pub summary: BatchSummary,
    /// Pulses for the last seed in the batch.
    pub example: PulsePair,
}

impl BatchReport {
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(32 * (self.rows.len() + 1));
        out.push_str(CSV_HEADER);
        out.push('\n');
        for r in &self.rows {
            let _ = writeln!(out, "{},{},{},{:.6}", r.seed, r.baseline_cost, r.dn_cost, r.cr);
        }
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[must_use]
    pub fn to_markdown(&self) -> String {
        let s = &self.summary;
        let mut out = String::new();
        let _ = writeln!(out, "# DN batch: {}\n", self.backend);
        let _ = writeln!(out, "- Generated: {}", self.generated_at);
        let _ = writeln!(out, "- max_iter: {}\n", self.max_iter);
        out.push_str("| seed | baseline cost | dn cost | CR |\n");
        out.push_str("|---:|---:|---:|---:|\n");
        for r in &self.rows {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {:.3} |",
                r.seed, r.baseline_cost, r.dn_cost, r.cr
            );
        }
        out.push_str("\n## Summary\n\n");
        let _ = writeln!(out, "| runs | mean CR | median CR | min CR | max CR |");
        out.push_str("|---:|---:|---:|---:|---:|\n");
        let _ = writeln!(
            out,
            "| {} | {:.3} | {:.3} | {:.3} | {:.3} |",
            s.runs, s.mean_cr, s.median_cr, s.min_cr, s.max_cr
        );
        out
    }

    /// Write CSV, JSON, Markdown and an artifact index into `dir`.
    pub fn write_to_dir(&self, dir: &Path) -> Result<ArtifactIndex, HarnessError> {
        std::fs::create_dir_all(dir)?;
        let stem = format!("{}_batch", self.backend);
        let mut index = ArtifactIndex::new(stem.clone());
        for (ext, kind, body) in [
            ("csv", "csv", self.to_csv()),
            ("json", "report", self.to_json()?),
            ("md", "markdown", self.to_markdown()),
        ] {
            let name = format!("{stem}.{ext}");
            std::fs::write(dir.join(&name), &body)?;
            index.add(name, kind, body.as_bytes());
        }
        std::fs::write(dir.join(format!("{stem}.artifacts.json")), index.to_json()?)?;
        Ok(index)
    }
}
