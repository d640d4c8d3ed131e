use dn_backends::ParamsError;
use dn_engine::ConfigError;
use thiserror::Error;

/// Failures surfaced by the harness. Tick-time engine code never fails; these
/// all come from configuration, I/O, or a run that did nothing.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("engine configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("backend parameters: {0}")]
    Backend(#[from] ParamsError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{backend} run with seed {seed} produced no ticks (max_iter = {max_iter})")]
    EmptyRun {
        backend: &'static str,
        seed: u64,
        max_iter: u32,
    },
    #[error("batch needs at least one seed")]
    EmptyBatch,
    #[error("invalid seed list `{0}`")]
    BadSeedList(String),
}
