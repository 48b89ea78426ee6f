use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::solver::{DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_SUBMIT_TIMEOUT_SECS};

#[derive(Parser, Debug)]
#[command(
    name = "gto-triage",
    version,
    about = "Two-stage poker hand triage: bulk solve-and-score, then selective AI explanation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Inventory(InventoryArgs),
    Solve(SolveArgs),
    List(ListArgs),
    Explain(ExplainArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, default_value = "hands")]
    pub hands_dir: PathBuf,

    #[arg(long, default_value = "txt")]
    pub extension: String,

    #[arg(long, default_value = ".cache/gto-triage")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SolveArgs {
    #[arg(long, default_value = "hands")]
    pub hands_dir: PathBuf,

    #[arg(long, default_value = "txt")]
    pub extension: String,

    #[arg(long, default_value = ".cache/gto-triage")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, env = "GTO_SOLVER_URL", default_value = "http://127.0.0.1:8080")]
    pub solver_url: String,

    /// Seconds-scale liveness probe budget; independent of the submit budget.
    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT_SECS)]
    pub probe_timeout_secs: u64,

    /// Minutes-scale per-hand solve budget.
    #[arg(long, default_value_t = DEFAULT_SUBMIT_TIMEOUT_SECS)]
    pub submit_timeout_secs: u64,

    #[arg(long)]
    pub run_manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, default_value = ".cache/gto-triage")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Minimum deviation score to show.
    #[arg(default_value_t = 0.0)]
    pub min_deviation: f64,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
#[command(group(
    ArgGroup::new("selection")
        .required(true)
        .args(["hands", "top", "min_score"])
))]
pub struct ExplainArgs {
    #[arg(long, default_value = ".cache/gto-triage")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Comma-separated hand ids to explain.
    #[arg(long, value_delimiter = ',')]
    pub hands: Vec<String>,

    /// Explain the top N hands by deviation score.
    #[arg(long)]
    pub top: Option<usize>,

    /// Explain every hand at or above this deviation score.
    #[arg(long)]
    pub min_score: Option<f64>,

    #[arg(
        long,
        env = "EXPLAIN_API_URL",
        default_value = "https://api.openai.com/v1/chat/completions"
    )]
    pub explain_url: String,

    #[arg(long, env = "EXPLAIN_MODEL", default_value = "gpt-4o")]
    pub explain_model: String,

    #[arg(long, default_value_t = 120)]
    pub explain_timeout_secs: u64,

    #[arg(long)]
    pub run_manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/gto-triage")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
