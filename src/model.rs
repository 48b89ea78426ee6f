use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    Holdem,
    Omaha,
    Unknown,
}

impl GameType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Holdem => "holdem",
            Self::Omaha => "omaha",
            Self::Unknown => "unknown",
        }
    }
}

/// One parsed hand. All derived fields are lossy best-effort extractions;
/// `raw_text` is the verbatim transcript and is never truncated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandRecord {
    pub hand_id: String,
    /// Parse-time timestamp; the raw text rarely carries a reliable one.
    pub observed_at: String,
    pub stakes: String,
    pub game_type: GameType,
    pub raw_text: String,
}

/// One completed solver round-trip. Empty maps are valid partial output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverResult {
    pub hand_id: String,
    pub narrative: String,
    pub ranges: BTreeMap<String, String>,
    pub frequencies: BTreeMap<String, f64>,
    pub ev_deltas: BTreeMap<String, f64>,
    pub latency_seconds: f64,
}

/// Stage-1 artifact. `deviation_score` is derived from the solver result and
/// recomputable from it; it is never edited independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageRecord {
    pub hand: HandRecord,
    pub solver: SolverResult,
    pub deviation_score: f64,
    pub persisted_at: String,
}

/// Stage-2 artifact. Re-running explanation appends a new record with a fresh
/// timestamp rather than replacing the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRecord {
    pub triage: TriageRecord,
    pub explanation_text: String,
    pub persisted_at: String,
}

/// Self-describing persisted document, tagged so either record can be
/// reconstructed without re-parsing the source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "doc_type", rename_all = "snake_case")]
pub enum StoredDocument {
    Triage(TriageRecord),
    Complete(CompleteRecord),
}

#[derive(Debug, Clone, Serialize)]
pub struct TriageSummary {
    pub hand_id: String,
    pub stakes: String,
    pub game_type: GameType,
    pub deviation_score: f64,
    pub persisted_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreCounts {
    pub triage_documents: i64,
    pub complete_documents: i64,
    pub distinct_hands: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandState {
    Scored,
    SolveFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandOutcome {
    pub source_file: String,
    pub hand_id: String,
    pub state: HandState,
    pub deviation_score: Option<f64>,
    pub failure_reason: Option<String>,
    pub failure_detail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolveRunSummary {
    pub files_discovered: usize,
    pub files_unreadable: usize,
    pub hands_attempted: usize,
    pub hands_scored: usize,
    pub hands_failed: usize,
    pub outcomes: Vec<HandOutcome>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainState {
    Explained,
    NotFound,
    ExplainFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainOutcome {
    pub hand_id: String,
    pub state: ExplainState,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplainRunSummary {
    pub requested: usize,
    pub explained: usize,
    pub not_found: usize,
    pub failed: usize,
    pub outcomes: Vec<ExplainOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandFileEntry {
    pub filename: String,
    pub sha256: String,
    pub hand_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub hand_count: usize,
    pub hands: Vec<HandFileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub solver_url: String,
    pub hands_dir: String,
    pub db_path: String,
    pub summary: SolveRunSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub explain_url: String,
    pub explain_model: String,
    pub selection: String,
    pub db_path: String,
    pub summary: ExplainRunSummary,
}
