use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::model::{
    CompleteRecord, ExplainOutcome, ExplainRunSummary, ExplainState, HandOutcome, HandRecord,
    HandState, SolveRunSummary, SolverResult, TriageRecord,
};
use crate::parser::HandParser;
use crate::scorer::deviation_score;
use crate::solver::SolveFailure;
use crate::store::ResultStore;
use crate::util::now_utc_string;

/// Seam for the equilibrium-solving service; the real HTTP client implements
/// this, tests substitute in-memory doubles.
pub trait SolveService {
    fn probe(&self) -> bool;
    fn submit(&self, record: &HandRecord) -> std::result::Result<SolverResult, SolveFailure>;
}

/// Seam for the natural-language explanation service.
pub trait ExplainService {
    fn explain(&self, hand: &HandRecord, solver: &SolverResult) -> Result<String>;
}

/// Stage-2 hand selection. Exactly one policy per invocation, by construction.
#[derive(Debug, Clone)]
pub enum Selection {
    Hands(Vec<String>),
    Top(usize),
    MinScore(f64),
}

impl Selection {
    pub fn describe(&self) -> String {
        match self {
            Self::Hands(hand_ids) => format!("hands: {}", hand_ids.join(",")),
            Self::Top(count) => format!("top {count} by deviation"),
            Self::MinScore(min_score) => format!("deviation >= {min_score}"),
        }
    }
}

/// Stage 1: parse, solve, and score every input file in order, persisting one
/// triage record per solved hand. One hand's failure never aborts the rest of
/// the batch; an unavailable solver aborts before any submission is attempted.
/// Re-runs append new records rather than deduplicating against prior runs.
pub fn run_solve_batch(
    store: &ResultStore,
    solver: &dyn SolveService,
    parser: &HandParser,
    files: &[PathBuf],
) -> Result<SolveRunSummary> {
    let mut summary = SolveRunSummary {
        files_discovered: files.len(),
        ..SolveRunSummary::default()
    };

    if files.is_empty() {
        warn!("no hand files to process");
        return Ok(summary);
    }

    if !solver.probe() {
        bail!("solver is unavailable; aborting batch before any submission");
    }

    for path in files {
        let source_file = path.display().to_string();

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %source_file, error = %err, "skipping unreadable hand file");
                summary.files_unreadable += 1;
                summary
                    .warnings
                    .push(format!("unreadable hand file {source_file}: {err}"));
                continue;
            }
        };

        let hand = parser.parse(&text);
        summary.hands_attempted += 1;
        info!(hand_id = %hand.hand_id, file = %source_file, "submitting hand to solver");

        match solver.submit(&hand) {
            Ok(result) => {
                let score = deviation_score(&result);
                let record = TriageRecord {
                    hand,
                    solver: result,
                    deviation_score: score,
                    persisted_at: now_utc_string(),
                };
                store.save_triage(&record)?;

                info!(hand_id = %record.hand.hand_id, deviation_score = score, "hand scored");
                summary.hands_scored += 1;
                summary.outcomes.push(HandOutcome {
                    source_file,
                    hand_id: record.hand.hand_id,
                    state: HandState::Scored,
                    deviation_score: Some(score),
                    failure_reason: None,
                    failure_detail: None,
                });
            }
            Err(failure) => {
                warn!(
                    hand_id = %hand.hand_id,
                    reason = failure.reason.as_str(),
                    detail = %failure.detail,
                    "solver analysis failed; continuing batch"
                );
                debug!(payload = %failure.payload, "failed submission payload");

                summary.hands_failed += 1;
                summary.outcomes.push(HandOutcome {
                    source_file,
                    hand_id: hand.hand_id,
                    state: HandState::SolveFailed,
                    deviation_score: None,
                    failure_reason: Some(failure.reason.as_str().to_string()),
                    failure_detail: Some(failure.detail),
                });
            }
        }
    }

    info!(
        attempted = summary.hands_attempted,
        scored = summary.hands_scored,
        failed = summary.hands_failed,
        unreadable = summary.files_unreadable,
        "solve batch complete"
    );

    Ok(summary)
}

/// Stage 2: explain the selected hands from their stored triage records and
/// append one complete record per success. Hands without a triage record are
/// reported as not found; per-hand explanation failures are captured and the
/// batch continues.
pub fn run_explanations(
    store: &ResultStore,
    explainer: &dyn ExplainService,
    selection: &Selection,
) -> Result<ExplainRunSummary> {
    let (records, not_found) = select_triage_records(store, selection)?;

    let mut summary = ExplainRunSummary {
        requested: records.len() + not_found.len(),
        ..ExplainRunSummary::default()
    };

    for hand_id in not_found {
        warn!(hand_id = %hand_id, "no triage record found for requested hand");
        summary.not_found += 1;
        summary.outcomes.push(ExplainOutcome {
            hand_id,
            state: ExplainState::NotFound,
            failure: None,
        });
    }

    for record in records {
        info!(
            hand_id = %record.hand.hand_id,
            deviation_score = record.deviation_score,
            "requesting explanation"
        );

        match explainer.explain(&record.hand, &record.solver) {
            Ok(explanation_text) => {
                let hand_id = record.hand.hand_id.clone();
                let complete = CompleteRecord {
                    triage: record,
                    explanation_text,
                    persisted_at: now_utc_string(),
                };
                store.save_complete(&complete)?;

                summary.explained += 1;
                summary.outcomes.push(ExplainOutcome {
                    hand_id,
                    state: ExplainState::Explained,
                    failure: None,
                });
            }
            Err(err) => {
                warn!(hand_id = %record.hand.hand_id, error = %err, "explanation failed; continuing");
                summary.failed += 1;
                summary.outcomes.push(ExplainOutcome {
                    hand_id: record.hand.hand_id.clone(),
                    state: ExplainState::ExplainFailed,
                    failure: Some(format!("{err:#}")),
                });
            }
        }
    }

    info!(
        requested = summary.requested,
        explained = summary.explained,
        not_found = summary.not_found,
        failed = summary.failed,
        "explanation batch complete"
    );

    Ok(summary)
}

/// Resolve a selection into full triage records plus the ids that had none.
/// Each hand is selected at most once per run, keeping its highest-ranked
/// record, so the explanation service is called once per selected hand.
fn select_triage_records(
    store: &ResultStore,
    selection: &Selection,
) -> Result<(Vec<TriageRecord>, Vec<String>)> {
    match selection {
        Selection::Hands(hand_ids) => {
            let mut seen = HashSet::new();
            let mut records = Vec::new();
            let mut not_found = Vec::new();

            for hand_id in hand_ids {
                if !seen.insert(hand_id.clone()) {
                    continue;
                }
                match store.find_triage(hand_id)? {
                    Some(record) => records.push(record),
                    None => not_found.push(hand_id.clone()),
                }
            }

            Ok((records, not_found))
        }
        Selection::Top(count) => {
            let mut records = dedupe_by_hand(store.triage_above(0.0)?);
            records.truncate(*count);
            Ok((records, Vec::new()))
        }
        Selection::MinScore(min_score) => {
            Ok((dedupe_by_hand(store.triage_above(*min_score)?), Vec::new()))
        }
    }
}

fn dedupe_by_hand(records: Vec<TriageRecord>) -> Vec<TriageRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.hand.hand_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::path::Path;

    use anyhow::bail;

    use super::*;
    use crate::model::GameType;
    use crate::solver::FailureReason;

    struct StubSolver {
        available: bool,
        submissions: RefCell<Vec<String>>,
    }

    impl StubSolver {
        fn new(available: bool) -> Self {
            Self {
                available,
                submissions: RefCell::new(Vec::new()),
            }
        }
    }

    impl SolveService for StubSolver {
        fn probe(&self) -> bool {
            self.available
        }

        fn submit(
            &self,
            record: &HandRecord,
        ) -> std::result::Result<SolverResult, SolveFailure> {
            self.submissions.borrow_mut().push(record.hand_id.clone());

            if record.raw_text.contains("SOLVER-BREAKS-HERE") {
                return Err(SolveFailure {
                    reason: FailureReason::Timeout,
                    detail: "timed out after 1s".to_string(),
                    payload: String::new(),
                });
            }

            Ok(SolverResult {
                hand_id: record.hand_id.clone(),
                narrative: "reviewed".to_string(),
                ranges: BTreeMap::new(),
                frequencies: BTreeMap::from([("bet".to_string(), 1.0)]),
                ev_deltas: BTreeMap::from([("flop".to_string(), -0.1)]),
                latency_seconds: 1.0,
            })
        }
    }

    struct StubExplainer {
        fail_for: Option<String>,
        calls: RefCell<usize>,
    }

    impl StubExplainer {
        fn new() -> Self {
            Self {
                fail_for: None,
                calls: RefCell::new(0),
            }
        }

        fn failing_for(hand_id: &str) -> Self {
            Self {
                fail_for: Some(hand_id.to_string()),
                calls: RefCell::new(0),
            }
        }
    }

    impl ExplainService for StubExplainer {
        fn explain(&self, hand: &HandRecord, _solver: &SolverResult) -> Result<String> {
            *self.calls.borrow_mut() += 1;
            let call = *self.calls.borrow();

            if self.fail_for.as_deref() == Some(hand.hand_id.as_str()) {
                bail!("explanation service rejected the request");
            }

            Ok(format!("explanation #{call} for {}", hand.hand_id))
        }
    }

    fn temp_hand_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "gto-triage-test-{}-{tag}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("temp dir created");
        dir
    }

    fn write_hand(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("hand file written");
        path
    }

    fn seed_triage(store: &ResultStore, hand_id: &str, score: f64) {
        let record = TriageRecord {
            hand: HandRecord {
                hand_id: hand_id.to_string(),
                observed_at: "2026-08-04T10:00:00Z".to_string(),
                stakes: "$1/2".to_string(),
                game_type: GameType::Holdem,
                raw_text: format!("Hand #{hand_id} - $1/$2 Holdem"),
            },
            solver: SolverResult {
                hand_id: hand_id.to_string(),
                narrative: "reviewed".to_string(),
                ranges: BTreeMap::new(),
                frequencies: BTreeMap::new(),
                ev_deltas: BTreeMap::new(),
                latency_seconds: 1.0,
            },
            deviation_score: score,
            persisted_at: now_utc_string(),
        };
        store.save_triage(&record).expect("seed triage saved");
    }

    #[test]
    fn unavailable_solver_aborts_before_any_submission() {
        let dir = temp_hand_dir("probe-gate");
        let file = write_hand(&dir, "hand1.txt", "Hand #1 - $1/$2 Holdem");

        let store = ResultStore::open_in_memory().expect("store opens");
        let solver = StubSolver::new(false);
        let parser = HandParser::new().expect("parser builds");

        let result = run_solve_batch(&store, &solver, &parser, &[file]);

        assert!(result.is_err());
        assert!(solver.submissions.borrow().is_empty());
        assert!(store.list_triage(0.0).expect("listing").is_empty());
    }

    #[test]
    fn empty_batch_completes_without_probing() {
        let store = ResultStore::open_in_memory().expect("store opens");
        let solver = StubSolver::new(false);
        let parser = HandParser::new().expect("parser builds");

        let summary = run_solve_batch(&store, &solver, &parser, &[]).expect("empty batch ok");

        assert_eq!(summary.files_discovered, 0);
        assert_eq!(summary.hands_attempted, 0);
    }

    #[test]
    fn mixed_batch_records_one_failure_and_one_success() {
        let dir = temp_hand_dir("mixed");
        let good = write_hand(&dir, "good.txt", "Hand #good1 - $1/$2 Holdem\nHero folds");
        let bad = write_hand(
            &dir,
            "bad.txt",
            "Hand #bad1 - $1/$2 Holdem\nSOLVER-BREAKS-HERE",
        );

        let store = ResultStore::open_in_memory().expect("store opens");
        let solver = StubSolver::new(true);
        let parser = HandParser::new().expect("parser builds");

        let summary =
            run_solve_batch(&store, &solver, &parser, &[good, bad]).expect("batch completes");

        assert_eq!(summary.hands_attempted, 2);
        assert_eq!(summary.hands_scored, 1);
        assert_eq!(summary.hands_failed, 1);

        let scored: Vec<_> = summary
            .outcomes
            .iter()
            .filter(|outcome| outcome.state == HandState::Scored)
            .collect();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].hand_id, "good1");
        // ev -0.1 -> 1.0, pure-strategy frequency -> 0.5
        assert_eq!(scored[0].deviation_score, Some(1.5));

        let failed: Vec<_> = summary
            .outcomes
            .iter()
            .filter(|outcome| outcome.state == HandState::SolveFailed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].failure_reason.as_deref(), Some("timeout"));

        let listing = store.list_triage(0.0).expect("listing");
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].hand_id, "good1");
    }

    #[test]
    fn unreadable_file_is_counted_and_batch_continues() {
        let dir = temp_hand_dir("unreadable");
        let good = write_hand(&dir, "good.txt", "Hand #ok - $1/$2 Holdem");
        let missing = dir.join("does-not-exist.txt");

        let store = ResultStore::open_in_memory().expect("store opens");
        let solver = StubSolver::new(true);
        let parser = HandParser::new().expect("parser builds");

        let summary =
            run_solve_batch(&store, &solver, &parser, &[missing, good]).expect("batch completes");

        assert_eq!(summary.files_unreadable, 1);
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.hands_scored, 1);
        assert_eq!(solver.submissions.borrow().len(), 1);
    }

    #[test]
    fn top_selection_explains_highest_scores_first() {
        let store = ResultStore::open_in_memory().expect("store opens");
        seed_triage(&store, "low", 1.0);
        seed_triage(&store, "high", 5.0);
        seed_triage(&store, "mid", 3.0);

        let explainer = StubExplainer::new();
        let summary = run_explanations(&store, &explainer, &Selection::Top(2))
            .expect("explanations complete");

        assert_eq!(summary.explained, 2);
        assert_eq!(*explainer.calls.borrow(), 2);
        assert!(store.find_complete("high").expect("lookup").is_some());
        assert!(store.find_complete("mid").expect("lookup").is_some());
        assert!(store.find_complete("low").expect("lookup").is_none());
    }

    #[test]
    fn min_score_selection_filters_below_threshold() {
        let store = ResultStore::open_in_memory().expect("store opens");
        seed_triage(&store, "low", 0.4);
        seed_triage(&store, "high", 2.1);

        let explainer = StubExplainer::new();
        let summary = run_explanations(&store, &explainer, &Selection::MinScore(1.0))
            .expect("explanations complete");

        assert_eq!(summary.explained, 1);
        assert!(store.find_complete("high").expect("lookup").is_some());
        assert!(store.find_complete("low").expect("lookup").is_none());
    }

    #[test]
    fn missing_hand_is_reported_not_found() {
        let store = ResultStore::open_in_memory().expect("store opens");
        seed_triage(&store, "present", 1.0);

        let explainer = StubExplainer::new();
        let selection =
            Selection::Hands(vec!["present".to_string(), "ghost".to_string()]);
        let summary =
            run_explanations(&store, &explainer, &selection).expect("explanations complete");

        assert_eq!(summary.requested, 2);
        assert_eq!(summary.explained, 1);
        assert_eq!(summary.not_found, 1);
        assert!(
            summary
                .outcomes
                .iter()
                .any(|outcome| outcome.hand_id == "ghost"
                    && outcome.state == ExplainState::NotFound)
        );
        assert!(store.find_complete("ghost").expect("lookup").is_none());
    }

    #[test]
    fn rerunning_explanation_appends_a_second_record() {
        let store = ResultStore::open_in_memory().expect("store opens");
        seed_triage(&store, "h1", 2.0);

        let explainer = StubExplainer::new();
        let selection = Selection::Hands(vec!["h1".to_string()]);

        run_explanations(&store, &explainer, &selection).expect("first run");
        run_explanations(&store, &explainer, &selection).expect("second run");

        let counts = store.counts().expect("counts");
        assert_eq!(counts.complete_documents, 2);

        let latest = store
            .find_complete("h1")
            .expect("lookup")
            .expect("record present");
        assert_eq!(latest.explanation_text, "explanation #2 for h1");
    }

    #[test]
    fn explanation_failure_is_captured_and_batch_continues() {
        let store = ResultStore::open_in_memory().expect("store opens");
        seed_triage(&store, "fine", 2.0);
        seed_triage(&store, "broken", 5.0);

        let explainer = StubExplainer::failing_for("broken");
        let summary = run_explanations(&store, &explainer, &Selection::MinScore(0.0))
            .expect("explanations complete");

        assert_eq!(summary.explained, 1);
        assert_eq!(summary.failed, 1);
        assert!(store.find_complete("fine").expect("lookup").is_some());
        assert!(store.find_complete("broken").expect("lookup").is_none());
    }

    #[test]
    fn repeated_triage_records_explain_each_hand_once() {
        let store = ResultStore::open_in_memory().expect("store opens");
        seed_triage(&store, "h1", 1.0);
        seed_triage(&store, "h1", 3.0);

        let explainer = StubExplainer::new();
        let summary = run_explanations(&store, &explainer, &Selection::MinScore(0.0))
            .expect("explanations complete");

        assert_eq!(summary.explained, 1);
        assert_eq!(*explainer.calls.borrow(), 1);
    }
}
