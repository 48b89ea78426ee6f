use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, params};
use tracing::warn;

use crate::model::{
    CompleteRecord, StoreCounts, StoredDocument, TriageRecord, TriageSummary,
};
use crate::util::ensure_directory;

const DB_SCHEMA_VERSION: &str = "0.1.0";

const TRIAGE_DOC_TYPE: &str = "triage";
const COMPLETE_DOC_TYPE: &str = "complete";

/// Row id of a newly appended document.
pub type DocumentHandle = i64;

/// Append-only store of triage and complete documents. Every save is a new
/// row; nothing is ever updated in place, so re-running a stage adds to the
/// audit trail instead of rewriting it. Single-statement inserts keep each
/// write atomic from any reader's perspective.
pub struct ResultStore {
    connection: Connection,
}

impl ResultStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            ensure_directory(parent)?;
        }

        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;

        Ok(Self { connection })
    }

    pub fn open_read_only(db_path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open store read-only: {}", db_path.display()))?;

        Ok(Self { connection })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory store")?;
        ensure_schema(&connection)?;

        Ok(Self { connection })
    }

    pub fn save_triage(&self, record: &TriageRecord) -> Result<DocumentHandle> {
        let document = serde_json::to_string(&StoredDocument::Triage(record.clone()))
            .context("failed to serialize triage document")?;

        self.connection
            .execute(
                "INSERT INTO documents(hand_id, doc_type, deviation_score, persisted_at, document)
                 VALUES(?1, ?2, ?3, ?4, ?5)",
                params![
                    record.hand.hand_id,
                    TRIAGE_DOC_TYPE,
                    record.deviation_score,
                    record.persisted_at,
                    document
                ],
            )
            .context("failed to append triage document")?;

        Ok(self.connection.last_insert_rowid())
    }

    pub fn save_complete(&self, record: &CompleteRecord) -> Result<DocumentHandle> {
        let document = serde_json::to_string(&StoredDocument::Complete(record.clone()))
            .context("failed to serialize complete document")?;

        self.connection
            .execute(
                "INSERT INTO documents(hand_id, doc_type, deviation_score, persisted_at, document)
                 VALUES(?1, ?2, ?3, ?4, ?5)",
                params![
                    record.triage.hand.hand_id,
                    COMPLETE_DOC_TYPE,
                    record.triage.deviation_score,
                    record.persisted_at,
                    document
                ],
            )
            .context("failed to append complete document")?;

        Ok(self.connection.last_insert_rowid())
    }

    pub fn list_triage(&self, min_score: f64) -> Result<Vec<TriageSummary>> {
        let records = self.triage_above(min_score)?;

        Ok(records
            .into_iter()
            .map(|record| TriageSummary {
                hand_id: record.hand.hand_id,
                stakes: record.hand.stakes,
                game_type: record.hand.game_type,
                deviation_score: record.deviation_score,
                persisted_at: record.persisted_at,
            })
            .collect())
    }

    /// Full triage records at or above `min_score`, highest deviation first;
    /// ties broken by persistence time, then insertion order, most recent
    /// first. Unreadable rows are skipped with a warning, never fatal.
    pub fn triage_above(&self, min_score: f64) -> Result<Vec<TriageRecord>> {
        let mut statement = self.connection.prepare(
            "SELECT id, document FROM documents
             WHERE doc_type = ?1 AND deviation_score >= ?2
             ORDER BY deviation_score DESC, persisted_at DESC, id DESC",
        )?;
        let mut rows = statement.query(params![TRIAGE_DOC_TYPE, min_score])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let row_id: i64 = row.get(0)?;
            let document: String = row.get(1)?;

            match serde_json::from_str::<StoredDocument>(&document) {
                Ok(StoredDocument::Triage(record)) => records.push(record),
                Ok(StoredDocument::Complete(_)) => {
                    warn!(row_id, "complete document stored under triage type; skipping")
                }
                Err(err) => {
                    warn!(row_id, error = %err, "skipping unreadable stored document")
                }
            }
        }

        Ok(records)
    }

    /// Most recent triage record for a hand, if any.
    pub fn find_triage(&self, hand_id: &str) -> Result<Option<TriageRecord>> {
        Ok(match self.find_latest(hand_id, TRIAGE_DOC_TYPE)? {
            Some(StoredDocument::Triage(record)) => Some(record),
            _ => None,
        })
    }

    /// Most recent complete record for a hand, if any.
    pub fn find_complete(&self, hand_id: &str) -> Result<Option<CompleteRecord>> {
        Ok(match self.find_latest(hand_id, COMPLETE_DOC_TYPE)? {
            Some(StoredDocument::Complete(record)) => Some(record),
            _ => None,
        })
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            triage_documents: self.count_documents(TRIAGE_DOC_TYPE)?,
            complete_documents: self.count_documents(COMPLETE_DOC_TYPE)?,
            distinct_hands: self.connection.query_row(
                "SELECT COUNT(DISTINCT hand_id) FROM documents",
                [],
                |row| row.get(0),
            )?,
        })
    }

    fn find_latest(&self, hand_id: &str, doc_type: &str) -> Result<Option<StoredDocument>> {
        let mut statement = self.connection.prepare(
            "SELECT id, document FROM documents
             WHERE hand_id = ?1 AND doc_type = ?2
             ORDER BY persisted_at DESC, id DESC",
        )?;
        let mut rows = statement.query(params![hand_id, doc_type])?;

        while let Some(row) = rows.next()? {
            let row_id: i64 = row.get(0)?;
            let document: String = row.get(1)?;

            match serde_json::from_str(&document) {
                Ok(doc) => return Ok(Some(doc)),
                Err(err) => {
                    warn!(row_id, error = %err, "skipping unreadable stored document")
                }
            }
        }

        Ok(None)
    }

    fn count_documents(&self, doc_type: &str) -> Result<i64> {
        let count = self.connection.query_row(
            "SELECT COUNT(*) FROM documents WHERE doc_type = ?1",
            [doc_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS documents (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          hand_id TEXT NOT NULL,
          doc_type TEXT NOT NULL,
          deviation_score REAL NOT NULL,
          persisted_at TEXT NOT NULL,
          document TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_type_score
          ON documents(doc_type, deviation_score);
        CREATE INDEX IF NOT EXISTS idx_documents_hand_type
          ON documents(hand_id, doc_type, persisted_at);
        ",
    )?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{GameType, HandRecord, SolverResult};

    fn triage(hand_id: &str, score: f64, persisted_at: &str) -> TriageRecord {
        TriageRecord {
            hand: HandRecord {
                hand_id: hand_id.to_string(),
                observed_at: "2026-08-04T10:00:00Z".to_string(),
                stakes: "$1/2".to_string(),
                game_type: GameType::Holdem,
                raw_text: format!("Hand #{hand_id} - $1/$2 Holdem"),
            },
            solver: SolverResult {
                hand_id: hand_id.to_string(),
                narrative: "line reviewed".to_string(),
                ranges: BTreeMap::new(),
                frequencies: BTreeMap::new(),
                ev_deltas: BTreeMap::new(),
                latency_seconds: 1.0,
            },
            deviation_score: score,
            persisted_at: persisted_at.to_string(),
        }
    }

    fn complete(hand_id: &str, text: &str, persisted_at: &str) -> CompleteRecord {
        CompleteRecord {
            triage: triage(hand_id, 1.0, "2026-08-04T10:00:00Z"),
            explanation_text: text.to_string(),
            persisted_at: persisted_at.to_string(),
        }
    }

    #[test]
    fn saves_are_append_only() {
        let store = ResultStore::open_in_memory().expect("store opens");

        let first = store
            .save_triage(&triage("h1", 1.0, "2026-08-04T10:00:00Z"))
            .expect("first save");
        let second = store
            .save_triage(&triage("h1", 2.0, "2026-08-04T11:00:00Z"))
            .expect("second save");

        assert_ne!(first, second);
        assert_eq!(store.list_triage(0.0).expect("listing").len(), 2);
    }

    #[test]
    fn list_triage_filters_and_sorts_by_score_descending() {
        let store = ResultStore::open_in_memory().expect("store opens");
        store
            .save_triage(&triage("low", 0.5, "2026-08-04T10:00:00Z"))
            .expect("save");
        store
            .save_triage(&triage("high", 4.2, "2026-08-04T10:01:00Z"))
            .expect("save");
        store
            .save_triage(&triage("mid", 2.0, "2026-08-04T10:02:00Z"))
            .expect("save");

        let all = store.list_triage(0.0).expect("listing");
        let ids: Vec<&str> = all.iter().map(|entry| entry.hand_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);

        let filtered = store.list_triage(2.0).expect("filtered listing");
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|entry| entry.deviation_score >= 2.0));
    }

    #[test]
    fn equal_scores_order_most_recent_first() {
        let store = ResultStore::open_in_memory().expect("store opens");
        store
            .save_triage(&triage("older", 1.5, "2026-08-04T10:00:00Z"))
            .expect("save");
        store
            .save_triage(&triage("newer", 1.5, "2026-08-04T11:00:00Z"))
            .expect("save");

        let listing = store.list_triage(0.0).expect("listing");
        assert_eq!(listing[0].hand_id, "newer");
        assert_eq!(listing[1].hand_id, "older");
    }

    #[test]
    fn listing_is_stable_across_repeated_calls() {
        let store = ResultStore::open_in_memory().expect("store opens");
        store
            .save_triage(&triage("a", 3.0, "2026-08-04T10:00:00Z"))
            .expect("save");
        store
            .save_triage(&triage("b", 3.0, "2026-08-04T10:00:00Z"))
            .expect("save");

        let first: Vec<String> = store
            .list_triage(0.0)
            .expect("listing")
            .into_iter()
            .map(|entry| entry.hand_id)
            .collect();
        let second: Vec<String> = store
            .list_triage(0.0)
            .expect("listing")
            .into_iter()
            .map(|entry| entry.hand_id)
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_document_is_skipped_not_fatal() {
        let store = ResultStore::open_in_memory().expect("store opens");
        store
            .save_triage(&triage("good", 1.0, "2026-08-04T10:00:00Z"))
            .expect("save");
        store
            .connection
            .execute(
                "INSERT INTO documents(hand_id, doc_type, deviation_score, persisted_at, document)
                 VALUES('bad', 'triage', 9.0, '2026-08-04T10:01:00Z', '{not json')",
                [],
            )
            .expect("raw insert");

        let listing = store.list_triage(0.0).expect("listing survives corruption");
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].hand_id, "good");
    }

    #[test]
    fn find_complete_returns_most_recent() {
        let store = ResultStore::open_in_memory().expect("store opens");
        store
            .save_complete(&complete("h1", "first pass", "2026-08-04T10:00:00Z"))
            .expect("save");
        store
            .save_complete(&complete("h1", "second pass", "2026-08-04T11:00:00Z"))
            .expect("save");

        let found = store
            .find_complete("h1")
            .expect("lookup")
            .expect("record present");
        assert_eq!(found.explanation_text, "second pass");

        assert!(store.find_complete("missing").expect("lookup").is_none());
    }

    #[test]
    fn find_triage_returns_most_recent() {
        let store = ResultStore::open_in_memory().expect("store opens");
        store
            .save_triage(&triage("h1", 1.0, "2026-08-04T10:00:00Z"))
            .expect("save");
        store
            .save_triage(&triage("h1", 2.5, "2026-08-04T11:00:00Z"))
            .expect("save");

        let found = store
            .find_triage("h1")
            .expect("lookup")
            .expect("record present");
        assert_eq!(found.deviation_score, 2.5);
    }

    #[test]
    fn counts_reflect_document_types() {
        let store = ResultStore::open_in_memory().expect("store opens");
        store
            .save_triage(&triage("h1", 1.0, "2026-08-04T10:00:00Z"))
            .expect("save");
        store
            .save_triage(&triage("h2", 2.0, "2026-08-04T10:01:00Z"))
            .expect("save");
        store
            .save_complete(&complete("h1", "text", "2026-08-04T10:02:00Z"))
            .expect("save");

        let counts = store.counts().expect("counts");
        assert_eq!(counts.triage_documents, 2);
        assert_eq!(counts.complete_documents, 1);
        assert_eq!(counts.distinct_hands, 2);
    }

    #[test]
    fn stored_document_round_trips_through_json() {
        let record = triage("h1", 3.25, "2026-08-04T10:00:00Z");
        let json =
            serde_json::to_string(&StoredDocument::Triage(record.clone())).expect("serializes");

        assert!(json.contains("\"doc_type\":\"triage\""));

        let parsed: StoredDocument = serde_json::from_str(&json).expect("parses");
        match parsed {
            StoredDocument::Triage(parsed_record) => {
                assert_eq!(parsed_record.hand.hand_id, record.hand.hand_id);
                assert_eq!(parsed_record.deviation_score, record.deviation_score);
                assert_eq!(parsed_record.hand.raw_text, record.hand.raw_text);
            }
            StoredDocument::Complete(_) => panic!("expected triage document"),
        }
    }
}
