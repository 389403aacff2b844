use tracing::{debug, warn};

use crate::db::repositories::kv_repository::{KvRepository, KvTable};
use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::assessment::SavedAssessment;

/// Key of the saved assessment collection in `local_store`.
pub const HISTORY_STORAGE_KEY: &str = "rubricai_assessments_v1";

/// Saved assessments, newest first. The collection is read and written whole.
#[derive(Clone)]
pub struct AssessmentHistoryService {
    db: DbPool,
}

impl AssessmentHistoryService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Saved records, newest first. An unreadable store reads as empty.
    pub fn list(&self) -> AppResult<Vec<SavedAssessment>> {
        let stored = self
            .db
            .with_connection(|conn| KvRepository::get(conn, KvTable::LocalStore, HISTORY_STORAGE_KEY));

        let row = match stored {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(Vec::new()),
            Err(err) => {
                warn!(
                    target: "app::history",
                    error = %err,
                    "assessment history store could not be read; treating as empty"
                );
                return Ok(Vec::new());
            }
        };

        match serde_json::from_str::<Vec<SavedAssessment>>(&row.value) {
            Ok(records) => Ok(records),
            Err(err) => {
                warn!(
                    target: "app::history",
                    error = %err,
                    "stored assessment history is unreadable; treating as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Inserts or replaces `record` and moves it to the front.
    pub fn save(&self, record: &SavedAssessment) -> AppResult<()> {
        let mut records = self.list()?;
        records.retain(|existing| existing.id != record.id);
        records.insert(0, record.clone());
        self.write_all(&records)?;

        debug!(
            target: "app::history",
            id = %record.id,
            total = records.len(),
            "assessment saved"
        );
        Ok(())
    }

    pub fn delete(&self, id: &str) -> AppResult<()> {
        let mut records = self.list()?;
        let before = records.len();
        records.retain(|record| record.id != id);
        if records.len() == before {
            debug!(target: "app::history", id = %id, "delete ignored for unknown assessment");
            return Ok(());
        }
        self.write_all(&records)
    }

    pub fn get_by_id(&self, id: &str) -> AppResult<Option<SavedAssessment>> {
        Ok(self.list()?.into_iter().find(|record| record.id == id))
    }

    fn write_all(&self, records: &[SavedAssessment]) -> AppResult<()> {
        let payload = serde_json::to_string(records)?;
        self.db.with_connection(|conn| {
            KvRepository::upsert(conn, KvTable::LocalStore, HISTORY_STORAGE_KEY, &payload)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::assessment::ScoreMap;
    use crate::models::rubric::ParsedRubric;
    use tempfile::TempDir;

    fn setup() -> (AssessmentHistoryService, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = DbPool::new(dir.path().join("history.sqlite")).unwrap();
        (AssessmentHistoryService::new(pool), dir)
    }

    fn record(id: &str, student: &str) -> SavedAssessment {
        SavedAssessment {
            id: id.to_string(),
            timestamp: 1_700_000_000_000,
            student_name: student.to_string(),
            date: "2024-05-01".to_string(),
            task: "Interview".to_string(),
            rubric: ParsedRubric::default(),
            scores: ScoreMap::new(),
            feedback: String::new(),
            strengths: String::new(),
            improvements: String::new(),
            total_score: 0,
            max_score: 0,
            average_score: "0.0".to_string(),
            student_reflection: None,
        }
    }

    #[test]
    fn empty_store_lists_nothing() {
        let (service, _dir) = setup();
        assert!(service.list().unwrap().is_empty());
        assert!(service.get_by_id("missing").unwrap().is_none());
    }

    #[test]
    fn resaving_moves_record_to_front_without_duplicates() {
        let (service, _dir) = setup();
        service.save(&record("a", "Ana")).unwrap();
        service.save(&record("b", "Ben")).unwrap();
        service.save(&record("a", "Ana Maria")).unwrap();

        let records = service.list().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(records[0].student_name, "Ana Maria");
    }

    #[test]
    fn corrupt_collection_reads_as_empty() {
        let (service, _dir) = setup();
        service
            .db
            .with_connection(|conn| {
                KvRepository::upsert(conn, KvTable::LocalStore, HISTORY_STORAGE_KEY, "{not json")
            })
            .unwrap();

        assert!(service.list().unwrap().is_empty());

        service.save(&record("c", "Cleo")).unwrap();
        assert_eq!(service.list().unwrap().len(), 1);
    }

    #[test]
    fn deleting_unknown_id_is_a_no_op() {
        let (service, _dir) = setup();
        service.save(&record("a", "Ana")).unwrap();
        service.delete("zzz").unwrap();
        assert_eq!(service.list().unwrap().len(), 1);

        service.delete("a").unwrap();
        assert!(service.list().unwrap().is_empty());
    }
}
