use rubric_assessor_lib::commands::history::{history_get, history_list, history_save};
use rubric_assessor_lib::commands::AppState;
use rubric_assessor_lib::db::repositories::kv_repository::{KvRepository, KvTable};
use rubric_assessor_lib::db::DbPool;
use rubric_assessor_lib::models::assessment::{SavedAssessment, ScoreMap};
use rubric_assessor_lib::models::rubric::{ParsedRubric, Sheet};
use rubric_assessor_lib::services::assessment_session::AssessmentSession;
use rubric_assessor_lib::services::feedback_service::testing::config_for;
use rubric_assessor_lib::services::feedback_service::FeedbackService;
use rubric_assessor_lib::services::settings_service::SettingsService;
use rubric_assessor_lib::utils::crypto::CryptoVault;
use rubric_assessor_lib::services::history_service::{AssessmentHistoryService, HISTORY_STORAGE_KEY};
use chrono::{TimeZone, Utc};
use serde_json::Value as JsonValue;
use tempfile::tempdir;

fn record(id: &str, student: &str, timestamp: i64) -> SavedAssessment {
    SavedAssessment {
        id: id.to_string(),
        timestamp,
        student_name: student.to_string(),
        date: "2024-09-02".to_string(),
        task: "Interview".to_string(),
        rubric: ParsedRubric {
            title: "Quick Check".to_string(),
            criteria: Vec::new(),
        },
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
fn collection_is_stored_as_camel_case_json_array() {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("history.sqlite")).expect("db pool");
    let history = AssessmentHistoryService::new(pool.clone());

    history.save(&record("a", "Ana", 1)).expect("save a");
    history.save(&record("b", "Ben", 2)).expect("save b");

    let raw = pool
        .with_connection(|conn| KvRepository::get(conn, KvTable::LocalStore, HISTORY_STORAGE_KEY))
        .expect("read raw")
        .expect("collection present");
    let value: JsonValue = serde_json::from_str(&raw.value).expect("stored json");

    let array = value.as_array().expect("array");
    assert_eq!(array.len(), 2);
    assert_eq!(array[0]["id"], "b");
    assert_eq!(array[0]["studentName"], "Ben");
    assert_eq!(array[1]["averageScore"], "0.0");
    assert!(array[0].get("studentReflection").is_none());
}

#[test]
fn history_survives_reopening_the_database() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("history.sqlite");

    {
        let history = AssessmentHistoryService::new(DbPool::new(&path).expect("db pool"));
        history.save(&record("a", "Ana", 1)).expect("save");
    }

    let history = AssessmentHistoryService::new(DbPool::new(&path).expect("db pool"));
    let records = history.list().expect("list");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].student_name, "Ana");
}

#[tokio::test]
async fn commands_save_and_fetch_records() {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("history.sqlite")).expect("db pool");
    let feedback = FeedbackService::with_config(pool.clone(), config_for("http://127.0.0.1:9", None))
        .expect("feedback service");
    let settings = SettingsService::new(pool.clone(), CryptoVault::in_memory());
    let state = AppState::with_services(pool, settings, feedback);

    history_save(&state, record("a", "Ana", 1)).await.expect("save a");
    let after = history_save(&state, record("b", "Ben", 2)).await.expect("save b");
    assert_eq!(after.len(), 2);

    let after = history_save(&state, record("a", "Ana R.", 3)).await.expect("resave a");
    let ids: Vec<&str> = after.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    let fetched = history_get(&state, "a".into()).await.expect("get");
    assert_eq!(fetched.map(|r| r.student_name), Some("Ana R.".to_string()));
    assert!(history_get(&state, "zzz".into()).await.expect("get").is_none());

    assert_eq!(history_list(&state).await.expect("list").len(), 2);
}

#[tokio::test]
async fn session_records_round_through_the_save_command() {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("history.sqlite")).expect("db pool");
    let feedback = FeedbackService::with_config(pool.clone(), config_for("http://127.0.0.1:9", None))
        .expect("feedback service");
    let settings = SettingsService::new(pool.clone(), CryptoVault::in_memory());
    let state = AppState::with_services(pool, settings, feedback);

    let mut session = AssessmentSession::from_sheet(&Sheet::from_rows(
        "Mini",
        vec![
            vec!["Mini rubric", "", ""],
            vec!["Criteria", "Low (1)", "High (2)"],
            vec!["Grammar", "errors", "accurate"],
            vec!["Fluency", "halting", "smooth"],
        ],
    ));
    let saved_at = Utc.with_ymd_and_hms(2024, 9, 2, 14, 0, 0).unwrap();
    assert!(session.build_record(saved_at).expect_err("no name").is_validation());

    session.state_mut().student_name = "Ana".into();
    session.set_score("crit_2", 2).expect("score");
    session.set_score("crit_3", 1).expect("score");
    let record = session.build_record(saved_at).expect("record");

    let stored = history_save(&state, record.clone()).await.expect("save");
    assert_eq!(stored, vec![record.clone()]);
    assert_eq!(stored[0].total_score, 3);
    assert_eq!(stored[0].max_score, 6);
    assert_eq!(stored[0].average_score, "1.5");

    let mut reopened = AssessmentSession::from_saved(&stored[0]);
    reopened.reset_scores();
    let resaved = history_save(&state, reopened.build_record(saved_at).expect("record"))
        .await
        .expect("resave");
    assert_eq!(resaved.len(), 1);
    assert_eq!(resaved[0].id, record.id);
    assert_eq!(resaved[0].total_score, 0);
}
