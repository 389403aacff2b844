// Failure paths surfaced to callers.

use async_trait::async_trait;
use chrono::Utc;
use tempfile::tempdir;

use rubric_assessor_lib::commands::feedback::{feedback_generate, feedback_status};
use rubric_assessor_lib::commands::history::{history_get, history_list};
use rubric_assessor_lib::commands::templates::templates_parse;
use rubric_assessor_lib::commands::AppState;
use rubric_assessor_lib::db::repositories::kv_repository::{KvRepository, KvTable};
use rubric_assessor_lib::db::DbPool;
use rubric_assessor_lib::error::{AiErrorCode, AppError, AppResult};
use rubric_assessor_lib::models::feedback::{FeedbackRequest, GeneratedFeedback};
use rubric_assessor_lib::models::rubric::Sheet;
use rubric_assessor_lib::services::assessment_session::AssessmentSession;
use rubric_assessor_lib::services::feedback_service::testing::config_for;
use rubric_assessor_lib::services::feedback_service::{FeedbackProvider, FeedbackService};
use rubric_assessor_lib::services::settings_service::SettingsService;
use rubric_assessor_lib::utils::crypto::CryptoVault;
use rubric_assessor_lib::services::history_service::{AssessmentHistoryService, HISTORY_STORAGE_KEY};

struct FailingProvider;

#[async_trait]
impl FeedbackProvider for FailingProvider {
    async fn generate_feedback(&self, _request: &FeedbackRequest) -> AppResult<GeneratedFeedback> {
        Err(AppError::ai(AiErrorCode::HttpTimeout, "timed out"))
    }
}

fn state_without_key() -> (AppState, tempfile::TempDir) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("errors.sqlite")).expect("db pool");
    let feedback = FeedbackService::with_config(pool.clone(), config_for("http://127.0.0.1:9", None))
        .expect("feedback service");
    let settings = SettingsService::new(pool.clone(), CryptoVault::in_memory());
    (AppState::with_services(pool, settings, feedback), dir)
}

fn sheet() -> Sheet {
    Sheet::from_rows(
        "Mini",
        vec![
            vec!["Mini rubric", "", ""],
            vec!["Criteria", "Low (1)", "High (2)"],
            vec!["Grammar", "errors", "accurate"],
        ],
    )
}

#[tokio::test]
async fn missing_key_reaches_the_caller_as_command_error() {
    let (state, _dir) = state_without_key();

    let status = feedback_status(&state).await.expect("status");
    assert!(!status.has_api_key);
    assert_eq!(status.model, "test-model");

    let mut session = AssessmentSession::from_sheet(&sheet());
    session.set_score("crit_2", 1).expect("score");
    let request = session.begin_feedback_request().expect("request");

    assert!(session.begin_feedback_request().is_err());

    let error = feedback_generate(&state, request).await.expect_err("no key");
    assert_eq!(error.code, "MISSING_API_KEY");

    session.abandon_feedback_request();
    assert!(!session.feedback_in_flight());
    assert!(session.begin_feedback_request().is_ok());
}

#[tokio::test]
async fn failed_feedback_keeps_prior_text_and_allows_retry() {
    let mut session = AssessmentSession::from_sheet(&sheet());
    session.set_score("crit_2", 2).expect("score");
    session.state_mut().feedback = "Draft comment".into();
    session.state_mut().strengths = "Draft strengths".into();

    let error = session
        .generate_feedback(&FailingProvider)
        .await
        .expect_err("provider fails");
    assert_eq!(error.ai_code(), Some(AiErrorCode::HttpTimeout));
    assert_eq!(session.state().feedback, "Draft comment");
    assert_eq!(session.state().strengths, "Draft strengths");

    // The in-flight flag was released, so a new request can start.
    assert!(session.begin_feedback_request().is_ok());
}

#[test]
fn unscored_session_cannot_request_feedback() {
    let mut session = AssessmentSession::from_sheet(&sheet());
    let error = session.begin_feedback_request().expect_err("no scores");
    assert!(error.is_validation());
    assert!(!session.feedback_in_flight());
}

#[test]
fn saving_without_student_name_is_rejected() {
    let dir = tempdir().expect("temp dir");
    let history = AssessmentHistoryService::new(
        DbPool::new(dir.path().join("errors.sqlite")).expect("db pool"),
    );

    let mut session = AssessmentSession::from_sheet(&sheet());
    session.state_mut().student_name = "   ".into();
    let error = session.save(&history, Utc::now()).expect_err("name required");
    assert!(error.is_validation());
    assert!(history.list().expect("list").is_empty());
    assert!(session.current_id().is_none());
}

#[test]
fn corrupt_history_lists_as_empty() {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("errors.sqlite")).expect("db pool");
    pool.with_connection(|conn| {
        KvRepository::upsert(conn, KvTable::LocalStore, HISTORY_STORAGE_KEY, "[{\"id\": 5}")
    })
    .expect("seed corrupt value");

    let history = AssessmentHistoryService::new(pool);
    assert!(history.list().expect("list").is_empty());
}

#[tokio::test]
async fn unreadable_store_reads_as_empty_history() {
    let (state, dir) = state_without_key();
    std::fs::write(dir.path().join("errors.sqlite"), vec![0xAB_u8; 8 * 1024])
        .expect("overwrite database file");

    let history = AssessmentHistoryService::new(state.db());
    assert!(history.list().expect("list").is_empty());
    assert!(history.get_by_id("anything").expect("get").is_none());

    assert!(history_list(&state).await.expect("list command").is_empty());
    assert!(history_get(&state, "anything".into())
        .await
        .expect("get command")
        .is_none());

    let mut session = AssessmentSession::from_sheet(&sheet());
    session.state_mut().student_name = "Ana".into();
    assert!(session.save(&history, Utc::now()).is_err());
}

#[tokio::test]
async fn unknown_template_index_is_not_found() {
    let (state, _dir) = state_without_key();
    let error = templates_parse(&state, 7).await.expect_err("missing template");
    assert_eq!(error.code, "NOT_FOUND");
}

#[test]
fn headerless_sheet_gives_empty_rubric() {
    let session = AssessmentSession::from_sheet(&Sheet::from_rows(
        "Loose",
        vec![vec!["Notes"], vec!["Grammar", "fine"]],
    ));
    assert_eq!(session.rubric().title, "Notes");
    assert!(session.rubric().criteria.is_empty());
    assert_eq!(session.summary().max_score, 0);
}
