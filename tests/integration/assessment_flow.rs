// End-to-end: template -> session -> feedback -> saved history.

use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::json;
use tempfile::tempdir;

use rubric_assessor_lib::commands::feedback::{feedback_generate, feedback_status};
use rubric_assessor_lib::commands::history::{history_delete, history_list};
use rubric_assessor_lib::commands::settings::{settings_update, SettingsUpdatePayload};
use rubric_assessor_lib::commands::templates::{templates_list, templates_parse};
use rubric_assessor_lib::commands::AppState;
use rubric_assessor_lib::db::DbPool;
use rubric_assessor_lib::services::assessment_session::AssessmentSession;
use rubric_assessor_lib::services::feedback_service::testing::config_for;
use rubric_assessor_lib::services::feedback_service::{
    FeedbackService, ENV_API_KEY, ENV_BASE_URL, ENV_MODEL,
};
use rubric_assessor_lib::services::settings_service::SettingsService;
use rubric_assessor_lib::services::template_library::sheet_by_index;
use rubric_assessor_lib::utils::crypto::CryptoVault;

fn setup(base_url: &str) -> (AppState, tempfile::TempDir) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("flow.sqlite")).expect("db pool");
    let feedback = FeedbackService::with_config(pool.clone(), config_for(base_url, Some("sk-flow")))
        .expect("feedback service");
    let settings = SettingsService::new(pool.clone(), CryptoVault::in_memory());
    let state = AppState::with_services(pool, settings, feedback);
    (state, dir)
}

#[tokio::test]
async fn quick_check_assessment_is_scored_generated_and_saved() {
    let server = MockServer::start_async().await;
    let content = serde_json::to_string(&json!({
        "feedback": "You are pronouncing most words clearly.",
        "strengths": ["Clear pronunciation"],
        "improvements": ["Reduce hesitation"]
    }))
    .expect("content");
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .json_body(json!({ "choices": [{ "message": { "content": content } }] }));
        })
        .await;

    let (state, _dir) = setup(&server.base_url());

    let catalog = templates_list(&state).await.expect("catalog");
    assert_eq!(catalog.sheet_names.len(), 2);

    let parsed = templates_parse(&state, 1).await.expect("parsed template");
    assert_eq!(parsed.criteria.len(), 1);

    let workbook = state.workbook();
    let mut session = AssessmentSession::from_sheet(sheet_by_index(&workbook, 1).expect("sheet"));
    assert_eq!(session.rubric(), &parsed);

    session.set_score("crit_6", 2).expect("score");
    session.state_mut().student_name = "Jose".into();
    session.state_mut().task = "Read aloud".into();

    let feedback_service = state.feedback();
    session
        .generate_feedback(feedback_service.as_ref())
        .await
        .expect("feedback");
    assert_eq!(session.state().strengths, "Clear pronunciation");

    let saved_at = Utc.with_ymd_and_hms(2024, 9, 2, 14, 0, 0).unwrap();
    let history = state.history();
    let record = session.save(&history, saved_at).expect("saved");

    assert_eq!(record.total_score, 2);
    assert_eq!(record.max_score, 3);
    assert_eq!(record.average_score, "2.0");
    assert_eq!(record.feedback, "You are pronouncing most words clearly.");

    let listed = history_list(&state).await.expect("history");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], record);

    let remaining = history_delete(&state, record.id.clone()).await.expect("delete");
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn saved_snapshot_ignores_later_rubric_edits() {
    let (state, _dir) = setup("http://127.0.0.1:9");
    let workbook = state.workbook();
    let history = state.history();

    let mut session = AssessmentSession::from_sheet(sheet_by_index(&workbook, 1).expect("sheet"));
    session.state_mut().student_name = "Lena".into();
    session.set_score("crit_6", 3).expect("score");

    let first_save = Utc.with_ymd_and_hms(2024, 9, 2, 9, 0, 0).unwrap();
    let record = session.save(&history, first_save).expect("saved");

    session.rename_title("Edited title");
    let added = session.add_criterion(first_save);
    session.set_score(&added, 1).expect("score new criterion");

    let stored = history
        .get_by_id(&record.id)
        .expect("lookup")
        .expect("record present");
    assert_eq!(stored.rubric.title, "QUICK CHECK RUBRIC - Daily Formative Assessment");
    assert_eq!(stored.rubric.criteria.len(), 1);

    let second_save = Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap();
    let updated = session.save(&history, second_save).expect("resaved");
    assert_eq!(updated.id, record.id);
    assert_eq!(updated.total_score, 4);
    assert_eq!(updated.max_score, 6);

    let all = history.list().expect("list");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].rubric.title, "Edited title");
}

#[tokio::test]
async fn reopened_assessment_restores_reflection() {
    let (state, _dir) = setup("http://127.0.0.1:9");
    let workbook = state.workbook();
    let history = state.history();

    let mut session = AssessmentSession::from_sheet(sheet_by_index(&workbook, 1).expect("sheet"));
    session.state_mut().student_name = "Mia".into();
    session.set_self_assessment_enabled(true);
    session.state_mut().student_reflection = "I spoke too fast".into();
    let record = session.save(&history, Utc::now()).expect("saved");
    assert_eq!(record.student_reflection.as_deref(), Some("I spoke too fast"));

    let reopened = AssessmentSession::from_saved(&record);
    assert!(reopened.self_assessment_enabled());
    assert_eq!(reopened.state().student_reflection, "I spoke too fast");
    assert_eq!(reopened.current_id(), Some(record.id.as_str()));
}

#[tokio::test]
async fn bootstrap_prepares_data_directory() {
    let dir = tempdir().expect("temp dir");
    let data_dir = dir.path().join("app-data");

    let state = rubric_assessor_lib::bootstrap(&data_dir).expect("bootstrap");

    assert!(data_dir.join(rubric_assessor_lib::DATABASE_FILE_NAME).exists());
    assert!(data_dir.join("logs").is_dir());
    assert_eq!(state.db().path(), data_dir.join("rubric-assessor.sqlite").as_path());
    assert!(history_list(&state).await.expect("history").is_empty());
}

#[tokio::test]
async fn stored_settings_drive_the_feedback_provider() {
    let server = MockServer::start_async().await;
    let content = serde_json::to_string(&json!({
        "feedback": "Solid effort.",
        "strengths": "Good pacing",
        "improvements": "Project your voice"
    }))
    .expect("content");
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-stored-1234")
                .body_contains("custom-model");
            then.status(200)
                .json_body(json!({ "choices": [{ "message": { "content": content } }] }));
        })
        .await;

    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("settings-flow.sqlite")).expect("db pool");
    let state = AppState::with_vault(pool, CryptoVault::in_memory()).expect("state");

    // Environment overrides would take precedence over stored settings.
    if [ENV_API_KEY, ENV_BASE_URL, ENV_MODEL]
        .iter()
        .any(|name| std::env::var(name).is_ok())
    {
        return;
    }

    let status = feedback_status(&state).await.expect("status");
    assert!(!status.has_api_key);

    let saved = settings_update(
        &state,
        serde_json::from_value::<SettingsUpdatePayload>(json!({
            "apiKey": "sk-stored-1234",
            "model": "custom-model",
            "apiBaseUrl": server.base_url(),
        }))
        .expect("payload"),
    )
    .await
    .expect("settings saved");
    assert_eq!(saved.api_key.as_deref(), Some("**********1234"));
    assert!(feedback_status(&state).await.expect("status").has_api_key);

    let workbook = state.workbook();
    let mut session = AssessmentSession::from_sheet(sheet_by_index(&workbook, 1).expect("sheet"));
    session.set_score("crit_6", 3).expect("score");

    let request = session.begin_feedback_request().expect("request");
    let generated = feedback_generate(&state, request).await.expect("feedback");
    session.finish_feedback_request(Ok(generated)).expect("applied");

    mock.assert_async().await;
    assert_eq!(session.state().improvements, "Project your voice");
}
