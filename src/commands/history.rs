use crate::models::assessment::SavedAssessment;

use super::{run_blocking, AppState, CommandResult};

pub async fn history_list(state: &AppState) -> CommandResult<Vec<SavedAssessment>> {
    let history = state.history();
    run_blocking(move || history.list()).await
}

pub async fn history_get(state: &AppState, id: String) -> CommandResult<Option<SavedAssessment>> {
    let history = state.history();
    run_blocking(move || history.get_by_id(&id)).await
}

/// Stores the record and returns the updated collection.
///
/// The record is stored unchecked. Build it with
/// [`AssessmentSession::build_record`](crate::services::assessment_session::AssessmentSession::build_record)
/// so the student name is validated and the totals match the rubric.
pub async fn history_save(
    state: &AppState,
    record: SavedAssessment,
) -> CommandResult<Vec<SavedAssessment>> {
    let history = state.history();
    run_blocking(move || {
        history.save(&record)?;
        history.list()
    })
    .await
}

pub async fn history_delete(state: &AppState, id: String) -> CommandResult<Vec<SavedAssessment>> {
    let history = state.history();
    run_blocking(move || {
        history.delete(&id)?;
        history.list()
    })
    .await
}
