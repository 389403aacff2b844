use serde::Serialize;

use crate::models::feedback::{FeedbackRequest, GeneratedFeedback};
use crate::services::feedback_service::FeedbackProvider;

use super::{run_blocking, AppState, CommandError, CommandResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackStatus {
    pub has_api_key: bool,
    pub model: String,
}

/// Sends `request` as is. It does not check for scores or guard against a
/// request already in flight; shells should build the request with
/// [`AssessmentSession::begin_feedback_request`], then apply a success with
/// [`AssessmentSession::finish_feedback_request`] or release the session after
/// an error with [`AssessmentSession::abandon_feedback_request`].
///
/// [`AssessmentSession::begin_feedback_request`]: crate::services::assessment_session::AssessmentSession::begin_feedback_request
/// [`AssessmentSession::finish_feedback_request`]: crate::services::assessment_session::AssessmentSession::finish_feedback_request
/// [`AssessmentSession::abandon_feedback_request`]: crate::services::assessment_session::AssessmentSession::abandon_feedback_request
pub async fn feedback_generate(
    state: &AppState,
    request: FeedbackRequest,
) -> CommandResult<GeneratedFeedback> {
    let service = state.feedback();
    service
        .generate_feedback(&request)
        .await
        .map_err(CommandError::from)
}

pub async fn feedback_status(state: &AppState) -> CommandResult<FeedbackStatus> {
    let service = state.feedback();
    run_blocking(move || {
        Ok(FeedbackStatus {
            has_api_key: service.has_api_key()?,
            model: service.model()?,
        })
    })
    .await
}
