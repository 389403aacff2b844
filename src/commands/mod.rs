//! Async entry points a UI shell calls. Store work runs on the blocking pool.

pub mod feedback;
pub mod history;
pub mod settings;
pub mod templates;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::error;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::rubric::RawRubricData;
use crate::services::feedback_service::FeedbackService;
use crate::services::history_service::AssessmentHistoryService;
use crate::services::settings_service::SettingsService;
use crate::services::template_library::builtin_workbook;
use crate::utils::crypto::CryptoVault;

#[derive(Clone)]
pub struct AppState {
    db_pool: DbPool,
    settings_service: Arc<SettingsService>,
    feedback_service: Arc<FeedbackService>,
    history_service: Arc<AssessmentHistoryService>,
    workbook: Arc<RawRubricData>,
}

impl AppState {
    /// Production state: the API key is sealed under a master secret in the OS keyring.
    pub fn new(db_pool: DbPool) -> AppResult<Self> {
        let vault = CryptoVault::from_database_path(db_pool.path())?;
        Self::with_vault(db_pool, vault)
    }

    pub fn with_vault(db_pool: DbPool, vault: CryptoVault) -> AppResult<Self> {
        let settings = SettingsService::new(db_pool.clone(), vault.clone());
        let feedback = FeedbackService::new(db_pool.clone(), vault)?;
        Ok(Self::with_services(db_pool, settings, feedback))
    }

    pub fn with_services(
        db_pool: DbPool,
        settings: SettingsService,
        feedback: FeedbackService,
    ) -> Self {
        let history_service = Arc::new(AssessmentHistoryService::new(db_pool.clone()));

        Self {
            db_pool,
            settings_service: Arc::new(settings),
            feedback_service: Arc::new(feedback),
            history_service,
            workbook: Arc::new(builtin_workbook()),
        }
    }

    pub fn settings(&self) -> Arc<SettingsService> {
        Arc::clone(&self.settings_service)
    }

    pub fn feedback(&self) -> Arc<FeedbackService> {
        Arc::clone(&self.feedback_service)
    }

    pub fn history(&self) -> Arc<AssessmentHistoryService> {
        Arc::clone(&self.history_service)
    }

    pub fn workbook(&self) -> Arc<RawRubricData> {
        Arc::clone(&self.workbook)
    }

    pub fn db(&self) -> DbPool {
        self.db_pool.clone()
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        let code = error.code();
        match error {
            AppError::NotFound => {
                CommandError::new(code, "The requested item does not exist", None)
            }
            AppError::Ai {
                message,
                correlation_id,
                details,
                ..
            } => {
                let mut merged = JsonMap::new();
                match details {
                    Some(JsonValue::Object(map)) => merged.extend(map),
                    Some(value) => {
                        merged.insert("info".to_string(), value);
                    }
                    None => {}
                }
                if let Some(id) = correlation_id {
                    merged.insert("correlationId".to_string(), JsonValue::String(id));
                }
                let details = (!merged.is_empty()).then(|| JsonValue::Object(merged));
                CommandError::new(code, message, details)
            }
            AppError::Serialization(err) => {
                error!(target: "app::command", error = %err, "serialization failure in command");
                CommandError::new(code, "Failed to serialize data", None)
            }
            AppError::Io(err) => {
                error!(target: "app::command", error = %err, "io failure in command");
                CommandError::new(code, "File system access failed", None)
            }
            other => CommandError::new(code, other.to_string(), None),
        }
    }
}

pub(crate) async fn run_blocking<T: Send + 'static>(
    task: impl FnOnce() -> Result<T, AppError> + Send + 'static,
) -> CommandResult<T> {
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| CommandError::new("UNKNOWN", format!("background task failed: {err}"), None))?
        .map_err(CommandError::from)
}
