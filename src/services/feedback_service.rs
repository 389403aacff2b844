use std::sync::{Arc, RwLock};
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::repositories::kv_repository::{KvRepository, KvTable};
use crate::db::DbPool;
use crate::error::{AiErrorCode, AppError, AppResult};
use crate::models::feedback::{FeedbackRequest, FeedbackResponseDto, GeneratedFeedback};
use crate::services::prompt_templates::{build_feedback_payload, feedback_system_prompt};
use crate::services::settings_service::{
    DEFAULT_API_BASE_URL, DEFAULT_MODEL, KEY_API_BASE_URL, KEY_API_KEY, KEY_MODEL,
};
use crate::utils::crypto::CryptoVault;
use crate::utils::redact::redact_sensitive_data;

pub const ENV_API_KEY: &str = "RUBRIC_ASSESSOR_API_KEY";
pub const ENV_BASE_URL: &str = "RUBRIC_ASSESSOR_BASE_URL";
pub const ENV_MODEL: &str = "RUBRIC_ASSESSOR_MODEL";

const MISSING_KEY_MESSAGE: &str =
    "API key is missing. Set RUBRIC_ASSESSOR_API_KEY or save a key in settings.";

/// Anything that can turn scored criteria into narrative feedback.
#[async_trait]
pub trait FeedbackProvider: Send + Sync {
    async fn generate_feedback(&self, request: &FeedbackRequest) -> AppResult<GeneratedFeedback>;
}

#[derive(Clone)]
pub struct FeedbackService {
    db_pool: DbPool,
    source: ConfigSource,
    provider: Arc<RwLock<Option<Arc<ChatFeedbackProvider>>>>,
    config: Arc<RwLock<FeedbackServiceConfig>>,
}

#[derive(Clone)]
enum ConfigSource {
    /// Environment first, then persisted settings; reloaded before every call.
    Layered(CryptoVault),
    Fixed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackServiceConfig {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub model: String,
    pub http_timeout: StdDuration,
    pub retry_delays: Vec<StdDuration>,
}

impl Default for FeedbackServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            http_timeout: StdDuration::from_secs(30),
            retry_delays: vec![
                StdDuration::from_secs(0),
                StdDuration::from_secs(1),
                StdDuration::from_secs(2),
                StdDuration::from_secs(4),
            ],
        }
    }
}

impl FeedbackService {
    /// A service that follows the environment and the settings stored in `db_pool`.
    /// `vault` must be the one the settings service sealed the API key with.
    pub fn new(db_pool: DbPool, vault: CryptoVault) -> AppResult<Self> {
        let config = FeedbackServiceConfig::load(&db_pool, &vault)?;
        Self::build(db_pool, ConfigSource::Layered(vault), config)
    }

    /// A service pinned to `config`, ignoring the environment and stored settings.
    pub fn with_config(db_pool: DbPool, config: FeedbackServiceConfig) -> AppResult<Self> {
        Self::build(db_pool, ConfigSource::Fixed, config)
    }

    fn build(
        db_pool: DbPool,
        source: ConfigSource,
        config: FeedbackServiceConfig,
    ) -> AppResult<Self> {
        let provider = config.build_provider()?;
        Ok(Self {
            db_pool,
            source,
            provider: Arc::new(RwLock::new(provider)),
            config: Arc::new(RwLock::new(config)),
        })
    }

    pub fn has_api_key(&self) -> AppResult<bool> {
        self.refresh_configuration()?;
        let guard = self
            .config
            .read()
            .map_err(|_| AppError::other("feedback config lock poisoned"))?;
        Ok(guard.api_key.is_some())
    }

    pub fn model(&self) -> AppResult<String> {
        let guard = self
            .config
            .read()
            .map_err(|_| AppError::other("feedback config lock poisoned"))?;
        Ok(guard.model.clone())
    }

    fn refresh_configuration(&self) -> AppResult<()> {
        let ConfigSource::Layered(vault) = &self.source else {
            return Ok(());
        };

        let config = FeedbackServiceConfig::load(&self.db_pool, vault)?;

        let provider_update = {
            let mut current = self
                .config
                .write()
                .map_err(|_| AppError::other("feedback config lock poisoned"))?;
            let update = if *current != config {
                Some(config.build_provider()?)
            } else {
                None
            };
            *current = config;
            update
        };

        if let Some(update) = provider_update {
            debug!(target: "app::ai", "feedback provider configuration changed");
            let mut guard = self
                .provider
                .write()
                .map_err(|_| AppError::other("feedback provider lock poisoned"))?;
            *guard = update;
        }

        Ok(())
    }

    fn current_provider(&self) -> AppResult<Arc<ChatFeedbackProvider>> {
        let guard = self
            .provider
            .read()
            .map_err(|_| AppError::other("feedback provider lock poisoned"))?;
        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| AppError::ai(AiErrorCode::MissingApiKey, MISSING_KEY_MESSAGE))
    }
}

#[async_trait]
impl FeedbackProvider for FeedbackService {
    async fn generate_feedback(&self, request: &FeedbackRequest) -> AppResult<GeneratedFeedback> {
        debug!(
            target: "app::ai",
            criteria = request.criteria.len(),
            scored = request.scores.len(),
            "generating rubric feedback"
        );

        self.refresh_configuration()?;
        let provider = self.current_provider()?;
        provider.generate_feedback(request).await
    }
}

impl FeedbackServiceConfig {
    fn load(db_pool: &DbPool, vault: &CryptoVault) -> AppResult<Self> {
        let mut config = Self::default();

        let (stored_key, stored_model, stored_base_url) = db_pool.with_connection(|conn| {
            Ok((
                KvRepository::get(conn, KvTable::SecureSettings, KEY_API_KEY)?,
                KvRepository::get(conn, KvTable::AppSettings, KEY_MODEL)?,
                KvRepository::get(conn, KvTable::AppSettings, KEY_API_BASE_URL)?,
            ))
        })?;

        if let Some(row) = stored_model {
            config.model = row.value;
        }
        if let Some(row) = stored_base_url {
            config.api_base_url = row.value;
        }

        if let Ok(model) = std::env::var(ENV_MODEL) {
            config.model = model;
        }
        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            config.api_base_url = base_url;
        }

        config.api_key = std::env::var(ENV_API_KEY).ok();
        if config.api_key.as_deref().map_or(true, |key| key.trim().is_empty()) {
            config.api_key = stored_key.and_then(|row| decrypt_stored_key(vault, &row.value));
        }

        config.api_key = config
            .api_key
            .take()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(config)
    }

    fn build_provider(&self) -> AppResult<Option<Arc<ChatFeedbackProvider>>> {
        match &self.api_key {
            Some(api_key) => {
                let provider = ChatFeedbackProvider::try_new(self, api_key.clone())?;
                Ok(Some(Arc::new(provider)))
            }
            None => Ok(None),
        }
    }
}

fn decrypt_stored_key(vault: &CryptoVault, sealed: &str) -> Option<String> {
    match vault.decrypt(sealed).map(String::from_utf8) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            warn!(target: "app::ai", error = %err, "stored API key is not valid UTF-8");
            None
        }
        Err(err) => {
            warn!(target: "app::ai", error = %err, "failed to decrypt stored API key");
            None
        }
    }
}

/// OpenAI-compatible chat-completions client.
struct ChatFeedbackProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    retry_delays: Vec<StdDuration>,
}

impl ChatFeedbackProvider {
    fn try_new(config: &FeedbackServiceConfig, api_key: String) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("failed to build HTTP client: {err}")))?;

        let base_url = config.api_base_url.trim_end_matches('/');
        let endpoint = format!("{}/v1/chat/completions", base_url);

        let retry_delays = if config.retry_delays.is_empty() {
            vec![StdDuration::from_secs(0)]
        } else {
            config.retry_delays.clone()
        };

        Ok(Self {
            client,
            api_key,
            endpoint,
            model: config.model.clone(),
            retry_delays,
        })
    }

    async fn invoke_chat(&self, payload: &JsonValue) -> AppResult<(JsonValue, String)> {
        let correlation_id = Uuid::new_v4().to_string();
        let sanitized_payload = redact_sensitive_data(payload)
            .unwrap_or_else(|_| JsonValue::String("<redacted>".to_string()));
        let sanitized_payload_str = serde_json::to_string(&sanitized_payload)
            .unwrap_or_else(|_| "\"<redacted>\"".to_string());

        let request_body = self.build_request_body(payload);
        let attempts = self.retry_delays.len();
        let mut last_error: Option<AppError> = None;

        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            if !delay.is_zero() {
                sleep(*delay).await;
            }

            debug!(
                target: "app::ai::provider",
                attempt = attempt + 1,
                correlation_id = %correlation_id,
                payload = %sanitized_payload_str,
                "requesting feedback"
            );

            let start = Instant::now();
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await;

            let (error, retryable) = match response {
                Ok(resp) if resp.status().is_success() => {
                    let latency_ms = start.elapsed().as_millis();
                    debug!(
                        target: "app::ai::provider",
                        correlation_id = %correlation_id,
                        latency_ms,
                        "provider responded"
                    );

                    let body: JsonValue = resp.json().await.map_err(|err| {
                        AppError::ai_with_details(
                            AiErrorCode::InvalidResponse,
                            "Failed to read the feedback response",
                            Some(correlation_id.as_str()),
                            Some(json!({ "reason": err.to_string() })),
                        )
                    })?;

                    let content = body
                        .pointer("/choices/0/message/content")
                        .and_then(|value| value.as_str())
                        .ok_or_else(|| {
                            AppError::ai_with_details(
                                AiErrorCode::InvalidResponse,
                                "Feedback response is missing message content",
                                Some(correlation_id.as_str()),
                                Some(json!({ "reason": "missing_message_content" })),
                            )
                        })?;

                    let content_value = parse_content(content, &correlation_id)?;
                    return Ok((content_value, correlation_id));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let (error, retryable) = map_http_error(status, correlation_id.as_str());
                    warn!(
                        target: "app::ai::provider",
                        correlation_id = %correlation_id,
                        status = status.as_u16(),
                        retryable,
                        "provider returned non-success status"
                    );
                    (error, retryable)
                }
                Err(err) => {
                    let (error, retryable) = error_from_reqwest(err, correlation_id.as_str());
                    warn!(
                        target: "app::ai::provider",
                        correlation_id = %correlation_id,
                        retryable,
                        "provider request failed"
                    );
                    (error, retryable)
                }
            };

            if !retryable || attempt + 1 == attempts {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::ai_with_details(
                AiErrorCode::ProviderUnavailable,
                "Failed to generate feedback. Please try again.",
                Some(correlation_id.as_str()),
                None,
            )
        }))
    }

    fn build_request_body(&self, payload: &JsonValue) -> JsonValue {
        let user_content = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
        json!({
            "model": self.model,
            "temperature": 0.7,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": feedback_system_prompt() },
                { "role": "user", "content": user_content }
            ]
        })
    }
}

#[async_trait]
impl FeedbackProvider for ChatFeedbackProvider {
    async fn generate_feedback(&self, request: &FeedbackRequest) -> AppResult<GeneratedFeedback> {
        let payload = build_feedback_payload(request);
        let (content, correlation_id) = self.invoke_chat(&payload).await?;

        let dto: FeedbackResponseDto = serde_json::from_value(content).map_err(|err| {
            AppError::ai_with_details(
                AiErrorCode::InvalidResponse,
                format!("Feedback response has an unexpected shape: {err}"),
                Some(correlation_id.as_str()),
                None,
            )
        })?;

        let feedback = GeneratedFeedback::from(dto);
        if feedback.feedback.trim().is_empty()
            && feedback.strengths.trim().is_empty()
            && feedback.improvements.trim().is_empty()
        {
            return Err(AppError::ai_with_details(
                AiErrorCode::InvalidResponse,
                "Feedback response was empty",
                Some(correlation_id.as_str()),
                Some(json!({ "reason": "empty_feedback" })),
            ));
        }

        Ok(feedback)
    }
}

fn parse_content(content: &str, correlation_id: &str) -> AppResult<JsonValue> {
    let trimmed = content.trim();
    let cleaned = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```JSON")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    serde_json::from_str(cleaned).map_err(|err| {
        AppError::ai_with_details(
            AiErrorCode::InvalidResponse,
            format!("Feedback response is not JSON: {err}"),
            Some(correlation_id),
            Some(json!({ "reason": "invalid_json" })),
        )
    })
}

fn map_http_error(status: StatusCode, correlation_id: &str) -> (AppError, bool) {
    let (code, message, retryable) = match status {
        StatusCode::UNAUTHORIZED => (
            AiErrorCode::MissingApiKey,
            "API key is invalid or unauthorized".to_string(),
            false,
        ),
        StatusCode::FORBIDDEN => (
            AiErrorCode::Forbidden,
            "API key lacks permission for this model".to_string(),
            false,
        ),
        StatusCode::TOO_MANY_REQUESTS => (
            AiErrorCode::RateLimited,
            "Too many feedback requests, please retry shortly".to_string(),
            true,
        ),
        status if status.is_server_error() => (
            AiErrorCode::ProviderUnavailable,
            format!(
                "Feedback service is temporarily unavailable (status {})",
                status.as_u16()
            ),
            true,
        ),
        StatusCode::BAD_REQUEST => (
            AiErrorCode::InvalidRequest,
            "Feedback request was rejected as malformed".to_string(),
            false,
        ),
        StatusCode::NOT_FOUND => (
            AiErrorCode::InvalidRequest,
            "Feedback endpoint not found; check the base URL".to_string(),
            false,
        ),
        status => (
            AiErrorCode::Unknown,
            format!("Feedback service returned status {}", status.as_u16()),
            false,
        ),
    };

    (
        AppError::ai_with_details(code, message, Some(correlation_id), None),
        retryable,
    )
}

fn error_from_reqwest(err: reqwest::Error, correlation_id: &str) -> (AppError, bool) {
    if err.is_timeout() {
        (
            AppError::ai_with_details(
                AiErrorCode::HttpTimeout,
                "Feedback request timed out",
                Some(correlation_id),
                None,
            ),
            true,
        )
    } else if err.is_connect() {
        (
            AppError::ai_with_details(
                AiErrorCode::ProviderUnavailable,
                "Could not connect to the feedback service",
                Some(correlation_id),
                None,
            ),
            true,
        )
    } else if let Some(status) = err.status() {
        map_http_error(status, correlation_id)
    } else {
        (
            AppError::ai_with_details(
                AiErrorCode::Unknown,
                format!("Feedback request failed: {err}"),
                Some(correlation_id),
                None,
            ),
            false,
        )
    }
}

pub mod testing {
    use super::*;

    /// Expose error mapping for integration tests without widening the public API surface.
    pub fn map_http_error(status: StatusCode) -> (AppError, bool) {
        super::map_http_error(status, "test-correlation-id")
    }

    /// Config pointed at `base_url` with a test key and no retry delays.
    pub fn config_for(base_url: &str, api_key: Option<&str>) -> FeedbackServiceConfig {
        FeedbackServiceConfig {
            api_key: api_key.map(str::to_string),
            api_base_url: base_url.trim_end_matches('/').to_string(),
            model: "test-model".to_string(),
            http_timeout: StdDuration::from_secs(5),
            retry_delays: vec![StdDuration::ZERO, StdDuration::ZERO],
        }
    }
}
