use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use tracing::warn;

use crate::db::repositories::kv_repository::{KvRepository, KvRow, KvTable};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::settings::AppSettings;
use crate::utils::crypto::CryptoVault;

pub(crate) const KEY_API_KEY: &str = "feedback_api_key";
pub(crate) const KEY_MODEL: &str = "feedback_model";
pub(crate) const KEY_API_BASE_URL: &str = "feedback_api_base_url";

pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_API_BASE_URL: &str = "https://api.deepseek.com";

#[derive(Debug, Default, Clone)]
pub struct SettingsUpdateInput {
    /// `Some(None)` clears the stored key; `None` leaves it untouched.
    pub api_key: Option<Option<String>>,
    pub model: Option<String>,
    pub api_base_url: Option<String>,
}

pub struct SettingsService {
    db: DbPool,
    vault: CryptoVault,
    cache: RwLock<Option<AppSettings>>,
}

impl SettingsService {
    pub fn new(db: DbPool, vault: CryptoVault) -> Self {
        Self {
            db,
            vault,
            cache: RwLock::new(None),
        }
    }

    pub fn get(&self) -> AppResult<AppSettings> {
        if let Ok(guard) = self.cache.read() {
            if let Some(settings) = guard.as_ref() {
                return Ok(settings.clone());
            }
        }

        let settings = self.load_settings_from_db()?;
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(settings.clone());
        }
        Ok(settings)
    }

    pub fn update(&self, input: SettingsUpdateInput) -> AppResult<AppSettings> {
        let mut current = self.get()?;

        let model = match input.model.as_deref().map(str::trim) {
            Some("") => return Err(AppError::validation("Model name cannot be empty")),
            Some(value) => Some(value.to_string()),
            None => None,
        };

        let api_base_url = match input.api_base_url.as_deref().map(str::trim) {
            Some(value) => {
                ensure_valid_base_url(value)?;
                Some(value.trim_end_matches('/').to_string())
            }
            None => None,
        };

        let api_key_instruction = self.prepare_api_key_instruction(&input)?;

        self.db.with_connection(|conn| {
            match &api_key_instruction {
                ApiKeyInstruction::Set { ciphertext, .. } => {
                    KvRepository::upsert(conn, KvTable::SecureSettings, KEY_API_KEY, ciphertext)?;
                }
                ApiKeyInstruction::Clear => {
                    KvRepository::delete(conn, KvTable::SecureSettings, KEY_API_KEY)?;
                }
                ApiKeyInstruction::NoChange => {}
            }

            if let Some(value) = model.as_deref() {
                KvRepository::upsert(conn, KvTable::AppSettings, KEY_MODEL, value)?;
            }
            if let Some(value) = api_base_url.as_deref() {
                KvRepository::upsert(conn, KvTable::AppSettings, KEY_API_BASE_URL, value)?;
            }

            Ok(())
        })?;

        match api_key_instruction {
            ApiKeyInstruction::Set { masked, .. } => current.api_key = Some(masked),
            ApiKeyInstruction::Clear => current.api_key = None,
            ApiKeyInstruction::NoChange => {}
        }
        if let Some(value) = model {
            current.model = value;
        }
        if let Some(value) = api_base_url {
            current.api_base_url = value;
        }
        current.updated_at = Utc::now().to_rfc3339();

        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(current.clone());
        }

        Ok(current)
    }

    pub fn clear_sensitive(&self) -> AppResult<()> {
        self.db
            .with_connection(|conn| KvRepository::delete(conn, KvTable::SecureSettings, KEY_API_KEY))?;

        if let Err(err) = self.vault.clear_master_secret() {
            warn!(
                target: "app::settings",
                error = %err,
                "failed to clear master secret from system keyring"
            );
        }

        if let Ok(mut guard) = self.cache.write() {
            if let Some(settings) = guard.as_mut() {
                settings.api_key = None;
                settings.updated_at = Utc::now().to_rfc3339();
            }
        }

        Ok(())
    }

    fn prepare_api_key_instruction(
        &self,
        input: &SettingsUpdateInput,
    ) -> AppResult<ApiKeyInstruction> {
        match &input.api_key {
            None => Ok(ApiKeyInstruction::NoChange),
            Some(None) => Ok(ApiKeyInstruction::Clear),
            Some(Some(value)) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(AppError::validation("API key cannot be empty"));
                }
                let ciphertext = self.vault.encrypt(trimmed.as_bytes())?;
                Ok(ApiKeyInstruction::Set {
                    ciphertext,
                    masked: mask_api_key(trimmed),
                })
            }
        }
    }

    fn load_settings_from_db(&self) -> AppResult<AppSettings> {
        self.db.with_connection(|conn| {
            let map: HashMap<String, KvRow> = KvRepository::list(conn, KvTable::AppSettings)?
                .into_iter()
                .map(|row| (row.key.clone(), row))
                .collect();
            let key_row = KvRepository::get(conn, KvTable::SecureSettings, KEY_API_KEY)?;

            let updated_at = map
                .values()
                .chain(key_row.iter())
                .map(|row| row.updated_at.clone())
                .max()
                .unwrap_or_else(|| Utc::now().to_rfc3339());

            let api_key = key_row.and_then(|row| match self.vault.decrypt(&row.value) {
                Ok(plain) => match String::from_utf8(plain) {
                    Ok(value) => Some(mask_api_key(&value)),
                    Err(_) => {
                        warn!(target: "app::settings", "stored api key is not valid UTF-8");
                        None
                    }
                },
                Err(err) => {
                    warn!(
                        target: "app::settings",
                        error = %err,
                        "failed to decrypt stored api key"
                    );
                    None
                }
            });

            let model = map
                .get(KEY_MODEL)
                .map(|row| row.value.clone())
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string());

            let api_base_url = map
                .get(KEY_API_BASE_URL)
                .map(|row| row.value.clone())
                .filter(|value| ensure_valid_base_url(value).is_ok())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

            Ok(AppSettings {
                api_key,
                model,
                api_base_url,
                updated_at,
            })
        })
    }
}

fn mask_api_key(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

fn ensure_valid_base_url(value: &str) -> AppResult<()> {
    let value = value.trim();
    let has_scheme = value.starts_with("https://") || value.starts_with("http://");
    if !has_scheme || value.ends_with("://") {
        return Err(AppError::validation(
            "API base URL must start with http:// or https://",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum ApiKeyInstruction {
    Set { ciphertext: String, masked: String },
    Clear,
    NoChange,
}
