use serde::Deserialize;

use crate::models::settings::AppSettings;
use crate::services::settings_service::SettingsUpdateInput;

use super::{run_blocking, AppState, CommandResult};

pub async fn settings_get(state: &AppState) -> CommandResult<AppSettings> {
    let settings = state.settings();
    run_blocking(move || settings.get()).await
}

pub async fn settings_update(
    state: &AppState,
    payload: SettingsUpdatePayload,
) -> CommandResult<AppSettings> {
    let settings = state.settings();
    let input = payload.into_input();
    run_blocking(move || settings.update(input)).await
}

pub async fn settings_clear_api_key(state: &AppState) -> CommandResult<AppSettings> {
    let settings = state.settings();
    run_blocking(move || {
        settings.clear_sensitive()?;
        settings.get()
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdatePayload {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub remove_api_key: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl SettingsUpdatePayload {
    fn into_input(self) -> SettingsUpdateInput {
        let api_key = if self.remove_api_key == Some(true) {
            Some(None)
        } else {
            self.api_key.map(Some)
        };

        SettingsUpdateInput {
            api_key,
            model: self.model,
            api_base_url: self.api_base_url,
        }
    }
}
