pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use std::path::Path;

use tracing::info;

use crate::commands::AppState;
use crate::db::DbPool;
use crate::error::AppResult;

pub const DATABASE_FILE_NAME: &str = "rubric-assessor.sqlite";

/// Sets up logging and storage under `data_dir` and returns the shared state.
pub fn bootstrap(data_dir: &Path) -> AppResult<AppState> {
    std::fs::create_dir_all(data_dir)?;
    crate::utils::logger::init_logging(data_dir)?;

    let pool = DbPool::new(data_dir.join(DATABASE_FILE_NAME))?;
    let state = AppState::new(pool)?;

    info!(target: "app::startup", data_dir = %data_dir.display(), "rubric assessor ready");
    Ok(state)
}
