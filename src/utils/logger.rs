use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, fmt::time::UtcTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::error::{AppError, AppResult};

/// Held for the life of the process so buffered file output is flushed.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

const DEFAULT_DIRECTIVES: &str = "info,app::ai=debug,app::rubric=info,app::history=info,app::db=info";

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    pub default_directives: String,
}

impl LogConfig {
    /// Daily files named `rubric-assessor.log.<date>` under `<data_dir>/logs`.
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            directory: data_dir.join("logs"),
            file_prefix: "rubric-assessor.log".to_string(),
            default_directives: DEFAULT_DIRECTIVES.to_string(),
        }
    }

    /// `RUST_LOG` when set and valid, otherwise the default directives.
    fn filter(&self) -> AppResult<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_directives))
            .map_err(|err| AppError::other(format!("invalid log directives: {err}")))
    }
}

pub fn init_logging(data_dir: &Path) -> AppResult<()> {
    init_with(&LogConfig::for_data_dir(data_dir))
}

/// Installs file and console output. Only the first call per process has an effect.
pub fn init_with(config: &LogConfig) -> AppResult<()> {
    if FILE_GUARD.get().is_some() {
        return Ok(());
    }

    std::fs::create_dir_all(&config.directory)?;
    let filter = config.filter()?;

    let appender = tracing_appender::rolling::daily(&config.directory, &config.file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    if FILE_GUARD.set(guard).is_err() {
        return Ok(());
    }

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339()),
        )
        .with(fmt::layer().with_target(false).with_timer(UtcTime::rfc_3339()))
        .try_init();

    // An embedding host may already own the global subscriber.
    if let Err(err) = installed {
        debug!(target: "app::startup", error = %err, "global subscriber already set");
    }

    Ok(())
}
