use edu_program::config::{AppConfig, DatabaseConfig};
use edu_program::error::AppError;
use edu_program::telemetry;
use edu_program::workflows::shortlist::SqliteShortlistStore;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Loads configuration, applies a `--database` override and installs the subscriber.
pub(crate) fn bootstrap(database: Option<PathBuf>) -> Result<AppConfig, AppError> {
    let mut config = AppConfig::load()?;
    if let Some(path) = database {
        config.database.path = path;
    }
    telemetry::init(&config.telemetry)?;
    Ok(config)
}

pub(crate) fn open_store(config: &DatabaseConfig) -> Result<Arc<SqliteShortlistStore>, AppError> {
    let store = SqliteShortlistStore::open(&config.path, config.transaction_timeout)?;
    info!(
        path = %config.path.display(),
        timeout_ms = config.transaction_timeout.as_millis() as u64,
        "shortlist store ready"
    );
    Ok(Arc::new(store))
}

pub(crate) fn parse_year(raw: &str) -> Result<i32, String> {
    let year: i32 = raw
        .trim()
        .parse()
        .map_err(|err| format!("failed to parse '{raw}' as a year ({err})"))?;
    if !(1900..=9999).contains(&year) {
        return Err(format!("year {year} is out of range"));
    }
    Ok(year)
}
