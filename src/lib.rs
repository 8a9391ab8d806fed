pub mod alerts;
pub mod billing;
pub mod config;
pub mod db;
pub mod lab_orders;
pub mod models;
pub mod store;
pub mod treatments;

pub use config::StoreConfig;
pub use db::{DatabaseError, ErrorKind};
pub use store::ClinicStore;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins over `filter`.
/// Calling it twice is harmless; the second call is ignored.
pub fn init_logging(filter: &str) {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(filter))
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    if result.is_ok() {
        tracing::info!("{} store v{}", config::APP_NAME, config::APP_VERSION);
    }
}

/// Open the store described by `config`, logging with its filter.
pub fn open_store(config: &StoreConfig) -> Result<ClinicStore, DatabaseError> {
    init_logging(&config.log_filter);
    let store = ClinicStore::open(config)?;
    if !store.startup_report().is_clean() {
        tracing::warn!(
            issues = store.startup_report().issues.len(),
            "Store opened with skipped schema steps"
        );
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_twice_is_harmless() {
        init_logging("warn");
        init_logging("not a [valid filter");
    }

    #[test]
    fn open_store_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            db_path: dir.path().join("nested").join("clinic.db"),
            log_filter: "warn".into(),
        };
        let mut store = open_store(&config).unwrap();
        assert!(store.is_healthy());
        assert!(config.db_path.exists());
        assert!(store.list_patients().unwrap().is_empty());
    }
}
