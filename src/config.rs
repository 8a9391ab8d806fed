use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Dentara";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DB_FILE_NAME: &str = "dentara.db";

/// Environment variable overriding the database location.
pub const DB_PATH_ENV: &str = "DENTARA_DB_PATH";
/// Environment variable overriding the log filter (when `RUST_LOG` is unset).
pub const LOG_FILTER_ENV: &str = "DENTARA_LOG";

/// Get the application data directory: the platform data dir, or the temp
/// dir when the platform has none.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Default location of the clinic database
pub fn default_db_path() -> PathBuf {
    app_data_dir().join(DB_FILE_NAME)
}

/// Log filter used when neither `RUST_LOG` nor `DENTARA_LOG` is set.
pub fn default_log_filter() -> &'static str {
    "info,dentara_lib=debug"
}

/// Settings the host injects when opening the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub log_filter: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_filter: default_log_filter().to_string(),
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by `DENTARA_DB_PATH` and `DENTARA_LOG`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            db_path: lookup(DB_PATH_ENV)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            log_filter: lookup(LOG_FILTER_ENV)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.log_filter),
        }
    }
}
