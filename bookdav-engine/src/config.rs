//! Engine configuration.
//!
//! Settings come from an optional TOML file overlaid with `BOOKDAV_*`
//! environment variables (`BOOKDAV_SERVER_ROOT`, ...). Every setting has
//! a default except the CalDAV server root, which must be provided.

use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use bookdav_core::error::{BookdavError, BookdavResult};

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Path of the SQLite availability database.
    pub database_path: String,
    /// Base URL of the CalDAV server.
    pub server_root: String,
    /// Seconds between reflection worker passes.
    pub reflection_interval_secs: u64,
    /// Seconds before an abandoned reflection lock expires.
    pub lock_ttl_secs: u64,
}

impl EngineConfig {
    /// Load configuration from `path` (ignored when absent) and the
    /// environment.
    pub fn load(path: &str) -> BookdavResult<Self> {
        Config::builder()
            .set_default("database_path", "bookdav.db")
            .map_err(config_err)?
            .set_default("reflection_interval_secs", 60_i64)
            .map_err(config_err)?
            .set_default("lock_ttl_secs", 300_i64)
            .map_err(config_err)?
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("BOOKDAV"))
            .build()
            .map_err(config_err)?
            .try_deserialize()
            .map_err(config_err)
    }

    pub fn reflection_interval(&self) -> Duration {
        Duration::from_secs(self.reflection_interval_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}

fn config_err(e: config::ConfigError) -> BookdavError {
    BookdavError::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookdav.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "server_root = \"https://dav.example.com/cal/\"").unwrap();
        writeln!(file, "reflection_interval_secs = 15").unwrap();

        let config = EngineConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server_root, "https://dav.example.com/cal/");
        assert_eq!(config.reflection_interval(), Duration::from_secs(15));
        assert_eq!(config.database_path, "bookdav.db");
        assert_eq!(config.lock_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_missing_server_root_fails() {
        let err = EngineConfig::load("/nonexistent/bookdav.toml").unwrap_err();
        assert!(matches!(err, BookdavError::Config(_)));
    }
}
