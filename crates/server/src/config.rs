//! Server configuration
//!
//! Loaded from `tavern.toml` in the working directory if present, then
//! overridden by `TAVERN_*` environment variables.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use tavern_core::{Error, Result};
use tracing::{info, warn};

/// Session lifetime: one week
const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;

/// Upper bound a history query may request
const DEFAULT_HISTORY_MAX_LIMIT: u32 = 500;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// SQLite database path; defaults to the platform data directory
    pub database_path: Option<PathBuf>,
    /// Hours until a new session expires
    pub session_ttl_hours: i64,
    /// Cap on the `limit` parameter of history queries
    pub history_max_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: tavern_net::DEFAULT_PORT,
            database_path: None,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            history_max_limit: DEFAULT_HISTORY_MAX_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Load configuration: `tavern.toml` if present, then env overrides
    pub fn load() -> Self {
        let mut config = Self::from_file(Path::new("tavern.toml")).unwrap_or_default();
        config.apply_env();
        config
    }

    fn from_file(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&raw) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded configuration file");
                Some(config)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring invalid configuration file");
                None
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("TAVERN_BIND") {
            match bind.parse() {
                Ok(addr) => self.bind = addr,
                Err(_) => warn!(bind = %bind, "Ignoring invalid TAVERN_BIND"),
            }
        }
        if let Ok(port) = std::env::var("TAVERN_PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!(port = %port, "Ignoring invalid TAVERN_PORT"),
            }
        }
        if let Ok(path) = std::env::var("TAVERN_DB") {
            self.database_path = Some(PathBuf::from(path));
        }
    }

    /// Resolve the database path, falling back to the platform data dir
    pub fn resolved_database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }

        let dirs = ProjectDirs::from("dev", "tavern", "tavern").ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine data directory",
            ))
        })?;

        Ok(dirs.data_dir().join("tavern.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, tavern_net::DEFAULT_PORT);
        assert_eq!(config.session_ttl_hours, 24 * 7);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tavern.toml");
        std::fs::write(&path, "port = 9000\ndatabase_path = \"/tmp/t.db\"\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/t.db")));
        assert_eq!(config.history_max_limit, DEFAULT_HISTORY_MAX_LIMIT);
    }

    #[test]
    fn test_invalid_file_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tavern.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        assert!(ServerConfig::from_file(&path).is_none());
    }
}
