use dirs::config_dir;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::driver::DriverOptions;

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "TABSCOPE_CONFIG";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub page_size: i64,
    pub preview_row_limit: i64,
    pub mongo_sample_size: i64,
    pub mongo_connect_timeout_secs: u64,
    pub mongo_query_timeout_secs: u64,
    pub mongo_count_timeout_secs: u64,
    pub sql_acquire_timeout_secs: u64,
    pub max_pool_connections: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            preview_row_limit: 1000,
            mongo_sample_size: 100,
            mongo_connect_timeout_secs: 10,
            mongo_query_timeout_secs: 30,
            mongo_count_timeout_secs: 5,
            sql_acquire_timeout_secs: 30,
            max_pool_connections: 5,
        }
    }
}

impl BrowserConfig {
    /// Defaults, then the JSON config file (if any), then environment overrides.
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        let mut config = match config_path() {
            Some(path) if path.exists() => match Self::from_file(&path) {
                Ok(cfg) => {
                    info!("Loaded config from {}", path.display());
                    cfg
                }
                Err(e) => {
                    warn!("Ignoring unreadable config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path).map_err(|e| e.to_string())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|e| e.to_string())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_i64("TABSCOPE_PAGE_SIZE") {
            self.page_size = v;
        }
        if let Some(v) = env_i64("TABSCOPE_ROW_LIMIT") {
            self.preview_row_limit = v;
        }
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            row_limit: if self.preview_row_limit > 0 { self.preview_row_limit } else { 1000 },
            sample_size: if self.mongo_sample_size > 0 { self.mongo_sample_size } else { 100 },
            max_connections: self.max_pool_connections.max(1),
            acquire_timeout: Duration::from_secs(self.sql_acquire_timeout_secs.max(1)),
            mongo_connect_timeout: Duration::from_secs(self.mongo_connect_timeout_secs.max(1)),
            mongo_query_timeout: Duration::from_secs(self.mongo_query_timeout_secs.max(1)),
            mongo_count_timeout: Duration::from_secs(self.mongo_count_timeout_secs.max(1)),
        }
    }
}

fn env_i64(key: &str) -> Option<i64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<i64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={:?}: not an integer", key, raw);
            None
        }
    }
}

/// `$TABSCOPE_CONFIG`, else `<config dir>/tabscope/config.json`
pub fn config_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV)
        && !explicit.trim().is_empty()
    {
        return Some(PathBuf::from(explicit));
    }
    config_dir().map(|mut dir| {
        dir.push("tabscope");
        dir.push(CONFIG_FILE);
        dir
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = BrowserConfig::from_json(r#"{"page_size": 50}"#).unwrap();
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.preview_row_limit, 1000);
        assert_eq!(cfg.mongo_sample_size, 100);
    }

    #[test]
    fn driver_options_never_zero() {
        let cfg = BrowserConfig {
            preview_row_limit: 0,
            mongo_sample_size: -1,
            max_pool_connections: 0,
            mongo_query_timeout_secs: 0,
            ..BrowserConfig::default()
        };
        let opts = cfg.driver_options();
        assert_eq!(opts.row_limit, 1000);
        assert_eq!(opts.sample_size, 100);
        assert_eq!(opts.max_connections, 1);
        assert_eq!(opts.mongo_query_timeout, Duration::from_secs(1));
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(BrowserConfig::from_json("{not json").is_err());
    }
}
