//! Engine configuration.
//!
//! Loaded from a JSON file, from `QUESTGATE_*` environment variables, or both
//! (environment wins).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{ConfigError, StoreError};
use crate::nullifier::NullifierStore;

pub const ENV_NULLIFIER_BACKEND: &str = "QUESTGATE_NULLIFIER_BACKEND";
pub const ENV_NULLIFIER_PATH: &str = "QUESTGATE_NULLIFIER_PATH";
pub const ENV_SUBMIT_URL: &str = "QUESTGATE_SUBMIT_URL";
pub const ENV_GOALS_PATH: &str = "QUESTGATE_GOALS_PATH";
pub const ENV_REGISTRY_PATH: &str = "QUESTGATE_REGISTRY_PATH";
pub const ENV_NOW: &str = "QUESTGATE_NOW";

// ═══════════════════════════════════════════════════════════════════════════════
// NULLIFIER BACKEND
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullifierBackendKind {
    Memory,
    Sled,
    #[default]
    Json,
}

impl NullifierBackendKind {
    pub fn default_path(&self) -> Option<PathBuf> {
        match self {
            Self::Memory => None,
            Self::Sled => Some(PathBuf::from("data/nullifiers.db")),
            Self::Json => Some(PathBuf::from("data/nullifiers.json")),
        }
    }
}

impl fmt::Display for NullifierBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Sled => "sled",
            Self::Json => "json",
        })
    }
}

impl FromStr for NullifierBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "sled" => Ok(Self::Sled),
            "json" | "file" => Ok(Self::Json),
            other => Err(format!("unknown nullifier backend: {other}")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub nullifier_backend: NullifierBackendKind,

    /// Overrides the backend's default location.
    #[serde(default)]
    pub nullifier_path: Option<PathBuf>,

    /// Leaderboard base URL. Without it sessions cannot be submitted.
    #[serde(default)]
    pub submit_url: Option<String>,

    #[serde(default = "default_goals_path")]
    pub goals_path: PathBuf,

    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    /// Fixed "now" in unix seconds.
    #[serde(default)]
    pub fixed_now: Option<i64>,
}

fn default_goals_path() -> PathBuf {
    PathBuf::from("config/goals.json")
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("config/cards.json")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nullifier_backend: NullifierBackendKind::default(),
            nullifier_path: None,
            submit_url: None,
            goals_path: default_goals_path(),
            registry_path: default_registry_path(),
            fixed_now: None,
        }
    }
}

impl EngineConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env(|var| std::env::var(var).ok())
    }

    /// Apply `QUESTGATE_*` overrides read through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

        if let Some(value) = lookup(ENV_NULLIFIER_BACKEND) {
            self.nullifier_backend = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_NULLIFIER_BACKEND,
                value,
            })?;
        }
        if let Some(value) = lookup(ENV_NULLIFIER_PATH) {
            self.nullifier_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(ENV_SUBMIT_URL) {
            self.submit_url = Some(value);
        }
        if let Some(value) = lookup(ENV_GOALS_PATH) {
            self.goals_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_REGISTRY_PATH) {
            self.registry_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_NOW) {
            let secs = value
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|secs| DateTime::from_timestamp(*secs, 0).is_some())
                .ok_or_else(|| ConfigError::InvalidEnv {
                    var: ENV_NOW,
                    value: value.clone(),
                })?;
            self.fixed_now = Some(secs);
        }
        Ok(self)
    }

    pub fn nullifier_path(&self) -> Option<PathBuf> {
        self.nullifier_path
            .clone()
            .or_else(|| self.nullifier_backend.default_path())
    }

    pub fn open_nullifier_store(&self) -> Result<NullifierStore, StoreError> {
        let store = match (self.nullifier_backend, self.nullifier_path()) {
            (NullifierBackendKind::Sled, Some(path)) => NullifierStore::sled(path)?,
            (NullifierBackendKind::Json, Some(path)) => NullifierStore::json_file(path)?,
            _ => NullifierStore::in_memory(),
        };
        tracing::info!(backend = store.backend_name(), "nullifier store opened");
        Ok(store)
    }

    pub fn clock(&self) -> Clock {
        self.fixed_now.map_or_else(Clock::system, Clock::from_unix_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_to_json_store() {
        let config = EngineConfig::default().with_env(env(&[])).unwrap();
        assert_eq!(config.nullifier_backend, NullifierBackendKind::Json);
        assert_eq!(config.nullifier_path(), Some(PathBuf::from("data/nullifiers.json")));
        assert_eq!(config.goals_path, PathBuf::from("config/goals.json"));
        assert!(!config.clock().is_fixed());
    }

    #[test]
    fn env_overrides_apply() {
        let config = EngineConfig::default()
            .with_env(env(&[
                (ENV_NULLIFIER_BACKEND, "SLED"),
                (ENV_SUBMIT_URL, "http://localhost:3000"),
                (ENV_NOW, "1700000000"),
            ]))
            .unwrap();
        assert_eq!(config.nullifier_backend, NullifierBackendKind::Sled);
        assert_eq!(config.nullifier_path(), Some(PathBuf::from("data/nullifiers.db")));
        assert_eq!(config.submit_url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(config.clock().now().timestamp(), 1_700_000_000);
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        let err = EngineConfig::default()
            .with_env(env(&[(ENV_NULLIFIER_BACKEND, "redis")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: ENV_NULLIFIER_BACKEND, .. }));

        let err = EngineConfig::default()
            .with_env(env(&[(ENV_NOW, "yesterday")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: ENV_NOW, .. }));
    }

    #[test]
    fn unrepresentable_timestamp_is_rejected() {
        let far_future = i64::MAX.to_string();
        let err = EngineConfig::default()
            .with_env(env(&[(ENV_NOW, far_future.as_str())]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: ENV_NOW, .. }));

        let config = EngineConfig::default()
            .with_env(env(&[(ENV_NOW, "-86400")]))
            .unwrap();
        assert_eq!(config.clock().now().timestamp(), -86_400);
    }

    #[test]
    fn file_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "nullifier_backend": "memory" }"#).unwrap();

        let config = EngineConfig::from_path(&path).unwrap();
        assert_eq!(config.nullifier_backend, NullifierBackendKind::Memory);
        assert_eq!(config.nullifier_path(), None);
        assert_eq!(config.open_nullifier_store().unwrap().backend_name(), "memory");
    }

    #[test]
    fn opens_configured_json_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            nullifier_path: Some(dir.path().join("spent.json")),
            ..EngineConfig::default()
        };
        assert_eq!(config.open_nullifier_store().unwrap().backend_name(), "json");
    }
}
