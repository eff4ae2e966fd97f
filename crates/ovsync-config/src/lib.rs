//! Shared configuration for ovsync consumers.
//!
//! TOML connection profiles, `OVSYNC_` environment overrides, and
//! translation to `ovsync_core::ClientConfig`. The core crate never reads
//! files; tools build their config here and hand it in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ovsync_core::{ClientConfig, DEFAULT_DATABASE};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{profile}'")]
    UnknownProfile { profile: String },

    #[error("no profile selected and no default_profile configured")]
    NoProfile,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named explicitly.
    pub default_profile: Option<String>,

    /// Named connection profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name, falling back to `default_profile`.
    ///
    /// The implicit `default` profile resolves to the local socket even
    /// when it is not written out in the file.
    pub fn profile(&self, name: Option<&str>) -> Result<Profile, ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .ok_or(ConfigError::NoProfile)?;

        match self.profiles.get(name) {
            Some(profile) => Ok(profile.clone()),
            None if name == "default" => Ok(Profile::default()),
            None => Err(ConfigError::UnknownProfile {
                profile: name.into(),
            }),
        }
    }
}

/// A named connection profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Transport kind: "unix" or "tcp".
    #[serde(default = "default_transport")]
    pub transport: String,

    /// Socket path or `host:port`. Empty selects the transport default.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_database")]
    pub database: String,

    /// Connect timeout in seconds.
    pub timeout: Option<u64>,

    /// Per-request timeout in seconds. Unset waits indefinitely.
    pub request_timeout: Option<u64>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            endpoint: String::new(),
            database: default_database(),
            timeout: None,
            request_timeout: None,
        }
    }
}

fn default_transport() -> String {
    "unix".into()
}
fn default_database() -> String {
    DEFAULT_DATABASE.into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "ovsync", "ovsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ovsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Nested keys are separated by a double underscore, so
/// `OVSYNC_PROFILES__LAB__ENDPOINT` sets `profiles.lab.endpoint`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("OVSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `ClientConfig` from a profile.
pub fn profile_to_client_config(profile: &Profile) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::from_parts(&profile.transport, &profile.endpoint).map_err(
        |err| ConfigError::Validation {
            field: "endpoint".into(),
            reason: err.to_string(),
        },
    )?;

    if profile.database.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "database".into(),
            reason: "must not be empty".into(),
        });
    }
    config.database.clone_from(&profile.database);

    if let Some(secs) = profile.timeout {
        config.connect_timeout = seconds("timeout", secs)?;
    }
    if let Some(secs) = profile.request_timeout {
        config.request_timeout = Some(seconds("request_timeout", secs)?);
    }

    Ok(config)
}

fn seconds(field: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be at least 1 second".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}
