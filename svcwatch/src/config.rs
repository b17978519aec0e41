//! Client configuration: named connection profiles plus tunables.
//! Stored under XDG config dir: $XDG_CONFIG_HOME/svcwatch/config.json
//! (fallback ~/.config/svcwatch/config.json)

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, io, path::PathBuf, time::Duration};

use crate::history::DEFAULT_MAX_POINTS;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/v1/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProfileEntry {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_ca: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub max_points: usize,
    /// Default lookback for metrics queries, in the server's duration syntax.
    pub lookback: String,
    pub refresh_interval_secs: u64,
    /// Host memory total used until the stream reports the real one.
    pub fallback_total_mb: f64,
    pub reconnect_delay_ms: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            lookback: "24h".into(),
            refresh_interval_secs: 5 * 60,
            fallback_total_mb: 16384.0,
            reconnect_delay_ms: 3000,
        }
    }
}

impl Tunables {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileEntry>,
    #[serde(default)]
    pub tunables: Tunables,
    #[serde(default)]
    pub version: u32,
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("svcwatch")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("svcwatch")
    }
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// Missing or unparsable config falls back to defaults
pub fn load_config() -> ConfigFile {
    let path = config_path();
    match fs::read_to_string(&path) {
        Ok(s) => match serde_json::from_str(&s) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable config: {e}");
                ConfigFile::default()
            }
        },
        Err(_) => ConfigFile::default(),
    }
}

pub fn save_config(cfg: &ConfigFile) -> io::Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(cfg).map_err(io::Error::other)?;
    fs::write(path, data)
}

#[derive(Debug, PartialEq)]
pub enum ResolveProfile {
    /// Use the provided runtime inputs (maybe persisted by the caller). (url, tls_ca)
    Direct(String, Option<String>),
    /// Loaded from existing profile entry (url, tls_ca)
    Loaded(String, Option<String>),
    /// Profile name given without a URL, and no such profile exists
    Unknown(String),
    /// Nothing given; no profiles saved either
    None,
}

pub struct ProfileRequest {
    pub profile_name: Option<String>,
    pub url: Option<String>,
    pub tls_ca: Option<String>,
}

impl ProfileRequest {
    pub fn resolve(self, cfg: &ConfigFile) -> ResolveProfile {
        match (self.url, self.profile_name) {
            (Some(u), _) => ResolveProfile::Direct(u, self.tls_ca),
            (None, Some(name)) => match cfg.profiles.get(&name) {
                Some(entry) => ResolveProfile::Loaded(
                    entry.url.clone(),
                    self.tls_ca.or_else(|| entry.tls_ca.clone()),
                ),
                None => ResolveProfile::Unknown(name),
            },
            // Nothing provided -> first saved profile, if any
            (None, None) => match cfg.profiles.values().next() {
                Some(entry) => ResolveProfile::Loaded(entry.url.clone(), entry.tls_ca.clone()),
                None => ResolveProfile::None,
            },
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProfileChange {
    Created,
    Updated,
    Unchanged,
    /// Differs from the saved entry but overwriting was not requested.
    Kept,
}

/// Record `entry` under `name`. A new profile is always stored; an existing
/// one is only overwritten when `overwrite` is set.
pub fn upsert_profile(
    cfg: &mut ConfigFile,
    name: &str,
    entry: ProfileEntry,
    overwrite: bool,
) -> ProfileChange {
    match cfg.profiles.get(name) {
        None => {
            cfg.profiles.insert(name.to_string(), entry);
            ProfileChange::Created
        }
        Some(existing) if *existing == entry => ProfileChange::Unchanged,
        Some(_) if overwrite => {
            cfg.profiles.insert(name.to_string(), entry);
            ProfileChange::Updated
        }
        Some(_) => ProfileChange::Kept,
    }
}
