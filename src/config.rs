use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::SESSION_MANAGER_PLUGIN;
use crate::wait::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_POLL_INTERVAL};

/// Process-wide settings, assembled once at start-up and read-only afterwards.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub version: &'static str,
    pub source: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub plugin: String,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct TnnlConfigFile {
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    profile: Option<String>,
    #[serde(default, alias = "session_manager_plugin")]
    plugin: Option<String>,
    #[serde(default, alias = "poll_interval")]
    poll_interval_secs: Option<u64>,
    #[serde(default, alias = "heartbeat_interval")]
    heartbeat_interval_secs: Option<u64>,
}

impl RuntimeConfig {
    pub fn defaults(version: &'static str) -> Self {
        Self {
            version,
            source: None,
            region: None,
            profile: None,
            plugin: SESSION_MANAGER_PLUGIN.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    pub fn discover(version: &'static str) -> Result<Self> {
        match discover_config_path() {
            Some(path) => Self::load(version, path),
            None => Ok(Self::defaults(version)),
        }
    }

    pub fn load(version: &'static str, path: PathBuf) -> Result<Self> {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let parsed: TnnlConfigFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;

        let mut config = Self::defaults(version);
        config.source = Some(path.display().to_string());
        config.region = parsed.region.filter(|value| !value.trim().is_empty());
        config.profile = parsed.profile.filter(|value| !value.trim().is_empty());
        if let Some(plugin) = parsed.plugin.filter(|value| !value.trim().is_empty()) {
            config.plugin = plugin;
        }
        if let Some(secs) = parsed.poll_interval_secs {
            config.poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parsed.heartbeat_interval_secs {
            config.heartbeat_interval = Duration::from_secs(secs.max(1));
        }
        Ok(config)
    }

    /// Command-line values win over the config file.
    pub fn with_overrides(mut self, region: Option<String>, profile: Option<String>) -> Self {
        if region.is_some() {
            self.region = region;
        }
        if profile.is_some() {
            self.profile = profile;
        }
        self
    }
}

static LOCAL_CONFIG_FILES: [&str; 3] = ["tnnl.yaml", "tnnl.yml", ".tnnl.yaml"];
static HOME_CONFIG_FILES: [&str; 3] = [
    ".config/tnnl/config.yaml",
    ".config/tnnl/config.yml",
    ".tnnl.yaml",
];

/// `TNNL_CONFIG` wins outright; otherwise the first existing candidate.
fn discover_config_path() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os("TNNL_CONFIG").filter(|path| !path.is_empty()) {
        return Some(PathBuf::from(explicit));
    }

    config_candidates(std::env::var_os("HOME").map(PathBuf::from))
        .find(|candidate| candidate.is_file())
}

/// Working-directory files first, then files under `home`.
fn config_candidates(home: Option<PathBuf>) -> impl Iterator<Item = PathBuf> {
    let under_home = home
        .into_iter()
        .flat_map(|home| HOME_CONFIG_FILES.iter().map(move |file| home.join(file)));
    LOCAL_CONFIG_FILES
        .iter()
        .map(PathBuf::from)
        .chain(under_home)
}
