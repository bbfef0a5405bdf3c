use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::model::{ResourceSelector, SessionMode};
use crate::session::validate_mode;

/// A per-mode input document. File values win; command-line values only
/// fill fields the file left at their zero value.
pub trait ModeInput: Serialize + DeserializeOwned + Default {
    const SKELETON_PATH: &'static str;

    fn fill_from(&mut self, flags: Self);

    fn selector(&self) -> ResourceSelector;

    fn mode(&self) -> SessionMode;

    fn validate(&self) -> Vec<String> {
        validate_mode(&self.mode())
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecInput {
    pub cluster: String,
    pub service: String,
    pub command: String,
    pub wait: u64,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortForwardInput {
    pub cluster: String,
    pub service: String,
    pub target_port_number: String,
    pub local_port_number: String,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemotePortForwardInput {
    pub cluster: String,
    pub service: String,
    pub remote_port_number: String,
    pub local_port_number: String,
    pub host: String,
}

impl ModeInput for ExecInput {
    const SKELETON_PATH: &'static str = "exec-input.json";

    fn fill_from(&mut self, flags: Self) {
        fill(&mut self.cluster, flags.cluster);
        fill(&mut self.service, flags.service);
        fill(&mut self.command, flags.command);
        if self.wait == 0 {
            self.wait = flags.wait;
        }
    }

    fn selector(&self) -> ResourceSelector {
        ResourceSelector::new(&self.cluster, &self.service)
    }

    fn mode(&self) -> SessionMode {
        SessionMode::Exec {
            command: self.command.clone(),
        }
    }
}

impl ModeInput for PortForwardInput {
    const SKELETON_PATH: &'static str = "portforward-input.json";

    fn fill_from(&mut self, flags: Self) {
        fill(&mut self.cluster, flags.cluster);
        fill(&mut self.service, flags.service);
        fill(&mut self.target_port_number, flags.target_port_number);
        fill(&mut self.local_port_number, flags.local_port_number);
    }

    fn selector(&self) -> ResourceSelector {
        ResourceSelector::new(&self.cluster, &self.service)
    }

    fn mode(&self) -> SessionMode {
        SessionMode::PortForward {
            target_port: self.target_port_number.clone(),
            local_port: self.local_port_number.clone(),
        }
    }
}

impl ModeInput for RemotePortForwardInput {
    const SKELETON_PATH: &'static str = "remoteportforward-input.json";

    fn fill_from(&mut self, flags: Self) {
        fill(&mut self.cluster, flags.cluster);
        fill(&mut self.service, flags.service);
        fill(&mut self.remote_port_number, flags.remote_port_number);
        fill(&mut self.local_port_number, flags.local_port_number);
        fill(&mut self.host, flags.host);
    }

    fn selector(&self) -> ResourceSelector {
        ResourceSelector::new(&self.cluster, &self.service)
    }

    fn mode(&self) -> SessionMode {
        SessionMode::RemotePortForward {
            remote_port: self.remote_port_number.clone(),
            local_port: self.local_port_number.clone(),
            host: self.host.clone(),
        }
    }
}

fn fill(field: &mut String, flag: String) {
    if field.is_empty() {
        *field = flag;
    }
}

/// Loads `path` when given, merges command-line values underneath it.
pub fn merge_with_file<T: ModeInput>(path: Option<&Path>, flags: T) -> Result<T> {
    let Some(path) = path else {
        return Ok(flags);
    };
    let mut input: T = read_input_file(path)?;
    input.fill_from(flags);
    Ok(input)
}

pub fn read_input_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to decode input file {}", path.display()))
}

pub fn make_input_file<T: ModeInput>(dir: &Path) -> Result<String> {
    let path = dir.join(T::SKELETON_PATH);
    let json = serde_json::to_string(&T::default()).context("failed to encode input skeleton")?;
    fs::write(&path, json)
        .with_context(|| format!("failed to write input file {}", path.display()))?;
    Ok(path.display().to_string())
}
