use anyhow::Context;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, TcpListener};
use std::process::Stdio;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

use crate::ecs::{EcsApi, SessionGrant, SessionTarget};
use crate::error::Error;
use crate::model::{SessionMode, SessionRequest};

pub const SESSION_MANAGER_PLUGIN: &str = "session-manager-plugin";
const START_SESSION_OPERATION: &str = "StartSession";

/// Session document brokered by the control plane, one per mode.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Document {
    Exec,
    PortForward,
    RemotePortForward,
}

impl Document {
    pub fn for_mode(mode: &SessionMode) -> Self {
        match mode {
            SessionMode::Exec { .. } => Self::Exec,
            SessionMode::PortForward { .. } => Self::PortForward,
            SessionMode::RemotePortForward { .. } => Self::RemotePortForward,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Exec => "AmazonECS-ExecuteInteractiveCommand",
            Self::PortForward => "AWS-StartPortForwardingSession",
            Self::RemotePortForward => "AWS-StartPortForwardingSessionToRemoteHost",
        }
    }
}

/// Missing mode-specific fields, one message per field.
pub fn validate_mode(mode: &SessionMode) -> Vec<String> {
    let mut messages = Vec::new();
    match mode {
        SessionMode::Exec { command } => {
            if command.trim().is_empty() {
                messages.push("command is required".to_string());
            }
        }
        SessionMode::PortForward { target_port, .. } => {
            if target_port.is_empty() {
                messages.push("target-port is required".to_string());
            }
        }
        SessionMode::RemotePortForward {
            remote_port, host, ..
        } => {
            if remote_port.is_empty() {
                messages.push("remote-port is required".to_string());
            }
            if host.is_empty() {
                messages.push("host is required".to_string());
            }
        }
    }
    messages
}

/// Document parameters for a mode. An empty local port is replaced by a free
/// ephemeral port.
pub fn session_parameters(mode: &SessionMode) -> Result<BTreeMap<String, Vec<String>>, Error> {
    Error::validation(validate_mode(mode))?;

    let mut parameters = BTreeMap::new();
    match mode {
        SessionMode::Exec { command } => {
            parameters.insert("command".to_string(), vec![command.clone()]);
        }
        SessionMode::PortForward {
            target_port,
            local_port,
        } => {
            parameters.insert("portNumber".to_string(), vec![target_port.clone()]);
            parameters.insert("localPortNumber".to_string(), vec![local_or_free(local_port)?]);
        }
        SessionMode::RemotePortForward {
            remote_port,
            local_port,
            host,
        } => {
            parameters.insert("portNumber".to_string(), vec![remote_port.clone()]);
            parameters.insert("localPortNumber".to_string(), vec![local_or_free(local_port)?]);
            parameters.insert("host".to_string(), vec![host.clone()]);
        }
    }
    Ok(parameters)
}

fn local_or_free(local_port: &str) -> Result<String, Error> {
    if !local_port.is_empty() {
        return Ok(local_port.to_string());
    }
    let port = available_port().map_err(Error::Input)?;
    debug!(port, "auto-assigned local port");
    Ok(port.to_string())
}

/// Asks the OS for a free TCP port on the loopback interface.
pub fn available_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .context("failed to bind an ephemeral local port")?;
    let port = listener
        .local_addr()
        .context("failed to read ephemeral local port")?
        .port();
    Ok(port)
}

/// Fully assembled invocation of the session helper.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    pub fn session_manager(program: &str, grant: &SessionGrant, region: &str) -> Self {
        Self {
            program: program.to_string(),
            args: vec![
                grant.payload.clone(),
                region.to_string(),
                START_SESSION_OPERATION.to_string(),
            ],
        }
    }

    fn to_command(&self) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }

    /// Hands the terminal to the helper and blocks until it exits.
    pub async fn run(&self) -> Result<(), Error> {
        debug!(program = %self.program, "starting session helper");
        let mut child = self.to_command().spawn().map_err(|error| Error::Dispatch {
            program: self.program.clone(),
            reason: format!("failed to start: {error}"),
        })?;

        // Interrupts belong to the remote session while the helper is attached.
        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                _ = tokio::signal::ctrl_c() => debug!("interrupt forwarded to session helper"),
            }
        };

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(Error::Dispatch {
                program: self.program.clone(),
                reason: format!("exited with {status}"),
            }),
            Err(error) => Err(Error::Dispatch {
                program: self.program.clone(),
                reason: format!("failed while waiting: {error}"),
            }),
        }
    }
}

pub struct SessionCommandBuilder<'a, G> {
    gateway: &'a G,
    region: &'a str,
    plugin: &'a str,
}

impl<'a, G: EcsApi> SessionCommandBuilder<'a, G> {
    pub fn new(gateway: &'a G, region: &'a str, plugin: &'a str) -> Self {
        Self {
            gateway,
            region,
            plugin,
        }
    }

    pub async fn build(&self, request: &SessionRequest) -> Result<ExternalCommand, Error> {
        let parameters = session_parameters(&request.mode)?;
        let document = Document::for_mode(&request.mode);
        let resource = &request.resource;
        let target = SessionTarget {
            cluster: resource.cluster.clone(),
            task_arn: resource.task.arn.clone(),
            task_id: resource.task.task_id().to_string(),
            container_name: resource.container.name.clone(),
            runtime_id: resource.container.runtime_id.clone(),
        };

        let grant = self
            .gateway
            .start_session(&target, document, &parameters)
            .await
            .map_err(Error::StartSession)?;
        if grant.token.is_empty() {
            return Err(Error::StartSession(anyhow::anyhow!(
                "control plane returned an empty session token"
            )));
        }
        info!(
            document = document.name(),
            container = %target.container_name,
            task = %target.task_id,
            "session started: {}",
            request.mode
        );

        Ok(ExternalCommand::session_manager(
            self.plugin,
            &grant,
            self.region,
        ))
    }
}
