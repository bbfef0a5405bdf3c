use std::fmt::{Display, Formatter};

pub const STATUS_RUNNING: &str = "RUNNING";

/// User supplied hints narrowing down which task to attach to.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ResourceSelector {
    pub cluster: Option<String>,
    pub service: Option<String>,
}

impl ResourceSelector {
    pub fn new(cluster: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            cluster: non_empty(cluster.into()),
            service: non_empty(service.into()),
        }
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TaskDescriptor {
    pub arn: String,
    pub group: String,
    pub status: String,
    pub execute_command_enabled: bool,
    pub containers: Vec<ContainerDescriptor>,
}

impl TaskDescriptor {
    /// Last path segment of the task ARN, e.g. `0123abcd` for
    /// `arn:aws:ecs:eu-west-1:123:task/prod/0123abcd`.
    pub fn task_id(&self) -> &str {
        self.arn.rsplit('/').next().unwrap_or(&self.arn)
    }

    pub fn is_running(&self) -> bool {
        self.status == STATUS_RUNNING
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ContainerDescriptor {
    pub name: String,
    pub runtime_id: String,
    pub task_arn: String,
    /// Last status of the container's `ExecuteCommandAgent`, when reported.
    pub execute_command_agent: Option<String>,
}

impl ContainerDescriptor {
    /// Containers without managed-agent information inherit eligibility from
    /// their task, which has already been filtered on `enableExecuteCommand`.
    pub fn execute_command_enabled(&self) -> bool {
        self.execute_command_agent
            .as_deref()
            .is_none_or(|status| status == STATUS_RUNNING)
    }
}

/// Output of the resolution pipeline, consumed once per invocation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResolvedResource {
    pub cluster: String,
    pub task: TaskDescriptor,
    pub container: ContainerDescriptor,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionMode {
    Exec {
        command: String,
    },
    PortForward {
        target_port: String,
        local_port: String,
    },
    RemotePortForward {
        remote_port: String,
        local_port: String,
        host: String,
    },
}

impl Display for SessionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exec { command } => write!(f, "exec `{command}`"),
            Self::PortForward {
                target_port,
                local_port,
            } => write!(f, "portforward localhost:{local_port} -> :{target_port}"),
            Self::RemotePortForward {
                remote_port,
                local_port,
                host,
            } => write!(f, "remoteportforward localhost:{local_port} -> {host}:{remote_port}"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SessionRequest {
    pub mode: SessionMode,
    pub resource: ResolvedResource,
}

/// Strips the structured prefix from an ARN-style name, leaving the bare name.
pub fn bare_name(value: &str) -> &str {
    match value.split_once('/') {
        Some((_, name)) => name,
        None => value,
    }
}

/// Only the empty string counts as absent; anything else is kept verbatim.
fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
