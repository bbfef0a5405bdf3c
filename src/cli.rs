use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::input::{ExecInput, PortForwardInput, RemotePortForwardInput};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "tnnl",
    about = "Attach a shell or a port forward to a running ECS task.",
    disable_version_flag = true
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<CliCommand>,

    /// Print the version
    #[arg(short = 'v', long = "version")]
    pub show_version: bool,

    /// Cluster to use instead of choosing one
    #[arg(long, global = true)]
    pub cluster: Option<String>,

    /// Only consider tasks of this service
    #[arg(long, global = true)]
    pub service: Option<String>,

    /// AWS region (overrides config and environment)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// AWS shared-config profile
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_filter: String,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// like ecs execute-command
    Exec(ExecArgs),
    /// like start-session --document-name AWS-StartPortForwardingSession
    Portforward(PortForwardArgs),
    /// like start-session --document-name AWS-StartPortForwardingSessionToRemoteHost
    Remoteportforward(RemotePortForwardArgs),
    /// Print the version
    Version,
}

#[derive(Debug, Clone, Subcommand)]
pub enum InputFileCommand {
    /// Write an input file skeleton into the current directory
    MakeInputFile,
}

#[derive(Debug, Clone, Args)]
pub struct ExecArgs {
    #[command(subcommand)]
    pub action: Option<InputFileCommand>,

    /// Command to run in the container
    #[arg(long, default_value = "sh")]
    pub command: String,

    /// Seconds to wait for the task to reach RUNNING before attaching
    #[arg(long, default_value_t = 0)]
    pub wait: u64,

    /// Input file path (see `exec make-input-file`)
    #[arg(long)]
    pub input_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct PortForwardArgs {
    #[command(subcommand)]
    pub action: Option<InputFileCommand>,

    /// Local port; auto assigned when omitted
    #[arg(short, long)]
    pub local_port: Option<String>,

    /// Port in the container
    #[arg(short, long)]
    pub target_port: Option<String>,

    /// Input file path (see `portforward make-input-file`)
    #[arg(long)]
    pub input_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct RemotePortForwardArgs {
    #[command(subcommand)]
    pub action: Option<InputFileCommand>,

    /// Local port; auto assigned when omitted
    #[arg(short, long)]
    pub local_port: Option<String>,

    /// Port on the remote host
    #[arg(short, long)]
    pub remote_port: Option<String>,

    /// Remote host reachable from the task
    #[arg(long)]
    pub host: Option<String>,

    /// Input file path (see `remoteportforward make-input-file`)
    #[arg(long)]
    pub input_file: Option<PathBuf>,
}

impl CliArgs {
    fn hint(value: &Option<String>) -> String {
        value.clone().unwrap_or_default()
    }
}

impl ExecArgs {
    pub fn to_input(&self, cli: &CliArgs) -> ExecInput {
        ExecInput {
            cluster: CliArgs::hint(&cli.cluster),
            service: CliArgs::hint(&cli.service),
            command: self.command.clone(),
            wait: self.wait,
        }
    }
}

impl PortForwardArgs {
    pub fn to_input(&self, cli: &CliArgs) -> PortForwardInput {
        PortForwardInput {
            cluster: CliArgs::hint(&cli.cluster),
            service: CliArgs::hint(&cli.service),
            target_port_number: self.target_port.clone().unwrap_or_default(),
            local_port_number: self.local_port.clone().unwrap_or_default(),
        }
    }
}

impl RemotePortForwardArgs {
    pub fn to_input(&self, cli: &CliArgs) -> RemotePortForwardInput {
        RemotePortForwardInput {
            cluster: CliArgs::hint(&cli.cluster),
            service: CliArgs::hint(&cli.service),
            remote_port_number: self.remote_port.clone().unwrap_or_default(),
            local_port_number: self.local_port.clone().unwrap_or_default(),
            host: self.host.clone().unwrap_or_default(),
        }
    }
}
