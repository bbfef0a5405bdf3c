mod app;
mod chooser;
mod cli;
mod config;
mod ecs;
mod error;
mod input;
mod model;
mod outcome;
mod resolve;
mod session;
#[cfg(test)]
mod testing;
mod wait;

use anyhow::{Context, Result};
use app::App;
use chooser::TerminalChooser;
use clap::{CommandFactory, Parser};
use cli::{CliArgs, CliCommand, InputFileCommand};
use config::RuntimeConfig;
use ecs::{AwsGateway, AwsSettings};
use error::Error;
use input::{ModeInput, make_input_file, merge_with_file};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    if let Err(error) = init_tracing(&args.log_filter) {
        eprintln!("{error:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{}", compact_error(&error));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(directives: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directives)
        .or_else(|_| EnvFilter::try_new("info"))
        .with_context(|| format!("unusable log filter `{directives}`"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact()
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to install log subscriber: {error}"))
}

async fn run(args: CliArgs) -> Result<()> {
    let config = RuntimeConfig::discover(env!("CARGO_PKG_VERSION"))?
        .with_overrides(args.region.clone(), args.profile.clone());
    debug!(source = ?config.source, plugin = %config.plugin, "runtime config");

    if args.show_version {
        println!("{}", config.version);
        return Ok(());
    }

    let Some(command) = args.command.as_ref() else {
        CliArgs::command()
            .print_help()
            .context("failed to print help")?;
        return Ok(());
    };

    match command {
        CliCommand::Version => {
            println!("{}", config.version);
            Ok(())
        }
        CliCommand::Exec(exec) => {
            if let Some(InputFileCommand::MakeInputFile) = exec.action {
                return write_skeleton::<input::ExecInput>();
            }
            let input = merge_with_file(exec.input_file.as_deref(), exec.to_input(&args))?;
            let wait = Duration::from_secs(input.wait);
            attach(&config, input, Some(wait)).await?;
            Ok(())
        }
        CliCommand::Portforward(pf) => {
            if let Some(InputFileCommand::MakeInputFile) = pf.action {
                return write_skeleton::<input::PortForwardInput>();
            }
            let input = merge_with_file(pf.input_file.as_deref(), pf.to_input(&args))?;
            attach(&config, input, None).await?;
            Ok(())
        }
        CliCommand::Remoteportforward(remote) => {
            if let Some(InputFileCommand::MakeInputFile) = remote.action {
                return write_skeleton::<input::RemotePortForwardInput>();
            }
            let input = merge_with_file(remote.input_file.as_deref(), remote.to_input(&args))?;
            attach(&config, input, None).await?;
            Ok(())
        }
    }
}

fn write_skeleton<T: ModeInput>() -> Result<()> {
    let path = make_input_file::<T>(Path::new("."))?;
    println!("made {path}");
    Ok(())
}

/// Validates, resolves and hands the terminal to the session helper.
/// Cancellation at any selection step ends quietly.
async fn attach<T: ModeInput>(
    config: &RuntimeConfig,
    input: T,
    wait_budget: Option<Duration>,
) -> Result<(), Error> {
    Error::validation(input.validate())?;

    let settings = AwsSettings {
        region: config.region.clone(),
        profile: config.profile.clone(),
    };
    let gateway = AwsGateway::new(&settings).await.map_err(Error::Lookup)?;
    let region = gateway.region().to_string();
    let mut app = App::new(gateway, TerminalChooser, config.clone(), region);

    match app.prepare(&input.selector(), input.mode(), wait_budget).await? {
        Some(command) => command.run().await,
        None => Ok(()),
    }
}

/// Top-level message plus at most two causes.
fn compact_error(error: &anyhow::Error) -> String {
    let mut chain = error.chain().take(3);
    let head = chain.next().map(ToString::to_string).unwrap_or_default();
    chain.fold(head, |out, cause| format!("{out}\ncaused by: {cause}"))
}
