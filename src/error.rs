use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{}", .0.join("\n"))]
    Validation(Vec<String>),

    #[error(transparent)]
    Lookup(anyhow::Error),

    #[error("chooser failed: {0:#}")]
    Chooser(anyhow::Error),

    #[error("task {task_arn} did not reach RUNNING within {}s", .timeout.as_secs())]
    WaitTimeout { task_arn: String, timeout: Duration },

    #[error("task {task_arn} stopped before reaching RUNNING (last status {status})")]
    TaskStopped { task_arn: String, status: String },

    #[error("waiting for task failed: {0:#}")]
    Wait(anyhow::Error),

    #[error("failed to start session: {0:#}")]
    StartSession(anyhow::Error),

    #[error("{program} {reason}")]
    Dispatch { program: String, reason: String },

    #[error(transparent)]
    Input(anyhow::Error),
}

impl Error {
    pub fn validation(messages: Vec<String>) -> Result<(), Self> {
        if messages.is_empty() {
            Ok(())
        } else {
            Err(Self::Validation(messages))
        }
    }
}
