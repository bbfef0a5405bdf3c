use std::io::Write;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ecs::EcsApi;
use crate::error::Error;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(6);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);
const HEARTBEAT_MARK: &[u8] = b".";
const TERMINAL_STATUSES: [&str; 3] = ["STOPPING", "STOPPED", "DELETED"];

#[derive(Debug, Clone, Copy)]
pub struct WaitSettings {
    pub budget: Duration,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

/// Blocks until the task reports RUNNING, printing a heartbeat to `progress`
/// while waiting.
///
/// The poller and the heartbeat share one cancellation token and are joined
/// in the calling task; whatever the poller returns, the heartbeat is torn
/// down before this returns.
pub async fn wait_running<G, W>(
    gateway: &G,
    cluster: &str,
    task_arn: &str,
    settings: WaitSettings,
    progress: &mut W,
) -> Result<(), Error>
where
    G: EcsApi,
    W: Write,
{
    let signal = CancellationToken::new();

    let poller = async {
        let result = match timeout(
            settings.budget,
            poll_until_running(gateway, cluster, task_arn, settings.poll_interval),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::WaitTimeout {
                task_arn: task_arn.to_string(),
                timeout: settings.budget,
            }),
        };
        signal.cancel();
        result
    };
    let heartbeat = heartbeat(&signal, settings.heartbeat_interval, progress);

    let (result, emitted) = tokio::join!(poller, heartbeat);
    if emitted > 0
        && let Err(error) = writeln!(progress)
    {
        debug!(%error, "failed to end heartbeat line");
    }
    debug!(task_arn, emitted, ok = result.is_ok(), "running wait finished");
    result
}

async fn poll_until_running<G: EcsApi>(
    gateway: &G,
    cluster: &str,
    task_arn: &str,
    poll_interval: Duration,
) -> Result<(), Error> {
    let arns = [task_arn.to_string()];
    loop {
        let tasks = gateway
            .describe_tasks(cluster, &arns)
            .await
            .map_err(Error::Wait)?;
        let Some(task) = tasks.into_iter().find(|task| task.arn == task_arn) else {
            return Err(Error::TaskStopped {
                task_arn: task_arn.to_string(),
                status: "MISSING".to_string(),
            });
        };

        if task.is_running() {
            return Ok(());
        }
        if TERMINAL_STATUSES.contains(&task.status.as_str()) {
            return Err(Error::TaskStopped {
                task_arn: task_arn.to_string(),
                status: task.status,
            });
        }

        debug!(task_arn, status = %task.status, "task not running yet");
        sleep(poll_interval).await;
    }
}

/// Writes one mark per interval until `signal` fires. Returns the number of
/// marks actually written.
async fn heartbeat<W: Write>(
    signal: &CancellationToken,
    every: Duration,
    progress: &mut W,
) -> usize {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut emitted = 0;
    let mut write_failed = false;
    loop {
        tokio::select! {
            biased;
            _ = signal.cancelled() => return emitted,
            _ = ticker.tick() => {
                let written = progress.write_all(HEARTBEAT_MARK).and_then(|()| progress.flush());
                match written {
                    Ok(()) => emitted += 1,
                    Err(error) if !write_failed => {
                        write_failed = true;
                        debug!(%error, "heartbeat write failed; further failures are not logged");
                    }
                    Err(_) => {}
                }
            }
        }
    }
}
