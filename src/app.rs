use std::io;
use std::time::Duration;
use tracing::{debug, info};

use crate::chooser::Chooser;
use crate::config::RuntimeConfig;
use crate::ecs::EcsApi;
use crate::error::Error;
use crate::model::{ResourceSelector, SessionMode, SessionRequest};
use crate::resolve::resolve_resource;
use crate::session::{ExternalCommand, SessionCommandBuilder};
use crate::wait::{WaitSettings, wait_running};

/// One invocation: resolve a target, optionally wait for it, then build the
/// session helper command.
pub struct App<G, C> {
    gateway: G,
    chooser: C,
    config: RuntimeConfig,
    region: String,
}

impl<G: EcsApi, C: Chooser> App<G, C> {
    pub fn new(gateway: G, chooser: C, config: RuntimeConfig, region: String) -> Self {
        Self {
            gateway,
            chooser,
            config,
            region,
        }
    }

    /// Returns `Ok(None)` when the operator cancelled a selection.
    pub async fn prepare(
        &mut self,
        selector: &ResourceSelector,
        mode: SessionMode,
        wait_budget: Option<Duration>,
    ) -> Result<Option<ExternalCommand>, Error> {
        let Some(resource) = resolve_resource(&self.gateway, &mut self.chooser, selector)
            .await
            .into_result()?
        else {
            debug!("selection cancelled");
            return Ok(None);
        };

        if let Some(budget) = wait_budget.filter(|budget| !budget.is_zero()) {
            info!(
                task = resource.task.task_id(),
                "waiting up to {}s for task to be RUNNING",
                budget.as_secs()
            );
            let settings = WaitSettings {
                budget,
                poll_interval: self.config.poll_interval,
                heartbeat_interval: self.config.heartbeat_interval,
            };
            wait_running(
                &self.gateway,
                &resource.cluster,
                &resource.task.arn,
                settings,
                &mut io::stderr(),
            )
            .await?;
        }

        let request = SessionRequest { mode, resource };
        let builder = SessionCommandBuilder::new(&self.gateway, &self.region, &self.config.plugin);
        builder.build(&request).await.map(Some)
    }
}
