use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_ecs::config::Region;
use aws_sdk_ecs::types::{Container, DesiredStatus, ManagedAgentName, Task};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use tracing::debug;

use crate::model::{ContainerDescriptor, TaskDescriptor};
use crate::session::Document;

const DESCRIBE_TASKS_BATCH: usize = 100;

/// Control-plane operations the resolvers, the waiter and the session
/// builder depend on.
pub trait EcsApi {
    fn list_clusters(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// ARNs of tasks whose desired status is RUNNING.
    fn list_tasks(
        &self,
        cluster: &str,
        service: Option<&str>,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: &[String],
    ) -> impl Future<Output = Result<Vec<TaskDescriptor>>> + Send;

    fn start_session(
        &self,
        target: &SessionTarget,
        document: Document,
        parameters: &BTreeMap<String, Vec<String>>,
    ) -> impl Future<Output = Result<SessionGrant>> + Send;
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SessionTarget {
    pub cluster: String,
    pub task_arn: String,
    pub task_id: String,
    pub container_name: String,
    pub runtime_id: String,
}

impl SessionTarget {
    /// SSM target for a container, `ecs:<cluster>_<taskId>_<runtimeId>`.
    pub fn ssm_target(&self) -> String {
        format!(
            "ecs:{}_{}_{}",
            self.cluster, self.task_id, self.runtime_id
        )
    }
}

/// Opaque session handed to the session helper. `payload` is passed through
/// untouched.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SessionGrant {
    pub payload: String,
    pub token: String,
}

impl SessionGrant {
    fn from_parts(session_id: &str, stream_url: &str, token: &str) -> Self {
        let payload = json!({
            "SessionId": session_id,
            "StreamUrl": stream_url,
            "TokenValue": token,
        });
        Self {
            payload: payload.to_string(),
            token: token.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub profile: Option<String>,
}

#[derive(Clone)]
pub struct AwsGateway {
    ecs: aws_sdk_ecs::Client,
    ssm: aws_sdk_ssm::Client,
    region: String,
}

impl AwsGateway {
    pub async fn new(settings: &AwsSettings) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = settings.region.as_ref() {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = settings.profile.as_ref() {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;
        let region = sdk_config
            .region()
            .map(|region| region.to_string())
            .context("no AWS region configured; pass --region or set AWS_REGION")?;
        debug!(%region, "loaded AWS configuration");

        Ok(Self {
            ecs: aws_sdk_ecs::Client::new(&sdk_config),
            ssm: aws_sdk_ssm::Client::new(&sdk_config),
            region,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn execute_command(
        &self,
        target: &SessionTarget,
        parameters: &BTreeMap<String, Vec<String>>,
    ) -> Result<SessionGrant> {
        let command = parameters
            .get("command")
            .and_then(|values| values.first())
            .context("exec session requires a command parameter")?;
        let output = self
            .ecs
            .execute_command()
            .cluster(&target.cluster)
            .task(&target.task_arn)
            .container(&target.container_name)
            .command(command)
            .interactive(true)
            .send()
            .await
            .with_context(|| {
                format!(
                    "failed to execute command in {}/{}",
                    target.task_id, target.container_name
                )
            })?;
        let session = output
            .session()
            .context("ExecuteCommand response carried no session")?;

        Ok(SessionGrant::from_parts(
            session.session_id().unwrap_or_default(),
            session.stream_url().unwrap_or_default(),
            session.token_value().unwrap_or_default(),
        ))
    }

    async fn start_ssm_session(
        &self,
        target: &SessionTarget,
        document: Document,
        parameters: &BTreeMap<String, Vec<String>>,
    ) -> Result<SessionGrant> {
        let ssm_target = target.ssm_target();
        let parameters = parameters
            .iter()
            .map(|(key, values)| (key.clone(), values.clone()))
            .collect::<HashMap<_, _>>();
        let output = self
            .ssm
            .start_session()
            .target(&ssm_target)
            .document_name(document.name())
            .set_parameters(Some(parameters))
            .send()
            .await
            .with_context(|| format!("failed to start {} on {ssm_target}", document.name()))?;

        Ok(SessionGrant::from_parts(
            output.session_id().unwrap_or_default(),
            output.stream_url().unwrap_or_default(),
            output.token_value().unwrap_or_default(),
        ))
    }
}

impl EcsApi for AwsGateway {
    async fn list_clusters(&self) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut next_token = None;
        loop {
            let page = self
                .ecs
                .list_clusters()
                .set_next_token(next_token)
                .send()
                .await
                .context("failed to list ECS clusters")?;
            arns.extend(page.cluster_arns().iter().cloned());
            next_token = page.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        debug!(count = arns.len(), "listed clusters");
        Ok(arns)
    }

    async fn list_tasks(&self, cluster: &str, service: Option<&str>) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut next_token = None;
        loop {
            let page = self
                .ecs
                .list_tasks()
                .cluster(cluster)
                .desired_status(DesiredStatus::Running)
                .set_service_name(service.map(str::to_string))
                .set_next_token(next_token)
                .send()
                .await
                .with_context(|| format!("failed to list tasks in cluster {cluster}"))?;
            arns.extend(page.task_arns().iter().cloned());
            next_token = page.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        debug!(cluster, ?service, count = arns.len(), "listed tasks");
        Ok(arns)
    }

    async fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: &[String],
    ) -> Result<Vec<TaskDescriptor>> {
        let mut tasks = Vec::with_capacity(task_arns.len());
        for batch in task_arns.chunks(DESCRIBE_TASKS_BATCH) {
            let output = self
                .ecs
                .describe_tasks()
                .cluster(cluster)
                .set_tasks(Some(batch.to_vec()))
                .send()
                .await
                .with_context(|| format!("failed to describe tasks in cluster {cluster}"))?;
            for failure in output.failures() {
                debug!(
                    arn = failure.arn().unwrap_or("-"),
                    reason = failure.reason().unwrap_or("-"),
                    "describe-tasks failure"
                );
            }
            tasks.extend(output.tasks().iter().map(task_descriptor));
        }
        Ok(tasks)
    }

    async fn start_session(
        &self,
        target: &SessionTarget,
        document: Document,
        parameters: &BTreeMap<String, Vec<String>>,
    ) -> Result<SessionGrant> {
        match document {
            Document::Exec => self.execute_command(target, parameters).await,
            Document::PortForward | Document::RemotePortForward => {
                self.start_ssm_session(target, document, parameters).await
            }
        }
    }
}

fn task_descriptor(task: &Task) -> TaskDescriptor {
    let arn = task.task_arn().unwrap_or_default().to_string();
    TaskDescriptor {
        group: task.group().unwrap_or_default().to_string(),
        status: task.last_status().unwrap_or_default().to_string(),
        execute_command_enabled: task.enable_execute_command(),
        containers: task
            .containers()
            .iter()
            .map(|container| container_descriptor(container, &arn))
            .collect(),
        arn,
    }
}

fn container_descriptor(container: &Container, task_arn: &str) -> ContainerDescriptor {
    let execute_command_agent = container
        .managed_agents()
        .iter()
        .find(|agent| agent.name() == Some(&ManagedAgentName::ExecuteCommandAgent))
        .map(|agent| agent.last_status().unwrap_or_default().to_string());

    ContainerDescriptor {
        name: container.name().unwrap_or_default().to_string(),
        runtime_id: container.runtime_id().unwrap_or_default().to_string(),
        task_arn: container
            .task_arn()
            .unwrap_or(task_arn)
            .to_string(),
        execute_command_agent,
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionGrant, SessionTarget, container_descriptor, task_descriptor};
    use aws_sdk_ecs::types::{Container, ManagedAgent, ManagedAgentName, Task};

    #[test]
    fn ssm_target_joins_cluster_task_and_runtime_id() {
        let target = SessionTarget {
            cluster: "prod".to_string(),
            task_arn: "arn:aws:ecs:eu-west-1:123:task/prod/abc".to_string(),
            task_id: "abc".to_string(),
            container_name: "app".to_string(),
            runtime_id: "abc-1234".to_string(),
        };
        assert_eq!(target.ssm_target(), "ecs:prod_abc_abc-1234");
    }

    #[test]
    fn session_payload_uses_helper_field_names() {
        let grant = SessionGrant::from_parts("sid", "wss://stream", "tok");
        let value: serde_json::Value = serde_json::from_str(&grant.payload).unwrap();
        assert_eq!(value["SessionId"], "sid");
        assert_eq!(value["StreamUrl"], "wss://stream");
        assert_eq!(value["TokenValue"], "tok");
        assert_eq!(grant.token, "tok");
    }

    #[test]
    fn task_descriptor_maps_sdk_task() {
        let agent = ManagedAgent::builder()
            .name(ManagedAgentName::ExecuteCommandAgent)
            .last_status("RUNNING")
            .build();
        let container = Container::builder()
            .name("app")
            .runtime_id("abc-1234")
            .managed_agents(agent)
            .build();
        let task = Task::builder()
            .task_arn("arn:aws:ecs:eu-west-1:123:task/prod/abc")
            .group("service:api")
            .last_status("RUNNING")
            .enable_execute_command(true)
            .containers(container)
            .build();

        let descriptor = task_descriptor(&task);
        assert_eq!(descriptor.group, "service:api");
        assert!(descriptor.execute_command_enabled);
        assert!(descriptor.is_running());
        assert_eq!(descriptor.containers.len(), 1);
        assert_eq!(descriptor.containers[0].name, "app");
        assert_eq!(
            descriptor.containers[0].task_arn,
            "arn:aws:ecs:eu-west-1:123:task/prod/abc"
        );
        assert_eq!(
            descriptor.containers[0].execute_command_agent.as_deref(),
            Some("RUNNING")
        );
    }

    #[test]
    fn container_without_agents_reports_no_agent_status() {
        let container = Container::builder().name("sidecar").build();
        let descriptor = container_descriptor(&container, "arn:task");
        assert_eq!(descriptor.execute_command_agent, None);
        assert_eq!(descriptor.task_arn, "arn:task");
    }
}
