use anyhow::{Result, anyhow};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::chooser::Chooser;
use crate::ecs::{EcsApi, SessionGrant, SessionTarget};
use crate::error::Error;
use crate::model::{ContainerDescriptor, TaskDescriptor};
use crate::outcome::Outcome;
use crate::session::Document;

pub type RecordedSession = (SessionTarget, Document, BTreeMap<String, Vec<String>>);

#[derive(Default)]
pub struct MockEcs {
    pub clusters: Vec<String>,
    pub tasks: Vec<TaskDescriptor>,
    /// Statuses handed out by successive `describe_tasks` calls; the last one
    /// sticks once the queue is drained to a single entry.
    pub statuses: Mutex<VecDeque<String>>,
    pub fail_list_clusters: bool,
    pub fail_list_tasks: bool,
    pub fail_start_session: bool,
    pub calls: Mutex<Vec<String>>,
    pub sessions: Mutex<Vec<RecordedSession>>,
}

impl MockEcs {
    pub fn with_statuses(task: TaskDescriptor, statuses: &[&str]) -> Self {
        Self {
            tasks: vec![task],
            statuses: Mutex::new(statuses.iter().map(|status| status.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, name: &str) -> bool {
        self.calls()
            .iter()
            .any(|call| call.split(' ').next() == Some(name))
    }

    pub fn sessions(&self) -> Vec<RecordedSession> {
        self.sessions.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_status(&self) -> Option<String> {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        }
    }
}

impl EcsApi for MockEcs {
    async fn list_clusters(&self) -> Result<Vec<String>> {
        self.record("list_clusters".to_string());
        if self.fail_list_clusters {
            return Err(anyhow!("AccessDeniedException: ecs:ListClusters"));
        }
        Ok(self.clusters.clone())
    }

    async fn list_tasks(&self, cluster: &str, service: Option<&str>) -> Result<Vec<String>> {
        self.record(format!("list_tasks {cluster} {}", service.unwrap_or("-")));
        if self.fail_list_tasks {
            return Err(anyhow!("ClusterNotFoundException: {cluster}"));
        }
        Ok(self.tasks.iter().map(|task| task.arn.clone()).collect())
    }

    async fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: &[String],
    ) -> Result<Vec<TaskDescriptor>> {
        self.record(format!("describe_tasks {cluster} {}", task_arns.len()));
        let status = self.next_status();
        Ok(self
            .tasks
            .iter()
            .filter(|task| task_arns.contains(&task.arn))
            .cloned()
            .map(|mut task| {
                if let Some(status) = status.as_ref() {
                    task.status = status.clone();
                }
                task
            })
            .collect())
    }

    async fn start_session(
        &self,
        target: &SessionTarget,
        document: Document,
        parameters: &BTreeMap<String, Vec<String>>,
    ) -> Result<SessionGrant> {
        self.record(format!("start_session {}", document.name()));
        if self.fail_start_session {
            return Err(anyhow!("TargetNotConnected: {}", target.ssm_target()));
        }
        self.sessions
            .lock()
            .unwrap()
            .push((target.clone(), document, parameters.clone()));
        Ok(SessionGrant {
            payload: r#"{"SessionId":"sid","StreamUrl":"wss://stream","TokenValue":"tok"}"#
                .to_string(),
            token: "tok".to_string(),
        })
    }
}

pub enum Scripted {
    Pick(&'static str),
    PickAfter(Duration, &'static str),
    Cancel,
    Fail(&'static str),
}

/// Chooser that replays scripted answers and records every prompt.
#[derive(Default)]
pub struct MockChooser {
    script: VecDeque<Scripted>,
    pub prompts: Vec<(String, Vec<String>)>,
}

impl MockChooser {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: script.into_iter().collect(),
            prompts: Vec::new(),
        }
    }
}

impl Chooser for MockChooser {
    async fn choose(&mut self, title: &str, labels: &[String]) -> Outcome<String> {
        self.prompts.push((title.to_string(), labels.to_vec()));
        match self.script.pop_front() {
            Some(Scripted::Pick(label)) => Outcome::Ok(label.to_string()),
            Some(Scripted::PickAfter(delay, label)) => {
                tokio::time::sleep(delay).await;
                Outcome::Ok(label.to_string())
            }
            Some(Scripted::Cancel) => Outcome::Cancelled,
            Some(Scripted::Fail(message)) => Outcome::Failed(Error::Chooser(anyhow!(message))),
            None => Outcome::Failed(Error::Chooser(anyhow!("unexpected prompt: {title}"))),
        }
    }
}

pub fn container(name: &str, task_arn: &str) -> ContainerDescriptor {
    ContainerDescriptor {
        name: name.to_string(),
        runtime_id: format!("{name}-runtime"),
        task_arn: task_arn.to_string(),
        execute_command_agent: Some("RUNNING".to_string()),
    }
}

pub fn task(id: &str, group: &str, enabled: bool, containers: &[&str]) -> TaskDescriptor {
    let arn = format!("arn:aws:ecs:eu-west-1:123456789012:task/prod/{id}");
    TaskDescriptor {
        containers: containers
            .iter()
            .map(|name| container(name, &arn))
            .collect(),
        arn,
        group: group.to_string(),
        status: "RUNNING".to_string(),
        execute_command_enabled: enabled,
    }
}
