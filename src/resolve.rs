use std::collections::HashMap;
use tracing::debug;

use crate::chooser::Chooser;
use crate::ecs::EcsApi;
use crate::error::Error;
use crate::model::{
    ContainerDescriptor, ResolvedResource, ResourceSelector, TaskDescriptor, bare_name,
};
use crate::outcome::Outcome;
use crate::try_outcome;

pub const SELECT_CLUSTER_TITLE: &str = "Select a cluster";
pub const SELECT_TASK_TITLE: &str = "Select a Task";
pub const SELECT_CONTAINER_TITLE: &str = "Select a Container";

/// Resolves cluster, task and container in order, stopping at the first
/// cancellation or failure.
pub async fn resolve_resource<G, C>(
    gateway: &G,
    chooser: &mut C,
    selector: &ResourceSelector,
) -> Outcome<ResolvedResource>
where
    G: EcsApi,
    C: Chooser,
{
    let cluster = try_outcome!(resolve_cluster(gateway, chooser, selector.cluster()).await);
    let task = try_outcome!(resolve_task(gateway, chooser, &cluster, selector.service()).await);
    let container = try_outcome!(resolve_container(chooser, &task).await);
    debug!(
        %cluster,
        task = %container.task_arn,
        container = %container.name,
        "resolved target"
    );

    Outcome::Ok(ResolvedResource {
        cluster,
        task,
        container,
    })
}

pub async fn resolve_cluster<G, C>(
    gateway: &G,
    chooser: &mut C,
    hint: Option<&str>,
) -> Outcome<String>
where
    G: EcsApi,
    C: Chooser,
{
    if let Some(cluster) = hint.filter(|cluster| !cluster.is_empty()) {
        return Outcome::Ok(cluster.to_string());
    }

    let arns = match gateway.list_clusters().await {
        Ok(arns) => arns,
        Err(error) => return Outcome::Failed(Error::Lookup(error)),
    };
    let names = arns
        .iter()
        .map(|arn| bare_name(arn).to_string())
        .collect::<Vec<_>>();

    chooser.choose(SELECT_CLUSTER_TITLE, &names).await
}

pub async fn resolve_task<G, C>(
    gateway: &G,
    chooser: &mut C,
    cluster: &str,
    service: Option<&str>,
) -> Outcome<TaskDescriptor>
where
    G: EcsApi,
    C: Chooser,
{
    let arns = match gateway.list_tasks(cluster, service).await {
        Ok(arns) => arns,
        Err(error) => return Outcome::Failed(Error::Lookup(error)),
    };
    let described = if arns.is_empty() {
        Vec::new()
    } else {
        match gateway.describe_tasks(cluster, &arns).await {
            Ok(tasks) => tasks,
            Err(error) => return Outcome::Failed(Error::Lookup(error)),
        }
    };

    let mut tasks = described
        .into_iter()
        .filter(|task| task.execute_command_enabled)
        .collect::<Vec<_>>();
    debug!(cluster, eligible = tasks.len(), "filtered exec-enabled tasks");
    if tasks.len() == 1 {
        return Outcome::Ok(tasks.remove(0));
    }

    let labels = task_labels(&tasks);
    let label = try_outcome!(chooser.choose(SELECT_TASK_TITLE, &labels).await);
    pick_by_label(tasks, &labels, &label, "task")
}

pub async fn resolve_container<C: Chooser>(
    chooser: &mut C,
    task: &TaskDescriptor,
) -> Outcome<ContainerDescriptor> {
    let mut containers = task
        .containers
        .iter()
        .filter(|container| container.execute_command_enabled())
        .cloned()
        .collect::<Vec<_>>();
    if containers.len() == 1 {
        return Outcome::Ok(containers.remove(0));
    }

    let labels = containers
        .iter()
        .map(|container| container.name.clone())
        .collect::<Vec<_>>();
    let label = try_outcome!(chooser.choose(SELECT_CONTAINER_TITLE, &labels).await);
    pick_by_label(containers, &labels, &label, "container")
}

/// Task group labels, suffixed with the task id where a group repeats.
pub fn task_labels(tasks: &[TaskDescriptor]) -> Vec<String> {
    let mut seen = HashMap::<&str, usize>::new();
    for task in tasks {
        *seen.entry(task.group.as_str()).or_default() += 1;
    }
    tasks
        .iter()
        .map(|task| {
            if seen.get(task.group.as_str()).copied().unwrap_or(0) > 1 {
                format!("{} ({})", task.group, task.task_id())
            } else {
                task.group.clone()
            }
        })
        .collect()
}

fn pick_by_label<T>(items: Vec<T>, labels: &[String], label: &str, kind: &str) -> Outcome<T> {
    match items
        .into_iter()
        .zip(labels)
        .find(|(_, candidate)| candidate.as_str() == label)
    {
        Some((item, _)) => Outcome::Ok(item),
        None => Outcome::Failed(Error::Chooser(anyhow::anyhow!(
            "selected {kind} `{label}` is not among the offered choices"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        SELECT_CLUSTER_TITLE, SELECT_CONTAINER_TITLE, SELECT_TASK_TITLE, resolve_cluster,
        resolve_container, resolve_resource, resolve_task, task_labels,
    };
    use crate::error::Error;
    use crate::model::ResourceSelector;
    use crate::outcome::Outcome;
    use crate::testing::{MockChooser, MockEcs, Scripted, task};
    use tokio::time::{Duration, Instant, sleep};

    #[tokio::test]
    async fn cluster_hint_skips_chooser_and_listing() {
        let gateway = MockEcs::default();
        let mut chooser = MockChooser::default();

        let outcome = resolve_cluster(&gateway, &mut chooser, Some("prod")).await;

        assert!(matches!(outcome, Outcome::Ok(ref cluster) if cluster == "prod"));
        assert!(chooser.prompts.is_empty());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn padded_cluster_hint_is_used_verbatim() {
        let gateway = MockEcs {
            clusters: vec!["arn:aws:ecs:eu-west-1:123:cluster/other".to_string()],
            tasks: vec![task("aaa", "service:api", true, &["app"])],
            ..MockEcs::default()
        };
        let mut chooser = MockChooser::default();

        let selector = ResourceSelector::new(" prod", "");
        let resolved = resolve_resource(&gateway, &mut chooser, &selector)
            .await
            .into_result()
            .unwrap()
            .unwrap();

        assert_eq!(resolved.cluster, " prod");
        assert!(chooser.prompts.is_empty());
        assert!(!gateway.called("list_clusters"));
        assert!(gateway.calls().contains(&"list_tasks  prod -".to_string()));
    }

    #[tokio::test]
    async fn whitespace_cluster_hint_never_prompts() {
        let gateway = MockEcs {
            clusters: vec!["arn:aws:ecs:eu-west-1:123:cluster/other".to_string()],
            ..MockEcs::default()
        };
        let mut chooser = MockChooser::default();

        let outcome = resolve_cluster(&gateway, &mut chooser, Some("  ")).await;

        assert!(matches!(outcome, Outcome::Ok(ref cluster) if cluster == "  "));
        assert!(chooser.prompts.is_empty());
    }

    #[tokio::test]
    async fn cluster_names_are_stripped_before_prompting() {
        let gateway = MockEcs {
            clusters: vec![
                "arn:aws:ecs:eu-west-1:123:cluster/prod".to_string(),
                "arn:aws:ecs:eu-west-1:123:cluster/staging".to_string(),
            ],
            ..MockEcs::default()
        };
        let mut chooser = MockChooser::new([Scripted::Pick("staging")]);

        let outcome = resolve_cluster(&gateway, &mut chooser, None).await;

        assert!(matches!(outcome, Outcome::Ok(ref cluster) if cluster == "staging"));
        assert_eq!(chooser.prompts[0].0, SELECT_CLUSTER_TITLE);
        assert_eq!(chooser.prompts[0].1, vec!["prod", "staging"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_chooser_leaves_runtime_free() {
        let gateway = MockEcs {
            clusters: vec!["arn:aws:ecs:eu-west-1:123:cluster/prod".to_string()],
            ..MockEcs::default()
        };
        let mut chooser =
            MockChooser::new([Scripted::PickAfter(Duration::from_secs(5), "prod")]);
        let started = Instant::now();
        let ticker = async {
            for _ in 0..4 {
                sleep(Duration::from_secs(1)).await;
            }
            started.elapsed()
        };

        let (outcome, ticked) =
            tokio::join!(resolve_cluster(&gateway, &mut chooser, None), ticker);

        assert!(matches!(outcome, Outcome::Ok(ref cluster) if cluster == "prod"));
        assert_eq!(ticked, Duration::from_secs(4));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cluster_listing_failure_is_a_lookup_error() {
        let gateway = MockEcs {
            fail_list_clusters: true,
            ..MockEcs::default()
        };
        let mut chooser = MockChooser::default();

        let outcome = resolve_cluster(&gateway, &mut chooser, None).await;

        match outcome {
            Outcome::Failed(Error::Lookup(error)) => {
                assert_eq!(error.to_string(), "AccessDeniedException: ecs:ListClusters");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(chooser.prompts.is_empty());
    }

    #[tokio::test]
    async fn single_enabled_task_is_auto_selected() {
        let gateway = MockEcs {
            tasks: vec![
                task("aaa", "service:api", true, &["app"]),
                task("bbb", "service:api", false, &["app"]),
            ],
            ..MockEcs::default()
        };
        let mut chooser = MockChooser::default();

        let outcome = resolve_task(&gateway, &mut chooser, "prod", Some("api")).await;

        assert!(matches!(outcome, Outcome::Ok(ref task) if task.task_id() == "aaa"));
        assert!(chooser.prompts.is_empty());
        assert!(gateway.calls().contains(&"list_tasks prod api".to_string()));
    }

    #[tokio::test]
    async fn no_enabled_tasks_prompts_with_empty_list() {
        let gateway = MockEcs {
            tasks: vec![task("aaa", "service:api", false, &["app"])],
            ..MockEcs::default()
        };
        let mut chooser = MockChooser::new([Scripted::Cancel]);

        let outcome = resolve_task(&gateway, &mut chooser, "prod", None).await;

        assert!(matches!(outcome, Outcome::Cancelled));
        assert_eq!(chooser.prompts.len(), 1);
        assert_eq!(chooser.prompts[0].0, SELECT_TASK_TITLE);
        assert!(chooser.prompts[0].1.is_empty());
    }

    #[tokio::test]
    async fn no_enabled_tasks_respects_chooser_error() {
        let gateway = MockEcs::default();
        let mut chooser = MockChooser::new([Scripted::Fail("nothing to select")]);

        let outcome = resolve_task(&gateway, &mut chooser, "prod", None).await;

        assert!(matches!(outcome, Outcome::Failed(Error::Chooser(_))));
        assert!(!gateway.called("describe_tasks"));
    }

    #[tokio::test]
    async fn multiple_enabled_tasks_are_chosen_by_group() {
        let gateway = MockEcs {
            tasks: vec![
                task("aaa", "service:api", true, &["app"]),
                task("bbb", "service:worker", true, &["app"]),
            ],
            ..MockEcs::default()
        };
        let mut chooser = MockChooser::new([Scripted::Pick("service:worker")]);

        let outcome = resolve_task(&gateway, &mut chooser, "prod", None).await;

        assert!(matches!(outcome, Outcome::Ok(ref task) if task.task_id() == "bbb"));
        assert_eq!(chooser.prompts[0].1, vec!["service:api", "service:worker"]);
    }

    #[test]
    fn duplicate_groups_are_disambiguated_by_task_id() {
        let tasks = vec![
            task("aaa", "service:api", true, &[]),
            task("bbb", "service:api", true, &[]),
            task("ccc", "service:web", true, &[]),
        ];
        assert_eq!(
            task_labels(&tasks),
            vec!["service:api (aaa)", "service:api (bbb)", "service:web"]
        );
    }

    #[tokio::test]
    async fn container_selection_filters_on_exec_agent() {
        let mut target = task("aaa", "service:api", true, &["app", "envoy"]);
        target.containers[1].execute_command_agent = Some("STOPPED".to_string());
        let mut chooser = MockChooser::default();

        let outcome = resolve_container(&mut chooser, &target).await;

        assert!(matches!(outcome, Outcome::Ok(ref container) if container.name == "app"));
        assert!(chooser.prompts.is_empty());
    }

    #[tokio::test]
    async fn multiple_containers_prompt_by_name() {
        let target = task("aaa", "service:api", true, &["app", "envoy"]);
        let mut chooser = MockChooser::new([Scripted::Pick("envoy")]);

        let outcome = resolve_container(&mut chooser, &target).await;

        assert!(matches!(outcome, Outcome::Ok(ref container) if container.name == "envoy"));
        assert_eq!(chooser.prompts[0].0, SELECT_CONTAINER_TITLE);
    }

    #[tokio::test]
    async fn cancelling_cluster_stage_skips_task_listing() {
        let gateway = MockEcs {
            clusters: vec!["arn:aws:ecs:eu-west-1:123:cluster/prod".to_string()],
            tasks: vec![task("aaa", "service:api", true, &["app"])],
            ..MockEcs::default()
        };
        let mut chooser = MockChooser::new([Scripted::Cancel]);

        let outcome = resolve_resource(&gateway, &mut chooser, &ResourceSelector::default()).await;

        assert!(matches!(outcome.into_result(), Ok(None)));
        assert!(!gateway.called("list_tasks"));
        assert!(!gateway.called("describe_tasks"));
    }

    #[tokio::test]
    async fn cancelling_task_stage_skips_container_stage() {
        let gateway = MockEcs {
            tasks: vec![
                task("aaa", "service:api", true, &["app", "envoy"]),
                task("bbb", "service:web", true, &["app", "envoy"]),
            ],
            ..MockEcs::default()
        };
        let mut chooser = MockChooser::new([Scripted::Cancel]);

        let outcome =
            resolve_resource(&gateway, &mut chooser, &ResourceSelector::new("prod", "")).await;

        assert!(matches!(outcome, Outcome::Cancelled));
        assert_eq!(chooser.prompts.len(), 1);
        assert_eq!(chooser.prompts[0].0, SELECT_TASK_TITLE);
    }

    #[tokio::test]
    async fn task_listing_failure_propagates_verbatim() {
        let gateway = MockEcs {
            fail_list_tasks: true,
            ..MockEcs::default()
        };
        let mut chooser = MockChooser::default();

        let outcome =
            resolve_resource(&gateway, &mut chooser, &ResourceSelector::new("prod", "")).await;

        let error = outcome.into_result().unwrap_err();
        assert_eq!(error.to_string(), "ClusterNotFoundException: prod");
    }

    #[tokio::test]
    async fn hinted_single_target_resolves_without_prompting() {
        let gateway = MockEcs {
            tasks: vec![task("aaa", "service:api", true, &["app"])],
            ..MockEcs::default()
        };
        let mut chooser = MockChooser::default();

        let outcome =
            resolve_resource(&gateway, &mut chooser, &ResourceSelector::new("prod", "api")).await;

        let resolved = outcome.into_result().unwrap().unwrap();
        assert_eq!(resolved.cluster, "prod");
        assert_eq!(resolved.task.task_id(), "aaa");
        assert_eq!(resolved.container.name, "app");
        assert!(chooser.prompts.is_empty());
        assert!(!gateway.called("list_clusters"));
    }
}
