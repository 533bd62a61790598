use futures::stream::StreamExt;
use kube::{
    Api, ResourceExt,
    client::Client,
    runtime::{
        Controller,
        controller::Action,
        finalizer::{Event as FinalizerEvent, finalizer},
    },
};
use kube_leader_election::{LeaseLock, LeaseLockParams};
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use storm_client::NimbusPool;
use storm_jar::{sources::container, JarAcquirer, JarCache};
use storm_types::{StormCluster, StormTopology, StormTopologyPhase};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::actions;
use crate::coordinator;
use crate::mapper;
use crate::util::{
    Error, PROBE_INTERVAL,
    colors::{FG1, FG2},
};

#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;

const FINALIZER_NAME: &str = "storm.apache.org/topology-cleanup";
const EXTRACT_JOB_PREFIX: &str = "jar-extract";

pub async fn run(client: Client) -> Result<(), Error> {
    println!("{}", "Starting StormTopology controller...".green());

    let context: Arc<ContextData> = Arc::new(ContextData::new(client.clone()));

    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("storm-topology-controller-{}", uuid::Uuid::new_v4()));
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: "storm-topology-controller-lock".to_string(),
            lease_ttl: StdDuration::from_secs(15),
        },
    );

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        storm_common::shutdown::shutdown_signal().await;
        shutdown_signal.cancel();
    });

    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(StdDuration::from_secs(5));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = controller_task.take() {
                    task.abort();
                    task.await.ok();
                }
                break Ok(())
            },
            _ = tick.tick() => {}
        }
        let lease = match leadership.try_acquire_or_renew().await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("leader election renew/acquire failed: {e}");
                if let Some(task) = controller_task.take() {
                    task.abort();
                }
                continue;
            }
        };
        if lease.acquired_lease {
            if controller_task.is_none() {
                println!("acquired leadership; starting StormTopology controller");
                let client_for_controller = client.clone();
                let context_for_controller = context.clone();
                let crd_api: Api<StormTopology> = Api::all(client_for_controller.clone());
                let controller = Controller::new(crd_api, Default::default());
                // Additive fan-in: react to a referenced StormCluster
                // changing without waiting out PROBE_INTERVAL. The
                // poll-based determine_action path above still catches
                // anything this watch misses.
                let topology_store = controller.store();
                controller_task = Some(tokio::spawn(async move {
                    println!("{}", "🚀 StormTopology controller started.".green());
                    controller
                        .watches(
                            Api::<StormCluster>::all(client_for_controller),
                            Default::default(),
                            mapper::topologies_for_cluster(topology_store),
                        )
                        .run(reconcile, on_error, context_for_controller)
                        .for_each(|_res| async move {})
                        .await;
                }));
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("lost leadership; stopping StormTopology controller");
            task.abort();
        }
    }
}

struct ContextData {
    client: Client,
    nimbus_pool: NimbusPool,
    jar_acquirer: JarAcquirer,
    #[cfg(feature = "metrics")]
    metrics: ControllerMetrics,
}

impl ContextData {
    fn new(client: Client) -> Self {
        let cache_root = std::env::var("JAR_CACHE_DIR").unwrap_or_else(|_| "/var/cache/storm-jars".to_string());
        let cache_capacity_bytes: u64 = std::env::var("JAR_CACHE_CAPACITY_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10 * 1024 * 1024 * 1024);
        let cache = Arc::new(JarCache::new(cache_root, cache_capacity_bytes));
        let http = reqwest::Client::builder()
            .build()
            .expect("reqwest client builder with static config cannot fail");
        let jar_acquirer = JarAcquirer::new(cache, http, client.clone());

        #[cfg(feature = "metrics")]
        {
            ContextData {
                client,
                nimbus_pool: NimbusPool::default(),
                jar_acquirer,
                metrics: ControllerMetrics::new("topologies"),
            }
        }
        #[cfg(not(feature = "metrics"))]
        {
            ContextData {
                client,
                nimbus_pool: NimbusPool::default(),
                jar_acquirer,
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum TopologyAction {
    ValidationFailed(String),
    WaitOnCluster,
    ExtractContainerJar,
    AwaitContainerExtraction,
    AcquireAndSubmit,
    WaitOnCapacity,
    KillForSuspend,
    KillForUpdate,
    Inspect,
    Error(String),
    NoOp,
    Requeue(Duration),
}

async fn reconcile(instance: Arc<StormTopology>, context: Arc<ContextData>) -> Result<Action, Error> {
    let client = context.client.clone();
    let namespace = instance.namespace().ok_or_else(|| {
        Error::UserInput(
            "Expected StormTopology resource to be namespaced. Can't deploy to an unknown namespace."
                .to_owned(),
        )
    })?;
    let name = instance.name_any();

    #[cfg(feature = "metrics")]
    context
        .metrics
        .reconcile_counter
        .with_label_values(&[&name, &namespace])
        .inc();

    let api: Api<StormTopology> = Api::namespaced(client.clone(), &namespace);
    let result = finalizer(&api, FINALIZER_NAME, instance.clone(), |event| async {
        match event {
            FinalizerEvent::Apply(topology) => handle_apply(context.clone(), &topology).await,
            FinalizerEvent::Cleanup(topology) => handle_cleanup(context.clone(), &topology).await,
        }
    })
    .await;

    result.map_err(|e| Error::Finalizer(e.to_string()))
}

async fn handle_apply(context: Arc<ContextData>, instance: &StormTopology) -> Result<Action, Error> {
    let client = context.client.clone();
    let action = determine_action(context.clone(), instance).await?;

    if action != TopologyAction::NoOp {
        println!(
            "🔧 {}{}{}{}{}",
            instance.namespace().unwrap_or_default().color(FG2),
            "/".color(FG1),
            instance.name_any().color(FG2),
            " ACTION: ".color(FG1),
            format!("{action:?}").color(FG2),
        );
    }

    match action {
        TopologyAction::Requeue(duration) => Ok(Action::requeue(duration)),
        TopologyAction::ValidationFailed(message) => {
            actions::validation_failed(client, instance, message).await?;
            Ok(Action::requeue(Duration::from_secs(30)))
        }
        TopologyAction::WaitOnCluster => {
            actions::waiting_on_cluster(client, instance).await?;
            Ok(Action::requeue(Duration::from_secs(5)))
        }
        TopologyAction::ExtractContainerJar => {
            start_container_extraction(client, instance).await?;
            Ok(Action::requeue(Duration::from_secs(5)))
        }
        TopologyAction::AwaitContainerExtraction => Ok(Action::requeue(Duration::from_secs(5))),
        TopologyAction::WaitOnCapacity => {
            actions::waiting_on_capacity(client, instance).await?;
            Ok(Action::requeue(PROBE_INTERVAL))
        }
        TopologyAction::AcquireAndSubmit => {
            actions::downloading(client.clone(), instance).await?;
            let namespace = instance.namespace().unwrap_or_default();
            let cluster = actions::cluster_for(client.clone(), &namespace, &instance.spec.cluster_ref)
                .await?
                .ok_or_else(|| Error::UserInput("clusterRef not found".to_string()))?;
            let base_url = cluster
                .status
                .as_ref()
                .and_then(|s| s.endpoints.rest_api.clone())
                .ok_or_else(|| Error::UserInput("cluster has no rest_api endpoint yet".to_string()))?;
            let nimbus = context.nimbus_pool.get_or_insert(&base_url);
            let id = if instance.spec.topology.jar.container.is_some() {
                let shared_path = format!("/shared-jars/{}.jar", instance.name_any());
                actions::submit_pre_extracted(&nimbus, instance, &shared_path).await?
            } else {
                let (id, hash) =
                    actions::acquire_and_submit(client.clone(), &context.jar_acquirer, &nimbus, instance)
                        .await?;
                // Submission succeeded, which this reconciler treats as the
                // topology reaching `Running`; the acquire pin can drop now.
                context.jar_acquirer.release(&hash);
                id
            };
            actions::submitted(client, instance, id, instance.spec.requested_version()).await?;
            Ok(Action::requeue(PROBE_INTERVAL))
        }
        TopologyAction::KillForSuspend | TopologyAction::KillForUpdate => {
            let suspend = action == TopologyAction::KillForSuspend;
            let reason = if suspend {
                "Suspending topology."
            } else {
                "Killing topology for rolling update."
            };
            actions::killing(client.clone(), instance, reason).await?;
            if let Some(id) = instance.status.as_ref().and_then(|s| s.topology_id.clone()) {
                let namespace = instance.namespace().unwrap_or_default();
                if let Some(cluster) =
                    actions::cluster_for(client.clone(), &namespace, &instance.spec.cluster_ref).await?
                {
                    if let Some(base_url) = cluster.status.as_ref().and_then(|s| s.endpoints.rest_api.clone())
                    {
                        let nimbus = context.nimbus_pool.get_or_insert(&base_url);
                        actions::kill(&nimbus, &id, instance.spec.kill_wait_seconds()).await?;
                    }
                }
            }
            actions::killed(client, instance, suspend).await?;
            Ok(Action::requeue(Duration::from_secs(5)))
        }
        TopologyAction::Inspect => {
            let namespace = instance.namespace().unwrap_or_default();
            let id = instance
                .status
                .as_ref()
                .and_then(|s| s.topology_id.clone())
                .ok_or_else(|| Error::UserInput("Inspect requires a topology_id".to_string()))?;
            let cluster = actions::cluster_for(client.clone(), &namespace, &instance.spec.cluster_ref)
                .await?
                .ok_or_else(|| Error::UserInput("clusterRef not found".to_string()))?;
            if let Some(base_url) = cluster.status.as_ref().and_then(|s| s.endpoints.rest_api.clone()) {
                let nimbus = context.nimbus_pool.get_or_insert(&base_url);
                actions::inspect(client, &nimbus, instance, &id).await?;
            }
            Ok(Action::requeue(PROBE_INTERVAL))
        }
        TopologyAction::Error(message) => {
            actions::error(client, instance, message).await?;
            Ok(Action::requeue(Duration::from_secs(10)))
        }
        TopologyAction::NoOp => Ok(Action::requeue(PROBE_INTERVAL)),
    }
}

async fn handle_cleanup(context: Arc<ContextData>, instance: &StormTopology) -> Result<Action, Error> {
    let client = context.client.clone();
    actions::terminating(client.clone(), instance).await?;
    if let Some(id) = instance.status.as_ref().and_then(|s| s.topology_id.clone()) {
        let namespace = instance.namespace().unwrap_or_default();
        if let Some(cluster) =
            actions::cluster_for(client.clone(), &namespace, &instance.spec.cluster_ref).await?
        {
            if let Some(base_url) = cluster.status.as_ref().and_then(|s| s.endpoints.rest_api.clone()) {
                let nimbus = context.nimbus_pool.get_or_insert(&base_url);
                actions::kill(&nimbus, &id, instance.spec.kill_wait_seconds()).await?;
            }
        }
    }
    Ok(Action::await_change())
}

async fn determine_action(
    context: Arc<ContextData>,
    instance: &StormTopology,
) -> Result<TopologyAction, Error> {
    if instance.spec.topology.jar.populated_count() != 1 {
        return Ok(TopologyAction::ValidationFailed(
            "exactly one of topology.jar.{url,configMap,secret,s3,container} must be set".to_string(),
        ));
    }
    if let Some(container) = &instance.spec.topology.jar.container {
        if container::require_job_mode(container.extraction_mode).is_err() {
            return Ok(TopologyAction::ValidationFailed(format!(
                "extractionMode '{:?}' is not implemented, only 'job' is",
                container.extraction_mode
            )));
        }
    }

    let namespace = instance.namespace().unwrap_or_default();
    let cluster = actions::cluster_for(context.client.clone(), &namespace, &instance.spec.cluster_ref)
        .await?;
    let cluster = match cluster {
        Some(c) => c,
        None => return Ok(TopologyAction::WaitOnCluster),
    };
    let cluster_status = cluster.status.unwrap_or_default();
    if !coordinator::cluster_ready_for_topology(&cluster_status) {
        return Ok(TopologyAction::WaitOnCluster);
    }

    let phase = instance.status.as_ref().map(|s| s.phase).unwrap_or_default();
    let topology_id = instance.status.as_ref().and_then(|s| s.topology_id.clone());

    if topology_id.is_none() {
        if instance.spec.topology.jar.container.is_some() {
            let job_name = format!("{EXTRACT_JOB_PREFIX}-{}", instance.name_any());
            let succeeded = container::job_succeeded(context.client.clone(), &namespace, &job_name)
                .await
                .unwrap_or(false);
            if !succeeded {
                return Ok(TopologyAction::ExtractContainerJar);
            }
            if !coordinator::capacity_available(&cluster_status, instance.spec.desired_workers()) {
                return Ok(TopologyAction::WaitOnCapacity);
            }
            return Ok(TopologyAction::AcquireAndSubmit);
        }
        if !coordinator::capacity_available(&cluster_status, instance.spec.desired_workers()) {
            return Ok(TopologyAction::WaitOnCapacity);
        }
        return Ok(TopologyAction::AcquireAndSubmit);
    }

    if instance.spec.suspend && phase != StormTopologyPhase::Suspended {
        return Ok(TopologyAction::KillForSuspend);
    }
    if !instance.spec.suspend && phase == StormTopologyPhase::Suspended {
        if !coordinator::capacity_available(&cluster_status, instance.spec.desired_workers()) {
            return Ok(TopologyAction::WaitOnCapacity);
        }
        return Ok(TopologyAction::AcquireAndSubmit);
    }

    let deployed_version = instance.status.as_ref().and_then(|s| s.deployed_version.as_deref());
    if deployed_version != Some(instance.spec.requested_version()) {
        return Ok(TopologyAction::KillForUpdate);
    }

    Ok(TopologyAction::Inspect)
}

/// Container-image JAR sources use an ephemeral extraction Job rather than
/// [`storm_jar::JarAcquirer`]; that path only handles sources it can fetch
/// as a byte stream (see DESIGN.md).
async fn start_container_extraction(client: Client, instance: &StormTopology) -> Result<(), Error> {
    let namespace = instance.namespace().unwrap_or_default();
    let container = instance
        .spec
        .topology
        .jar
        .container
        .as_ref()
        .ok_or_else(|| Error::UserInput("expected a container jar source".to_string()))?;
    let job_name = format!("{EXTRACT_JOB_PREFIX}-{}", instance.name_any());
    let job = container::build_extraction_job(
        &job_name,
        &namespace,
        &container.image,
        &container.path,
        container.extraction_timeout_seconds,
        &container.pull_secrets,
    );
    container::create_job(client, &namespace, &job).await?;
    Ok(())
}

fn on_error(instance: Arc<StormTopology>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!(
            "StormTopology reconciliation error: {:?} ({}/{})",
            error,
            instance.namespace().unwrap_or_default(),
            instance.name_any()
        )
        .red()
    );
    Action::requeue(Duration::from_secs(5))
}
