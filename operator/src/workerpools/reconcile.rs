use futures::stream::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
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
use storm_types::{ImageSpec, StormCluster, StormTopology, StormWorkerPool, StormWorkerPoolPhase};
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

const FINALIZER_NAME: &str = "storm.apache.org/workerpool-cleanup";

/// How long fewer than half of `spec.replicas` may stay unready before the
/// pool flips `Running -> Failed` (spec: "a sustained period").
const SUSTAINED_UNHEALTHY_THRESHOLD: Duration = Duration::from_secs(300);

pub async fn run(client: Client) -> Result<(), Error> {
    println!("{}", "Starting StormWorkerPool controller...".green());

    let context: Arc<ContextData> = Arc::new(ContextData::new(client.clone()));

    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("storm-workerpool-controller-{}", uuid::Uuid::new_v4()));
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: "storm-workerpool-controller-lock".to_string(),
            lease_ttl: Duration::from_secs(15),
        },
    );

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        storm_common::shutdown::shutdown_signal().await;
        shutdown_signal.cancel();
    });
    storm_common::signal_ready();

    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(Duration::from_secs(5));
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
                println!("acquired leadership; starting StormWorkerPool controller");
                let client_for_controller = client.clone();
                let context_for_controller = context.clone();
                let crd_api: Api<StormWorkerPool> = Api::all(client_for_controller.clone());
                let controller = Controller::new(crd_api, Default::default());
                // Additive fan-in: react to a referenced StormTopology
                // changing without waiting out PROBE_INTERVAL. The
                // poll-based determine_action path above still catches
                // anything this watch misses.
                let pool_store = controller.store();
                controller_task = Some(tokio::spawn(async move {
                    println!("{}", "🚀 StormWorkerPool controller started.".green());
                    controller
                        .owns(
                            Api::<Deployment>::all(client_for_controller.clone()),
                            Default::default(),
                        )
                        .watches(
                            Api::<StormTopology>::all(client_for_controller),
                            Default::default(),
                            mapper::worker_pools_for_topology(pool_store),
                        )
                        .run(reconcile, on_error, context_for_controller)
                        .for_each(|_res| async move {})
                        .await;
                }));
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("lost leadership; stopping StormWorkerPool controller");
            task.abort();
        }
    }
}

struct ContextData {
    client: Client,
    #[cfg(feature = "metrics")]
    metrics: ControllerMetrics,
}

impl ContextData {
    fn new(client: Client) -> Self {
        #[cfg(feature = "metrics")]
        {
            ContextData {
                client,
                metrics: ControllerMetrics::new("workerpools"),
            }
        }
        #[cfg(not(feature = "metrics"))]
        {
            ContextData { client }
        }
    }
}

#[derive(Debug, PartialEq)]
enum WorkerPoolAction {
    WaitOnTopology(String),
    WaitOnCapacity,
    ApplyChildren,
    Observe,
    Recovering,
    Error(String),
    NoOp,
    Requeue(Duration),
}

async fn reconcile(instance: Arc<StormWorkerPool>, context: Arc<ContextData>) -> Result<Action, Error> {
    let client = context.client.clone();
    let namespace = instance
        .namespace()
        .ok_or_else(|| Error::UserInput("StormWorkerPool is missing a namespace".to_string()))?;
    let name = instance.name_any();

    #[cfg(feature = "metrics")]
    context
        .metrics
        .reconcile_counter
        .with_label_values(&[&name, &namespace])
        .inc();
    #[cfg(feature = "metrics")]
    let start = std::time::Instant::now();

    let api: Api<StormWorkerPool> = Api::namespaced(client.clone(), &namespace);
    let result = finalizer(&api, FINALIZER_NAME, instance.clone(), |event| async {
        match event {
            FinalizerEvent::Apply(pool) => handle_apply(client.clone(), &pool).await,
            FinalizerEvent::Cleanup(pool) => handle_cleanup(client.clone(), &pool).await,
        }
    })
    .await;

    #[cfg(feature = "metrics")]
    context
        .metrics
        .read_histogram
        .with_label_values(&[&name, &namespace, "finalizer"])
        .observe(start.elapsed().as_secs_f64());

    result.map_err(|e| Error::Finalizer(e.to_string()))
}

async fn handle_apply(client: Client, instance: &StormWorkerPool) -> Result<Action, Error> {
    let action = determine_action(client.clone(), instance).await?;

    if action != WorkerPoolAction::NoOp {
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
        WorkerPoolAction::WaitOnTopology(message) => {
            actions::waiting_on_topology(client, instance, message).await?;
            Ok(Action::requeue(PROBE_INTERVAL))
        }
        WorkerPoolAction::WaitOnCapacity => {
            actions::waiting_on_topology(client, instance, "Waiting for cluster capacity.".to_string()).await?;
            Ok(Action::requeue(PROBE_INTERVAL))
        }
        WorkerPoolAction::ApplyChildren => {
            let default_image = resolve_default_image(client.clone(), instance).await?;
            actions::creating(client.clone(), instance).await?;
            actions::apply_children(client, instance, &default_image).await?;
            Ok(Action::requeue(Duration::from_secs(5)))
        }
        WorkerPoolAction::Observe => {
            observe(client, instance).await?;
            Ok(Action::requeue(PROBE_INTERVAL))
        }
        WorkerPoolAction::Recovering => {
            actions::recovering(client, instance).await?;
            Ok(Action::requeue(Duration::from_secs(5)))
        }
        WorkerPoolAction::Error(message) => {
            actions::error(client, instance, message).await?;
            Ok(Action::requeue(Duration::from_secs(30)))
        }
        WorkerPoolAction::NoOp => Ok(Action::requeue(PROBE_INTERVAL)),
        WorkerPoolAction::Requeue(duration) => Ok(Action::requeue(duration)),
    }
}

async fn handle_cleanup(client: Client, instance: &StormWorkerPool) -> Result<Action, Error> {
    actions::terminating(client.clone(), instance).await?;
    actions::delete_children(client, instance).await?;
    Ok(Action::await_change())
}

async fn determine_action(client: Client, instance: &StormWorkerPool) -> Result<WorkerPoolAction, Error> {
    let namespace = instance.namespace().unwrap_or_default();

    let topology_api: Api<StormTopology> = Api::namespaced(client.clone(), &namespace);
    let topology = topology_api.get_opt(&instance.spec.topology_ref).await?;
    let Some(topology) = topology else {
        return Ok(WorkerPoolAction::WaitOnTopology(format!(
            "referenced topology {} not found",
            instance.spec.topology_ref
        )));
    };
    let topology_status = topology.status.clone().unwrap_or_default();
    if !coordinator::topology_ready_for_worker_pool(&topology_status) {
        return Ok(WorkerPoolAction::WaitOnTopology(format!(
            "waiting for topology {} to reach Running (currently {:?})",
            instance.spec.topology_ref, topology_status.phase
        )));
    }

    let cluster_ref = instance
        .spec
        .cluster_ref
        .clone()
        .unwrap_or_else(|| topology.spec.cluster_ref.clone());
    let cluster_api: Api<StormCluster> = Api::namespaced(client, &namespace);
    if let Some(cluster) = cluster_api.get_opt(&cluster_ref).await? {
        let cluster_status = cluster.status.unwrap_or_default();
        if instance.status.is_none() && !coordinator::capacity_available(&cluster_status, instance.spec.replicas) {
            return Ok(WorkerPoolAction::WaitOnCapacity);
        }
    }

    let Some(status) = &instance.status else {
        return Ok(WorkerPoolAction::ApplyChildren);
    };

    if status.deployment_name.is_none() {
        return Ok(WorkerPoolAction::ApplyChildren);
    }

    if status.phase == StormWorkerPoolPhase::Failed {
        let ready = deployment_ready_replicas(client, instance).await?;
        if ready * 2 >= instance.spec.replicas {
            return Ok(WorkerPoolAction::Recovering);
        }
        return Ok(WorkerPoolAction::Requeue(PROBE_INTERVAL));
    }

    let ready = deployment_ready_replicas(client, instance).await?;
    if ready * 2 < instance.spec.replicas {
        if let Some(elapsed) = unhealthy_duration(status.unhealthy_since.as_deref()) {
            if elapsed >= SUSTAINED_UNHEALTHY_THRESHOLD {
                return Ok(WorkerPoolAction::Error(format!(
                    "fewer than half of replicas ready ({ready}/{}) for over {}s",
                    instance.spec.replicas,
                    SUSTAINED_UNHEALTHY_THRESHOLD.as_secs()
                )));
            }
        }
    }

    Ok(WorkerPoolAction::Observe)
}

/// How long ago `unhealthy_since` was recorded, or `None` if unset or
/// unparseable (treated the same as "just became unhealthy").
fn unhealthy_duration(unhealthy_since: Option<&str>) -> Option<Duration> {
    let since = chrono::DateTime::parse_from_rfc3339(unhealthy_since?).ok()?;
    let elapsed = chrono::Utc::now().signed_duration_since(since.with_timezone(&chrono::Utc));
    elapsed.to_std().ok()
}

async fn deployment_ready_replicas(client: Client, instance: &StormWorkerPool) -> Result<i32, Error> {
    let namespace = instance.namespace().unwrap_or_default();
    let name = format!("{}-workers", instance.name_any());
    let deploy_api: Api<Deployment> = Api::namespaced(client, &namespace);
    let deployment = deploy_api.get_opt(&name).await?;
    Ok(deployment
        .and_then(|d| d.status)
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0))
}

async fn resolve_default_image(client: Client, instance: &StormWorkerPool) -> Result<ImageSpec, Error> {
    if let Some(image) = &instance.spec.image {
        return Ok(image.clone());
    }
    let namespace = instance.namespace().unwrap_or_default();
    let topology_api: Api<StormTopology> = Api::namespaced(client.clone(), &namespace);
    let topology = topology_api.get(&instance.spec.topology_ref).await?;
    let cluster_ref = instance
        .spec
        .cluster_ref
        .clone()
        .unwrap_or_else(|| topology.spec.cluster_ref.clone());
    let cluster_api: Api<StormCluster> = Api::namespaced(client, &namespace);
    let cluster = cluster_api.get(&cluster_ref).await?;
    Ok(cluster.spec.image)
}

async fn observe(client: Client, instance: &StormWorkerPool) -> Result<(), Error> {
    let namespace = instance.namespace().unwrap_or_default();
    let name = format!("{}-workers", instance.name_any());
    let deploy_api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    let deployment = deploy_api.get_opt(&name).await?;

    let (ready, updated) = deployment
        .and_then(|d| d.status)
        .map(|s| (s.ready_replicas.unwrap_or(0), s.updated_replicas.unwrap_or(0)))
        .unwrap_or((0, 0));

    actions::observe(client, instance, ready, updated).await
}

fn on_error(instance: Arc<StormWorkerPool>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!(
            "StormWorkerPool reconciliation error: {:?} ({}/{})",
            error,
            instance.namespace().unwrap_or_default(),
            instance.name_any()
        )
        .red()
    );
    Action::requeue(Duration::from_secs(5))
}
