use futures::stream::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
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
use storm_client::NimbusPool;
use storm_types::{ManagementMode, StormCluster};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::actions;
use crate::util::{
    Error, PROBE_INTERVAL,
    colors::{FG1, FG2},
};

#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;

const FINALIZER_NAME: &str = "storm.apache.org/cluster-cleanup";

/// Entrypoint for the `StormCluster` controller.
pub async fn run(client: Client) -> Result<(), Error> {
    println!("{}", "Starting StormCluster controller...".green());

    let context: Arc<ContextData> = Arc::new(ContextData::new(client.clone()));

    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("storm-cluster-controller-{}", uuid::Uuid::new_v4()));
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: "storm-cluster-controller-lock".to_string(),
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
                println!("acquired leadership; starting StormCluster controller");
                let client_for_controller = client.clone();
                let context_for_controller = context.clone();
                let crd_api: Api<StormCluster> = Api::all(client_for_controller.clone());
                controller_task = Some(tokio::spawn(async move {
                    println!("{}", "🚀 StormCluster controller started.".green());
                    Controller::new(crd_api, Default::default())
                        .owns(
                            Api::<StatefulSet>::all(client_for_controller),
                            Default::default(),
                        )
                        .run(reconcile, on_error, context_for_controller)
                        .for_each(|_res| async move {})
                        .await;
                }));
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("lost leadership; stopping StormCluster controller");
            task.abort();
        }
    }
}

struct ContextData {
    client: Client,
    nimbus_pool: NimbusPool,
    #[cfg(feature = "metrics")]
    metrics: ControllerMetrics,
}

impl ContextData {
    fn new(client: Client) -> Self {
        #[cfg(feature = "metrics")]
        {
            ContextData {
                client,
                nimbus_pool: NimbusPool::default(),
                metrics: ControllerMetrics::new("clusters"),
            }
        }
        #[cfg(not(feature = "metrics"))]
        {
            ContextData {
                client,
                nimbus_pool: NimbusPool::default(),
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum ClusterAction {
    ApplyChildren,
    ObserveReadiness,
    Error(String),
    NoOp,
    Requeue(Duration),
}

async fn reconcile(instance: Arc<StormCluster>, context: Arc<ContextData>) -> Result<Action, Error> {
    let client = context.client.clone();
    let namespace = instance.namespace().ok_or_else(|| {
        Error::UserInput(
            "Expected StormCluster resource to be namespaced. Can't deploy to an unknown namespace."
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
    #[cfg(feature = "metrics")]
    let start = std::time::Instant::now();

    let api: Api<StormCluster> = Api::namespaced(client.clone(), &namespace);
    let result = finalizer(&api, FINALIZER_NAME, instance.clone(), |event| async {
        match event {
            FinalizerEvent::Apply(cluster) => handle_apply(context.clone(), &cluster).await,
            FinalizerEvent::Cleanup(cluster) => handle_cleanup(context.clone(), &cluster).await,
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

async fn handle_apply(context: Arc<ContextData>, instance: &StormCluster) -> Result<Action, Error> {
    let client = context.client.clone();
    let action = determine_action(client.clone(), instance).await?;

    if action != ClusterAction::NoOp {
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
        ClusterAction::Requeue(duration) => Ok(Action::requeue(duration)),
        ClusterAction::ApplyChildren => {
            actions::creating(client.clone(), instance).await?;
            actions::apply_children(client, instance).await?;
            Ok(Action::requeue(Duration::from_secs(5)))
        }
        ClusterAction::ObserveReadiness => {
            observe_readiness(context, instance).await?;
            Ok(Action::requeue(PROBE_INTERVAL))
        }
        ClusterAction::Error(message) => {
            actions::error(client, instance, message).await?;
            Ok(Action::requeue(Duration::from_secs(10)))
        }
        ClusterAction::NoOp => Ok(Action::requeue(PROBE_INTERVAL)),
    }
}

async fn handle_cleanup(context: Arc<ContextData>, instance: &StormCluster) -> Result<Action, Error> {
    let client = context.client.clone();
    actions::terminating(client.clone(), instance).await?;
    actions::delete_all_children(client, instance).await?;
    Ok(Action::await_change())
}

async fn determine_action(client: Client, instance: &StormCluster) -> Result<ClusterAction, Error> {
    if instance.spec.management_mode == ManagementMode::Reference {
        return Ok(ClusterAction::ObserveReadiness);
    }

    let namespace = instance.namespace().unwrap_or_default();
    let name = instance.name_any();
    let sts_api: Api<StatefulSet> = Api::namespaced(client, &namespace);
    let nimbus_exists = sts_api.get_opt(&format!("{name}-nimbus")).await?.is_some();

    if !nimbus_exists {
        return Ok(ClusterAction::ApplyChildren);
    }

    Ok(ClusterAction::ObserveReadiness)
}

/// Derives observed readiness from the owned StatefulSets/Deployment's
/// `readyReplicas`. There is no Nimbus Thrift leader-election signal
/// available over the REST surface this operator talks to (see
/// DESIGN.md), so the first ready Nimbus pod is reported as the leader —
/// an approximation, not a Zookeeper-verified fact.
async fn observe_readiness(context: Arc<ContextData>, instance: &StormCluster) -> Result<(), Error> {
    let client = context.client.clone();
    let namespace = instance.namespace().unwrap_or_default();
    let name = instance.name_any();
    let sts_api: Api<StatefulSet> = Api::namespaced(client.clone(), &namespace);

    let nimbus = sts_api.get_opt(&format!("{name}-nimbus")).await?;
    let supervisor = sts_api.get_opt(&format!("{name}-supervisor")).await?;

    let ready_nimbus = nimbus
        .as_ref()
        .and_then(|s| s.status.as_ref())
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    let ready_supervisor = supervisor
        .as_ref()
        .and_then(|s| s.status.as_ref())
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);

    let deploy_api: Api<k8s_openapi::api::apps::v1::Deployment> =
        Api::namespaced(client.clone(), &namespace);
    let ui = deploy_api.get_opt(&format!("{name}-ui")).await?;
    let ready_ui = ui
        .as_ref()
        .and_then(|d| d.status.as_ref())
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);

    let nimbus_leader = (ready_nimbus > 0).then(|| format!("{name}-nimbus-0"));

    let total_slots = instance.spec.supervisor.replicas * instance.spec.supervisor.slots_per_supervisor;
    let prior_used_slots = instance.status.as_ref().map(|s| s.used_slots).unwrap_or(0);
    let prior_topology_count = instance.status.as_ref().map(|s| s.topology_count).unwrap_or(0);

    // The REST surface only comes up once the UI deployment has a ready pod;
    // before that, fall back to the last observed values rather than calling
    // an endpoint that isn't there yet.
    let (used_slots, topology_count) = if ready_ui > 0 {
        let base_url = format!("http://{name}-ui.{namespace}.svc.cluster.local:8080");
        let nimbus_client = context.nimbus_pool.get_or_insert(&base_url);
        match nimbus_client.get_cluster_info().await {
            Ok(info) => (info.slots_used, info.topology_count),
            Err(_) => (prior_used_slots, prior_topology_count),
        }
    } else {
        (prior_used_slots, prior_topology_count)
    };

    actions::update_observed_state(
        client,
        instance,
        ready_nimbus,
        ready_supervisor,
        ready_ui,
        total_slots,
        used_slots,
        topology_count,
        nimbus_leader,
    )
    .await
}

fn on_error(instance: Arc<StormCluster>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!(
            "StormCluster reconciliation error: {:?} ({}/{})",
            error,
            instance.namespace().unwrap_or_default(),
            instance.name_any()
        )
        .red()
    );
    Action::requeue(Duration::from_secs(5))
}
