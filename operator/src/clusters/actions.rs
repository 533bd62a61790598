use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Service;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};

use crate::materializer;
use crate::util::{patch::patch_status, Error, MANAGER_NAME};
use storm_types::{Endpoints, StormCluster, StormClusterPhase};

pub async fn pending(client: Client, instance: &StormCluster, message: String) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormClusterPhase::Pending;
        status.message = Some(message);
    })
    .await?;
    Ok(())
}

pub async fn creating(client: Client, instance: &StormCluster) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormClusterPhase::Creating;
        status.message = Some("Materializing Nimbus/Supervisor/UI workloads.".to_string());
    })
    .await?;
    Ok(())
}

pub async fn error(client: Client, instance: &StormCluster, message: String) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormClusterPhase::Failed;
        status.message = Some(message);
    })
    .await?;
    Ok(())
}

pub async fn terminating(client: Client, instance: &StormCluster) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormClusterPhase::Terminating;
        status.message = Some(crate::util::messages::TERMINATING.to_string());
    })
    .await?;
    Ok(())
}

/// Server-side-applies every child resource the cluster materializer
/// produces for `create` management mode. Idempotent: re-applying an
/// unchanged spec is a no-op on the API server side.
pub async fn apply_children(client: Client, instance: &StormCluster) -> Result<(), Error> {
    let namespace = instance.namespace().unwrap_or_default();
    let pp = PatchParams::apply(MANAGER_NAME).force();

    let nimbus = materializer::nimbus_stateful_set(instance);
    let sts_api: Api<StatefulSet> = Api::namespaced(client.clone(), &namespace);
    sts_api
        .patch(
            nimbus.metadata.name.as_deref().unwrap(),
            &pp,
            &Patch::Apply(&nimbus),
        )
        .await?;

    let supervisor = materializer::supervisor_stateful_set(instance);
    sts_api
        .patch(
            supervisor.metadata.name.as_deref().unwrap(),
            &pp,
            &Patch::Apply(&supervisor),
        )
        .await?;

    let ui = materializer::ui_deployment(instance);
    let deploy_api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    deploy_api
        .patch(ui.metadata.name.as_deref().unwrap(), &pp, &Patch::Apply(&ui))
        .await?;

    let name = instance.name_any();
    let svc_api: Api<Service> = Api::namespaced(client, &namespace);
    for (component, port) in [("nimbus", 6627), ("ui", 8080), ("supervisor", 6700)] {
        let svc = materializer::daemon_service(&name, component, port);
        svc_api
            .patch(
                svc.metadata.name.as_deref().unwrap(),
                &pp,
                &Patch::Apply(&svc),
            )
            .await?;
    }

    Ok(())
}

pub async fn delete_all_children(client: Client, instance: &StormCluster) -> Result<(), Error> {
    let namespace = instance.namespace().unwrap_or_default();
    let name = instance.name_any();
    let dp = kube::api::DeleteParams::background();

    let sts_api: Api<StatefulSet> = Api::namespaced(client.clone(), &namespace);
    for suffix in ["nimbus", "supervisor"] {
        let _ = sts_api.delete(&format!("{name}-{suffix}"), &dp).await;
    }
    let deploy_api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    let _ = deploy_api.delete(&format!("{name}-ui"), &dp).await;
    let svc_api: Api<Service> = Api::namespaced(client, &namespace);
    for component in ["nimbus", "ui", "supervisor"] {
        let _ = svc_api.delete(&format!("{name}-{component}"), &dp).await;
    }
    Ok(())
}

pub async fn update_observed_state(
    client: Client,
    instance: &StormCluster,
    ready_nimbus: i32,
    ready_supervisor: i32,
    ready_ui: i32,
    total_slots: i32,
    used_slots: i32,
    topology_count: i32,
    nimbus_leader: Option<String>,
) -> Result<(), Error> {
    let namespace = instance.namespace().unwrap_or_default();
    let name = instance.name_any();
    patch_status(client, instance, |status| {
        status.ready_nimbus = ready_nimbus;
        status.ready_supervisor = ready_supervisor;
        status.ready_ui = ready_ui;
        status.total_slots = total_slots;
        status.used_slots = used_slots;
        status.free_slots = (total_slots - used_slots).max(0);
        status.topology_count = topology_count;
        status.nimbus_leader = nimbus_leader.clone();
        if nimbus_leader.is_some() && ready_nimbus > 0 && ready_supervisor > 0 {
            status.phase = StormClusterPhase::Running;
            status.message = Some("All daemon roles are ready.".to_string());
            status.endpoints = Endpoints {
                nimbus: Some(format!("{name}-nimbus.{namespace}.svc.cluster.local:6627")),
                ui: Some(format!("http://{name}-ui.{namespace}.svc.cluster.local:8080")),
                rest_api: Some(format!("http://{name}-ui.{namespace}.svc.cluster.local:8080")),
            };
        }
    })
    .await?;
    Ok(())
}
