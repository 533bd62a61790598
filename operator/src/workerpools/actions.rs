use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};

use crate::materializer;
use crate::util::{patch::patch_status, Error, MANAGER_NAME};
use storm_types::{ImageSpec, StormWorkerPool, StormWorkerPoolPhase};

pub async fn waiting_on_topology(client: Client, instance: &StormWorkerPool, message: String) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormWorkerPoolPhase::Pending;
        status.message = Some(message);
    })
    .await?;
    Ok(())
}

pub async fn apply_children(
    client: Client,
    instance: &StormWorkerPool,
    default_image: &ImageSpec,
) -> Result<(), Error> {
    let namespace = instance.namespace().unwrap_or_default();
    let pp = PatchParams::apply(MANAGER_NAME).force();

    let deployment = materializer::worker_pool_deployment(instance, default_image);
    let deploy_api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    deploy_api
        .patch(
            deployment.metadata.name.as_deref().unwrap(),
            &pp,
            &Patch::Apply(&deployment),
        )
        .await?;

    if let Some(hpa) = materializer::worker_pool_hpa(instance) {
        let hpa_api: Api<HorizontalPodAutoscaler> = Api::namespaced(client, &namespace);
        hpa_api
            .patch(hpa.metadata.name.as_deref().unwrap(), &pp, &Patch::Apply(&hpa))
            .await?;
    } else {
        let hpa_api: Api<HorizontalPodAutoscaler> = Api::namespaced(client, &namespace);
        let name = format!("{}-workers", instance.name_any());
        let _ = hpa_api.delete(&name, &kube::api::DeleteParams::default()).await;
    }

    Ok(())
}

pub async fn creating(client: Client, instance: &StormWorkerPool) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormWorkerPoolPhase::Creating;
        status.message = Some("Materializing worker Deployment.".to_string());
        status.deployment_name = Some(format!("{}-workers", instance.name_any()));
    })
    .await?;
    Ok(())
}

pub async fn observe(
    client: Client,
    instance: &StormWorkerPool,
    ready_replicas: i32,
    updated_replicas: i32,
) -> Result<(), Error> {
    let desired = instance.spec.replicas;
    let majority_ready = ready_replicas * 2 >= desired;
    patch_status(client, instance, |status| {
        status.replicas = desired;
        status.ready_replicas = ready_replicas;
        status.updated_replicas = updated_replicas;
        status.phase = if ready_replicas >= desired {
            StormWorkerPoolPhase::Running
        } else {
            StormWorkerPoolPhase::Scaling
        };
        status.message = Some(format!("{ready_replicas}/{desired} worker replicas ready."));
        status.unhealthy_since = if majority_ready {
            None
        } else {
            status
                .unhealthy_since
                .clone()
                .or_else(|| Some(chrono::Utc::now().to_rfc3339()))
        };
    })
    .await?;
    Ok(())
}

/// Moves a pool out of `Failed` once the workers Deployment reports at
/// least half of `spec.replicas` ready again; the next reconcile re-derives
/// whether to head straight to `Observe` or back through `ApplyChildren`.
pub async fn recovering(client: Client, instance: &StormWorkerPool) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormWorkerPoolPhase::Pending;
        status.message = Some("Recovered from Failed; re-evaluating worker pool.".to_string());
        status.unhealthy_since = None;
    })
    .await?;
    Ok(())
}

pub async fn error(client: Client, instance: &StormWorkerPool, message: String) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormWorkerPoolPhase::Failed;
        status.message = Some(message);
    })
    .await?;
    Ok(())
}

pub async fn terminating(client: Client, instance: &StormWorkerPool) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormWorkerPoolPhase::Terminating;
        status.message = Some(crate::util::messages::TERMINATING.to_string());
    })
    .await?;
    Ok(())
}

pub async fn delete_children(client: Client, instance: &StormWorkerPool) -> Result<(), Error> {
    let namespace = instance.namespace().unwrap_or_default();
    let name = format!("{}-workers", instance.name_any());
    let dp = kube::api::DeleteParams::background();

    let deploy_api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    let _ = deploy_api.delete(&name, &dp).await;
    let hpa_api: Api<HorizontalPodAutoscaler> = Api::namespaced(client, &namespace);
    let _ = hpa_api.delete(&name, &dp).await;
    Ok(())
}
