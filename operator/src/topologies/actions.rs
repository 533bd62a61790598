use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use tokio_util::io::ReaderStream;

use crate::util::{patch::patch_status, Error};
use storm_client::NimbusClient;
use storm_jar::sources::container;
use storm_jar::JarAcquirer;
use storm_types::{StormTopology, StormTopologyPhase};

pub async fn validation_failed(client: Client, instance: &StormTopology, message: String) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormTopologyPhase::Failed;
        status.message = Some(message);
    })
    .await?;
    Ok(())
}

pub async fn waiting_on_cluster(client: Client, instance: &StormTopology) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormTopologyPhase::Validating;
        status.message = Some(crate::util::messages::WAITING_ON_CLUSTER.to_string());
    })
    .await?;
    Ok(())
}

pub async fn waiting_on_capacity(client: Client, instance: &StormTopology) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormTopologyPhase::Pending;
        status.message = Some(crate::util::messages::CAPACITY_UNAVAILABLE.to_string());
    })
    .await?;
    Ok(())
}

pub async fn downloading(client: Client, instance: &StormTopology) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormTopologyPhase::Downloading;
        status.message = Some("Acquiring topology JAR.".to_string());
    })
    .await?;
    Ok(())
}

/// Acquires the topology's JAR, uploads it to Nimbus, and submits it.
/// Returns the Nimbus-assigned topology id and the cache content hash on
/// success. The cache entry stays pinned until the caller releases it via
/// [`JarAcquirer::release`] (once `Running` is observed, or immediately
/// here on an upload/submit failure).
pub async fn acquire_and_submit(
    client: Client,
    acquirer: &JarAcquirer,
    nimbus: &NimbusClient,
    instance: &StormTopology,
) -> Result<(String, String), Error> {
    let namespace = instance.namespace().unwrap_or_default();
    let acquired = acquirer
        .acquire(&namespace, &instance.spec.topology.jar, None)
        .await?;

    let result: Result<String, Error> = async {
        let file = tokio::fs::File::open(&acquired.path).await?;
        let jar_path = nimbus.upload_jar(ReaderStream::new(file)).await?;

        let config: BTreeMap<String, String> = instance.spec.topology.config.clone();
        let id = nimbus
            .submit_topology(
                &instance.spec.topology.name,
                &instance.spec.topology.main_class,
                &instance.spec.topology.args,
                &config,
                &jar_path,
            )
            .await?;
        Ok(id)
    }
    .await;

    let _ = client;
    match result {
        Ok(id) => Ok((id, acquired.hash)),
        Err(e) => {
            acquirer.release(&acquired.hash);
            Err(e)
        }
    }
}

/// Submits a topology whose JAR an extraction Job already placed on a
/// volume shared with Nimbus, skipping the byte-acquire/upload path
/// `acquire_and_submit` takes for the other four source kinds (see
/// DESIGN.md: container sources are not byte-streamed through the
/// operator).
pub async fn submit_pre_extracted(
    nimbus: &NimbusClient,
    instance: &StormTopology,
    shared_jar_path: &str,
) -> Result<String, Error> {
    if let Some(checksum) = instance
        .spec
        .topology
        .jar
        .container
        .as_ref()
        .and_then(|c| c.checksum.as_ref())
    {
        container::verify_checksum_file(std::path::Path::new(shared_jar_path), checksum).await?;
    }

    let config: BTreeMap<String, String> = instance.spec.topology.config.clone();
    let id = nimbus
        .submit_topology(
            &instance.spec.topology.name,
            &instance.spec.topology.main_class,
            &instance.spec.topology.args,
            &config,
            shared_jar_path,
        )
        .await?;
    Ok(id)
}

pub async fn submitted(
    client: Client,
    instance: &StormTopology,
    topology_id: String,
    version: &str,
) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormTopologyPhase::Running;
        status.topology_id = Some(topology_id);
        status.deployed_version = Some(version.to_string());
        status.message = Some("Topology submitted to Nimbus.".to_string());
    })
    .await?;
    Ok(())
}

pub async fn killing(client: Client, instance: &StormTopology, reason: &str) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormTopologyPhase::Killing;
        status.message = Some(reason.to_string());
    })
    .await?;
    Ok(())
}

/// Kills the live topology on Nimbus, tolerating `NotAlive` (already gone).
pub async fn kill(nimbus: &NimbusClient, topology_id: &str, wait_seconds: u32) -> Result<(), Error> {
    match nimbus.kill_topology(topology_id, wait_seconds).await {
        Ok(()) => Ok(()),
        Err(storm_client::Error::NotAlive(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub async fn killed(client: Client, instance: &StormTopology, suspend: bool) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = if suspend {
            StormTopologyPhase::Suspended
        } else {
            StormTopologyPhase::Killed
        };
        status.topology_id = None;
        status.message = Some(if suspend {
            "Topology suspended.".to_string()
        } else {
            "Topology killed, awaiting resubmission.".to_string()
        });
    })
    .await?;
    Ok(())
}

pub async fn error(client: Client, instance: &StormTopology, message: String) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormTopologyPhase::Failed;
        status.last_error = Some(message);
    })
    .await?;
    Ok(())
}

/// Refreshes metrics/uptime from Nimbus's live view of the running topology.
pub async fn inspect(
    client: Client,
    nimbus: &NimbusClient,
    instance: &StormTopology,
    topology_id: &str,
) -> Result<(), Error> {
    let info = match nimbus.get_topology(topology_id).await {
        Ok(info) => info,
        Err(storm_client::Error::NotFound(_)) => {
            patch_status(client, instance, |status| {
                status.phase = StormTopologyPhase::Failed;
                status.last_error = Some("topology no longer present on Nimbus".to_string());
            })
            .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    patch_status(client, instance, |status| {
        status.uptime_seconds = Some(info.uptime_seconds);
        status.metrics.worker_count = info.workers.len() as i32;
        status.workers = info.workers.len() as i32;
    })
    .await?;
    Ok(())
}

pub async fn terminating(client: Client, instance: &StormTopology) -> Result<(), Error> {
    patch_status(client, instance, |status| {
        status.phase = StormTopologyPhase::Killing;
        status.message = Some(crate::util::messages::TERMINATING.to_string());
    })
    .await?;
    Ok(())
}

pub async fn cluster_for(
    client: Client,
    namespace: &str,
    cluster_ref: &str,
) -> Result<Option<storm_types::StormCluster>, Error> {
    let api: Api<storm_types::StormCluster> = Api::namespaced(client, namespace);
    Ok(api.get_opt(cluster_ref).await?)
}
