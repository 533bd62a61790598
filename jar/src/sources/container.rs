use crate::error::Error;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use storm_types::{ChecksumSpec, ExtractionMode};

/// Runs an ephemeral Job that mounts the source image, copies `path` onto
/// an `emptyDir`, and exits; the caller then reads the copied file back out
/// through a sidecar volume-sharing container. Only [`ExtractionMode::Job`]
/// is implemented (see DESIGN.md); the other variants are parsed but
/// rejected before reaching this function.
pub fn require_job_mode(mode: ExtractionMode) -> Result<(), Error> {
    if mode == ExtractionMode::Job {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "containerJarSource.extractionMode '{mode:?}' is not implemented, only 'job' is"
        )))
    }
}

/// Builds the extraction Job spec. The job runs `image` with an override
/// command that copies `source_path` to `/output/jar` on a shared
/// `emptyDir` volume named `jar-output`; the caller is responsible for
/// reading `/output/jar` back out via a pod exec or a follow-up volume
/// mount, since this module only materializes the Job.
pub fn build_extraction_job(
    name: &str,
    namespace: &str,
    image: &str,
    source_path: &str,
    timeout_seconds: u32,
    pull_secrets: &[String],
) -> Job {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/component".to_string(), "jar-extract".to_string());

    let container = Container {
        name: "extract".to_string(),
        image: Some(image.to_string()),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("cp {source_path} /output/jar"),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: "jar-output".to_string(),
            mount_path: "/output".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let image_pull_secrets = if pull_secrets.is_empty() {
        None
    } else {
        Some(
            pull_secrets
                .iter()
                .map(|s| k8s_openapi::api::core::v1::LocalObjectReference {
                    name: s.clone(),
                })
                .collect(),
        )
    };

    let pod_spec = PodSpec {
        containers: vec![container],
        restart_policy: Some("Never".to_string()),
        volumes: Some(vec![Volume {
            name: "jar-output".to_string(),
            empty_dir: Some(Default::default()),
            ..Default::default()
        }]),
        image_pull_secrets,
        active_deadline_seconds: Some(timeout_seconds as i64),
        ..Default::default()
    };

    Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(k8s_openapi::api::batch::v1::JobSpec {
            template: PodTemplateSpec {
                spec: Some(pod_spec),
                ..Default::default()
            },
            backoff_limit: Some(0),
            active_deadline_seconds: Some(timeout_seconds as i64),
            ttl_seconds_after_finished: Some(300),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub async fn create_job(client: Client, namespace: &str, job: &Job) -> Result<(), Error> {
    let api: Api<Job> = Api::namespaced(client, namespace);
    api.create(&PostParams::default(), job).await?;
    Ok(())
}

pub async fn delete_job(client: Client, namespace: &str, name: &str) -> Result<(), Error> {
    let api: Api<Job> = Api::namespaced(client, namespace);
    let dp = DeleteParams::background();
    match api.delete(name, &dp).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub async fn job_succeeded(client: Client, namespace: &str, name: &str) -> Result<bool, Error> {
    let api: Api<Job> = Api::namespaced(client, namespace);
    let job = api.get(name).await?;
    Ok(job
        .status
        .as_ref()
        .and_then(|s| s.succeeded)
        .unwrap_or(0)
        > 0)
}

/// Hashes the extracted JAR at `path` and compares it against `checksum`,
/// mirroring [`crate::acquirer`]'s verification for the other four source
/// kinds. The extraction Job has no way to report its own hash back to the
/// operator, so this reads the file from the shared volume after the Job
/// succeeds, before any submission to Nimbus.
pub async fn verify_checksum_file(path: &Path, checksum: &ChecksumSpec) -> Result<(), Error> {
    if checksum.algorithm.to_lowercase() != "sha256" {
        return Err(Error::UnsupportedChecksumAlgorithm(checksum.algorithm.clone()));
    }
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let actual = hex::encode(hasher.finalize());
    if actual != checksum.value.to_lowercase() {
        return Err(Error::ChecksumMismatch {
            expected: checksum.value.clone(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_job_mode_is_accepted() {
        assert!(require_job_mode(ExtractionMode::Job).is_ok());
        assert!(require_job_mode(ExtractionMode::InitContainer).is_err());
        assert!(require_job_mode(ExtractionMode::Sidecar).is_err());
    }

    #[test]
    fn extraction_job_mounts_shared_emptydir_and_copies_path() {
        let job = build_extraction_job(
            "extract-topo-a",
            "storm-ns",
            "myrepo/topology:1.2.3",
            "/app/topology.jar",
            120,
            &["regcred".to_string()],
        );

        assert_eq!(job.metadata.name.as_deref(), Some("extract-topo-a"));
        assert_eq!(job.metadata.namespace.as_deref(), Some("storm-ns"));

        let spec = job.spec.expect("job spec");
        assert_eq!(spec.backoff_limit, Some(0));
        let pod_spec = spec.template.spec.expect("pod spec");
        assert_eq!(pod_spec.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod_spec.image_pull_secrets.unwrap()[0].name, "regcred");

        let container = &pod_spec.containers[0];
        assert_eq!(container.image.as_deref(), Some("myrepo/topology:1.2.3"));
        let command = container.command.as_ref().unwrap();
        assert!(command[2].contains("/app/topology.jar"));
        assert_eq!(container.volume_mounts.as_ref().unwrap()[0].name, "jar-output");

        let volumes = pod_spec.volumes.unwrap();
        assert_eq!(volumes[0].name, "jar-output");
        assert!(volumes[0].empty_dir.is_some());
    }

    #[tokio::test]
    async fn checksum_match_is_accepted() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        tokio::fs::write(tmp.path(), b"hello").await.unwrap();
        let mut hasher = Sha256::new();
        hasher.update(b"hello");
        let checksum = ChecksumSpec {
            algorithm: "sha256".into(),
            value: hex::encode(hasher.finalize()),
        };
        assert!(verify_checksum_file(tmp.path(), &checksum).await.is_ok());
    }

    #[tokio::test]
    async fn checksum_mismatch_is_rejected() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        tokio::fs::write(tmp.path(), b"hello").await.unwrap();
        let checksum = ChecksumSpec {
            algorithm: "sha256".into(),
            value: "0".repeat(64),
        };
        let err = verify_checksum_file(tmp.path(), &checksum).await.unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn extraction_job_omits_pull_secrets_when_none_given() {
        let job = build_extraction_job("extract-b", "ns", "img:latest", "/jar", 60, &[]);
        let pod_spec = job.spec.unwrap().template.spec.unwrap();
        assert!(pod_spec.image_pull_secrets.is_none());
    }
}
