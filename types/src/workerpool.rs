use crate::common::{AutoscalingSpec, ImageSpec, PortRange};
use k8s_openapi::api::core::v1::{
    Affinity, Container, EnvVar, Toleration, Volume,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Pod-level overrides applied on top of the materializer's generated
/// worker pod template.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct WorkerPodTemplate {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, rename = "containerOverrides")]
    pub container_overrides: Vec<Container>,

    #[serde(default)]
    pub volumes: Vec<Volume>,

    #[serde(default)]
    pub affinity: Option<Affinity>,

    #[serde(default)]
    pub tolerations: Vec<Toleration>,

    #[serde(default, rename = "nodeSelector")]
    pub node_selector: BTreeMap<String, String>,
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "storm.apache.org",
    version = "v1beta1",
    kind = "StormWorkerPool",
    plural = "stormworkerpools",
    derive = "PartialEq",
    status = "StormWorkerPoolStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"PHASE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.readyReplicas\", \"name\": \"READY\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.replicas\", \"name\": \"DESIRED\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
pub struct StormWorkerPoolSpec {
    #[serde(rename = "topologyRef")]
    pub topology_ref: String,

    #[serde(default, rename = "clusterRef")]
    pub cluster_ref: Option<String>,

    #[serde(default = "default_replicas")]
    pub replicas: i32,

    #[serde(default)]
    pub image: Option<ImageSpec>,

    #[serde(default)]
    pub template: WorkerPodTemplate,

    #[serde(default, rename = "workerConfig")]
    pub worker_config: BTreeMap<String, String>,

    #[serde(default, rename = "jvmOpts")]
    pub jvm_opts: Vec<String>,

    #[serde(default, rename = "extraEnv")]
    pub extra_env: Vec<EnvVar>,

    #[serde(default)]
    pub ports: PortRange,

    #[serde(default)]
    pub autoscaling: Option<AutoscalingSpec>,
}

fn default_replicas() -> i32 {
    1
}

impl StormWorkerPoolSpec {
    pub fn autoscaling_enabled(&self) -> bool {
        self.autoscaling.as_ref().map(|a| a.enabled).unwrap_or(false)
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum StormWorkerPoolPhase {
    #[default]
    Pending,
    Creating,
    Running,
    Scaling,
    Updating,
    Failed,
    Terminating,
}

impl FromStr for StormWorkerPoolPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Creating" => Ok(Self::Creating),
            "Running" => Ok(Self::Running),
            "Scaling" => Ok(Self::Scaling),
            "Updating" => Ok(Self::Updating),
            "Failed" => Ok(Self::Failed),
            "Terminating" => Ok(Self::Terminating),
            _ => Err(()),
        }
    }
}

impl fmt::Display for StormWorkerPoolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Creating => write!(f, "Creating"),
            Self::Running => write!(f, "Running"),
            Self::Scaling => write!(f, "Scaling"),
            Self::Updating => write!(f, "Updating"),
            Self::Failed => write!(f, "Failed"),
            Self::Terminating => write!(f, "Terminating"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct StormWorkerPoolStatus {
    #[serde(default)]
    pub phase: StormWorkerPoolPhase,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default, rename = "lastUpdated")]
    pub last_updated: Option<String>,

    #[serde(default, rename = "replicas")]
    pub replicas: i32,

    #[serde(default, rename = "readyReplicas")]
    pub ready_replicas: i32,

    #[serde(default, rename = "updatedReplicas")]
    pub updated_replicas: i32,

    #[serde(default, rename = "deploymentName")]
    pub deployment_name: Option<String>,

    #[serde(default, rename = "hpaName")]
    pub hpa_name: Option<String>,

    /// RFC3339 timestamp of when fewer than half of `spec.replicas` were
    /// last observed ready; cleared once readiness recovers. Drives the
    /// `Ready -> Failed` transition on sustained unhealthiness.
    #[serde(default, rename = "unhealthySince")]
    pub unhealthy_since: Option<String>,

    #[serde(default)]
    pub conditions: Vec<k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition>,
}

impl StormWorkerPoolStatus {
    pub fn is_ready(&self, desired: i32) -> bool {
        self.ready_replicas >= desired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_ready_true_at_and_above_desired() {
        let mut status = StormWorkerPoolStatus::default();
        status.ready_replicas = 3;
        assert!(status.is_ready(3));
        assert!(status.is_ready(2));
    }

    #[test]
    fn is_ready_false_below_desired() {
        let mut status = StormWorkerPoolStatus::default();
        status.ready_replicas = 2;
        assert!(!status.is_ready(3));
    }
}
