use k8s_openapi::api::core::v1::{ResourceRequirements, Toleration};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Container image reference shared by every daemon role and the worker pool.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ImageSpec {
    pub repository: String,

    #[serde(default = "default_image_tag")]
    pub tag: String,

    #[serde(default, rename = "pullPolicy")]
    pub pull_policy: Option<String>,

    #[serde(default, rename = "pullSecrets")]
    pub pull_secrets: Vec<String>,
}

fn default_image_tag() -> String {
    "latest".to_string()
}

/// Persistent storage request for a stateful daemon role (Nimbus, Zookeeper).
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct PersistenceSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, rename = "storageClassName")]
    pub storage_class_name: Option<String>,

    #[serde(default = "default_persistence_size")]
    pub size: String,
}

fn default_persistence_size() -> String {
    "10Gi".to_string()
}

/// Placement hints for pods the materializer generates.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Placement {
    #[serde(default, rename = "nodeSelector")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default)]
    pub tolerations: Vec<Toleration>,
}

/// A single custom-metric target for horizontal autoscaling.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct CustomMetricSpec {
    pub name: String,

    #[serde(rename = "targetAverageValue")]
    pub target_average_value: String,
}

/// Scale-up/scale-down stabilization windows, mirroring HPA's `behavior` block.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct AutoscalingBehavior {
    #[serde(default, rename = "scaleUpStabilizationSeconds")]
    pub scale_up_stabilization_seconds: Option<i32>,

    #[serde(default, rename = "scaleDownStabilizationSeconds")]
    pub scale_down_stabilization_seconds: Option<i32>,
}

/// Autoscaling configuration shared by `StormTopology.spec.workers` and
/// `StormWorkerPool.spec.autoscaling`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct AutoscalingSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(rename = "minReplicas")]
    pub min_replicas: i32,

    #[serde(rename = "maxReplicas")]
    pub max_replicas: i32,

    #[serde(default, rename = "targetCPUUtilizationPercentage")]
    pub target_cpu_utilization_percentage: Option<i32>,

    #[serde(default, rename = "targetMemoryUtilizationPercentage")]
    pub target_memory_utilization_percentage: Option<i32>,

    #[serde(default, rename = "customMetrics")]
    pub custom_metrics: Vec<CustomMetricSpec>,

    #[serde(default)]
    pub behavior: Option<AutoscalingBehavior>,
}

/// Checksum verification requested for a fetched JAR artifact.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ChecksumSpec {
    #[serde(default = "default_checksum_algorithm")]
    pub algorithm: String,

    pub value: String,
}

fn default_checksum_algorithm() -> String {
    "sha256".to_string()
}

/// Contiguous port range a worker pool exposes, `[start, start+count)`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct PortRange {
    pub start: u16,

    pub count: u16,
}

/// Externally-reachable addresses for a `StormCluster`, filled in by the
/// cluster reconciler once the materialized daemons are observed ready.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Endpoints {
    #[serde(default)]
    pub nimbus: Option<String>,

    #[serde(default)]
    pub ui: Option<String>,

    #[serde(default, rename = "restApi")]
    pub rest_api: Option<String>,
}

/// Per-resource Prometheus scrape configuration. Rendering the actual
/// ServiceMonitor/scrape annotations is left to the resource materializer;
/// this only toggles the behavior.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct MetricsSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

/// Convenience alias: every status type accumulates k8s-standard conditions.
pub type Conditions = Vec<Condition>;

/// Upsert a condition by `type_`, following the usual "set condition"
/// semantics: replace in place if the type already exists, else append.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        if existing.status != condition.status {
            existing.last_transition_time = condition.last_transition_time;
        }
        existing.status = condition.status;
        existing.reason = condition.reason;
        existing.message = condition.message;
        existing.observed_generation = condition.observed_generation;
    } else {
        conditions.push(condition);
    }
}

pub fn resource_requirements_default() -> Option<ResourceRequirements> {
    None
}
