use crate::common::{AutoscalingSpec, ChecksumSpec, Placement};
use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One of several ways to obtain a topology's JAR. Exactly one field is
/// populated per invariant 3; validation enforcing that lives in the
/// topology reconciler, not in this type.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct JarSource {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default, rename = "configMap")]
    pub config_map: Option<ConfigMapJarSource>,

    #[serde(default)]
    pub secret: Option<SecretJarSource>,

    #[serde(default)]
    pub s3: Option<S3JarSource>,

    #[serde(default)]
    pub container: Option<ContainerJarSource>,
}

impl JarSource {
    /// Returns a short tag for the populated variant, or `None` if none/more
    /// than one field is set (the caller decides how to treat that).
    pub fn kind(&self) -> Option<&'static str> {
        let set = [
            self.url.is_some(),
            self.config_map.is_some(),
            self.secret.is_some(),
            self.s3.is_some(),
            self.container.is_some(),
        ];
        if set.iter().filter(|x| **x).count() != 1 {
            return None;
        }
        if self.url.is_some() {
            Some("url")
        } else if self.config_map.is_some() {
            Some("configMap")
        } else if self.secret.is_some() {
            Some("secret")
        } else if self.s3.is_some() {
            Some("s3")
        } else {
            Some("container")
        }
    }

    pub fn populated_count(&self) -> usize {
        [
            self.url.is_some(),
            self.config_map.is_some(),
            self.secret.is_some(),
            self.s3.is_some(),
            self.container.is_some(),
        ]
        .iter()
        .filter(|x| **x)
        .count()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ConfigMapJarSource {
    pub name: String,
    pub key: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct SecretJarSource {
    pub name: String,
    pub key: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct S3JarSource {
    pub bucket: String,
    pub key: String,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(rename = "credentialsSecret")]
    pub credentials_secret: String,
}

/// How the operator extracts a JAR from a container image. `job` is the
/// only mode this implementation runs; the others are accepted so that
/// manifests written against the full spec still parse (see DESIGN.md).
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum ExtractionMode {
    InitContainer,
    #[default]
    Job,
    Sidecar,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ContainerJarSource {
    pub image: String,
    pub path: String,

    #[serde(default, rename = "pullPolicy")]
    pub pull_policy: Option<String>,

    #[serde(default, rename = "pullSecrets")]
    pub pull_secrets: Vec<String>,

    #[serde(default, rename = "extractionMode")]
    pub extraction_mode: ExtractionMode,

    #[serde(
        default = "default_extraction_timeout_seconds",
        rename = "extractionTimeoutSeconds"
    )]
    pub extraction_timeout_seconds: u32,

    #[serde(default)]
    pub checksum: Option<ChecksumSpec>,
}

fn default_extraction_timeout_seconds() -> u32 {
    120
}

/// `spec.topology`: what Nimbus should run.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct TopologySpecInner {
    pub name: String,

    pub jar: JarSource,

    #[serde(rename = "mainClass")]
    pub main_class: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct WorkersSpec {
    #[serde(default = "default_worker_replicas")]
    pub replicas: i32,

    #[serde(default)]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, rename = "jvmOpts")]
    pub jvm_opts: Vec<String>,

    #[serde(default)]
    pub autoscaling: Option<AutoscalingSpec>,

    #[serde(default)]
    pub placement: Option<Placement>,
}

fn default_worker_replicas() -> i32 {
    1
}

/// Storm has no native rolling update for arbitrary topology graph changes;
/// `killAndResubmit` (the only supported value today) models the explicit
/// kill-wait-resubmit sequence from §4.4/§9.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum UpdateStrategy {
    #[default]
    KillAndResubmit,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct LifecycleSpec {
    #[serde(default = "default_kill_wait_seconds", rename = "killWaitSeconds")]
    pub kill_wait_seconds: u32,

    #[serde(default, rename = "updateStrategy")]
    pub update_strategy: UpdateStrategy,
}

impl Default for LifecycleSpec {
    fn default() -> Self {
        Self {
            kill_wait_seconds: default_kill_wait_seconds(),
            update_strategy: UpdateStrategy::default(),
        }
    }
}

fn default_kill_wait_seconds() -> u32 {
    30
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "storm.apache.org",
    version = "v1beta1",
    kind = "StormTopology",
    plural = "stormtopologies",
    derive = "PartialEq",
    status = "StormTopologyStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"PHASE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.deployedVersion\", \"name\": \"VERSION\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
pub struct StormTopologySpec {
    #[serde(rename = "clusterRef")]
    pub cluster_ref: String,

    pub topology: TopologySpecInner,

    #[serde(default)]
    pub workers: Option<WorkersSpec>,

    #[serde(default)]
    pub lifecycle: Option<LifecycleSpec>,

    #[serde(default)]
    pub suspend: bool,
}

impl StormTopologySpec {
    pub fn desired_workers(&self) -> i32 {
        self.workers.as_ref().map(|w| w.replicas).unwrap_or(1)
    }

    pub fn kill_wait_seconds(&self) -> u32 {
        self.lifecycle
            .as_ref()
            .map(|l| l.kill_wait_seconds)
            .unwrap_or_else(default_kill_wait_seconds)
    }

    /// The version this spec declares, from `topology.config["topology.version"]`,
    /// defaulting to `"unversioned"` per §4.4 step 6.
    pub fn requested_version(&self) -> &str {
        self.topology
            .config
            .get("topology.version")
            .map(|v| v.as_str())
            .unwrap_or("unversioned")
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum StormTopologyPhase {
    #[default]
    Pending,
    Validating,
    Downloading,
    Submitting,
    Running,
    Suspended,
    Updating,
    Killing,
    Killed,
    Failed,
}

impl FromStr for StormTopologyPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Validating" => Ok(Self::Validating),
            "Downloading" => Ok(Self::Downloading),
            "Submitting" => Ok(Self::Submitting),
            "Running" => Ok(Self::Running),
            "Suspended" => Ok(Self::Suspended),
            "Updating" => Ok(Self::Updating),
            "Killing" => Ok(Self::Killing),
            "Killed" => Ok(Self::Killed),
            "Failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for StormTopologyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Validating => write!(f, "Validating"),
            Self::Downloading => write!(f, "Downloading"),
            Self::Submitting => write!(f, "Submitting"),
            Self::Running => write!(f, "Running"),
            Self::Suspended => write!(f, "Suspended"),
            Self::Updating => write!(f, "Updating"),
            Self::Killing => write!(f, "Killing"),
            Self::Killed => write!(f, "Killed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl StormTopologyPhase {
    /// Non-terminal post-validation states that must carry a finalizer
    /// (invariant 1). `Pending`/`Validating` precede any Nimbus-visible
    /// side effect, so they're excluded.
    pub fn requires_finalizer(self) -> bool {
        !matches!(self, Self::Pending | Self::Validating)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct TopologyMetrics {
    #[serde(default, rename = "executorCount")]
    pub executor_count: i32,

    #[serde(default, rename = "taskCount")]
    pub task_count: i32,

    #[serde(default, rename = "workerCount")]
    pub worker_count: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct StormTopologyStatus {
    #[serde(default)]
    pub phase: StormTopologyPhase,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default, rename = "lastUpdated")]
    pub last_updated: Option<String>,

    #[serde(default, rename = "topologyId")]
    pub topology_id: Option<String>,

    #[serde(default, rename = "deployedVersion")]
    pub deployed_version: Option<String>,

    #[serde(default)]
    pub workers: i32,

    #[serde(default)]
    pub executors: i32,

    #[serde(default)]
    pub tasks: i32,

    #[serde(default, rename = "uptimeSeconds")]
    pub uptime_seconds: Option<i64>,

    #[serde(default)]
    pub metrics: TopologyMetrics,

    #[serde(default, rename = "lastError")]
    pub last_error: Option<String>,

    #[serde(default)]
    pub conditions: Vec<k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_reports_the_single_populated_variant() {
        let mut source = JarSource::default();
        assert_eq!(source.kind(), None);
        assert_eq!(source.populated_count(), 0);

        source.url = Some("https://example.com/topo.jar".to_string());
        assert_eq!(source.kind(), Some("url"));
        assert_eq!(source.populated_count(), 1);

        source.s3 = Some(S3JarSource {
            bucket: "bucket".to_string(),
            key: "topo.jar".to_string(),
            credentials_secret: "s3-creds".to_string(),
            ..Default::default()
        });
        assert_eq!(source.kind(), None);
        assert_eq!(source.populated_count(), 2);
    }

    #[test]
    fn kind_distinguishes_each_variant() {
        let mut source = JarSource {
            config_map: Some(ConfigMapJarSource {
                name: "cm".to_string(),
                key: "topo.jar".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(source.kind(), Some("configMap"));

        source = JarSource {
            secret: Some(SecretJarSource {
                name: "sec".to_string(),
                key: "topo.jar".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(source.kind(), Some("secret"));
    }
}
