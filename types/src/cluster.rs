use crate::common::{Endpoints, ImageSpec, MetricsSpec, PersistenceSpec as Persistence};
use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Nimbus daemon role configuration.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct NimbusSpec {
    #[serde(default = "default_nimbus_replicas")]
    pub replicas: i32,

    #[serde(default)]
    pub resources: Option<ResourceRequirements>,

    #[serde(default)]
    pub persistence: Persistence,

    #[serde(default, rename = "extraConfig")]
    pub extra_config: BTreeMap<String, String>,
}

fn default_nimbus_replicas() -> i32 {
    1
}

/// Supervisor daemon role configuration.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct SupervisorSpec {
    #[serde(default = "default_supervisor_replicas")]
    pub replicas: i32,

    #[serde(default)]
    pub resources: Option<ResourceRequirements>,

    #[serde(default = "default_slots_per_supervisor", rename = "slotsPerSupervisor")]
    pub slots_per_supervisor: i32,

    #[serde(default = "default_port_start", rename = "portStart")]
    pub port_start: i32,
}

fn default_supervisor_replicas() -> i32 {
    2
}

fn default_slots_per_supervisor() -> i32 {
    4
}

fn default_port_start() -> i32 {
    6700
}

/// UI daemon role configuration.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct UiSpec {
    #[serde(default = "default_ui_replicas")]
    pub replicas: i32,

    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
}

fn default_ui_replicas() -> i32 {
    1
}

/// An embedded Zookeeper ensemble materialized by the operator, as opposed
/// to `externalServers`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ZookeeperEmbedded {
    #[serde(default = "default_zk_replicas")]
    pub replicas: i32,

    #[serde(default)]
    pub persistence: Persistence,
}

fn default_zk_replicas() -> i32 {
    3
}

/// Either an embedded ensemble or a reference to servers the operator does
/// not manage. Exactly one of `embedded`/`externalServers` should be set;
/// enforcement lives in the cluster reconciler's validation step, mirroring
/// the way `JarSource` enforces single-source selection for topologies.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ZookeeperSpec {
    #[serde(default)]
    pub embedded: Option<ZookeeperEmbedded>,

    #[serde(default, rename = "externalServers")]
    pub external_servers: Vec<String>,
}

/// `create`: the operator materializes Nimbus/Supervisor/UI/Zookeeper.
/// `reference`: the operator only observes workloads named in `resourceNames`.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum ManagementMode {
    #[default]
    Create,
    Reference,
}

/// Pre-existing resource names consulted in `reference` mode.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ResourceNames {
    #[serde(default)]
    pub nimbus: Option<String>,

    #[serde(default)]
    pub supervisor: Option<String>,

    #[serde(default)]
    pub ui: Option<String>,
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "storm.apache.org",
    version = "v1beta1",
    kind = "StormCluster",
    plural = "stormclusters",
    derive = "PartialEq",
    status = "StormClusterStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"PHASE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.nimbusLeader\", \"name\": \"LEADER\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.freeSlots\", \"name\": \"FREE-SLOTS\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.creationTimestamp\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
pub struct StormClusterSpec {
    #[serde(default, rename = "managementMode")]
    pub management_mode: ManagementMode,

    #[serde(default, rename = "resourceNames")]
    pub resource_names: Option<ResourceNames>,

    #[serde(default)]
    pub image: ImageSpec,

    #[serde(default)]
    pub nimbus: NimbusSpec,

    #[serde(default)]
    pub supervisor: SupervisorSpec,

    #[serde(default)]
    pub ui: UiSpec,

    #[serde(default)]
    pub zookeeper: ZookeeperSpec,

    #[serde(default)]
    pub config: BTreeMap<String, String>,

    #[serde(default)]
    pub metrics: MetricsSpec,
}

/// A short description of the [`StormCluster`] resource's current state.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum StormClusterPhase {
    #[default]
    Pending,
    Creating,
    Running,
    Failed,
    Updating,
    Terminating,
}

impl FromStr for StormClusterPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Creating" => Ok(Self::Creating),
            "Running" => Ok(Self::Running),
            "Failed" => Ok(Self::Failed),
            "Updating" => Ok(Self::Updating),
            "Terminating" => Ok(Self::Terminating),
            _ => Err(()),
        }
    }
}

impl fmt::Display for StormClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Creating => write!(f, "Creating"),
            Self::Running => write!(f, "Running"),
            Self::Failed => write!(f, "Failed"),
            Self::Updating => write!(f, "Updating"),
            Self::Terminating => write!(f, "Terminating"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct StormClusterStatus {
    #[serde(default)]
    pub phase: StormClusterPhase,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default, rename = "lastUpdated")]
    pub last_updated: Option<String>,

    #[serde(default, rename = "readyNimbus")]
    pub ready_nimbus: i32,

    #[serde(default, rename = "readySupervisor")]
    pub ready_supervisor: i32,

    #[serde(default, rename = "readyUi")]
    pub ready_ui: i32,

    #[serde(default, rename = "nimbusLeader")]
    pub nimbus_leader: Option<String>,

    #[serde(default, rename = "totalSlots")]
    pub total_slots: i32,

    #[serde(default, rename = "usedSlots")]
    pub used_slots: i32,

    #[serde(default, rename = "freeSlots")]
    pub free_slots: i32,

    #[serde(default, rename = "topologyCount")]
    pub topology_count: i32,

    #[serde(default)]
    pub endpoints: Endpoints,

    #[serde(default)]
    pub conditions: Vec<k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition>,
}

impl StormClusterStatus {
    /// Free capacity the coordinator can compare desired worker counts against.
    /// Clamped to zero since Nimbus can report stale/negative slot counts
    /// while supervisors are transitioning (see §9, advisory capacity gate).
    pub fn effective_free_slots(&self) -> i32 {
        self.free_slots.max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_free_slots_clamps_negative_to_zero() {
        let mut status = StormClusterStatus::default();
        status.free_slots = -3;
        assert_eq!(status.effective_free_slots(), 0);
    }

    #[test]
    fn effective_free_slots_passes_through_positive_values() {
        let mut status = StormClusterStatus::default();
        status.free_slots = 7;
        assert_eq!(status.effective_free_slots(), 7);
    }
}
