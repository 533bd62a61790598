pub mod cluster;
pub mod common;
pub mod topology;
pub mod workerpool;

pub use cluster::{
    ManagementMode, NimbusSpec, ResourceNames, StormCluster, StormClusterPhase,
    StormClusterSpec, StormClusterStatus, SupervisorSpec, UiSpec, ZookeeperEmbedded,
    ZookeeperSpec,
};
pub use common::{
    set_condition, AutoscalingBehavior, AutoscalingSpec, ChecksumSpec, Conditions,
    CustomMetricSpec, Endpoints, ImageSpec, MetricsSpec, Placement, PersistenceSpec, PortRange,
};
pub use topology::{
    ConfigMapJarSource, ContainerJarSource, ExtractionMode, JarSource, LifecycleSpec,
    S3JarSource, SecretJarSource, StormTopology, StormTopologyPhase, StormTopologySpec,
    StormTopologyStatus, TopologyMetrics, TopologySpecInner, UpdateStrategy, WorkersSpec,
};
pub use workerpool::{
    StormWorkerPool, StormWorkerPoolPhase, StormWorkerPoolSpec, StormWorkerPoolStatus,
    WorkerPodTemplate,
};
