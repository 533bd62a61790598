//! Pure `(spec, name) -> desired child resource` builders, grounded in the
//! planner style used elsewhere in this workspace's ecosystem: plain
//! functions with no I/O, covered by table-driven unit tests rather than
//! a mocked API server.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::autoscaling::v2::{
    HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, MetricSpec, MetricTarget,
    ResourceMetricSource,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, ResourceRequirements, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;
use storm_types::{ImageSpec, StormCluster, StormWorkerPool};

use crate::util::merge_maps;

pub fn base_labels(cluster_name: &str, component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_string(), "storm".to_string());
    labels.insert(
        "app.kubernetes.io/instance".to_string(),
        cluster_name.to_string(),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        component.to_string(),
    );
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "storm-operator".to_string(),
    );
    labels
}

fn image_ref(image: &ImageSpec) -> String {
    format!("{}:{}", image.repository, image.tag)
}

fn storm_container(
    name: &str,
    image: &ImageSpec,
    command: Vec<String>,
    resources: Option<ResourceRequirements>,
    extra_env: Vec<EnvVar>,
) -> Container {
    storm_container_with_ports(name, image, command, resources, extra_env, None)
}

fn storm_container_with_ports(
    name: &str,
    image: &ImageSpec,
    command: Vec<String>,
    resources: Option<ResourceRequirements>,
    extra_env: Vec<EnvVar>,
    ports: Option<Vec<ContainerPort>>,
) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image_ref(image)),
        image_pull_policy: image.pull_policy.clone(),
        command: Some(command),
        resources,
        env: Some(extra_env),
        ports,
        ..Default::default()
    }
}

/// Worker slot ports a Supervisor listens on: `portStart + i` for
/// `i in [0, slotsPerSupervisor)`.
fn supervisor_worker_ports(port_start: i32, slots_per_supervisor: i32) -> Vec<ContainerPort> {
    (0..slots_per_supervisor)
        .map(|i| ContainerPort {
            name: Some(format!("worker-{i}")),
            container_port: port_start + i,
            ..Default::default()
        })
        .collect()
}

/// Builds the Nimbus StatefulSet for a cluster in `create` management mode.
pub fn nimbus_stateful_set(cluster: &StormCluster) -> StatefulSet {
    let name = cluster.metadata.name.clone().unwrap_or_default();
    let namespace = cluster.metadata.namespace.clone();
    let sts_name = format!("{name}-nimbus");
    let labels = base_labels(&name, "nimbus");

    let pvc = cluster.spec.nimbus.persistence.enabled.then(|| {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some("data".to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                storage_class_name: cluster.spec.nimbus.persistence.storage_class_name.clone(),
                resources: Some(k8s_openapi::api::core::v1::VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(cluster.spec.nimbus.persistence.size.clone()),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    });

    let container = storm_container(
        "nimbus",
        &cluster.spec.image,
        vec!["storm".to_string(), "nimbus".to_string()],
        cluster.spec.nimbus.resources.clone(),
        Vec::new(),
    );

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(sts_name.clone()),
            namespace: namespace.clone(),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(cluster.spec.nimbus.replicas),
            service_name: sts_name,
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            volume_claim_templates: pvc.map(|p| vec![p]),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn supervisor_stateful_set(cluster: &StormCluster) -> StatefulSet {
    let name = cluster.metadata.name.clone().unwrap_or_default();
    let sts_name = format!("{name}-supervisor");
    let labels = base_labels(&name, "supervisor");

    let container = storm_container_with_ports(
        "supervisor",
        &cluster.spec.image,
        vec!["storm".to_string(), "supervisor".to_string()],
        cluster.spec.supervisor.resources.clone(),
        vec![EnvVar {
            name: "STORM_SLOTS_PER_SUPERVISOR".to_string(),
            value: Some(cluster.spec.supervisor.slots_per_supervisor.to_string()),
            ..Default::default()
        }],
        Some(supervisor_worker_ports(
            cluster.spec.supervisor.port_start,
            cluster.spec.supervisor.slots_per_supervisor,
        )),
    );

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(sts_name.clone()),
            namespace: cluster.metadata.namespace.clone(),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(cluster.spec.supervisor.replicas),
            service_name: sts_name,
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

pub fn ui_deployment(cluster: &StormCluster) -> Deployment {
    let name = cluster.metadata.name.clone().unwrap_or_default();
    let deploy_name = format!("{name}-ui");
    let labels = base_labels(&name, "ui");

    let container = storm_container(
        "ui",
        &cluster.spec.image,
        vec!["storm".to_string(), "ui".to_string()],
        cluster.spec.ui.resources.clone(),
        Vec::new(),
    );

    Deployment {
        metadata: ObjectMeta {
            name: Some(deploy_name),
            namespace: cluster.metadata.namespace.clone(),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(cluster.spec.ui.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// A headless Service fronting a cluster daemon role, named
/// `{cluster}-{component}`.
pub fn daemon_service(cluster_name: &str, component: &str, port: i32) -> Service {
    let labels = base_labels(cluster_name, component);
    Service {
        metadata: ObjectMeta {
            name: Some(format!("{cluster_name}-{component}")),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            cluster_ip: Some("None".to_string()),
            ports: Some(vec![ServicePort {
                port,
                name: Some(component.to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Worker pool Deployment. Pod template overrides from
/// `spec.template.containerOverrides` are appended after the generated
/// worker container rather than replacing it, mirroring how `extraEnv`
/// layers on top of the base env list.
pub fn worker_pool_deployment(pool: &StormWorkerPool, default_image: &ImageSpec) -> Deployment {
    let name = pool.metadata.name.clone().unwrap_or_default();
    let image = pool.spec.image.as_ref().unwrap_or(default_image);
    let mut labels = base_labels(&pool.spec.topology_ref, "worker");
    labels.insert("storm.apache.org/worker-pool".to_string(), name.clone());
    labels = merge_maps(&labels, &pool.spec.template.labels);

    let mut env: Vec<EnvVar> = pool
        .spec
        .jvm_opts
        .iter()
        .enumerate()
        .map(|(i, opt)| EnvVar {
            name: format!("STORM_JVM_OPT_{i}"),
            value: Some(opt.clone()),
            ..Default::default()
        })
        .collect();
    env.extend(pool.spec.extra_env.iter().cloned());

    let container = storm_container(
        "worker",
        image,
        vec!["storm".to_string(), "worker".to_string()],
        None,
        env,
    );

    let mut containers = vec![container];
    containers.extend(pool.spec.template.container_overrides.iter().cloned());

    Deployment {
        metadata: ObjectMeta {
            name: Some(format!("{name}-workers")),
            namespace: pool.metadata.namespace.clone(),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(pool.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: non_empty(pool.spec.template.annotations.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers,
                    volumes: non_empty_vec(pool.spec.template.volumes.clone()),
                    affinity: pool.spec.template.affinity.clone(),
                    tolerations: non_empty_vec(pool.spec.template.tolerations.clone()),
                    node_selector: non_empty(pool.spec.template.node_selector.clone()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn non_empty<K, V>(map: BTreeMap<K, V>) -> Option<BTreeMap<K, V>> {
    if map.is_empty() { None } else { Some(map) }
}

fn non_empty_vec<T>(v: Vec<T>) -> Option<Vec<T>> {
    if v.is_empty() { None } else { Some(v) }
}

pub fn worker_pool_hpa(pool: &StormWorkerPool) -> Option<HorizontalPodAutoscaler> {
    let autoscaling = pool.spec.autoscaling.as_ref()?;
    if !autoscaling.enabled {
        return None;
    }
    let name = pool.metadata.name.clone().unwrap_or_default();
    let mut metrics = Vec::new();
    if let Some(cpu) = autoscaling.target_cpu_utilization_percentage {
        metrics.push(MetricSpec {
            type_: "Resource".to_string(),
            resource: Some(ResourceMetricSource {
                name: "cpu".to_string(),
                target: MetricTarget {
                    type_: "Utilization".to_string(),
                    average_utilization: Some(cpu),
                    ..Default::default()
                },
            }),
            ..Default::default()
        });
    }
    if let Some(mem) = autoscaling.target_memory_utilization_percentage {
        metrics.push(MetricSpec {
            type_: "Resource".to_string(),
            resource: Some(ResourceMetricSource {
                name: "memory".to_string(),
                target: MetricTarget {
                    type_: "Utilization".to_string(),
                    average_utilization: Some(mem),
                    ..Default::default()
                },
            }),
            ..Default::default()
        });
    }

    Some(HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(format!("{name}-workers")),
            namespace: pool.metadata.namespace.clone(),
            ..Default::default()
        },
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: k8s_openapi::api::autoscaling::v2::CrossVersionObjectReference {
                kind: "Deployment".to_string(),
                name: format!("{name}-workers"),
                api_version: Some("apps/v1".to_string()),
            },
            min_replicas: Some(autoscaling.min_replicas),
            max_replicas: autoscaling.max_replicas,
            metrics: if metrics.is_empty() { None } else { Some(metrics) },
            ..Default::default()
        }),
        status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_types::{AutoscalingSpec, StormClusterSpec, StormWorkerPoolSpec};

    fn test_cluster() -> StormCluster {
        let mut c = StormCluster::new("test", StormClusterSpec::default());
        c.metadata.namespace = Some("ns".to_string());
        c.spec.image.repository = "apache/storm".to_string();
        c
    }

    #[test]
    fn nimbus_sts_uses_declared_replicas() {
        let mut cluster = test_cluster();
        cluster.spec.nimbus.replicas = 3;
        let sts = nimbus_stateful_set(&cluster);
        assert_eq!(sts.spec.unwrap().replicas, Some(3));
    }

    #[test]
    fn nimbus_sts_omits_pvc_when_persistence_disabled() {
        let cluster = test_cluster();
        let sts = nimbus_stateful_set(&cluster);
        assert!(sts.spec.unwrap().volume_claim_templates.is_none());
    }

    #[test]
    fn supervisor_sts_exposes_ports_from_port_start() {
        let mut cluster = test_cluster();
        cluster.spec.supervisor.port_start = 6700;
        cluster.spec.supervisor.slots_per_supervisor = 3;
        let sts = supervisor_stateful_set(&cluster);
        let container = &sts.spec.unwrap().template.spec.unwrap().containers[0];
        let ports: Vec<i32> = container
            .ports
            .as_ref()
            .unwrap()
            .iter()
            .map(|p| p.container_port)
            .collect();
        assert_eq!(ports, vec![6700, 6701, 6702]);
    }

    #[test]
    fn worker_pool_hpa_none_when_disabled() {
        let mut pool = StormWorkerPool::new("pool", StormWorkerPoolSpec {
            topology_ref: "topo".to_string(),
            ..Default::default()
        });
        pool.spec.autoscaling = Some(AutoscalingSpec {
            enabled: false,
            min_replicas: 1,
            max_replicas: 5,
            ..Default::default()
        });
        assert!(worker_pool_hpa(&pool).is_none());
    }

    #[test]
    fn worker_pool_hpa_built_when_enabled() {
        let mut pool = StormWorkerPool::new("pool", StormWorkerPoolSpec {
            topology_ref: "topo".to_string(),
            ..Default::default()
        });
        pool.spec.autoscaling = Some(AutoscalingSpec {
            enabled: true,
            min_replicas: 2,
            max_replicas: 10,
            target_cpu_utilization_percentage: Some(80),
            ..Default::default()
        });
        let hpa = worker_pool_hpa(&pool).expect("hpa should be built");
        let spec = hpa.spec.unwrap();
        assert_eq!(spec.min_replicas, Some(2));
        assert_eq!(spec.max_replicas, 10);
        assert_eq!(spec.metrics.unwrap().len(), 1);
    }
}
