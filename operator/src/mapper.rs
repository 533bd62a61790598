//! Cross-CRD fan-in mappers for `Controller::watches`.
//!
//! Every reconciler in this crate already discovers its parent/children by
//! polling: `determine_action` re-fetches the referenced resource on each
//! pass, bounded by [`crate::util::PROBE_INTERVAL`]. These mappers let a
//! `Controller` additionally react the moment a *referenced* resource
//! changes, without replacing that polling path. If a mapper misses an
//! event (store not yet synced, name not resolvable), the next poll still
//! catches up within `PROBE_INTERVAL`.

use kube::runtime::reflector::{ObjectRef, Store};
use kube::ResourceExt;
use storm_types::{StormCluster, StormTopology, StormWorkerPool};

/// Maps a `StormCluster` change onto every `StormTopology` in `store` whose
/// `spec.cluster_ref` names it.
pub fn topologies_for_cluster(
    store: Store<StormTopology>,
) -> impl Fn(StormCluster) -> Vec<ObjectRef<StormTopology>> + Clone {
    move |cluster| {
        let cluster_name = cluster.name_any();
        store
            .state()
            .iter()
            .filter(|topology| topology.spec.cluster_ref == cluster_name)
            .map(|topology| ObjectRef::from_obj(topology.as_ref()))
            .collect()
    }
}

/// Maps a `StormTopology` change onto every `StormWorkerPool` in `store`
/// whose `spec.topology_ref` names it.
pub fn worker_pools_for_topology(
    store: Store<StormWorkerPool>,
) -> impl Fn(StormTopology) -> Vec<ObjectRef<StormWorkerPool>> + Clone {
    move |topology| {
        let topology_name = topology.name_any();
        store
            .state()
            .iter()
            .filter(|pool| pool.spec.topology_ref == topology_name)
            .map(|pool| ObjectRef::from_obj(pool.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::runtime::reflector::store;
    use kube::runtime::watcher::Event;
    use storm_types::StormTopologySpec;

    fn topology(name: &str, cluster_ref: &str) -> StormTopology {
        let mut t = StormTopology::new(name, StormTopologySpec {
            cluster_ref: cluster_ref.to_string(),
            ..Default::default()
        });
        t.metadata.namespace = Some("default".to_string());
        t
    }

    #[test]
    fn filters_topologies_by_cluster_ref() {
        let (reader, mut writer) = store::<StormTopology>();
        writer.apply_watcher_event(&Event::Init);
        writer.apply_watcher_event(&Event::InitApply(topology("t1", "prod")));
        writer.apply_watcher_event(&Event::InitApply(topology("t2", "staging")));
        writer.apply_watcher_event(&Event::InitDone);

        let mapper = topologies_for_cluster(reader);
        let mut prod_cluster = StormCluster::new("prod", Default::default());
        prod_cluster.metadata.namespace = Some("default".to_string());
        let matches = mapper(prod_cluster);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "t1");
    }

    #[test]
    fn no_matches_when_no_topology_references_cluster() {
        let (reader, mut writer) = store::<StormTopology>();
        writer.apply_watcher_event(&Event::Init);
        writer.apply_watcher_event(&Event::InitApply(topology("t1", "staging")));
        writer.apply_watcher_event(&Event::InitDone);

        let mapper = topologies_for_cluster(reader);
        let mut prod_cluster = StormCluster::new("prod", Default::default());
        prod_cluster.metadata.namespace = Some("default".to_string());
        assert!(mapper(prod_cluster).is_empty());
    }
}
