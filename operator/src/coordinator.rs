//! Pure predicates gating reconciliation across the three CRDs: a
//! `StormTopology` only proceeds past validation once its `StormCluster` is
//! ready, and a `StormWorkerPool` only proceeds once its `StormTopology` is
//! running. Kept free of I/O so these rules are covered by plain unit
//! tests instead of integration tests against a real API server.

use storm_types::{StormClusterPhase, StormClusterStatus, StormTopologyPhase, StormTopologyStatus};

/// Whether a `StormTopology` may proceed past `Validating` into
/// `Downloading`/`Submitting`.
pub fn cluster_ready_for_topology(status: &StormClusterStatus) -> bool {
    status.phase == StormClusterPhase::Running && status.nimbus_leader.is_some()
}

/// Whether a `StormWorkerPool` may proceed past `Pending` into `Creating`.
pub fn topology_ready_for_worker_pool(status: &StormTopologyStatus) -> bool {
    status.phase == StormTopologyPhase::Running
}

/// Advisory capacity gate (see SPEC_FULL.md §9): compares desired worker
/// slots against the cluster's last-observed free slots. A `false` result
/// should produce a `Pending` phase with a capacity-unavailable message,
/// not a hard failure, since Nimbus's own scheduler is the actual
/// arbiter and this check can be stale.
pub fn capacity_available(cluster_status: &StormClusterStatus, desired_slots: i32) -> bool {
    cluster_status.effective_free_slots() >= desired_slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_types::Endpoints;

    fn running_cluster() -> StormClusterStatus {
        StormClusterStatus {
            phase: StormClusterPhase::Running,
            nimbus_leader: Some("storm-nimbus-0".to_string()),
            free_slots: 10,
            ..Default::default()
        }
    }

    #[test]
    fn cluster_not_ready_until_running_with_leader() {
        let mut status = running_cluster();
        status.phase = StormClusterPhase::Creating;
        assert!(!cluster_ready_for_topology(&status));

        let mut status = running_cluster();
        status.nimbus_leader = None;
        assert!(!cluster_ready_for_topology(&status));

        assert!(cluster_ready_for_topology(&running_cluster()));
    }

    #[test]
    fn topology_gates_worker_pool_on_running_only() {
        for phase in [
            StormTopologyPhase::Pending,
            StormTopologyPhase::Validating,
            StormTopologyPhase::Downloading,
            StormTopologyPhase::Submitting,
            StormTopologyPhase::Suspended,
            StormTopologyPhase::Updating,
            StormTopologyPhase::Killing,
            StormTopologyPhase::Killed,
            StormTopologyPhase::Failed,
        ] {
            let status = StormTopologyStatus {
                phase,
                ..Default::default()
            };
            assert!(!topology_ready_for_worker_pool(&status), "{phase:?}");
        }
        let status = StormTopologyStatus {
            phase: StormTopologyPhase::Running,
            ..Default::default()
        };
        assert!(topology_ready_for_worker_pool(&status));
    }

    #[test]
    fn capacity_gate_is_advisory_and_clamped() {
        let mut status = running_cluster();
        status.free_slots = -5;
        assert!(!capacity_available(&status, 1));

        status.free_slots = 4;
        assert!(capacity_available(&status, 4));
        assert!(!capacity_available(&status, 5));
    }

    #[test]
    fn endpoints_default_does_not_affect_readiness() {
        let mut status = running_cluster();
        status.endpoints = Endpoints::default();
        assert!(cluster_ready_for_topology(&status));
    }
}
