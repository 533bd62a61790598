/// User-friendly message to display in `status.message` whenever a resource's
/// deletion is pending garbage collection.
pub const TERMINATING: &str = "Resource deletion is pending garbage collection.";

pub const WAITING_ON_CLUSTER: &str = "Waiting for the referenced StormCluster to become Running.";

pub const WAITING_ON_TOPOLOGY: &str =
    "Waiting for the referenced StormTopology to become Running.";

pub const CAPACITY_UNAVAILABLE: &str =
    "CapacityUnavailable: the referenced StormCluster does not currently advertise enough free slots for the requested workers.";
