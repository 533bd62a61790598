pub mod circuit;
pub mod error;
pub mod nimbus;
pub mod pool;
pub mod retry;

pub use error::Error;
pub use nimbus::{ClusterInfo, NimbusClient, NimbusConfig, TopologyInfo, TopologySummary, WorkerSummary};
pub use pool::NimbusPool;
pub use retry::with_retry;
