pub mod acquirer;
pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod inflight;
pub mod sources;

pub use acquirer::{AcquiredJar, JarAcquirer};
pub use cache::JarCache;
pub use error::Error;
pub use fingerprint::{content_hash, source_fingerprint};
