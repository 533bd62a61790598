pub mod args;
pub mod shutdown;

use tracing_subscriber::EnvFilter;

/// Initializes `tracing` logging, honoring `RUST_LOG` if set and falling
/// back to `info`.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Emits a one-line readiness marker once startup has completed far enough
/// to start accepting traffic. Kept separate from `init()` so the two can
/// be interleaved with leader-election setup in `main`.
pub fn signal_ready() {
    tracing::info!("ready");
}
