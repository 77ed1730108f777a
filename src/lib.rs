// Clapwatch Core - clap rhythm detection and alarm arbitration
// Frame-driven amplitude analysis feeding a fear + rhythm alarm with e-mail alerts

// Module declarations
pub mod alarm;
pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixtures;
pub mod notify;
pub mod telemetry;

// Re-exports for convenience
pub use config::AppConfig;
pub use engine::SentinelHandle;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, honoring `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
