#![forbid(unsafe_code)]
#![expect(
    clippy::missing_panics_doc,
    reason = "test utility crate, panics are the failure mode"
)]

//! Shared test utilities for the cadenza workspace.

pub mod extractor;
pub mod fixtures;
pub mod http_server;
pub mod memory_net;
pub mod meter;

pub use extractor::{FailingExtractorFactory, RecordingExtractorFactory, RecordingOutput};
pub use fixtures::*;
pub use http_server::{TestHttpServer, segment_router};
pub use memory_net::{MemoryNet, Request};
pub use meter::FixedBandwidthMeter;

/// Install a `tracing` subscriber for tests, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
