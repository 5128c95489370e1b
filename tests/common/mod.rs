//! Helpers shared by the integration tests.
#![allow(dead_code)]

use tracing_subscriber::EnvFilter;

pub mod engine;
pub mod server;

/// Setup logging of events reported by the crate and the test suite.
///
/// Use the RUST_LOG environment variable to override the defaults.
///
/// E.g. To enable debug level logging:
///   RUST_LOG=DEBUG
///
/// Or to log only what the stub engine does:
///   RUST_LOG=resolv_channel::engine::stub=TRACE
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_ids(true)
        .without_time()
        .try_init()
        .ok();
}
