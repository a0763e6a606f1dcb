//! Shared fixtures for factlog integration tests.
//!
//! The bank-account domain is the reference workload: enough business rules
//! to exercise validation, enough state to make snapshots and projections
//! meaningful, small enough to read in one sitting.

#![forbid(unsafe_code)]

use tracing_subscriber::EnvFilter;

pub mod account;
pub mod projections;
pub mod unreliable;

/// Installs a compact tracing subscriber writing to the test harness.
///
/// Safe to call from every test; only the first call installs. Run with
/// `RUST_LOG=debug` to see engine and store diagnostics, including the
/// warnings emitted on the snapshot and checkpoint degradation paths.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
