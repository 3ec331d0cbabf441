//! Tracing and logging setup shared by binaries and tests.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize a human-readable subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs the subscriber.
pub fn init_for_tests() {
    tracing::init_for_tests();
}

/// Tracing configuration (filters, layers).
pub mod tracing;
