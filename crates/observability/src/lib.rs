//! Process-wide tracing/logging setup.

pub mod subscriber;

/// Initialize structured logging for a service process.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    subscriber::init_json("info");
}

/// Initialize compact, test-captured logging. Idempotent.
pub fn init_for_tests() {
    subscriber::init_test("debug");
}
