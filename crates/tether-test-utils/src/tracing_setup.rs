//! Tracing initialisation for the end-to-end handshake tests.
//!
//! The handshake tests in `tether-core` drive the engine over a shared
//! `MemoryBackend` and call [`init_test_tracing`] so the engine's protocol
//! and stats events show up under `RUST_LOG`. Single-call protocol tests use
//! `#[test_log::test]` instead. The subscriber is installed at most once per
//! process.

use tracing_subscriber::EnvFilter;

/// Install a subscriber on the test-harness writer, honouring `RUST_LOG`.
///
/// Subsequent calls are ignored.
///
/// # Example
///
/// ```ignore
/// #[tokio::test]
/// async fn test_parent_initiated_handshake() {
///     tether_test_utils::tracing_setup::init_test_tracing();
///     // "Included target in association group" shows at RUST_LOG=info
/// }
/// ```
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
