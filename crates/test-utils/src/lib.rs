pub mod builders;
pub mod fake_client;
pub mod sink;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Install a tracing subscriber for the test binary (first caller wins).
///
/// Uses `with_test_writer()`, so log output is captured per test and the
/// harness only prints it when a test fails (or with `-- --nocapture`).
/// Raise the level via the environment, e.g. `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `future`, panicking if it takes longer than five seconds. Keeps a
/// wedged execution tree from hanging the whole test run.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), future)
        .await
        .expect("future did not finish within 5s")
}
