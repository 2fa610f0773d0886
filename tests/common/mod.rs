#![allow(dead_code)]

pub use eldorado_test_utils::builders;
pub use eldorado_test_utils::{
    init_tracing, FakeMetadataReader, FakeScheduler, RunFixture, SettingsBuilder,
};

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}
