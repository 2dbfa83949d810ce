//! Configuration and logging for the e2e suite

use std::sync::Once;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use openmcp_testing::config::HarnessConfig;

static TRACING: Once = Once::new();

#[derive(Parser)]
struct EnvConfig {
    #[command(flatten)]
    config: HarnessConfig,
}

/// Harness configuration taken from `OPENMCP_*` environment variables only
pub fn config_from_env() -> HarnessConfig {
    EnvConfig::parse_from(["openmcp-e2e"]).config
}

/// Install a test-friendly subscriber once per process
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}
