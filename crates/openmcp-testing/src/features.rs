//! Service provider feature test
//!
//! Runs against the onboarding cluster of a bootstrapped environment: create
//! a ManagedControlPlane, optionally import the service provider's APIs,
//! check the MCP is ready, and delete it again.

use futures::FutureExt;
use tracing::info;

use openmcp_common::conditions::WaitCondition;
use openmcp_common::gateway::apply_dir;
use openmcp_common::poll::{wait_for_all_present, PollConfig};
use openmcp_common::resource::{ApplyOptions, ResourceGateway};
use openmcp_common::{Error, Result};

use crate::config::HarnessConfig;
use crate::env::TestEnv;
use crate::installers::{Installer, McpOptions, Recipe};
use crate::pipeline::Pipeline;
use crate::setup::stage;

/// Feature pipeline for the configured service provider
pub fn service_provider_feature(config: &HarnessConfig) -> Pipeline<TestEnv> {
    let mut pipeline = Pipeline::new("service provider test")
        .setup(stage("create-mcp", |env| create_mcp(env).boxed()));
    if config.service_provider_api_dir.is_some() {
        pipeline = pipeline.setup(stage("import-service-provider-apis", |env| {
            import_service_provider_apis(env).boxed()
        }));
    }
    pipeline
        .assess(stage("verify-mcp-ready", |env| verify_mcp_ready(env).boxed()))
        .teardown(stage("delete-mcp", |env| delete_mcp(env).boxed()))
}

fn mcp_installer(config: &HarnessConfig) -> Installer {
    Installer::new(
        Recipe::managed_control_plane(),
        config.ready_poll(),
        config.delete_poll(),
    )
}

async fn create_mcp(env: &TestEnv) -> Result<()> {
    let onboarding = env.onboarding().await?;
    let options = McpOptions {
        name: env.config().mcp_name.clone(),
    };
    mcp_installer(env.config())
        .install(&onboarding.gateway(), &options)
        .await?;
    Ok(())
}

async fn delete_mcp(env: &TestEnv) -> Result<()> {
    let onboarding = env.onboarding().await?;
    mcp_installer(env.config())
        .uninstall(&onboarding.gateway(), &env.config().mcp_name)
        .await
}

/// Apply every manifest in `dir` and wait until all objects exist
pub async fn import_apis(
    gateway: &dyn ResourceGateway,
    dir: &std::path::Path,
    poll: PollConfig,
) -> Result<()> {
    info!(dir = %dir.display(), "importing service provider APIs");
    let refs = apply_dir(gateway, dir, &ApplyOptions::default()).await?;
    wait_for_all_present(gateway, &refs, poll).await?;
    info!(objects = refs.len(), "service provider APIs imported");
    Ok(())
}

async fn import_service_provider_apis(env: &TestEnv) -> Result<()> {
    let Some(dir) = &env.config().service_provider_api_dir else {
        return Ok(());
    };
    let onboarding = env.onboarding().await?;
    import_apis(&onboarding.gateway(), dir, env.config().ready_poll()).await
}

/// Check once that the MCP reports `status.phase == "Ready"`
pub async fn assert_mcp_ready(gateway: &dyn ResourceGateway, name: &str) -> Result<()> {
    let check = WaitCondition::phase_ready().on(Recipe::managed_control_plane().reference(name));
    if check.evaluate(gateway).await? {
        Ok(())
    } else {
        Err(Error::internal_with_context(
            "verify-mcp-ready",
            format!("{} does not hold", check),
        ))
    }
}

async fn verify_mcp_ready(env: &TestEnv) -> Result<()> {
    let onboarding = env.onboarding().await?;
    assert_mcp_ready(&onboarding.gateway(), &env.config().mcp_name).await
}
