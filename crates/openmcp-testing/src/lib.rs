//! End-to-end test harness for OpenMCP
//!
//! Provisions a kind platform cluster, installs the OpenMCP operator and
//! providers, runs the service provider feature against the onboarding
//! cluster the operator creates, and tears everything down.

pub mod cluster;
pub mod config;
pub mod env;
pub mod features;
pub mod installers;
pub mod pipeline;
pub mod report;
pub mod setup;

use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use openmcp_common::template::ManifestRenderer;
pub use openmcp_common::{Error, Result};

use crate::cluster::{random_name, KindProvider};
use crate::config::HarnessConfig;
use crate::env::TestEnv;
use crate::installers::{
    ClusterProviderOptions, McpOptions, OperatorOptions, ServiceProviderOptions,
    CLUSTER_PROVIDER_TEMPLATE, MCP_TEMPLATE, OPERATOR_TEMPLATE, SERVICE_PROVIDER_TEMPLATE,
};
use crate::setup::{bootstrap, PLATFORM_CLUSTER_NAME_LEN, PLATFORM_CLUSTER_PREFIX};

/// OpenMCP end-to-end test harness
#[derive(Parser, Debug)]
#[command(name = "openmcp-e2e")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bootstrap the platform, run the feature test and tear down
    Run(HarnessConfig),
    /// Print a built-in manifest template rendered with the given values
    Render(RenderArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(config) => run(config).await,
            Commands::Render(args) => {
                println!("{}", render(&args)?);
                Ok(())
            }
        }
    }
}

/// Built-in templates
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TemplateKind {
    /// ClusterProvider
    ClusterProvider,
    /// ServiceProvider
    ServiceProvider,
    /// ManagedControlPlaneV2
    Mcp,
    /// Operator deployment
    Operator,
}

/// Arguments of `openmcp-e2e render`
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Template to render
    #[arg(value_enum)]
    pub template: TemplateKind,

    /// Object name
    #[arg(long)]
    pub name: String,

    /// Container image
    #[arg(long, default_value = "")]
    pub image: String,

    /// Operator namespace
    #[arg(long, default_value = "openmcp-system")]
    pub namespace: String,

    /// Operator environment label
    #[arg(long, default_value = "e2e")]
    pub environment: String,

    /// Operator platform label
    #[arg(long, default_value = "openmcp-e2e")]
    pub platform_name: String,
}

/// Render one of the built-in templates
pub fn render(args: &RenderArgs) -> Result<String> {
    let renderer = ManifestRenderer::new();
    match args.template {
        TemplateKind::ClusterProvider => renderer.render_str(
            CLUSTER_PROVIDER_TEMPLATE,
            &ClusterProviderOptions {
                name: args.name.clone(),
                image: args.image.clone(),
            },
        ),
        TemplateKind::ServiceProvider => renderer.render_str(
            SERVICE_PROVIDER_TEMPLATE,
            &ServiceProviderOptions {
                name: args.name.clone(),
                image: args.image.clone(),
            },
        ),
        TemplateKind::Mcp => renderer.render_str(
            MCP_TEMPLATE,
            &McpOptions {
                name: args.name.clone(),
            },
        ),
        TemplateKind::Operator => renderer.render_str(
            OPERATOR_TEMPLATE,
            &OperatorOptions {
                name: args.name.clone(),
                namespace: args.namespace.clone(),
                image: args.image.clone(),
                environment: args.environment.clone(),
                platform_name: args.platform_name.clone(),
            },
        ),
    }
}

/// Bootstrap, run the service provider feature and tear down.
///
/// Fails with [`Error::Pipeline`] listing every failed stage.
pub async fn run(config: HarnessConfig) -> Result<()> {
    config.validate()?;
    tokio::fs::create_dir_all(&config.kubeconfig_dir).await?;

    let provider = Arc::new(KindProvider::new(
        config.kind_config.clone(),
        config.kubeconfig_dir.clone(),
    ));
    let platform_name = random_name(PLATFORM_CLUSTER_PREFIX, PLATFORM_CLUSTER_NAME_LEN);
    info!(platform = %platform_name, "starting openmcp e2e run");

    let pipeline = bootstrap(&config).assess(features::service_provider_feature(&config));
    let env = TestEnv::new(config, provider, platform_name);

    let report = pipeline.execute(&env).await;
    report.log_summary();
    report.into_result()
}
