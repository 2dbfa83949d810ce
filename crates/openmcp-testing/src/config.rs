//! Harness configuration
//!
//! Every setting is a flag with an `OPENMCP_*` environment variable fallback,
//! so CI can drive the harness purely through the environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::Args;

use openmcp_common::poll::PollConfig;
use openmcp_common::{Error, Result};

use crate::installers::{ClusterProviderOptions, OperatorOptions, ServiceProviderOptions};

/// Settings for one bootstrap and feature run
#[derive(Args, Clone, Debug)]
pub struct HarnessConfig {
    /// Namespace the operator and onboarding Cluster live in
    #[arg(long, env = "OPENMCP_NAMESPACE", default_value = "openmcp-system")]
    pub namespace: String,

    /// Operator deployment name
    #[arg(long, env = "OPENMCP_OPERATOR_NAME", default_value = "openmcp-operator")]
    pub operator_name: String,

    /// Operator image
    #[arg(long, env = "OPENMCP_OPERATOR_IMAGE")]
    pub operator_image: String,

    /// Operator manifest file used instead of the built-in template;
    /// `{{UPPER_SNAKE}}` placeholders are filled from the environment
    #[arg(long, env = "OPENMCP_OPERATOR_MANIFESTS")]
    pub operator_manifests: Option<PathBuf>,

    /// Cluster provider name
    #[arg(long, env = "OPENMCP_CP_NAME", default_value = "kind")]
    pub cluster_provider_name: String,

    /// Kind cluster provider image
    #[arg(long, env = "OPENMCP_CP_KIND_IMAGE")]
    pub cluster_provider_image: String,

    /// Cluster provider manifest file used instead of the built-in template
    #[arg(long, env = "OPENMCP_CP_MANIFESTS")]
    pub cluster_provider_manifests: Option<PathBuf>,

    /// Service provider to install and test
    #[arg(long, env = "OPENMCP_SP_NAME")]
    pub service_provider_name: Option<String>,

    /// Service provider image
    #[arg(long, env = "OPENMCP_SP_IMAGE")]
    pub service_provider_image: Option<String>,

    /// Directory of service provider API manifests to apply to the
    /// onboarding cluster
    #[arg(long, env = "OPENMCP_SP_API_DIR")]
    pub service_provider_api_dir: Option<PathBuf>,

    /// Name of the ManagedControlPlane created by the feature test
    #[arg(long, env = "OPENMCP_MCP_NAME", default_value = "test-mcp")]
    pub mcp_name: String,

    /// Operator environment label
    #[arg(long, env = "OPENMCP_ENVIRONMENT", default_value = "e2e")]
    pub environment: String,

    /// Operator platform label
    #[arg(long, env = "OPENMCP_PLATFORM_NAME", default_value = "openmcp-e2e")]
    pub platform_name: String,

    /// Kind config file for the platform cluster
    #[arg(long, env = "OPENMCP_KIND_CONFIG")]
    pub kind_config: Option<PathBuf>,

    /// Directory kubeconfigs are written to
    #[arg(long, env = "OPENMCP_KUBECONFIG_DIR", default_value = "/tmp/openmcp-e2e")]
    pub kubeconfig_dir: PathBuf,

    /// Skip `docker pull` of the images
    #[arg(long, env = "OPENMCP_SKIP_PULL", value_parser = BoolishValueParser::new())]
    pub skip_pull: bool,

    /// Leave clusters running after the run
    #[arg(long, env = "OPENMCP_KEEP_CLUSTERS", value_parser = BoolishValueParser::new())]
    pub keep_clusters: bool,

    /// Seconds to wait for a component to become ready
    #[arg(long, env = "OPENMCP_READY_TIMEOUT", default_value = "60")]
    pub ready_timeout: u64,

    /// Seconds to wait for a component to be deleted
    #[arg(long, env = "OPENMCP_DELETE_TIMEOUT", default_value = "60")]
    pub delete_timeout: u64,

    /// Milliseconds between readiness checks
    #[arg(long, env = "OPENMCP_POLL_INTERVAL_MS", default_value = "1000")]
    pub poll_interval_ms: u64,
}

impl HarnessConfig {
    /// Reject settings that cannot produce a working run
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("namespace", &self.namespace),
            ("operator name", &self.operator_name),
            ("operator image", &self.operator_image),
            ("cluster provider name", &self.cluster_provider_name),
            ("cluster provider image", &self.cluster_provider_image),
            ("MCP name", &self.mcp_name),
        ];
        for (what, value) in required {
            if value.trim().is_empty() {
                return Err(Error::config(format!("{} must not be empty", what)));
            }
        }

        match (&self.service_provider_name, &self.service_provider_image) {
            (Some(_), None) => {
                return Err(Error::config("service provider name set without an image"))
            }
            (None, Some(_)) => {
                return Err(Error::config("service provider image set without a name"))
            }
            _ => {}
        }

        if self.ready_timeout == 0 || self.delete_timeout == 0 {
            return Err(Error::config("timeouts must be greater than zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config("poll interval must be greater than zero"));
        }
        Ok(())
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Budget for readiness waits
    pub fn ready_poll(&self) -> PollConfig {
        PollConfig::new(Duration::from_secs(self.ready_timeout), self.interval())
    }

    /// Budget for deletion waits
    pub fn delete_poll(&self) -> PollConfig {
        PollConfig::new(Duration::from_secs(self.delete_timeout), self.interval())
    }

    /// Images pulled before the platform cluster is created
    pub fn images(&self) -> Vec<&str> {
        let mut images = vec![
            self.operator_image.as_str(),
            self.cluster_provider_image.as_str(),
        ];
        if let Some(image) = &self.service_provider_image {
            images.push(image);
        }
        images
    }

    /// Operator template parameters
    pub fn operator(&self) -> OperatorOptions {
        OperatorOptions {
            name: self.operator_name.clone(),
            namespace: self.namespace.clone(),
            image: self.operator_image.clone(),
            environment: self.environment.clone(),
            platform_name: self.platform_name.clone(),
        }
    }

    /// Cluster provider template parameters
    pub fn cluster_provider(&self) -> ClusterProviderOptions {
        ClusterProviderOptions {
            name: self.cluster_provider_name.clone(),
            image: self.cluster_provider_image.clone(),
        }
    }

    /// Service provider template parameters, when one is configured
    pub fn service_provider(&self) -> Option<ServiceProviderOptions> {
        Some(ServiceProviderOptions {
            name: self.service_provider_name.clone()?,
            image: self.service_provider_image.clone()?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use clap::Parser;
    use rstest::rstest;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        config: HarnessConfig,
    }

    pub(crate) fn parse(args: &[&str]) -> HarnessConfig {
        let mut argv = vec![
            "openmcp-e2e",
            "--operator-image",
            "ghcr.io/openmcp-project/images/openmcp-operator:v0.1.0",
            "--cluster-provider-image",
            "ghcr.io/openmcp-project/images/cluster-provider-kind:v0.0.1",
        ];
        argv.extend_from_slice(args);
        Wrapper::parse_from(argv).config
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.namespace, "openmcp-system");
        assert_eq!(config.operator_name, "openmcp-operator");
        assert_eq!(config.cluster_provider_name, "kind");
        assert_eq!(config.ready_poll().timeout, Duration::from_secs(60));
        assert_eq!(config.delete_poll().interval, Duration::from_millis(1000));
        assert!(config.service_provider().is_none());
        assert_eq!(config.images().len(), 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_service_provider() {
        let config = parse(&[
            "--service-provider-name",
            "crossplane",
            "--service-provider-image",
            "ghcr.io/openmcp-project/images/service-provider-crossplane:v0.0.4",
        ]);
        config.validate().unwrap();
        assert_eq!(config.service_provider().unwrap().name, "crossplane");
        assert_eq!(config.images().len(), 3);
    }

    #[test]
    fn test_skip_pull_accepts_boolish_env() {
        // Only OPENMCP_SKIP_PULL is touched; no other test depends on its value
        std::env::set_var("OPENMCP_SKIP_PULL", "1");
        let on = parse(&[]).skip_pull;
        std::env::set_var("OPENMCP_SKIP_PULL", "off");
        let off = parse(&[]).skip_pull;
        std::env::remove_var("OPENMCP_SKIP_PULL");

        assert!(on);
        assert!(!off);
        assert!(parse(&["--skip-pull"]).skip_pull);
    }

    #[rstest]
    #[case::empty_namespace(&["--namespace", ""])]
    #[case::zero_timeout(&["--ready-timeout", "0"])]
    #[case::zero_interval(&["--poll-interval-ms", "0"])]
    #[case::sp_without_image(&["--service-provider-name", "crossplane"])]
    #[case::sp_without_name(&["--service-provider-image", "ghcr.io/x/sp:v1"])]
    fn test_validate_rejects(#[case] args: &[&str]) {
        let err = parse(args).validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
