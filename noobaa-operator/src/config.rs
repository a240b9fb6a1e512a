use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const ENV_PREFIX: &str = "NOOBAA_";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to load operator configuration"))]
    Extract { source: figment::Error },
}

/// How the operator scales the stateless s3 endpoints.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AutoscalerType {
    #[default]
    Hpav2,
    None,
}

/// Transport used for the management rpc.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RpcMode {
    #[default]
    Ws,
    Http,
}

impl RpcMode {
    pub fn scheme(&self) -> &'static str {
        match self {
            RpcMode::Ws => "wss",
            RpcMode::Http => "https",
        }
    }
}

/// Process-wide settings, read once at start and shared by every controller.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct OperatorConfig {
    pub namespace: String,
    pub system_name: String,
    pub core_image: String,
    pub db_image: String,
    pub image_version_constraint: String,
    pub autoscaler_type: AutoscalerType,
    pub cosi_enabled: bool,
    pub kms_enabled: bool,
    pub mgmt_addr: Option<String>,
    pub s3_addr: Option<String>,
    pub rpc_mode: RpcMode,
    pub requeue_secs: u64,
    pub cloud_creds_secret: String,
    pub default_target_bucket: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            namespace: "default".into(),
            system_name: "noobaa".into(),
            core_image: "noobaa/noobaa-core:5.18.0".into(),
            db_image: "quay.io/sclorg/postgresql-15-c9s".into(),
            image_version_constraint: ">=5.0.0, <6.0.0".into(),
            autoscaler_type: AutoscalerType::default(),
            cosi_enabled: false,
            kms_enabled: false,
            mgmt_addr: None,
            s3_addr: None,
            rpc_mode: RpcMode::default(),
            requeue_secs: 3,
            cloud_creds_secret: "noobaa-aws-cloud-creds-secret".into(),
            default_target_bucket: None,
        }
    }
}

/// Command line overrides, merged last.
#[derive(clap::Args, Serialize, Debug, Default, Clone)]
pub struct OperatorConfigArgs {
    /// Namespace the system lives in
    #[arg(long = "system-namespace", value_name = "NAMESPACE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[arg(long, value_name = "NAME")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,

    #[arg(long, value_name = "IMAGE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_image: Option<String>,

    #[arg(long, value_name = "IMAGE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_image: Option<String>,

    #[arg(long, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscaler_type: Option<AutoscalerType>,

    /// Management address, bypasses service discovery
    #[arg(long, value_name = "URL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mgmt_addr: Option<String>,

    #[arg(long, value_name = "URL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_addr: Option<String>,

    #[arg(long, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_mode: Option<RpcMode>,
}

impl OperatorConfig {
    pub fn load(args: &OperatorConfigArgs) -> Result<OperatorConfig, Error> {
        Self::figment(args).extract().context(ExtractSnafu)
    }

    fn figment(args: &OperatorConfigArgs) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(OperatorConfig::default()))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(args))
    }

    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }

    /// Name of the storage class bucket claims provision through.
    pub fn storage_class_name(&self) -> String {
        format!("{}.noobaa.io", self.namespace)
    }

    pub fn provisioner_name(&self) -> String {
        format!("{}.noobaa.io/obc", self.namespace)
    }

    pub fn default_image_name(&self) -> &str {
        image_name(&self.core_image)
    }
}

/// Strips tag and digest from an image reference.
pub fn image_name(image: &str) -> &str {
    let without_digest = image.split('@').next().unwrap_or(image);
    match without_digest.rfind(':') {
        // a colon before the last slash belongs to a registry port
        Some(idx) if !without_digest[idx..].contains('/') => &without_digest[..idx],
        _ => without_digest,
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::default();
        assert_eq!(config.system_name, "noobaa");
        assert_eq!(config.requeue_after(), Duration::from_secs(3));
        assert_eq!(config.default_image_name(), "noobaa/noobaa-core");
    }

    #[test]
    fn test_env_and_args_override_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("NOOBAA_NAMESPACE", "storage");
            jail.set_env("NOOBAA_SYSTEM_NAME", "from-env");
            jail.set_env("NOOBAA_KMS_ENABLED", "true");

            let args = OperatorConfigArgs {
                system_name: Some("from-args".into()),
                rpc_mode: Some(RpcMode::Http),
                ..OperatorConfigArgs::default()
            };
            let config = OperatorConfig::load(&args).expect("config should load");

            assert_eq!(config.namespace, "storage");
            assert_eq!(config.system_name, "from-args");
            assert!(config.kms_enabled);
            assert_eq!(config.rpc_mode, RpcMode::Http);
            assert_eq!(config.storage_class_name(), "storage.noobaa.io");
            assert_eq!(config.provisioner_name(), "storage.noobaa.io/obc");
            Ok(())
        });
    }

    #[test]
    fn test_image_name() {
        assert_eq!(image_name("noobaa/noobaa-core:5.0"), "noobaa/noobaa-core");
        assert_eq!(image_name("registry:5000/noobaa-core"), "registry:5000/noobaa-core");
        assert_eq!(
            image_name("registry:5000/noobaa-core:5.1@sha256:abc"),
            "registry:5000/noobaa-core"
        );
    }
}
