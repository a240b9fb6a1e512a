use std::{io::Write, sync::Arc};

use serde_json::Value;
use snafu::{ResultExt, Snafu};
use stackable_operator::{
    cli::ProductOperatorRun,
    client::{self, Client},
    utils::cluster_info::KubernetesClusterInfoOpts,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{OperatorConfig, OperatorConfigArgs},
    manager::{Ctx, OPERATOR_NAME},
    remote,
    secret::{S3Credentials, Secret},
    wait::{self, POLL_INTERVAL, WaitKind},
};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to load operator configuration"))]
    LoadConfig { source: crate::config::Error },

    #[snafu(display("failed to connect to kubernetes"))]
    InitializeClient {
        source: stackable_operator::client::Error,
    },

    #[snafu(display("params are not valid json"))]
    InvalidParams { source: serde_json::Error },

    #[snafu(display("failed to reach the system"))]
    Remote { source: remote::Error },

    #[snafu(display("{api}.{method} failed"))]
    Call {
        source: noobaa_rpc::RpcError,
        api: String,
        method: String,
    },

    #[snafu(display("failed to render reply"))]
    RenderJson { source: serde_json::Error },

    #[snafu(display("failed to render reply"))]
    RenderYaml { source: serde_yaml::Error },

    #[snafu(display("failed to print secret"))]
    PrintSecret { source: crate::secret::Error },

    #[snafu(display("failed to write to stdout"))]
    WriteToStdout { source: std::io::Error },

    #[snafu(display("wait failed"))]
    Wait { source: wait::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(clap::Parser)]
pub enum NoobaaCommand {
    /// Print a secret holding an S3 key pair, as stores reference them
    CreateS3Secret(S3SecretArgs),
    /// Call a management api method of the running system
    Api(ApiArgs),
    /// Block until a resource is ready
    WaitReady(WaitReadyArgs),
    #[clap(flatten)]
    Framework(stackable_operator::cli::Command<NoobaaRun>),
}

#[derive(clap::Parser, Debug, PartialEq, Eq)]
#[command(long_about = "")]
pub struct S3SecretArgs {
    #[arg(long, default_value = "s3-credentials")]
    pub name: String,

    #[arg(long, default_value = "default")]
    pub namespace: String,

    #[arg(long, short = 'a')]
    pub access_key: String,

    #[arg(long, short = 's')]
    pub secret_key: String,
}

impl S3SecretArgs {
    pub fn generate_secret(&self) -> Result<()> {
        let credentials = S3Credentials {
            access_key_id: self.access_key.to_owned(),
            secret_access_key: self.secret_key.to_owned(),
        };
        Secret::<S3Credentials>::new(self.name.clone(), self.namespace.clone(), credentials)
            .print_yaml()
            .context(PrintSecretSnafu)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

#[derive(clap::Parser, Debug)]
pub struct ApiArgs {
    /// Api name, with or without the `_api` suffix
    pub api: String,

    pub method: String,

    /// Params as a json object
    pub params: Option<String>,

    #[arg(long, short = 'o', value_enum, default_value_t)]
    pub output: OutputFormat,

    #[clap(flatten)]
    pub config: OperatorConfigArgs,

    #[clap(flatten)]
    pub cluster_info_opts: KubernetesClusterInfoOpts,
}

/// `bucket` and `bucket_api` name the same api.
pub fn api_name(api: &str) -> String {
    if api.ends_with("_api") {
        api.to_owned()
    } else {
        format!("{api}_api")
    }
}

pub fn parse_params(params: Option<&str>) -> Result<Option<Value>> {
    params
        .map(|raw| serde_json::from_str(raw).context(InvalidParamsSnafu))
        .transpose()
}

pub fn render(reply: &Value, output: OutputFormat) -> Result<String> {
    match output {
        OutputFormat::Json => serde_json::to_string_pretty(reply).context(RenderJsonSnafu),
        OutputFormat::Yaml => serde_yaml::to_string(reply).context(RenderYamlSnafu),
    }
}

async fn connect(
    config_args: &OperatorConfigArgs,
    cluster_info_opts: &KubernetesClusterInfoOpts,
) -> Result<(Client, OperatorConfig)> {
    let config = OperatorConfig::load(config_args).context(LoadConfigSnafu)?;
    let client = client::initialize_operator(Some(OPERATOR_NAME.to_string()), cluster_info_opts)
        .await
        .context(InitializeClientSnafu)?;
    Ok((client, config))
}

impl ApiArgs {
    pub async fn call(&self) -> Result<()> {
        let params = parse_params(self.params.as_deref())?;
        let (client, config) = connect(&self.config, &self.cluster_info_opts).await?;
        let ctx = Ctx {
            client,
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        };
        let api = remote::system_api(&ctx).await.context(RemoteSnafu)?;
        let api_name = api_name(&self.api);
        let reply = api
            .call_raw(&api_name, &self.method, params)
            .await
            .and_then(|frame| frame.message.into_result())
            .context(CallSnafu {
                api: &api_name,
                method: &self.method,
            })?;
        let rendered = render(&reply, self.output)?;
        std::io::stdout()
            .write_all(rendered.as_bytes())
            .context(WriteToStdoutSnafu)
    }
}

#[derive(clap::Parser, Debug)]
pub struct WaitReadyArgs {
    #[arg(value_enum)]
    pub kind: WaitKind,

    pub name: String,

    #[arg(long, short = 'n', default_value = "default")]
    pub namespace: String,

    #[clap(flatten)]
    pub config: OperatorConfigArgs,

    #[clap(flatten)]
    pub cluster_info_opts: KubernetesClusterInfoOpts,
}

impl WaitReadyArgs {
    pub async fn wait(&self) -> Result<()> {
        let (client, _) = connect(&self.config, &self.cluster_info_opts).await?;
        wait::wait_ready(&client, self.kind, &self.name, &self.namespace, POLL_INTERVAL)
            .await
            .context(WaitSnafu)
    }
}

#[derive(clap::Parser)]
#[clap(about, author)]
pub struct Opts {
    #[clap(subcommand)]
    pub cmd: NoobaaCommand,
}

#[derive(clap::Parser)]
pub struct NoobaaRun {
    #[clap(flatten)]
    pub common: ProductOperatorRun,

    #[clap(flatten)]
    pub config: OperatorConfigArgs,
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use serde_json::json;
    use stackable_operator::cli::Command;

    use super::*;

    #[test]
    fn test_api_name() {
        assert_eq!(api_name("bucket"), "bucket_api");
        assert_eq!(api_name("system_api"), "system_api");
    }

    #[test]
    fn test_params_and_render() {
        assert_eq!(parse_params(None).unwrap(), None);
        assert_eq!(
            parse_params(Some(r#"{"name":"first.bucket"}"#)).unwrap(),
            Some(json!({ "name": "first.bucket" }))
        );
        assert!(matches!(
            parse_params(Some("{name")),
            Err(Error::InvalidParams { .. })
        ));

        let reply = json!({ "name": "noobaa" });
        assert_eq!(render(&reply, OutputFormat::Yaml).unwrap(), "name: noobaa\n");
        assert!(render(&reply, OutputFormat::Json).unwrap().contains("\"name\": \"noobaa\""));
    }

    #[test]
    fn test_parse_commands() {
        let opts = Opts::try_parse_from([
            "noobaa-operator",
            "api",
            "bucket",
            "read_bucket",
            r#"{"name":"b"}"#,
            "--output",
            "json",
        ])
        .unwrap();
        let NoobaaCommand::Api(args) = opts.cmd else {
            panic!("expected the api command");
        };
        assert_eq!(args.method, "read_bucket");
        assert_eq!(args.output, OutputFormat::Json);

        let opts =
            Opts::try_parse_from(["noobaa-operator", "wait-ready", "claim", "photos", "-n", "apps"])
                .unwrap();
        let NoobaaCommand::WaitReady(args) = opts.cmd else {
            panic!("expected the wait-ready command");
        };
        assert_eq!(args.kind, WaitKind::Claim);
        assert_eq!(args.namespace, "apps");

        let opts = Opts::try_parse_from(["noobaa-operator", "crd"]).unwrap();
        assert!(matches!(opts.cmd, NoobaaCommand::Framework(Command::Crd)));
    }

    #[test]
    fn test_s3_secret_args() {
        let opts = Opts::try_parse_from([
            "noobaa-operator",
            "create-s3-secret",
            "-a",
            "AK",
            "-s",
            "SK",
        ])
        .unwrap();
        let NoobaaCommand::CreateS3Secret(args) = opts.cmd else {
            panic!("expected the create-s3-secret command");
        };
        assert_eq!(args.access_key, "AK");
        assert_eq!(args.name, "s3-credentials");
    }
}
