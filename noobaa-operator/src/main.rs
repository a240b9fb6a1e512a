use clap::{Parser, crate_description, crate_version};
use noobaa_operator::{
    api::{
        account::NooBaaAccount,
        bucket_class::BucketClass,
        obc::{ObjectBucket, ObjectBucketClaim},
        store::{BackingStore, NamespaceStore},
        system::NooBaa,
    },
    built_info,
    cli::{NoobaaCommand, NoobaaRun, Opts},
    config::OperatorConfig,
    manager::{self, APP_NAME, OPERATOR_NAME},
};
use stackable_operator::{
    CustomResourceExt,
    cli::{Command, ProductOperatorRun},
    client,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    match opts.cmd {
        NoobaaCommand::CreateS3Secret(args) => args.generate_secret()?,
        NoobaaCommand::Api(args) => args.call().await?,
        NoobaaCommand::WaitReady(args) => args.wait().await?,
        NoobaaCommand::Framework(Command::Crd) => {
            NooBaa::print_yaml_schema(built_info::PKG_VERSION)?;
            BackingStore::print_yaml_schema(built_info::PKG_VERSION)?;
            NamespaceStore::print_yaml_schema(built_info::PKG_VERSION)?;
            BucketClass::print_yaml_schema(built_info::PKG_VERSION)?;
            NooBaaAccount::print_yaml_schema(built_info::PKG_VERSION)?;
            ObjectBucketClaim::print_yaml_schema(built_info::PKG_VERSION)?;
            ObjectBucket::print_yaml_schema(built_info::PKG_VERSION)?;
        }
        NoobaaCommand::Framework(Command::Run(NoobaaRun {
            common:
                ProductOperatorRun {
                    watch_namespace,
                    tracing_target,
                    cluster_info_opts,
                    ..
                },
            config,
        })) => {
            stackable_operator::logging::initialize_logging(
                "NOOBAA_OPERATOR_LOG",
                APP_NAME,
                tracing_target,
            );
            stackable_operator::utils::print_startup_string(
                crate_description!(),
                crate_version!(),
                built_info::GIT_VERSION,
                built_info::TARGET,
                built_info::BUILT_TIME_UTC,
                built_info::RUSTC_VERSION,
            );
            let config = OperatorConfig::load(&config)?;
            tracing::info!(
                namespace = %config.namespace,
                system = %config.system_name,
                cosi_enabled = config.cosi_enabled,
                kms_enabled = config.kms_enabled,
                "loaded operator configuration"
            );
            let client =
                client::initialize_operator(Some(OPERATOR_NAME.to_string()), &cluster_info_opts)
                    .await?;
            manager::run_all(client, config, watch_namespace).await;
        }
    };

    Ok(())
}
