//! Keeping a remote account in line with its resource.

use noobaa_rpc::{
    NoobaaApi,
    error::{RPC_CODE_ACCOUNT_ALREADY_EXISTS, RPC_CODE_NO_SUCH_ACCOUNT, ignore_codes},
    types::{
        AccountAllowedBuckets, AccountInfo, CreateAccountParams, NsfsAccountConfig, S3AccessKeys,
        UpdateAccountS3AccessParams,
    },
};
use snafu::{OptionExt, ResultExt};
use stackable_operator::kube::ResourceExt;

use super::error::{
    AmbiguousDefaultResourceSnafu, DefaultResourceRequiredSnafu, MissingAccessKeysSnafu,
    MissingDefaultResourceSnafu, Result, RpcSnafu,
};
use crate::api::account::{NooBaaAccount, NooBaaAccountSpec};

/// Checks the default resource against which store kinds carry that name.
pub fn verify_default_resource(
    spec: &NooBaaAccountSpec,
    backing_store_exists: bool,
    namespace_store_exists: bool,
) -> Result<()> {
    let Some(name) = spec.default_resource.as_deref() else {
        if spec.allow_bucket_creation {
            return DefaultResourceRequiredSnafu.fail();
        }
        return Ok(());
    };
    match (backing_store_exists, namespace_store_exists) {
        (true, true) => AmbiguousDefaultResourceSnafu { name }.fail(),
        (false, false) => MissingDefaultResourceSnafu { name }.fail(),
        _ => Ok(()),
    }
}

/// Accounts are addressed by email; the resource name serves as both.
pub fn account_email(account: &NooBaaAccount) -> String {
    account.name_any()
}

fn allowed_buckets(spec: &NooBaaAccountSpec) -> AccountAllowedBuckets {
    spec.allowed_buckets
        .as_ref()
        .map(AccountAllowedBuckets::from)
        .unwrap_or_else(AccountAllowedBuckets::full)
}

fn nsfs_config(spec: &NooBaaAccountSpec) -> Option<NsfsAccountConfig> {
    spec.nsfs_account_config.as_ref().map(NsfsAccountConfig::from)
}

/// Update for the fields that may drift from the spec, `None` when the account matches.
pub fn account_update(
    spec: &NooBaaAccountSpec,
    info: &AccountInfo,
) -> Option<UpdateAccountS3AccessParams> {
    let nsfs_account_config = nsfs_config(spec);
    // without a default resource in the spec the server keeps whatever it picked
    let resource_matches = spec.default_resource.is_none()
        || info.default_resource == spec.default_resource;
    let unchanged = resource_matches
        && info.can_create_buckets == spec.allow_bucket_creation
        && info.nsfs_account_config == nsfs_account_config;
    if unchanged {
        return None;
    }
    Some(UpdateAccountS3AccessParams {
        email: info.email.clone(),
        s3_access: true,
        default_resource: spec.default_resource.clone(),
        allow_bucket_creation: Some(spec.allow_bucket_creation),
        allowed_buckets: Some(allowed_buckets(spec)),
        nsfs_account_config,
    })
}

/// Creates the account or brings an existing one up to date, returning its keys.
pub async fn sync_account(api: &dyn NoobaaApi, account: &NooBaaAccount) -> Result<S3AccessKeys> {
    let email = account_email(account);
    let existing = ignore_codes(api.read_account(&email).await, &[RPC_CODE_NO_SUCH_ACCOUNT])
        .context(RpcSnafu {
            method: "read_account",
        })?;

    if let Some(info) = existing {
        if let Some(update) = account_update(&account.spec, &info) {
            tracing::info!(%email, "updating account");
            api.update_account_s3_access(update)
                .await
                .context(RpcSnafu {
                    method: "update_account_s3_access",
                })?;
        }
        return info
            .access_keys
            .into_iter()
            .next()
            .context(MissingAccessKeysSnafu { email });
    }

    tracing::info!(%email, "creating account");
    let reply = ignore_codes(
        api.create_account(CreateAccountParams {
            name: account.name_any(),
            email: email.clone(),
            has_login: false,
            s3_access: true,
            default_resource: account.spec.default_resource.clone(),
            allow_bucket_creation: Some(account.spec.allow_bucket_creation),
            allowed_buckets: Some(allowed_buckets(&account.spec)),
            bucket_claim_owner: None,
            nsfs_account_config: nsfs_config(&account.spec),
        })
        .await,
        &[RPC_CODE_ACCOUNT_ALREADY_EXISTS],
    )
    .context(RpcSnafu {
        method: "create_account",
    })?;
    if let Some(keys) = reply.and_then(|reply| reply.access_keys.into_iter().next()) {
        return Ok(keys);
    }
    api.read_account(&email)
        .await
        .context(RpcSnafu {
            method: "read_account",
        })?
        .access_keys
        .into_iter()
        .next()
        .context(MissingAccessKeysSnafu { email })
}

pub async fn remove_account(api: &dyn NoobaaApi, email: &str) -> Result<()> {
    ignore_codes(api.delete_account(email).await, &[RPC_CODE_NO_SUCH_ACCOUNT]).context(
        RpcSnafu {
            method: "delete_account",
        },
    )?;
    Ok(())
}
