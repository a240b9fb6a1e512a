//! In-memory stand-in for the management rpc, recording every call.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use noobaa_rpc::{
    NoobaaApi, Result, RpcError,
    error::{
        RPC_CODE_ACCOUNT_ALREADY_EXISTS, RPC_CODE_BUCKET_ALREADY_EXISTS,
        RPC_CODE_CONNECTION_ALREADY_EXIST, RPC_CODE_NO_SUCH_ACCOUNT, RPC_CODE_NO_SUCH_BUCKET,
        RPC_CODE_NO_SUCH_NAMESPACE_RESOURCE, RPC_CODE_NO_SUCH_POOL,
    },
    types::*,
};

#[derive(Default, Debug)]
pub struct FakeState {
    pub calls: Vec<String>,
    pub accounts: BTreeMap<String, AccountInfo>,
    pub buckets: BTreeMap<String, BucketInfo>,
    pub pools: BTreeMap<String, PoolInfo>,
    pub namespace_resources: BTreeMap<String, NamespaceResourceInfo>,
    pub connections: BTreeSet<String>,
    pub tiers: BTreeMap<String, TierInfo>,
    pub policies: BTreeMap<String, TieringPolicyInfo>,
    pub replication: BTreeMap<String, ReplicationPolicy>,
    pub bucket_class_updates: Vec<BucketClassInfo>,
    pub account_updates: Vec<UpdateAccountS3AccessParams>,
    /// method name -> rpc code the next calls fail with
    pub failures: BTreeMap<String, String>,
    pub unreachable: bool,
    pub revert: Option<UpdateBucketClassReply>,
    /// create_account replies without keys, forcing a read_account
    pub omit_keys: bool,
    /// Email the current token belongs to, `None` while it is not accepted
    pub authenticated: Option<String>,
}

#[derive(Default)]
pub struct FakeNoobaa {
    state: Mutex<FakeState>,
}

fn rpc_error(code: &str, message: impl Into<String>) -> RpcError {
    RpcError::Rpc {
        rpc_code: code.to_string(),
        message: message.into(),
    }
}

impl FakeNoobaa {
    pub fn new() -> Self {
        FakeNoobaa::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn called(&self, method: &str) -> bool {
        self.state().calls.iter().any(|call| call == method)
    }

    pub fn fail(&self, method: &str, code: &str) {
        self.state().failures.insert(method.into(), code.into());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn add_pool(&self, name: &str, mode: &str) {
        self.state().pools.insert(
            name.into(),
            PoolInfo {
                name: name.into(),
                resource_type: "CLOUD".into(),
                mode: mode.into(),
                storage: None,
            },
        );
    }

    pub fn add_bucket(&self, bucket: BucketInfo) {
        self.state().buckets.insert(bucket.name.clone(), bucket);
    }

    pub fn add_account(&self, account: AccountInfo) {
        self.state().accounts.insert(account.email.clone(), account);
    }

    fn enter(&self, method: &str) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(method.to_string());
        if state.unreachable {
            return Err(RpcError::ConnectionClosed);
        }
        if let Some(code) = state.failures.get(method) {
            return Err(rpc_error(code, format!("{method} failed")));
        }
        Ok(state)
    }
}

fn keys_for(name: &str) -> S3AccessKeys {
    S3AccessKeys {
        access_key: format!("AK-{name}"),
        secret_key: format!("SK-{name}"),
    }
}

#[async_trait]
impl NoobaaApi for FakeNoobaa {
    async fn read_auth(&self) -> Result<ReadAuthReply> {
        let state = self.enter("read_auth")?;
        Ok(ReadAuthReply {
            account: state.authenticated.as_ref().map(|email| AuthAccount {
                name: email.clone(),
                email: email.clone(),
                is_support: false,
            }),
            system: Some(AuthSystem {
                name: "noobaa".into(),
            }),
            ..ReadAuthReply::default()
        })
    }

    async fn create_auth(&self, params: CreateAuthParams) -> Result<CreateAuthReply> {
        let mut state = self.enter("create_auth")?;
        state.authenticated = Some(params.email.clone());
        Ok(CreateAuthReply {
            token: format!("auth-{}", params.email),
        })
    }

    async fn create_system(&self, params: CreateSystemParams) -> Result<CreateSystemReply> {
        let mut state = self.enter("create_system")?;
        state.authenticated = Some(params.email.clone());
        state.accounts.insert(
            params.email.clone(),
            AccountInfo {
                name: params.name.clone(),
                email: params.email.clone(),
                has_login: true,
                has_s3_access: true,
                access_keys: vec![keys_for("admin")],
                ..AccountInfo::default()
            },
        );
        Ok(CreateSystemReply {
            token: "system-token".into(),
            operator_token: Some("operator-token".into()),
        })
    }

    async fn read_system(&self) -> Result<SystemInfo> {
        let state = self.enter("read_system")?;
        Ok(SystemInfo {
            name: "noobaa".into(),
            version: "5.18.0".into(),
            accounts: state.accounts.values().cloned().collect(),
            buckets: state.buckets.values().cloned().collect(),
            pools: state.pools.values().cloned().collect(),
            tiers: state.tiers.values().cloned().collect(),
            namespace_resources: state.namespace_resources.values().cloned().collect(),
        })
    }

    async fn read_account(&self, email: &str) -> Result<AccountInfo> {
        let state = self.enter("read_account")?;
        state
            .accounts
            .get(email)
            .cloned()
            .ok_or_else(|| rpc_error(RPC_CODE_NO_SUCH_ACCOUNT, email))
    }

    async fn list_accounts(&self) -> Result<ListAccountsReply> {
        let state = self.enter("list_accounts")?;
        Ok(ListAccountsReply {
            accounts: state.accounts.values().cloned().collect(),
        })
    }

    async fn create_account(&self, params: CreateAccountParams) -> Result<CreateAccountReply> {
        let mut state = self.enter("create_account")?;
        if state.accounts.contains_key(&params.email) {
            return Err(rpc_error(RPC_CODE_ACCOUNT_ALREADY_EXISTS, params.email));
        }
        let keys = keys_for(&params.name);
        state.accounts.insert(
            params.email.clone(),
            AccountInfo {
                name: params.name.clone(),
                email: params.email.clone(),
                has_login: params.has_login,
                has_s3_access: params.s3_access,
                can_create_buckets: params.allow_bucket_creation.unwrap_or(false),
                default_resource: params.default_resource.clone(),
                access_keys: vec![keys.clone()],
                allowed_buckets: params.allowed_buckets.clone(),
                nsfs_account_config: params.nsfs_account_config.clone(),
                ..AccountInfo::default()
            },
        );
        let access_keys = if state.omit_keys { vec![] } else { vec![keys] };
        Ok(CreateAccountReply {
            token: None,
            access_keys,
        })
    }

    async fn update_account_s3_access(&self, params: UpdateAccountS3AccessParams) -> Result<()> {
        let mut state = self.enter("update_account_s3_access")?;
        let account = state
            .accounts
            .get_mut(&params.email)
            .ok_or_else(|| rpc_error(RPC_CODE_NO_SUCH_ACCOUNT, params.email.clone()))?;
        account.has_s3_access = params.s3_access;
        account.default_resource = params.default_resource.clone();
        if let Some(allow) = params.allow_bucket_creation {
            account.can_create_buckets = allow;
        }
        account.nsfs_account_config = params.nsfs_account_config.clone();
        state.account_updates.push(params);
        Ok(())
    }

    async fn delete_account(&self, email: &str) -> Result<()> {
        let mut state = self.enter("delete_account")?;
        state
            .accounts
            .remove(email)
            .map(|_| ())
            .ok_or_else(|| rpc_error(RPC_CODE_NO_SUCH_ACCOUNT, email))
    }

    async fn add_external_connection(&self, params: AddExternalConnectionParams) -> Result<()> {
        let mut state = self.enter("add_external_connection")?;
        if !state.connections.insert(params.name.clone()) {
            return Err(rpc_error(RPC_CODE_CONNECTION_ALREADY_EXIST, params.name));
        }
        Ok(())
    }

    async fn read_bucket(&self, name: &str) -> Result<BucketInfo> {
        let state = self.enter("read_bucket")?;
        state
            .buckets
            .get(name)
            .cloned()
            .ok_or_else(|| rpc_error(RPC_CODE_NO_SUCH_BUCKET, name))
    }

    async fn create_bucket(&self, params: CreateBucketParams) -> Result<BucketInfo> {
        let mut state = self.enter("create_bucket")?;
        if state.buckets.contains_key(&params.name) {
            return Err(rpc_error(RPC_CODE_BUCKET_ALREADY_EXISTS, params.name));
        }
        let tiering = params
            .tiering
            .as_ref()
            .map(|name| state.policies.get(name).cloned().unwrap_or(TieringPolicyInfo {
                name: name.clone(),
                tiers: vec![],
            }));
        let bucket = BucketInfo {
            name: params.name.clone(),
            tiering,
            namespace: params.namespace.clone(),
            ..BucketInfo::default()
        };
        state.buckets.insert(params.name, bucket.clone());
        Ok(bucket)
    }

    async fn update_bucket(&self, params: UpdateBucketParams) -> Result<()> {
        let mut state = self.enter("update_bucket")?;
        let bucket = state
            .buckets
            .get_mut(&params.name)
            .ok_or_else(|| rpc_error(RPC_CODE_NO_SUCH_BUCKET, params.name.clone()))?;
        if params.quota.is_some() {
            bucket.quota = params.quota;
        }
        if params.namespace.is_some() {
            bucket.namespace = params.namespace;
        }
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        let mut state = self.enter("delete_bucket")?;
        state
            .buckets
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| rpc_error(RPC_CODE_NO_SUCH_BUCKET, name))
    }

    async fn delete_bucket_and_objects(&self, name: &str) -> Result<()> {
        let mut state = self.enter("delete_bucket_and_objects")?;
        state
            .buckets
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| rpc_error(RPC_CODE_NO_SUCH_BUCKET, name))
    }

    async fn get_bucket_replication(&self, name: &str) -> Result<ReplicationPolicy> {
        let state = self.enter("get_bucket_replication")?;
        Ok(state.replication.get(name).cloned().unwrap_or_default())
    }

    async fn put_bucket_replication(&self, params: PutBucketReplicationParams) -> Result<()> {
        let mut state = self.enter("put_bucket_replication")?;
        state
            .replication
            .insert(params.name, params.replication_policy);
        Ok(())
    }

    async fn delete_bucket_replication(&self, name: &str) -> Result<()> {
        let mut state = self.enter("delete_bucket_replication")?;
        state.replication.remove(name);
        Ok(())
    }

    async fn create_hosts_pool(&self, params: CreateHostsPoolParams) -> Result<()> {
        let mut state = self.enter("create_hosts_pool")?;
        state.pools.insert(
            params.name.clone(),
            PoolInfo {
                name: params.name,
                resource_type: "HOSTS".into(),
                mode: "INITIALIZING".into(),
                storage: None,
            },
        );
        Ok(())
    }

    async fn create_cloud_pool(&self, params: CreateCloudPoolParams) -> Result<()> {
        let mut state = self.enter("create_cloud_pool")?;
        state.pools.insert(
            params.name.clone(),
            PoolInfo {
                name: params.name,
                resource_type: "CLOUD".into(),
                mode: "OPTIMAL".into(),
                storage: None,
            },
        );
        Ok(())
    }

    async fn update_cloud_pool(&self, params: UpdateCloudPoolParams) -> Result<()> {
        let state = self.enter("update_cloud_pool")?;
        if !state.pools.contains_key(&params.name) {
            return Err(rpc_error(RPC_CODE_NO_SUCH_POOL, params.name));
        }
        Ok(())
    }

    async fn delete_pool(&self, name: &str) -> Result<()> {
        let mut state = self.enter("delete_pool")?;
        state
            .pools
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| rpc_error(RPC_CODE_NO_SUCH_POOL, name))
    }

    async fn create_namespace_resource(&self, params: CreateNamespaceResourceParams) -> Result<()> {
        let mut state = self.enter("create_namespace_resource")?;
        state.namespace_resources.insert(
            params.name.clone(),
            NamespaceResourceInfo {
                name: params.name,
                mode: "OPTIMAL".into(),
                target_bucket: Some(params.target_bucket),
            },
        );
        Ok(())
    }

    async fn delete_namespace_resource(&self, name: &str) -> Result<()> {
        let mut state = self.enter("delete_namespace_resource")?;
        state
            .namespace_resources
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| rpc_error(RPC_CODE_NO_SUCH_NAMESPACE_RESOURCE, name))
    }

    async fn create_tier(&self, params: TierInfo) -> Result<()> {
        let mut state = self.enter("create_tier")?;
        state.tiers.insert(params.name.clone(), params);
        Ok(())
    }

    async fn create_tiering_policy(&self, params: TieringPolicyInfo) -> Result<()> {
        let mut state = self.enter("create_tiering_policy")?;
        state.policies.insert(params.name.clone(), params);
        Ok(())
    }

    async fn update_bucket_class(&self, params: BucketClassInfo) -> Result<UpdateBucketClassReply> {
        let mut state = self.enter("update_bucket_class")?;
        if let Some(reply) = state.revert.clone() {
            return Ok(reply);
        }
        for tier in &params.tiers {
            state.tiers.insert(tier.name.clone(), tier.clone());
        }
        state
            .policies
            .insert(params.policy.name.clone(), params.policy.clone());
        state.bucket_class_updates.push(params);
        Ok(UpdateBucketClassReply::default())
    }
}
