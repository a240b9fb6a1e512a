use async_trait::async_trait;
use serde_json::json;

use crate::{client::RpcClient, error::Result, types::*};

/// The management api surface the operator drives.
///
/// [`RpcClient`] implements it over the wire; tests substitute an in-memory fake.
#[async_trait]
pub trait NoobaaApi: Send + Sync {
    async fn read_auth(&self) -> Result<ReadAuthReply>;
    async fn create_auth(&self, params: CreateAuthParams) -> Result<CreateAuthReply>;
    async fn create_system(&self, params: CreateSystemParams) -> Result<CreateSystemReply>;
    async fn read_system(&self) -> Result<SystemInfo>;

    async fn read_account(&self, email: &str) -> Result<AccountInfo>;
    async fn list_accounts(&self) -> Result<ListAccountsReply>;
    async fn create_account(&self, params: CreateAccountParams) -> Result<CreateAccountReply>;
    async fn update_account_s3_access(&self, params: UpdateAccountS3AccessParams) -> Result<()>;
    async fn delete_account(&self, email: &str) -> Result<()>;
    async fn add_external_connection(&self, params: AddExternalConnectionParams) -> Result<()>;

    async fn read_bucket(&self, name: &str) -> Result<BucketInfo>;
    async fn create_bucket(&self, params: CreateBucketParams) -> Result<BucketInfo>;
    async fn update_bucket(&self, params: UpdateBucketParams) -> Result<()>;
    async fn delete_bucket(&self, name: &str) -> Result<()>;
    async fn delete_bucket_and_objects(&self, name: &str) -> Result<()>;
    async fn get_bucket_replication(&self, name: &str) -> Result<ReplicationPolicy>;
    async fn put_bucket_replication(&self, params: PutBucketReplicationParams) -> Result<()>;
    async fn delete_bucket_replication(&self, name: &str) -> Result<()>;

    async fn create_hosts_pool(&self, params: CreateHostsPoolParams) -> Result<()>;
    async fn create_cloud_pool(&self, params: CreateCloudPoolParams) -> Result<()>;
    async fn update_cloud_pool(&self, params: UpdateCloudPoolParams) -> Result<()>;
    async fn delete_pool(&self, name: &str) -> Result<()>;
    async fn create_namespace_resource(&self, params: CreateNamespaceResourceParams) -> Result<()>;
    async fn delete_namespace_resource(&self, name: &str) -> Result<()>;

    async fn create_tier(&self, params: TierInfo) -> Result<()>;
    async fn create_tiering_policy(&self, params: TieringPolicyInfo) -> Result<()>;
    async fn update_bucket_class(&self, params: BucketClassInfo) -> Result<UpdateBucketClassReply>;
}

#[async_trait]
impl NoobaaApi for RpcClient {
    async fn read_auth(&self) -> Result<ReadAuthReply> {
        self.call_no_params("auth_api", "read_auth").await
    }

    async fn create_auth(&self, params: CreateAuthParams) -> Result<CreateAuthReply> {
        self.call("auth_api", "create_auth", &params).await
    }

    async fn create_system(&self, params: CreateSystemParams) -> Result<CreateSystemReply> {
        self.call("system_api", "create_system", &params).await
    }

    async fn read_system(&self) -> Result<SystemInfo> {
        self.call_no_params("system_api", "read_system").await
    }

    async fn read_account(&self, email: &str) -> Result<AccountInfo> {
        let params = ReadAccountParams {
            email: email.to_owned(),
        };
        self.call("account_api", "read_account", &params).await
    }

    async fn list_accounts(&self) -> Result<ListAccountsReply> {
        self.call("account_api", "list_accounts", &json!({})).await
    }

    async fn create_account(&self, params: CreateAccountParams) -> Result<CreateAccountReply> {
        self.call("account_api", "create_account", &params).await
    }

    async fn update_account_s3_access(&self, params: UpdateAccountS3AccessParams) -> Result<()> {
        self.call_void("account_api", "update_account_s3_access", &params)
            .await
    }

    async fn delete_account(&self, email: &str) -> Result<()> {
        let params = DeleteAccountParams {
            email: email.to_owned(),
        };
        self.call_void("account_api", "delete_account", &params).await
    }

    async fn add_external_connection(&self, params: AddExternalConnectionParams) -> Result<()> {
        self.call_void("account_api", "add_external_connection", &params)
            .await
    }

    async fn read_bucket(&self, name: &str) -> Result<BucketInfo> {
        self.call("bucket_api", "read_bucket", &BucketNameParams::new(name))
            .await
    }

    async fn create_bucket(&self, params: CreateBucketParams) -> Result<BucketInfo> {
        self.call("bucket_api", "create_bucket", &params).await
    }

    async fn update_bucket(&self, params: UpdateBucketParams) -> Result<()> {
        self.call_void("bucket_api", "update_bucket", &params).await
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.call_void("bucket_api", "delete_bucket", &BucketNameParams::new(name))
            .await
    }

    async fn delete_bucket_and_objects(&self, name: &str) -> Result<()> {
        self.call_void(
            "bucket_api",
            "delete_bucket_and_objects",
            &BucketNameParams::new(name),
        )
        .await
    }

    async fn get_bucket_replication(&self, name: &str) -> Result<ReplicationPolicy> {
        self.call(
            "bucket_api",
            "get_bucket_replication",
            &BucketNameParams::new(name),
        )
        .await
    }

    async fn put_bucket_replication(&self, params: PutBucketReplicationParams) -> Result<()> {
        self.call_void("bucket_api", "put_bucket_replication", &params)
            .await
    }

    async fn delete_bucket_replication(&self, name: &str) -> Result<()> {
        self.call_void(
            "bucket_api",
            "delete_bucket_replication",
            &BucketNameParams::new(name),
        )
        .await
    }

    async fn create_hosts_pool(&self, params: CreateHostsPoolParams) -> Result<()> {
        self.call_void("pool_api", "create_hosts_pool", &params).await
    }

    async fn create_cloud_pool(&self, params: CreateCloudPoolParams) -> Result<()> {
        self.call_void("pool_api", "create_cloud_pool", &params).await
    }

    async fn update_cloud_pool(&self, params: UpdateCloudPoolParams) -> Result<()> {
        self.call_void("pool_api", "update_cloud_pool", &params).await
    }

    async fn delete_pool(&self, name: &str) -> Result<()> {
        self.call_void("pool_api", "delete_pool", &PoolNameParams::new(name))
            .await
    }

    async fn create_namespace_resource(&self, params: CreateNamespaceResourceParams) -> Result<()> {
        self.call_void("pool_api", "create_namespace_resource", &params)
            .await
    }

    async fn delete_namespace_resource(&self, name: &str) -> Result<()> {
        self.call_void(
            "pool_api",
            "delete_namespace_resource",
            &PoolNameParams::new(name),
        )
        .await
    }

    async fn create_tier(&self, params: TierInfo) -> Result<()> {
        self.call_void("tier_api", "create_tier", &params).await
    }

    async fn create_tiering_policy(&self, params: TieringPolicyInfo) -> Result<()> {
        self.call_void("tiering_policy_api", "create_policy", &params)
            .await
    }

    async fn update_bucket_class(&self, params: BucketClassInfo) -> Result<UpdateBucketClassReply> {
        self.call("tiering_policy_api", "update_bucket_class", &params)
            .await
    }
}
