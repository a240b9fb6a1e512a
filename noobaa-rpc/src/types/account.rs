use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct S3AccessKeys {
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountAllowedBuckets {
    pub full_permission: bool,
    #[serde(default)]
    pub permission_list: Vec<String>,
}

impl AccountAllowedBuckets {
    pub fn full() -> Self {
        AccountAllowedBuckets {
            full_permission: true,
            permission_list: vec![],
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NsfsAccountConfig {
    pub uid: Option<i64>,
    pub gid: Option<i64>,
    pub new_buckets_path: Option<String>,
    #[serde(default)]
    pub nsfs_only: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountInfo {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_support: bool,
    #[serde(default)]
    pub has_login: bool,
    #[serde(default)]
    pub has_s3_access: bool,
    #[serde(default)]
    pub can_create_buckets: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_resource: Option<String>,
    #[serde(default)]
    pub access_keys: Vec<S3AccessKeys>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_buckets: Option<AccountAllowedBuckets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsfs_account_config: Option<NsfsAccountConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListAccountsReply {
    #[serde(default)]
    pub accounts: Vec<AccountInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReadAccountParams {
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DeleteAccountParams {
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateAccountParams {
    pub name: String,
    pub email: String,
    pub has_login: bool,
    pub s3_access: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_bucket_creation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_buckets: Option<AccountAllowedBuckets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_claim_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsfs_account_config: Option<NsfsAccountConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateAccountReply {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub access_keys: Vec<S3AccessKeys>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateAccountS3AccessParams {
    pub email: String,
    pub s3_access: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_bucket_creation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_buckets: Option<AccountAllowedBuckets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsfs_account_config: Option<NsfsAccountConfig>,
}

/// Credentials of a foreign endpoint that cloud pools and namespace resources connect through.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AddExternalConnectionParams {
    pub name: String,
    pub endpoint: String,
    pub endpoint_type: String,
    pub identity: String,
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthAccount {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_support: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthSystem {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadAuthReply {
    #[serde(default)]
    pub account: Option<AuthAccount>,
    #[serde(default)]
    pub system: Option<AuthSystem>,
    #[serde(default)]
    pub authorized_by: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateAuthParams {
    pub system: String,
    pub role: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateAuthReply {
    pub token: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateSystemParams {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_change_password: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateSystemReply {
    pub token: String,
    #[serde(default)]
    pub operator_token: Option<String>,
}
