use std::{collections::BTreeMap, io::Write};

use noobaa_rpc::types::S3AccessKeys;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu};
use stackable_operator::{
    builder::meta::ObjectMetaBuilder,
    client::Client,
    k8s_openapi::{
        ByteString, api::core::v1::Secret as K8sSecret,
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    },
    kube::{Resource, runtime::reflector::Lookup},
};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to fetch secret {name}"))]
    GetSecret {
        source: stackable_operator::client::Error,
        name: String,
    },

    #[snafu(display("secret {name} carries non utf-8 data under {key}"))]
    NonUtf8Data { name: String, key: String },

    #[snafu(display("object has no name"))]
    ObjectHasNoName,

    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("failed to deserialize secret"))]
    SecretDeserialization { source: serde_json::Error },

    #[snafu(display("failed to serialize secret"))]
    SecretSerialization { source: serde_json::Error },

    #[snafu(display("failed to serialize secret"))]
    YamlSerialization { source: serde_yaml::Error },

    #[snafu(display("failed to build owner reference"))]
    OwnerReference {
        source: stackable_operator::builder::meta::Error,
    },

    #[snafu(display("fail to write YAML to stdout"))]
    WriteToStdout { source: std::io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// S3 key pair in the shape applications read it from a secret.
#[derive(Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct S3Credentials {
    #[serde(rename = "AWS_ACCESS_KEY_ID")]
    pub access_key_id: String,
    #[serde(rename = "AWS_SECRET_ACCESS_KEY")]
    pub secret_access_key: String,
}

impl From<S3AccessKeys> for S3Credentials {
    fn from(keys: S3AccessKeys) -> Self {
        S3Credentials {
            access_key_id: keys.access_key,
            secret_access_key: keys.secret_key,
        }
    }
}

/// A Kubernetes Secret whose string data is the flat serialization of `T`.
///
/// Data is written under `stringData`; on read, base64 `data` and
/// `stringData` are merged so fetched secrets and locally built ones
/// parse the same way. Nested values do not survive the flattening.
pub struct Secret<T> {
    name: String,
    namespace: String,
    value: T,
}

impl<T> Secret<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(name: String, namespace: String, value: T) -> Self {
        Self {
            name,
            namespace,
            value,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn fetch(client: &Client, name: &str, namespace: &str) -> Result<Self> {
        client
            .get::<K8sSecret>(name, namespace)
            .await
            .context(GetSecretSnafu { name })
            .and_then(Self::from)
    }

    /// `None` when the secret does not exist.
    pub async fn fetch_opt(client: &Client, name: &str, namespace: &str) -> Result<Option<Self>> {
        client
            .get_opt::<K8sSecret>(name, namespace)
            .await
            .context(GetSecretSnafu { name })?
            .map(Self::from)
            .transpose()
    }

    pub fn to_secret(&self) -> Result<K8sSecret> {
        let metadata = ObjectMetaBuilder::new()
            .name(&self.name)
            .namespace(&self.namespace)
            .build();
        self.with_metadata(metadata)
    }

    /// Same as [`Secret::to_secret`], owned by `owner` so it is removed with it.
    pub fn to_owned_secret<R: Resource<DynamicType = ()>>(&self, owner: &R) -> Result<K8sSecret> {
        let metadata = ObjectMetaBuilder::new()
            .name(&self.name)
            .namespace(&self.namespace)
            .ownerreference_from_resource(owner, None, Some(true))
            .context(OwnerReferenceSnafu)?
            .build();
        self.with_metadata(metadata)
    }

    pub fn print_yaml(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.to_secret()?).context(YamlSerializationSnafu)?;
        std::io::stdout()
            .write_all(yaml.as_bytes())
            .context(WriteToStdoutSnafu)
    }

    fn with_metadata(&self, metadata: ObjectMeta) -> Result<K8sSecret> {
        Ok(K8sSecret {
            metadata,
            string_data: Some(flatten(&self.value)?),
            ..K8sSecret::default()
        })
    }

    pub fn from(k8s_secret: K8sSecret) -> Result<Self> {
        let name = k8s_secret.name().context(ObjectHasNoNameSnafu)?.to_string();
        let namespace = k8s_secret
            .namespace()
            .context(ObjectHasNoNamespaceSnafu)?
            .to_string();
        let data = string_map(&name, k8s_secret.data, k8s_secret.string_data)?;
        let object = data
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect::<serde_json::Map<_, _>>();
        let value = serde_json::from_value(Value::Object(object))
            .context(SecretDeserializationSnafu)?;
        Ok(Self {
            name,
            namespace,
            value,
        })
    }
}

/// Top level scalars of `value` as strings; anything nested is dropped.
fn flatten<T: Serialize>(value: &T) -> Result<BTreeMap<String, String>> {
    let Value::Object(fields) = serde_json::to_value(value).context(SecretSerializationSnafu)?
    else {
        return Ok(BTreeMap::new());
    };
    Ok(fields
        .into_iter()
        .filter_map(|(key, field)| {
            let text = match field {
                Value::String(text) => text,
                Value::Bool(_) | Value::Number(_) => field.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => return None,
            };
            Some((key, text))
        })
        .collect())
}

/// Decoded `data` overlaid with `stringData`.
pub fn string_map(
    name: &str,
    data: Option<BTreeMap<String, ByteString>>,
    string_data: Option<BTreeMap<String, String>>,
) -> Result<BTreeMap<String, String>> {
    let mut result = BTreeMap::new();
    for (key, ByteString(bytes)) in data.unwrap_or_default() {
        let value = String::from_utf8(bytes).map_err(|_| Error::NonUtf8Data {
            name: name.to_owned(),
            key: key.clone(),
        })?;
        result.insert(key, value);
    }
    result.extend(string_data.unwrap_or_default());
    Ok(result)
}
