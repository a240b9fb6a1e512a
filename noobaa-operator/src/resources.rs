//! Helpers every reconciler uses against the cluster: finalizers, recommended
//! labels, owned object metadata and server-side apply.

use std::fmt::Debug;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use stackable_operator::{
    builder::meta::ObjectMetaBuilder,
    client::{Client, GetApi},
    k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
    kube::{
        Api, Resource,
        api::{ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams},
    },
    kvp::ObjectLabels,
};

use crate::{
    built_info,
    manager::{APP_NAME, OPERATOR_NAME},
};

pub const FINALIZER: &str = "noobaa.io/finalizer";
pub const OBC_FINALIZER: &str = "objectbucket.io/finalizer";

pub const APP_LABEL: &str = "app";

/// Role label value shared by everything that is not split into roles.
pub const ROLE_DEFAULT: &str = "default";

pub fn object_labels<'a, T: Resource>(
    owner: &'a T,
    controller_name: &'a str,
    role: &'a str,
) -> ObjectLabels<'a, T> {
    ObjectLabels {
        owner,
        app_name: APP_NAME,
        app_version: built_info::PKG_VERSION,
        operator_name: OPERATOR_NAME,
        controller_name,
        role,
        role_group: ROLE_DEFAULT,
    }
}

/// Metadata for an object owned by `owner`, in the owner's namespace.
pub fn owned_meta<T: Resource<DynamicType = ()>>(
    owner: &T,
    name: impl Into<String>,
    labels: ObjectLabels<T>,
) -> Result<ObjectMeta, stackable_operator::builder::meta::Error> {
    Ok(ObjectMetaBuilder::new()
        .name_and_namespace(owner)
        .name(name)
        .ownerreference_from_resource(owner, None, Some(true))?
        .with_recommended_labels(labels)?
        .build())
}

/// Merge patch adding the finalizer and the app label, `None` when both are present.
///
/// The patch carries the observed resourceVersion so a concurrent writer turns
/// it into a conflict instead of a lost update.
pub fn ensure_meta_patch(meta: &ObjectMeta, finalizer: &str) -> Option<Value> {
    let mut finalizers = meta.finalizers.clone().unwrap_or_default();
    let has_finalizer = finalizers.iter().any(|f| f == finalizer);
    let has_label = meta
        .labels
        .as_ref()
        .is_some_and(|labels| labels.get(APP_LABEL).is_some_and(|v| v == APP_NAME));
    if has_finalizer && has_label {
        return None;
    }
    if !has_finalizer {
        finalizers.push(finalizer.to_string());
    }
    Some(json!({
        "metadata": {
            "resourceVersion": meta.resource_version,
            "finalizers": finalizers,
            "labels": { APP_LABEL: APP_NAME },
        }
    }))
}

/// Merge patch dropping the finalizer, `None` when it is already gone.
pub fn remove_finalizer_patch(meta: &ObjectMeta, finalizer: &str) -> Option<Value> {
    let finalizers = meta.finalizers.as_ref()?;
    if !finalizers.iter().any(|f| f == finalizer) {
        return None;
    }
    let remaining: Vec<&String> = finalizers.iter().filter(|f| *f != finalizer).collect();
    Some(json!({
        "metadata": {
            "resourceVersion": meta.resource_version,
            "finalizers": remaining,
        }
    }))
}

/// True when the meta needed an update; the caller requeues in that case.
pub async fn ensure_meta<K>(
    client: &Client,
    obj: &K,
    finalizer: &str,
) -> Result<bool, stackable_operator::client::Error>
where
    K: Resource + GetApi + Clone + Debug + DeserializeOwned + Serialize,
{
    let Some(patch) = ensure_meta_patch(obj.meta(), finalizer) else {
        return Ok(false);
    };
    tracing::debug!(%finalizer, "adding finalizer and labels");
    client.merge_patch(obj, patch).await?;
    Ok(true)
}

pub async fn release_finalizer<K>(
    client: &Client,
    obj: &K,
    finalizer: &str,
) -> Result<(), stackable_operator::client::Error>
where
    K: Resource + GetApi + Clone + Debug + DeserializeOwned + Serialize,
{
    if let Some(patch) = remove_finalizer_patch(obj.meta(), finalizer) {
        tracing::debug!(%finalizer, "releasing finalizer");
        client.merge_patch(obj, patch).await?;
    }
    Ok(())
}

pub fn is_deleting<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

/// Server-side apply for kinds outside the cluster resources set.
pub async fn apply<K>(client: &Client, obj: &K) -> Result<K, stackable_operator::client::Error>
where
    K: Resource + GetApi + Clone + Debug + DeserializeOwned + Serialize,
{
    client.apply_patch(OPERATOR_NAME, obj, obj).await
}

/// Applies an object of a kind whose CRD may not be installed.
///
/// Returns `Ok(false)` when the api server does not know the kind.
pub async fn apply_optional(
    client: &Client,
    gvk: &GroupVersionKind,
    plural: &str,
    obj: &DynamicObject,
) -> Result<bool, stackable_operator::kube::Error> {
    let resource = ApiResource::from_gvk_with_plural(gvk, plural);
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");
    let name = obj.metadata.name.clone().unwrap_or_default();
    let api: Api<DynamicObject> =
        Api::namespaced_with(client.as_kube_client(), namespace, &resource);
    match api
        .patch(&name, &PatchParams::apply(OPERATOR_NAME).force(), &Patch::Apply(obj))
        .await
    {
        Ok(_) => Ok(true),
        Err(stackable_operator::kube::Error::Api(err)) if err.code == 404 => {
            tracing::debug!(kind = %gvk.kind, %name, "kind not served, skipping");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
