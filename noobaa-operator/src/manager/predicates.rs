//! Event filters for the primary resource streams.
//!
//! A filter hashes the fields whose change deserves a reconcile; events that
//! leave the hash unchanged are dropped. Status only churn never passes.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use stackable_operator::kube::{Resource, ResourceExt, core::DeserializeGuard};

use crate::api::store::Store;

/// Hash of generation, labels, finalizers and deletion timestamp.
pub fn meta_hash<K: Resource>(obj: &K) -> u64 {
    let meta = obj.meta();
    let mut hasher = DefaultHasher::new();
    meta.generation.hash(&mut hasher);
    meta.labels.hash(&mut hasher);
    meta.finalizers.hash(&mut hasher);
    meta.deletion_timestamp
        .as_ref()
        .map(|ts| ts.0.timestamp())
        .hash(&mut hasher);
    hasher.finish()
}

pub fn primary<K: Resource>(obj: &K) -> Option<u64> {
    Some(meta_hash(obj))
}

/// Like [`primary`], plus the remote mode code copied into the status.
pub fn store<S: Store>(guard: &DeserializeGuard<S>) -> Option<u64> {
    let mut hasher = DefaultHasher::new();
    meta_hash(guard).hash(&mut hasher);
    if let Ok(store) = &guard.0 {
        store.mode_code().hash(&mut hasher);
    }
    Some(hasher.finish())
}

/// Debug line for an event that made it past the filter.
pub fn log_queued<K: Resource>(kind: &str, obj: &K) {
    tracing::debug!(
        %kind,
        name = %obj.name_any(),
        namespace = ?obj.namespace(),
        generation = ?obj.meta().generation,
        "event queued"
    );
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use stackable_operator::k8s_openapi::{
        apimachinery::pkg::apis::meta::v1::Time, chrono::Utc,
    };

    use super::*;
    use crate::api::{
        Phase,
        store::{BackingStore, StoreMode, StoreStatus},
    };
    use crate::store::fixtures;

    fn backing_store() -> BackingStore {
        serde_yaml::from_str(fixtures::AWS_BACKING_STORE).unwrap()
    }

    #[test]
    fn test_status_change_is_filtered() {
        let bs = backing_store();
        let mut updated = bs.clone();
        updated.status = Some(StoreStatus {
            phase: Some(Phase::Ready),
            ..StoreStatus::default()
        });
        assert_eq!(primary(&bs), primary(&updated));
    }

    #[test]
    fn test_meta_changes_pass() {
        let bs = backing_store();

        let mut bumped = bs.clone();
        bumped.metadata.generation = Some(2);
        assert_ne!(primary(&bs), primary(&bumped));

        let mut labelled = bs.clone();
        labelled.metadata.labels = Some(BTreeMap::from([("app".into(), "noobaa".into())]));
        assert_ne!(primary(&bs), primary(&labelled));

        let mut finalized = bs.clone();
        finalized.metadata.finalizers = Some(vec!["noobaa.io/finalizer".into()]);
        assert_ne!(primary(&bs), primary(&finalized));

        let mut deleting = bs.clone();
        deleting.metadata.deletion_timestamp = Some(Time(Utc::now()));
        assert_ne!(primary(&bs), primary(&deleting));
    }

    #[test]
    fn test_store_mode_change_passes() {
        let bs = backing_store();
        let mut degraded = bs.clone();
        degraded.status = Some(StoreStatus {
            mode: Some(StoreMode {
                mode_code: "AUTH_FAILED".into(),
                time_stamp: None,
            }),
            ..StoreStatus::default()
        });
        let before = store(&DeserializeGuard(Ok(bs)));
        let after = store(&DeserializeGuard(Ok(degraded)));
        assert_ne!(before, after);
    }
}
