use stackable_operator::{
    client::Client,
    kube::{
        Resource,
        runtime::events::{Event, EventType, Recorder, Reporter},
    },
};

use crate::manager::OPERATOR_NAME;

pub const ACTION_RECONCILE: &str = "Reconcile";

fn recorder<K: Resource<DynamicType = ()>>(client: &Client, obj: &K) -> Recorder {
    Recorder::new(
        client.as_kube_client(),
        Reporter {
            controller: OPERATOR_NAME.to_string(),
            instance: None,
        },
        obj.object_ref(&()),
    )
}

async fn publish<K: Resource<DynamicType = ()>>(
    client: &Client,
    obj: &K,
    type_: EventType,
    reason: &str,
    note: &str,
) {
    let event = Event {
        type_,
        reason: reason.to_string(),
        note: Some(note.to_string()),
        action: ACTION_RECONCILE.to_string(),
        secondary: None,
    };
    if let Err(err) = recorder(client, obj).publish(event).await {
        tracing::warn!(error = %err, %reason, "failed to publish event");
    }
}

/// Publishes a warning event against `obj`; failures are only logged.
pub async fn publish_warning<K: Resource<DynamicType = ()>>(
    client: &Client,
    obj: &K,
    reason: &str,
    note: &str,
) {
    publish(client, obj, EventType::Warning, reason, note).await
}

pub async fn publish_normal<K: Resource<DynamicType = ()>>(
    client: &Client,
    obj: &K,
    reason: &str,
    note: &str,
) {
    publish(client, obj, EventType::Normal, reason, note).await
}
