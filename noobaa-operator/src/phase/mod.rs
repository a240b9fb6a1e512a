//! Phased reconciliation shared by every resource kind.
//!
//! A reconciler walks its phases and ends with a [`ReconcileOutcome`] or an
//! error. [`settle`] folds that result into the status: phase, conditions and
//! observed generation, and decides how the resource is requeued. Errors say
//! whether a retry can help through [`PhaseError`].

use std::{fmt::Debug, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use stackable_operator::{
    client::{Client, GetApi},
    k8s_openapi::chrono::{DateTime, Utc},
    kube::{Resource, ResourceExt, runtime::controller::Action},
};

use crate::{
    api::{
        Phase,
        account::{NooBaaAccount, NooBaaAccountStatus},
        bucket_class::{BucketClass, BucketClassStatus},
        conditions::{Condition, ConditionType, find_condition, set_exclusive_condition},
        obc::{ObjectBucketClaim, ObjectBucketClaimStatus},
        store::{BackingStore, NamespaceStore, StoreStatus},
        system::{NooBaa, NooBaaStatus},
    },
    events,
    manager::OPERATOR_NAME,
};

pub const TEMPORARY_ERROR_REASON: &str = "TemporaryError";

/// How a phase run ended when it did not fail.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// Every phase passed, the resource is ready.
    Done,
    /// Waiting on something that is expected to happen by itself.
    Requeue(Duration),
    /// The spec cannot be satisfied as written.
    Reject { reason: String, message: String },
}

impl ReconcileOutcome {
    pub fn reject(reason: impl Into<String>, message: impl Into<String>) -> Self {
        ReconcileOutcome::Reject {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Only a spec change can fix it.
    Persistent { reason: String },
    /// Retrying later may succeed.
    Temporary,
}

pub trait PhaseError: std::error::Error {
    fn class(&self) -> ErrorClass;

    fn is_persistent(&self) -> bool {
        matches!(self.class(), ErrorClass::Persistent { .. })
    }
}

/// Folds the errors of one reconcile into the one that decides the outcome:
/// a persistent error wins over temporary ones, otherwise the first one.
pub fn combine_errors<E: PhaseError>(errors: Vec<E>) -> Option<E> {
    let first_persistent = errors.iter().position(PhaseError::is_persistent);
    let idx = first_persistent.unwrap_or(0);
    errors.into_iter().nth(idx)
}

/// The status fields the phase machine maintains.
pub trait PhasedStatus: Default + Clone + Debug + Serialize + Send + Sync {
    fn phase(&self) -> Option<Phase>;
    fn set_phase(&mut self, phase: Phase);
    fn conditions(&self) -> &[Condition];
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
    fn set_observed_generation(&mut self, generation: Option<i64>);
}

/// A resource kind driven through phases.
pub trait Phased:
    Resource<DynamicType = ()> + GetApi + Clone + Debug + DeserializeOwned + Serialize + Send + Sync
{
    type Status: PhasedStatus;

    fn phased_status(&self) -> Option<&Self::Status>;

    /// Status to start a reconcile from.
    fn initial_status(&self) -> Self::Status {
        self.phased_status().cloned().unwrap_or_default()
    }
}

/// Moves the status to `phase`, logging the transition.
pub fn enter<S: PhasedStatus>(status: &mut S, phase: Phase) {
    let from = status.phase();
    if from != Some(phase) {
        tracing::debug!(?from, to = %phase, "phase transition");
    }
    status.set_phase(phase);
}

/// Result of folding a phase run into the status.
#[derive(Clone, Debug, PartialEq)]
pub struct Settled {
    pub action: Action,
    /// Reason and message of a fresh rejection, to be published as an event.
    pub rejection: Option<(String, String)>,
}

pub fn settle<S, E>(
    status: &mut S,
    kind: &str,
    generation: Option<i64>,
    result: Result<ReconcileOutcome, E>,
    requeue_after: Duration,
    now: DateTime<Utc>,
) -> Settled
where
    S: PhasedStatus,
    E: PhaseError,
{
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => match err.class() {
            ErrorClass::Persistent { reason } => ReconcileOutcome::Reject {
                reason,
                message: err.to_string(),
            },
            ErrorClass::Temporary => {
                tracing::warn!(error = %err, "temporary error, will retry");
                if status.phase().is_none() {
                    status.set_phase(Phase::Verifying);
                }
                set_exclusive_condition(
                    status.conditions_mut(),
                    ConditionType::Progressing,
                    TEMPORARY_ERROR_REASON,
                    &err.to_string(),
                    now,
                );
                return Settled {
                    action: Action::requeue(requeue_after),
                    rejection: None,
                };
            }
        },
    };

    match outcome {
        ReconcileOutcome::Done => {
            enter(status, Phase::Ready);
            set_exclusive_condition(
                status.conditions_mut(),
                ConditionType::Available,
                &format!("{kind}PhaseReady"),
                &format!("{kind} is ready"),
                now,
            );
            status.set_observed_generation(generation);
            Settled {
                action: Action::await_change(),
                rejection: None,
            }
        }
        ReconcileOutcome::Requeue(after) => {
            let phase = status.phase().unwrap_or_default();
            set_exclusive_condition(
                status.conditions_mut(),
                ConditionType::Progressing,
                &phase.to_string(),
                &format!("{kind} is {phase}"),
                now,
            );
            Settled {
                action: Action::requeue(after),
                rejection: None,
            }
        }
        ReconcileOutcome::Reject { reason, message } => {
            let already_rejected = status.phase() == Some(Phase::Rejected)
                && find_condition(status.conditions(), ConditionType::Error)
                    .is_some_and(|c| c.reason.as_deref() == Some(reason.as_str()));
            tracing::warn!(%reason, %message, "rejected");
            enter(status, Phase::Rejected);
            set_exclusive_condition(
                status.conditions_mut(),
                ConditionType::Error,
                &reason,
                &message,
                now,
            );
            status.set_observed_generation(generation);
            Settled {
                action: Action::await_change(),
                rejection: (!already_rejected).then_some((reason, message)),
            }
        }
    }
}

/// Settles a phase run, publishes a warning event on rejection and writes
/// the status back through the status subresource.
pub async fn finish<K, E>(
    client: &Client,
    obj: &K,
    mut status: K::Status,
    result: Result<ReconcileOutcome, E>,
    requeue_after: Duration,
) -> Result<(Action, K::Status), stackable_operator::client::Error>
where
    K: Phased,
    E: PhaseError,
{
    let kind = K::kind(&()).to_string();
    let settled = settle(
        &mut status,
        &kind,
        obj.meta().generation,
        result,
        requeue_after,
        Utc::now(),
    );
    if let Some((reason, message)) = &settled.rejection {
        events::publish_warning(client, obj, reason, message).await;
    }
    write_status(client, obj, &status).await?;
    Ok((settled.action, status))
}

pub async fn write_status<K, S>(
    client: &Client,
    obj: &K,
    status: &S,
) -> Result<(), stackable_operator::client::Error>
where
    K: Phased,
    S: Serialize + Debug,
{
    tracing::debug!(name = %obj.name_any(), "writing status");
    client
        .apply_patch_status(OPERATOR_NAME, obj, status)
        .await
        .map(|_| ())
}

macro_rules! phased_status {
    ($status:ty) => {
        impl PhasedStatus for $status {
            fn phase(&self) -> Option<Phase> {
                self.phase
            }
            fn set_phase(&mut self, phase: Phase) {
                self.phase = Some(phase);
            }
            fn conditions(&self) -> &[Condition] {
                &self.conditions
            }
            fn conditions_mut(&mut self) -> &mut Vec<Condition> {
                &mut self.conditions
            }
            fn set_observed_generation(&mut self, generation: Option<i64>) {
                self.observed_generation = generation;
            }
        }
    };
}

phased_status!(NooBaaStatus);
phased_status!(StoreStatus);
phased_status!(BucketClassStatus);
phased_status!(NooBaaAccountStatus);

impl PhasedStatus for ObjectBucketClaimStatus {
    fn phase(&self) -> Option<Phase> {
        self.reconcile_phase
    }
    fn set_phase(&mut self, phase: Phase) {
        self.reconcile_phase = Some(phase);
        self.phase = Some(phase.into());
    }
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
    fn set_observed_generation(&mut self, generation: Option<i64>) {
        self.observed_generation = generation;
    }
}

macro_rules! phased {
    ($kind:ty, $status:ty) => {
        impl Phased for $kind {
            type Status = $status;

            fn phased_status(&self) -> Option<&$status> {
                self.status.as_ref()
            }
        }
    };
}

phased!(NooBaa, NooBaaStatus);
phased!(BackingStore, StoreStatus);
phased!(NamespaceStore, StoreStatus);
phased!(BucketClass, BucketClassStatus);
phased!(NooBaaAccount, NooBaaAccountStatus);
phased!(ObjectBucketClaim, ObjectBucketClaimStatus);
