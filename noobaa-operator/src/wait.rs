//! Waiting for a resource to settle, as used by the imperative cli.
//!
//! The wait is a small state machine: every poll feeds an [`Observation`]
//! into [`WaitState::next`], which either keeps polling or ends in one of the
//! terminal states. Only the caller sleeps, reconcilers never do.

use std::time::Duration;

use snafu::{ResultExt, Snafu};
use stackable_operator::client::Client;

use crate::{
    api::{
        Phase,
        account::NooBaaAccount,
        bucket_class::BucketClass,
        conditions::{ConditionType, find_condition},
        obc::ObjectBucketClaim,
        store::{BackingStore, NamespaceStore},
        system::NooBaa,
    },
    phase::{Phased, PhasedStatus},
};

pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const CLAIM_MAX_POLLS: u32 = 60;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to get {kind} {name}"))]
    GetResource {
        source: stackable_operator::client::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("{kind} {name} was rejected: {reason}: {message}"))]
    Rejected {
        kind: String,
        name: String,
        reason: String,
        message: String,
    },

    #[snafu(display("{kind} {name} not ready after {polls} polls"))]
    TimedOut {
        kind: String,
        name: String,
        polls: u32,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum WaitKind {
    System,
    BackingStore,
    NamespaceStore,
    BucketClass,
    Account,
    Claim,
}

impl WaitKind {
    pub fn kind(&self) -> &'static str {
        match self {
            WaitKind::System => "NooBaa",
            WaitKind::BackingStore => "BackingStore",
            WaitKind::NamespaceStore => "NamespaceStore",
            WaitKind::BucketClass => "BucketClass",
            WaitKind::Account => "NooBaaAccount",
            WaitKind::Claim => "ObjectBucketClaim",
        }
    }

    /// Claims give up after a fixed number of polls, everything else waits forever.
    pub fn max_polls(&self) -> Option<u32> {
        match self {
            WaitKind::Claim => Some(CLAIM_MAX_POLLS),
            _ => None,
        }
    }
}

/// What one poll saw.
#[derive(Clone, Debug, PartialEq)]
pub enum Observation {
    Missing,
    Phase(Option<Phase>),
    Rejected { reason: String, message: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum WaitState {
    Polling { polls: u32 },
    Ready,
    Rejected { reason: String, message: String },
    TimedOut { polls: u32 },
}

impl WaitState {
    pub fn start() -> WaitState {
        WaitState::Polling { polls: 0 }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WaitState::Polling { .. })
    }

    pub fn next(self, observation: Observation, max_polls: Option<u32>) -> WaitState {
        let WaitState::Polling { polls } = self else {
            return self;
        };
        match observation {
            Observation::Phase(Some(Phase::Ready)) => return WaitState::Ready,
            Observation::Rejected { reason, message } => {
                return WaitState::Rejected { reason, message };
            }
            Observation::Missing | Observation::Phase(_) => {}
        }
        let polls = polls + 1;
        match max_polls {
            Some(max) if polls >= max => WaitState::TimedOut { polls },
            _ => WaitState::Polling { polls },
        }
    }
}

pub fn observe<K: Phased>(obj: Option<&K>) -> Observation {
    let Some(obj) = obj else {
        return Observation::Missing;
    };
    let Some(status) = obj.phased_status() else {
        return Observation::Phase(None);
    };
    match status.phase() {
        Some(Phase::Rejected) => {
            let error = find_condition(status.conditions(), ConditionType::Error);
            Observation::Rejected {
                reason: error
                    .and_then(|c| c.reason.clone())
                    .unwrap_or_default(),
                message: error
                    .and_then(|c| c.message.clone())
                    .unwrap_or_default(),
            }
        }
        phase => Observation::Phase(phase),
    }
}

async fn fetch<K: Phased>(
    client: &Client,
    kind: WaitKind,
    name: &str,
    namespace: &str,
) -> Result<Observation> {
    let obj = client
        .get_opt::<K>(name, namespace)
        .await
        .context(GetResourceSnafu {
            kind: kind.kind(),
            name,
        })?;
    Ok(observe(obj.as_ref()))
}

async fn poll(client: &Client, kind: WaitKind, name: &str, namespace: &str) -> Result<Observation> {
    match kind {
        WaitKind::System => fetch::<NooBaa>(client, kind, name, namespace).await,
        WaitKind::BackingStore => fetch::<BackingStore>(client, kind, name, namespace).await,
        WaitKind::NamespaceStore => fetch::<NamespaceStore>(client, kind, name, namespace).await,
        WaitKind::BucketClass => fetch::<BucketClass>(client, kind, name, namespace).await,
        WaitKind::Account => fetch::<NooBaaAccount>(client, kind, name, namespace).await,
        WaitKind::Claim => fetch::<ObjectBucketClaim>(client, kind, name, namespace).await,
    }
}

/// Polls until the resource is ready, fails on rejection or when it runs out of polls.
pub async fn wait_ready(
    client: &Client,
    kind: WaitKind,
    name: &str,
    namespace: &str,
    interval: Duration,
) -> Result<()> {
    let mut state = WaitState::start();
    loop {
        let observation = poll(client, kind, name, namespace).await?;
        tracing::debug!(kind = kind.kind(), %name, ?observation, "polled");
        state = state.next(observation, kind.max_polls());
        match &state {
            WaitState::Ready => {
                tracing::info!(kind = kind.kind(), %name, "ready");
                return Ok(());
            }
            WaitState::Rejected { reason, message } => {
                return RejectedSnafu {
                    kind: kind.kind(),
                    name,
                    reason,
                    message,
                }
                .fail();
            }
            WaitState::TimedOut { polls } => {
                return TimedOutSnafu {
                    kind: kind.kind(),
                    name,
                    polls: *polls,
                }
                .fail();
            }
            WaitState::Polling { .. } => tokio::time::sleep(interval).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{conditions::set_exclusive_condition, system::NooBaaStatus},
        system::fixtures,
    };

    #[test]
    fn test_ready_ends_the_wait() {
        let state = WaitState::start()
            .next(Observation::Missing, None)
            .next(Observation::Phase(Some(Phase::Creating)), None);
        assert_eq!(state, WaitState::Polling { polls: 2 });
        let state = state.next(Observation::Phase(Some(Phase::Ready)), None);
        assert_eq!(state, WaitState::Ready);
        assert!(state.is_terminal());
        // terminal states absorb further observations
        assert_eq!(state.next(Observation::Missing, None), WaitState::Ready);
    }

    #[test]
    fn test_claims_time_out() {
        let max = WaitKind::Claim.max_polls();
        assert_eq!(max, Some(CLAIM_MAX_POLLS));
        let mut state = WaitState::start();
        for _ in 0..CLAIM_MAX_POLLS - 1 {
            state = state.next(Observation::Phase(Some(Phase::Creating)), max);
            assert!(!state.is_terminal());
        }
        state = state.next(Observation::Phase(Some(Phase::Creating)), max);
        assert_eq!(state, WaitState::TimedOut { polls: CLAIM_MAX_POLLS });

        let mut state = WaitState::start();
        for _ in 0..CLAIM_MAX_POLLS * 2 {
            state = state.next(Observation::Missing, WaitKind::System.max_polls());
        }
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_observe_rejection() {
        let mut nb: NooBaa = serde_yaml::from_str(fixtures::SYSTEM).unwrap();
        assert_eq!(observe::<NooBaa>(None), Observation::Missing);
        assert_eq!(observe(Some(&nb)), Observation::Phase(None));

        let mut status = NooBaaStatus {
            phase: Some(Phase::Rejected),
            ..NooBaaStatus::default()
        };
        set_exclusive_condition(
            &mut status.conditions,
            ConditionType::Error,
            "InvalidImage",
            "image cannot be parsed",
            stackable_operator::k8s_openapi::chrono::Utc::now(),
        );
        nb.status = Some(status);
        let observation = observe(Some(&nb));
        assert_eq!(
            observation,
            Observation::Rejected {
                reason: "InvalidImage".into(),
                message: "image cannot be parsed".into(),
            }
        );
        assert!(matches!(
            WaitState::start().next(observation, None),
            WaitState::Rejected { reason, .. } if reason == "InvalidImage"
        ));
    }
}
