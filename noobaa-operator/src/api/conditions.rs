use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stackable_operator::k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::Time, chrono::DateTime, chrono::Utc,
};

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Serialize,
    JsonSchema,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
)]
pub enum ConditionType {
    Available,
    Progressing,
    Degraded,
    Upgradeable,
    Error,
    KMSType,
    KMSInit,
    KMSSync,
}

impl ConditionType {
    /// Condition types of which at most one is true at a time.
    pub const EXCLUSIVE: [ConditionType; 4] = [
        ConditionType::Available,
        ConditionType::Progressing,
        ConditionType::Degraded,
        ConditionType::Error,
    ];
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, strum::Display,
)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn find_condition(conditions: &[Condition], type_: ConditionType) -> Option<&Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

pub fn is_condition_true(conditions: &[Condition], type_: ConditionType) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Sets a condition, keeping its transition time when the status did not change.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) {
    let reason = Some(reason.to_owned());
    let message = Some(message.to_owned());
    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => {
            if existing.status != status || existing.last_transition_time.is_none() {
                existing.status = status;
                existing.last_transition_time = Some(Time(now));
            }
            existing.reason = reason;
            existing.message = message;
            existing.last_heartbeat_time = Some(Time(now));
        }
        None => conditions.push(Condition {
            type_,
            status,
            last_heartbeat_time: Some(Time(now)),
            last_transition_time: Some(Time(now)),
            reason,
            message,
        }),
    }
}

/// Makes `active` the single true condition among [`ConditionType::EXCLUSIVE`].
pub fn set_exclusive_condition(
    conditions: &mut Vec<Condition>,
    active: ConditionType,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) {
    for type_ in ConditionType::EXCLUSIVE {
        if type_ == active {
            set_condition(conditions, type_, ConditionStatus::True, reason, message, now);
        } else {
            set_condition(conditions, type_, ConditionStatus::False, reason, message, now);
        }
    }
}
