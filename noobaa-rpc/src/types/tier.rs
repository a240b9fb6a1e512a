use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataPlacement {
    Mirror,
    #[default]
    Spread,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TierInfo {
    pub name: String,
    #[serde(default)]
    pub attached_pools: Vec<String>,
    #[serde(default)]
    pub data_placement: DataPlacement,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TierItem {
    pub order: i32,
    pub tier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spillover: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TieringPolicyInfo {
    pub name: String,
    #[serde(default)]
    pub tiers: Vec<TierItem>,
}

/// Policy plus its tiers, pushed and reverted as one unit.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BucketClassInfo {
    pub name: String,
    pub policy: TieringPolicyInfo,
    #[serde(default)]
    pub tiers: Vec<TierInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateBucketClassReply {
    #[serde(default, alias = "shouldRevert")]
    pub should_revert: bool,
    #[serde(default, alias = "revertToPolicy")]
    pub revert_to_policy: Option<BucketClassInfo>,
    #[serde(default, alias = "errorMessage")]
    pub error_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_reply_accepts_both_casings() {
        let reply: UpdateBucketClassReply = serde_json::from_str(
            r#"{"shouldRevert": true, "errorMessage": "bad tiers",
                "revertToPolicy": {"name": "gold", "policy": {"name": "gold", "tiers": [{"order": 0, "tier": "t0"}]},
                "tiers": [{"name": "t0", "attached_pools": ["bs1", "bs2"], "data_placement": "MIRROR"}]}}"#,
        )
        .unwrap();
        assert!(reply.should_revert);
        assert_eq!(reply.error_message, "bad tiers");
        let policy = reply.revert_to_policy.unwrap();
        assert_eq!(policy.tiers[0].data_placement, DataPlacement::Mirror);
        assert_eq!(policy.tiers[0].attached_pools, vec!["bs1", "bs2"]);

        let reply: UpdateBucketClassReply = serde_json::from_str(r#"{"should_revert": false}"#).unwrap();
        assert!(!reply.should_revert);
        assert!(reply.revert_to_policy.is_none());
    }
}
