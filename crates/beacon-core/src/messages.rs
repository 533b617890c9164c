//! Payload schemas for the COMM and WEBBROKER catalogs.
//!
//! All payloads are CBOR structs. Numeric user-id fields marked "tagged"
//! travel with the type tag from [`crate::ident`] applied.

use serde::{Deserialize, Serialize};

/// Which of the two parallel field sets of a stat is populated.
///
/// This is a closed two-way variant: a stat is either integer-valued or
/// float-valued, and the unused field set is left at its zero values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
#[repr(u32)]
pub enum ValueType {
    Int = 1,
    Float = 2,
}

impl From<ValueType> for u32 {
    fn from(v: ValueType) -> u32 {
        v as u32
    }
}

impl TryFrom<u32> for ValueType {
    type Error = String;
    fn try_from(v: u32) -> Result<Self, String> {
        match v {
            1 => Ok(Self::Int),
            2 => Ok(Self::Float),
            other => Err(format!("unknown value type {other}")),
        }
    }
}

// ── COMM payloads ───────────────────────────────────────────────────────

/// Environment discriminator carried in `AuthInfoResponse`.
pub const ENVIRONMENT_PRODUCTION: u32 = 0;

/// Region discriminator carried in `AuthInfoResponse`.
pub const REGION_WORLD_WIDE: u32 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthInfoRequest {
    #[serde(default)]
    pub game_pid: u32,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthInfoResponse {
    pub refresh_token: String,
    pub environment_type: u32,
    pub user_id: u64,
    pub user_name: String,
    pub region: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetUserStatsRequest {
    /// Tagged user id.
    pub user_id: u64,
}

/// One stat entry. Exactly one of the `int_*` / `float_*` field sets is
/// populated, selected by `value_type`; the other set stays at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStat {
    pub stat_id: u64,
    pub key: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub window_size: f64,
    #[serde(default)]
    pub increment_only: bool,
    #[serde(default)]
    pub int_value: i32,
    #[serde(default)]
    pub int_default_value: i32,
    #[serde(default)]
    pub int_min_value: i32,
    #[serde(default)]
    pub int_max_value: i32,
    #[serde(default)]
    pub int_max_change: i32,
    #[serde(default)]
    pub float_value: f32,
    #[serde(default)]
    pub float_default_value: f32,
    #[serde(default)]
    pub float_min_value: f32,
    #[serde(default)]
    pub float_max_value: f32,
    #[serde(default)]
    pub float_max_change: f32,
}

impl Default for UserStat {
    fn default() -> Self {
        Self {
            stat_id: 0,
            key: String::new(),
            value_type: ValueType::Int,
            window_size: 0.0,
            increment_only: false,
            int_value: 0,
            int_default_value: 0,
            int_min_value: 0,
            int_max_value: 0,
            int_max_change: 0,
            float_value: 0.0,
            float_default_value: 0.0,
            float_min_value: 0.0,
            float_max_value: 0.0,
            float_max_change: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetUserStatsResponse {
    pub user_stats: Vec<UserStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateUserStatRequest {
    pub stat_id: u64,
    pub value_type: ValueType,
    #[serde(default)]
    pub int_value: i32,
    #[serde(default)]
    pub float_value: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateUserStatResponse {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeleteUserStatsRequest {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeleteUserStatsResponse {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetUserAchievementsRequest {
    /// Tagged user id.
    pub user_id: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserAchievement {
    pub achievement_id: u64,
    pub key: String,
    pub name: String,
    pub description: String,
    pub visible_while_locked: bool,
    pub image_url_locked: String,
    pub image_url_unlocked: String,
    /// Seconds since the epoch; zero while locked.
    #[serde(default)]
    pub unlock_time: u32,
    #[serde(default)]
    pub rarity: f32,
    #[serde(default)]
    pub rarity_level_description: String,
    #[serde(default)]
    pub rarity_level_slug: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetUserAchievementsResponse {
    pub user_achievements: Vec<UserAchievement>,
    pub language: String,
    pub achievements_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockUserAchievementRequest {
    pub achievement_id: u64,
    /// Unlock time in seconds since the epoch.
    pub time: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnlockUserAchievementResponse {
    /// True when the achievement was already unlocked and no backend call
    /// was made.
    #[serde(default)]
    pub already_unlocked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearUserAchievementRequest {
    pub achievement_id: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClearUserAchievementResponse {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeleteUserAchievementsRequest {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeleteUserAchievementsResponse {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetLeaderboardsRequest {}

/// Leaderboard sort methods.
pub const SORT_METHOD_ASCENDING: u32 = 1;
pub const SORT_METHOD_DESCENDING: u32 = 2;

/// Leaderboard display types.
pub const DISPLAY_TYPE_NUMERIC: u32 = 1;
pub const DISPLAY_TYPE_TIME_SECONDS: u32 = 2;
pub const DISPLAY_TYPE_TIME_MILLISECONDS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LeaderboardDefinition {
    pub leaderboard_id: u64,
    pub key: String,
    pub name: String,
    pub sort_method: u32,
    pub display_type: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetLeaderboardsResponse {
    pub definitions: Vec<LeaderboardDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetLeaderboardEntriesGlobalRequest {
    pub leaderboard_id: u64,
    pub range_start: u32,
    pub range_end: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetLeaderboardEntriesAroundUserRequest {
    pub leaderboard_id: u64,
    /// Tagged user id.
    pub user_id: u64,
    pub count_before: u32,
    pub count_after: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Tagged user id.
    pub user_id: u64,
    pub score: i32,
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetLeaderboardEntriesResponse {
    pub entries: Vec<LeaderboardEntry>,
    pub leaderboard_entry_total_count: u32,
}

// ── WEBBROKER payloads ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerAuthRequest {
    /// `Bearer <access token>`.
    pub auth_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeTopicRequest {
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeTopicResponse {
    pub topic: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_payload, encode_payload};

    #[test]
    fn stat_payload_round_trip() {
        let stat = UserStat {
            stat_id: 10,
            key: "kills".into(),
            value_type: ValueType::Int,
            increment_only: true,
            int_value: 5,
            int_max_value: 100,
            ..Default::default()
        };
        let bytes = encode_payload(&stat).unwrap();
        let back: UserStat = decode_payload(&bytes).unwrap();
        assert_eq!(back, stat);
        assert_eq!(back.float_value, 0.0);
    }

    #[test]
    fn value_type_rejects_unknown_discriminant() {
        let bytes = encode_payload(&7u32).unwrap();
        assert!(decode_payload::<ValueType>(&bytes).is_err());
    }
}
