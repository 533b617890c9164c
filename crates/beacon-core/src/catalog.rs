//! Message catalog ids.
//!
//! Two channels exist: `COMM` carries request/response traffic between the
//! game client and the gateway, `WEBBROKER` carries push/subscribe traffic.
//! The numeric values are part of the wire contract and must not change.

/// Request/response channel.
pub const CHANNEL_COMM: u16 = 1;
/// Push/subscribe channel.
pub const CHANNEL_WEBBROKER: u16 = 2;

/// Message types on the `COMM` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommType {
    AuthInfoRequest = 3,
    AuthInfoResponse = 4,
    GetUserStatsRequest = 15,
    GetUserStatsResponse = 16,
    UpdateUserStatRequest = 17,
    UpdateUserStatResponse = 18,
    DeleteUserStatsRequest = 19,
    DeleteUserStatsResponse = 20,
    GetUserAchievementsRequest = 23,
    GetUserAchievementsResponse = 24,
    UnlockUserAchievementRequest = 25,
    UnlockUserAchievementResponse = 26,
    ClearUserAchievementRequest = 27,
    ClearUserAchievementResponse = 28,
    DeleteUserAchievementsRequest = 29,
    DeleteUserAchievementsResponse = 30,
    GetLeaderboardsRequest = 31,
    GetLeaderboardsResponse = 32,
    GetLeaderboardEntriesGlobalRequest = 33,
    GetLeaderboardEntriesAroundUserRequest = 34,
    GetLeaderboardEntriesResponse = 36,
}

impl From<CommType> for u16 {
    fn from(t: CommType) -> u16 {
        t as u16
    }
}

impl TryFrom<u16> for CommType {
    type Error = u16;
    fn try_from(v: u16) -> Result<Self, u16> {
        match v {
            3 => Ok(Self::AuthInfoRequest),
            4 => Ok(Self::AuthInfoResponse),
            15 => Ok(Self::GetUserStatsRequest),
            16 => Ok(Self::GetUserStatsResponse),
            17 => Ok(Self::UpdateUserStatRequest),
            18 => Ok(Self::UpdateUserStatResponse),
            19 => Ok(Self::DeleteUserStatsRequest),
            20 => Ok(Self::DeleteUserStatsResponse),
            23 => Ok(Self::GetUserAchievementsRequest),
            24 => Ok(Self::GetUserAchievementsResponse),
            25 => Ok(Self::UnlockUserAchievementRequest),
            26 => Ok(Self::UnlockUserAchievementResponse),
            27 => Ok(Self::ClearUserAchievementRequest),
            28 => Ok(Self::ClearUserAchievementResponse),
            29 => Ok(Self::DeleteUserAchievementsRequest),
            30 => Ok(Self::DeleteUserAchievementsResponse),
            31 => Ok(Self::GetLeaderboardsRequest),
            32 => Ok(Self::GetLeaderboardsResponse),
            33 => Ok(Self::GetLeaderboardEntriesGlobalRequest),
            34 => Ok(Self::GetLeaderboardEntriesAroundUserRequest),
            36 => Ok(Self::GetLeaderboardEntriesResponse),
            other => Err(other),
        }
    }
}

/// Message types on the `WEBBROKER` channel.
///
/// The same ids are spoken on both legs of the bridge: the upstream push
/// endpoint and the local subscribe stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum BrokerType {
    AuthRequest = 1,
    AuthResponse = 2,
    SubscribeTopicRequest = 3,
    SubscribeTopicResponse = 4,
    MessageFromTopic = 5,
}

impl From<BrokerType> for u16 {
    fn from(t: BrokerType) -> u16 {
        t as u16
    }
}

impl TryFrom<u16> for BrokerType {
    type Error = u16;
    fn try_from(v: u16) -> Result<Self, u16> {
        match v {
            1 => Ok(Self::AuthRequest),
            2 => Ok(Self::AuthResponse),
            3 => Ok(Self::SubscribeTopicRequest),
            4 => Ok(Self::SubscribeTopicResponse),
            5 => Ok(Self::MessageFromTopic),
            other => Err(other),
        }
    }
}
