//! Account backend capability.
//!
//! Dispatch handlers consume these operations; the REST implementation
//! lives in [`rest`], token caching in [`token`]. Keeping the seam a trait
//! lets the dispatch and session layers be exercised against a mock.

pub mod rest;
pub mod token;

pub use rest::RestBackend;
pub use token::{TokenRecord, TokenStore};

use std::future::Future;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend returned status {0}")]
    Status(u32),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected backend payload: {0}")]
    Decode(String),

    #[error("client not identified")]
    NotIdentified,
}

impl BackendError {
    /// HTTP-like result code to surface on a response header.
    pub fn status_code(&self) -> u32 {
        match self {
            BackendError::Status(code) => *code,
            BackendError::Http(err) => err
                .status()
                .map(|s| u32::from(s.as_u16()))
                .unwrap_or(500),
            _ => 500,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Identity of the authenticated platform user.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: u64,
    pub username: String,
}

/// A stat value with its bounds. The two variants mirror the wire schema's
/// parallel `int_*` / `float_*` field sets.
#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Int {
        value: i32,
        default_value: Option<i32>,
        min_value: Option<i32>,
        max_value: Option<i32>,
        max_change: Option<i32>,
    },
    Float {
        value: f32,
        default_value: Option<f32>,
        min_value: Option<f32>,
        max_value: Option<f32>,
        max_change: Option<f32>,
    },
}

#[derive(Debug, Clone)]
pub struct Stat {
    pub stat_id: u64,
    pub key: String,
    pub window: Option<f64>,
    pub increment_only: bool,
    pub value: StatValue,
}

/// A new value for one stat, as carried by an update request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatUpdate {
    Int(i32),
    Float(f32),
}

#[derive(Debug, Clone)]
pub struct Achievement {
    pub achievement_id: u64,
    pub key: String,
    pub name: String,
    pub description: String,
    pub visible_while_locked: bool,
    pub image_url_locked: String,
    pub image_url_unlocked: String,
    pub rarity: f32,
    pub rarity_level_description: String,
    pub rarity_level_slug: String,
    /// RFC 3339 unlock date; `None` while locked.
    pub date_unlocked: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AchievementList {
    pub items: Vec<Achievement>,
    pub mode: String,
}

impl AchievementList {
    /// Whether the list holds an unlocked entry for the given id.
    pub fn is_unlocked(&self, achievement_id: u64) -> bool {
        self.items.iter().any(|a| {
            a.achievement_id == achievement_id
                && a.date_unlocked.as_deref().is_some_and(|d| !d.is_empty())
        })
    }
}

#[derive(Debug, Clone)]
pub struct SetAchievementOutcome {
    pub already_unlocked: bool,
}

#[derive(Debug, Clone)]
pub struct LeaderboardDef {
    pub id: u64,
    pub key: String,
    pub name: String,
    pub sort_method: String,
    pub display_type: String,
}

/// One leaderboard row; `user_id` is the bare backend id (untagged).
#[derive(Debug, Clone)]
pub struct LeaderboardRow {
    pub user_id: u64,
    pub score: i32,
    pub rank: u32,
}

#[derive(Debug, Clone, Default)]
pub struct EntriesPage {
    pub items: Vec<LeaderboardRow>,
    pub total: u32,
}

/// How a slice of leaderboard entries is selected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntriesSelector {
    Range {
        start: u32,
        end: u32,
    },
    AroundUser {
        user_id: u64,
        count_before: u32,
        count_after: u32,
    },
}

/// Operations the gateway consumes from the remote account/social service.
///
/// Futures are required to be `Send` so handlers can run inside spawned
/// session tasks.
pub trait AccountBackend: Send + Sync + 'static {
    /// Record the game client this session authenticated as. Subsequent
    /// calls are issued on behalf of this client.
    fn identify(&self, client_id: &str, client_secret: &str);

    fn obtain_token(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> impl Future<Output = BackendResult<TokenRecord>> + Send;

    fn get_user_info(&self) -> impl Future<Output = BackendResult<UserProfile>> + Send;

    fn get_user_stats(&self, user_id: u64)
        -> impl Future<Output = BackendResult<Vec<Stat>>> + Send;

    fn update_user_stat(
        &self,
        stat_id: u64,
        value: StatUpdate,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    fn delete_user_stats(&self) -> impl Future<Output = BackendResult<()>> + Send;

    fn get_user_achievements(
        &self,
        user_id: u64,
    ) -> impl Future<Output = BackendResult<AchievementList>> + Send;

    /// Set an achievement's unlock time; `unlock_time` of zero clears it.
    fn set_user_achievement(
        &self,
        achievement_id: u64,
        unlock_time: u32,
    ) -> impl Future<Output = BackendResult<SetAchievementOutcome>> + Send;

    fn delete_user_achievements(&self) -> impl Future<Output = BackendResult<()>> + Send;

    fn get_leaderboards(&self) -> impl Future<Output = BackendResult<Vec<LeaderboardDef>>> + Send;

    fn get_leaderboard_entries(
        &self,
        leaderboard_id: u64,
        selector: EntriesSelector,
    ) -> impl Future<Output = BackendResult<EntriesPage>> + Send;
}
