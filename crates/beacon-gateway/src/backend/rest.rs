//! REST implementation of the account backend.
//!
//! One instance exists per connection session; the token store and HTTP
//! client are shared across sessions. Bearer tokens are looked up through
//! the store and refreshed lazily when stale.

use super::token::{TokenRecord, TokenStore};
use super::{
    AccountBackend, Achievement, AchievementList, BackendError, BackendResult, EntriesPage,
    EntriesSelector, LeaderboardDef, LeaderboardRow, SetAchievementOutcome, Stat, StatUpdate,
    StatValue, UserProfile,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Base URLs of the remote service, from configuration.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub auth_url: String,
    pub gameplay_url: String,
    pub users_url: String,
}

pub struct RestBackend {
    http: reqwest::Client,
    tokens: Arc<TokenStore>,
    endpoints: Endpoints,
    /// Launcher-issued access token, used for the profile endpoint.
    session_token: String,
    /// The local platform user's id, used in gameplay write paths.
    user_id: u64,
    /// Game client this session authenticated as.
    client: Mutex<Option<(String, String)>>,
}

impl RestBackend {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<TokenStore>,
        endpoints: Endpoints,
        session_token: String,
        user_id: u64,
    ) -> Self {
        Self {
            http,
            tokens,
            endpoints,
            session_token,
            user_id,
            client: Mutex::new(None),
        }
    }

    fn client_id(&self) -> BackendResult<String> {
        self.client
            .lock()
            .expect("client lock poisoned")
            .as_ref()
            .map(|(id, _)| id.clone())
            .ok_or(BackendError::NotIdentified)
    }

    fn client_credentials(&self) -> BackendResult<(String, String)> {
        self.client
            .lock()
            .expect("client lock poisoned")
            .clone()
            .ok_or(BackendError::NotIdentified)
    }

    async fn fetch_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> BackendResult<TokenRecord> {
        let mut url = reqwest::Url::parse(&format!("{}/token", self.endpoints.auth_url))
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("client_secret", client_secret)
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", refresh_token)
            .append_pair("without_new_session", "1");

        let response = self.http.get(url).send().await?.error_for_status()?;
        let record: TokenRecord = response.json().await?;
        Ok(record)
    }

    /// Bearer token for gameplay calls on behalf of the identified client,
    /// refreshing the cached record when stale.
    async fn bearer(&self) -> BackendResult<String> {
        let (client_id, client_secret) = self.client_credentials()?;
        if let Some(record) = self.tokens.get(&client_id).await {
            if !record.is_stale() {
                return Ok(record.access_token);
            }
            debug!(client_id = %client_id, "cached token stale, refreshing");
        }
        let refresh = self.tokens.refresh_source(&client_id).await;
        let record = self.fetch_token(&client_id, &client_secret, &refresh).await?;
        let access = record.access_token.clone();
        self.tokens.insert(client_id, record).await;
        Ok(access)
    }

    fn gameplay_url(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.gameplay_url, path)
    }
}

// ── REST response shapes ────────────────────────────────────────────────

#[derive(Deserialize)]
struct UserDataDto {
    #[serde(rename = "userId")]
    user_id: String,
    username: String,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum FieldValueDto {
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

#[derive(Deserialize)]
struct StatDto {
    stat_id: String,
    stat_key: String,
    window: Option<f64>,
    increment_only: bool,
    #[serde(flatten)]
    values: FieldValueDto,
}

#[derive(Deserialize)]
struct StatsResponseDto {
    items: Vec<StatDto>,
}

#[derive(Deserialize)]
struct AchievementDto {
    achievement_id: String,
    achievement_key: String,
    name: String,
    description: String,
    visible: bool,
    image_url_locked: String,
    image_url_unlocked: String,
    #[serde(default)]
    rarity: f32,
    #[serde(default)]
    rarity_level_description: String,
    #[serde(default)]
    rarity_level_slug: String,
    date_unlocked: Option<String>,
}

#[derive(Deserialize)]
struct AchievementsResponseDto {
    items: Vec<AchievementDto>,
    achievements_mode: String,
}

#[derive(Deserialize)]
struct LeaderboardDefDto {
    id: String,
    key: String,
    name: String,
    sort_method: String,
    display_type: String,
}

#[derive(Deserialize)]
struct LeaderboardsResponseDto {
    items: Vec<LeaderboardDefDto>,
}

#[derive(Deserialize)]
struct LeaderboardEntryDto {
    user_id: String,
    score: i32,
    rank: u32,
}

#[derive(Deserialize)]
struct LeaderboardEntriesResponseDto {
    items: Vec<LeaderboardEntryDto>,
    leaderboard_entry_total_count: u32,
}

fn parse_id(value: &str) -> BackendResult<u64> {
    value
        .parse()
        .map_err(|_| BackendError::Decode(format!("non-numeric id {value:?}")))
}

impl AccountBackend for RestBackend {
    fn identify(&self, client_id: &str, client_secret: &str) {
        *self.client.lock().expect("client lock poisoned") =
            Some((client_id.to_string(), client_secret.to_string()));
    }

    async fn obtain_token(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> BackendResult<TokenRecord> {
        let refresh = self.tokens.refresh_source(client_id).await;
        let record = self.fetch_token(client_id, client_secret, &refresh).await?;
        self.tokens
            .insert(client_id.to_string(), record.clone())
            .await;
        Ok(record)
    }

    async fn get_user_info(&self) -> BackendResult<UserProfile> {
        let url = format!("{}/userData.json", self.endpoints.users_url);
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.session_token)
            .send()
            .await?
            .error_for_status()?;
        let data: UserDataDto = response.json().await?;
        Ok(UserProfile {
            user_id: parse_id(&data.user_id)?,
            username: data.username,
        })
    }

    async fn get_user_stats(&self, user_id: u64) -> BackendResult<Vec<Stat>> {
        let token = self.bearer().await?;
        let url = self.gameplay_url(&format!(
            "/clients/{}/users/{}/stats",
            self.client_id()?,
            user_id
        ));
        let response = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?;
        let data: StatsResponseDto = response.json().await?;

        data.items
            .into_iter()
            .map(|dto| {
                let value = match dto.values {
                    FieldValueDto::Int {
                        value,
                        default_value,
                        min_value,
                        max_value,
                        max_change,
                    } => StatValue::Int {
                        value,
                        default_value,
                        min_value,
                        max_value,
                        max_change,
                    },
                    FieldValueDto::Float {
                        value,
                        default_value,
                        min_value,
                        max_value,
                        max_change,
                    } => StatValue::Float {
                        value,
                        default_value,
                        min_value,
                        max_value,
                        max_change,
                    },
                };
                Ok(Stat {
                    stat_id: parse_id(&dto.stat_id)?,
                    key: dto.stat_key,
                    window: dto.window,
                    increment_only: dto.increment_only,
                    value,
                })
            })
            .collect()
    }

    async fn update_user_stat(&self, stat_id: u64, value: StatUpdate) -> BackendResult<()> {
        let token = self.bearer().await?;
        let url = self.gameplay_url(&format!(
            "/clients/{}/users/{}/stats/{}",
            self.client_id()?,
            self.user_id,
            stat_id
        ));
        let body = match value {
            StatUpdate::Int(v) => serde_json::json!({ "value": v }),
            StatUpdate::Float(v) => serde_json::json!({ "value": v }),
        };
        self.http
            .post(url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_user_stats(&self) -> BackendResult<()> {
        let token = self.bearer().await?;
        let url = self.gameplay_url(&format!(
            "/clients/{}/users/{}/stats",
            self.client_id()?,
            self.user_id
        ));
        self.http
            .delete(url)
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn get_user_achievements(&self, user_id: u64) -> BackendResult<AchievementList> {
        let token = self.bearer().await?;
        let url = self.gameplay_url(&format!(
            "/clients/{}/users/{}/achievements",
            self.client_id()?,
            user_id
        ));
        let response = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?;
        let data: AchievementsResponseDto = response.json().await?;

        let items = data
            .items
            .into_iter()
            .map(|dto| {
                Ok(Achievement {
                    achievement_id: parse_id(&dto.achievement_id)?,
                    key: dto.achievement_key,
                    name: dto.name,
                    description: dto.description,
                    visible_while_locked: dto.visible,
                    image_url_locked: dto.image_url_locked,
                    image_url_unlocked: dto.image_url_unlocked,
                    rarity: dto.rarity,
                    rarity_level_description: dto.rarity_level_description,
                    rarity_level_slug: dto.rarity_level_slug,
                    date_unlocked: dto.date_unlocked,
                })
            })
            .collect::<BackendResult<Vec<_>>>()?;

        Ok(AchievementList {
            items,
            mode: data.achievements_mode,
        })
    }

    async fn set_user_achievement(
        &self,
        achievement_id: u64,
        unlock_time: u32,
    ) -> BackendResult<SetAchievementOutcome> {
        let token = self.bearer().await?;
        let url = self.gameplay_url(&format!(
            "/clients/{}/users/{}/achievements/{}",
            self.client_id()?,
            self.user_id,
            achievement_id
        ));
        let date_unlocked = if unlock_time == 0 {
            None
        } else {
            DateTime::<Utc>::from_timestamp(i64::from(unlock_time), 0)
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "date_unlocked": date_unlocked }))
            .send()
            .await?;

        // A conflict means the unlock date was already set upstream.
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Ok(SetAchievementOutcome {
                already_unlocked: true,
            });
        }
        response.error_for_status()?;
        Ok(SetAchievementOutcome {
            already_unlocked: false,
        })
    }

    async fn delete_user_achievements(&self) -> BackendResult<()> {
        let token = self.bearer().await?;
        let url = self.gameplay_url(&format!(
            "/clients/{}/users/{}/achievements",
            self.client_id()?,
            self.user_id
        ));
        self.http
            .delete(url)
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn get_leaderboards(&self) -> BackendResult<Vec<LeaderboardDef>> {
        let token = self.bearer().await?;
        let url = self.gameplay_url(&format!("/clients/{}/leaderboards", self.client_id()?));
        let response = self
            .http
            .get(url)
            .bearer_auth(&token)
            .header("Accept-Language", "en-US")
            .send()
            .await?
            .error_for_status()?;
        let data: LeaderboardsResponseDto = response.json().await?;
        debug!(count = data.items.len(), "fetched leaderboard definitions");

        data.items
            .into_iter()
            .map(|dto| {
                Ok(LeaderboardDef {
                    id: parse_id(&dto.id)?,
                    key: dto.key,
                    name: dto.name,
                    sort_method: dto.sort_method,
                    display_type: dto.display_type,
                })
            })
            .collect()
    }

    async fn get_leaderboard_entries(
        &self,
        leaderboard_id: u64,
        selector: EntriesSelector,
    ) -> BackendResult<EntriesPage> {
        let token = self.bearer().await?;
        let raw = self.gameplay_url(&format!(
            "/clients/{}/leaderboards/{}/entries",
            self.client_id()?,
            leaderboard_id
        ));
        let mut url =
            reqwest::Url::parse(&raw).map_err(|e| BackendError::Decode(e.to_string()))?;
        match selector {
            EntriesSelector::Range { start, end } => {
                url.query_pairs_mut()
                    .append_pair("range_start", &start.to_string())
                    .append_pair("range_end", &end.to_string());
            }
            EntriesSelector::AroundUser {
                user_id,
                count_before,
                count_after,
            } => {
                url.query_pairs_mut()
                    .append_pair("user", &user_id.to_string())
                    .append_pair("count_before", &count_before.to_string())
                    .append_pair("count_after", &count_after.to_string());
            }
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?;
        let data: LeaderboardEntriesResponseDto = response.json().await?;

        let items = data
            .items
            .into_iter()
            .map(|dto| {
                Ok(LeaderboardRow {
                    user_id: parse_id(&dto.user_id)?,
                    score: dto.score,
                    rank: dto.rank,
                })
            })
            .collect::<BackendResult<Vec<_>>>()?;

        Ok(EntriesPage {
            items,
            total: data.leaderboard_entry_total_count,
        })
    }
}
