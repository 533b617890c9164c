//! Handlers for the request/response channel.
//!
//! Backend failures are non-fatal: they surface as a status code on an
//! otherwise well-formed response header, and the session continues. The
//! only operations that omit the response entirely are the "not found"
//! cases for which the protocol defines no error-capable reply.

use crate::backend::{
    AccountBackend, Achievement, EntriesSelector, Stat, StatUpdate, StatValue,
};
use crate::dispatch::{HandlerResult, Outcome};
use crate::session::SessionContext;
use beacon_core::catalog::CommType;
use beacon_core::messages as msg;
use beacon_core::{decode_payload, ident, FrameHeader};
use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

pub fn auth_info<'a, B: AccountBackend>(
    payload: &'a [u8],
    ctx: &'a SessionContext<B>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let req: msg::AuthInfoRequest = decode_payload(payload)?;
        ctx.identify(&req.client_id).await;
        ctx.backend().identify(&req.client_id, &req.client_secret);
        info!(client_id = %req.client_id, game_pid = req.game_pid, "client identified");

        // The token grant and the profile fetch are independent calls;
        // issue them together.
        let (token, profile) = tokio::join!(
            ctx.backend().obtain_token(&req.client_id, &req.client_secret),
            ctx.backend().get_user_info(),
        );

        let mut header = FrameHeader::comm(CommType::AuthInfoResponse);
        let refresh_token = match token {
            Ok(record) => record.refresh_token,
            Err(err) => {
                warn!(client_id = %req.client_id, error = %err, "token grant failed");
                header.status = Some(err.status_code());
                String::new()
            }
        };
        let (user_id, user_name) = match profile {
            Ok(profile) => (profile.user_id, profile.username),
            Err(err) => {
                warn!(error = %err, "profile fetch failed");
                if header.status.is_none() {
                    header.status = Some(err.status_code());
                }
                (0, String::new())
            }
        };

        Outcome::reply(
            header,
            &msg::AuthInfoResponse {
                refresh_token,
                environment_type: msg::ENVIRONMENT_PRODUCTION,
                user_id,
                user_name,
                region: msg::REGION_WORLD_WIDE,
            },
        )
    })
}

pub fn get_user_stats<'a, B: AccountBackend>(
    payload: &'a [u8],
    ctx: &'a SessionContext<B>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let req: msg::GetUserStatsRequest = decode_payload(payload)?;
        let user_id = ident::strip_user_id(req.user_id);

        let stats = match ctx.backend().get_user_stats(user_id).await {
            Ok(stats) => stats,
            Err(err) if err.status_code() == 404 => return Ok(Outcome::NoReply),
            Err(err) => {
                warn!(user_id, error = %err, "stats fetch failed");
                return Ok(Outcome::status_only(
                    FrameHeader::comm(CommType::GetUserStatsResponse),
                    err.status_code(),
                ));
            }
        };
        // No reply exists for "this user has no stats".
        if stats.is_empty() {
            return Ok(Outcome::NoReply);
        }

        Outcome::reply(
            FrameHeader::comm(CommType::GetUserStatsResponse),
            &msg::GetUserStatsResponse {
                user_stats: stats.into_iter().map(wire_stat).collect(),
            },
        )
    })
}

pub fn update_user_stat<'a, B: AccountBackend>(
    payload: &'a [u8],
    ctx: &'a SessionContext<B>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let req: msg::UpdateUserStatRequest = decode_payload(payload)?;
        let value = match req.value_type {
            msg::ValueType::Int => StatUpdate::Int(req.int_value),
            msg::ValueType::Float => StatUpdate::Float(req.float_value),
        };

        let mut header = FrameHeader::comm(CommType::UpdateUserStatResponse);
        if let Err(err) = ctx.backend().update_user_stat(req.stat_id, value).await {
            warn!(stat_id = req.stat_id, error = %err, "stat update failed");
            header.status = Some(err.status_code());
        }
        Outcome::reply(header, &msg::UpdateUserStatResponse {})
    })
}

pub fn delete_user_stats<'a, B: AccountBackend>(
    payload: &'a [u8],
    ctx: &'a SessionContext<B>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let _req: msg::DeleteUserStatsRequest = decode_payload(payload)?;
        let status = match ctx.backend().delete_user_stats().await {
            Ok(()) => 200,
            Err(err) => {
                warn!(error = %err, "stats delete failed");
                err.status_code()
            }
        };
        Outcome::reply(
            FrameHeader::comm(CommType::DeleteUserStatsResponse).with_status(status),
            &msg::DeleteUserStatsResponse {},
        )
    })
}

pub fn get_user_achievements<'a, B: AccountBackend>(
    payload: &'a [u8],
    ctx: &'a SessionContext<B>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let req: msg::GetUserAchievementsRequest = decode_payload(payload)?;
        let user_id = ident::strip_user_id(req.user_id);

        match ctx.backend().get_user_achievements(user_id).await {
            Ok(list) => {
                ctx.store_achievements(list.clone()).await;
                Outcome::reply(
                    FrameHeader::comm(CommType::GetUserAchievementsResponse),
                    &msg::GetUserAchievementsResponse {
                        user_achievements: list.items.iter().map(wire_achievement).collect(),
                        language: "en-US".into(),
                        achievements_mode: list.mode,
                    },
                )
            }
            Err(err) => {
                warn!(user_id, error = %err, "achievements fetch failed");
                Ok(Outcome::status_only(
                    FrameHeader::comm(CommType::GetUserAchievementsResponse),
                    err.status_code(),
                ))
            }
        }
    })
}

pub fn unlock_user_achievement<'a, B: AccountBackend>(
    payload: &'a [u8],
    ctx: &'a SessionContext<B>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let req: msg::UnlockUserAchievementRequest = decode_payload(payload)?;

        // Idempotence short-circuit: an unlock the cache already knows
        // about produces a success reply without a backend call.
        if ctx.is_unlocked_in_cache(req.achievement_id).await {
            debug!(
                achievement_id = req.achievement_id,
                "achievement already unlocked"
            );
            return Outcome::reply(
                FrameHeader::comm(CommType::UnlockUserAchievementResponse),
                &msg::UnlockUserAchievementResponse {
                    already_unlocked: true,
                },
            );
        }

        let mut header = FrameHeader::comm(CommType::UnlockUserAchievementResponse);
        let mut already_unlocked = false;
        match ctx
            .backend()
            .set_user_achievement(req.achievement_id, req.time)
            .await
        {
            Ok(outcome) => {
                already_unlocked = outcome.already_unlocked;
                info!(achievement_id = req.achievement_id, "achievement unlocked");
                refresh_achievement_cache(ctx).await;
            }
            Err(err) => {
                warn!(achievement_id = req.achievement_id, error = %err, "unlock failed");
                header.status = Some(err.status_code());
            }
        }

        Outcome::reply(
            header,
            &msg::UnlockUserAchievementResponse { already_unlocked },
        )
    })
}

pub fn clear_user_achievement<'a, B: AccountBackend>(
    payload: &'a [u8],
    ctx: &'a SessionContext<B>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let req: msg::ClearUserAchievementRequest = decode_payload(payload)?;

        // No short-circuit here: clearing always goes to the backend.
        let mut header = FrameHeader::comm(CommType::ClearUserAchievementResponse);
        if let Err(err) = ctx.backend().set_user_achievement(req.achievement_id, 0).await {
            warn!(achievement_id = req.achievement_id, error = %err, "clear failed");
            header.status = Some(err.status_code());
        }
        refresh_achievement_cache(ctx).await;

        Outcome::reply(header, &msg::ClearUserAchievementResponse {})
    })
}

pub fn delete_user_achievements<'a, B: AccountBackend>(
    payload: &'a [u8],
    ctx: &'a SessionContext<B>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let _req: msg::DeleteUserAchievementsRequest = decode_payload(payload)?;
        let status = match ctx.backend().delete_user_achievements().await {
            Ok(()) => {
                ctx.invalidate_achievements().await;
                200
            }
            Err(err) => {
                warn!(error = %err, "achievements delete failed");
                err.status_code()
            }
        };
        Outcome::reply(
            FrameHeader::comm(CommType::DeleteUserAchievementsResponse).with_status(status),
            &msg::DeleteUserAchievementsResponse {},
        )
    })
}

pub fn get_leaderboards<'a, B: AccountBackend>(
    payload: &'a [u8],
    ctx: &'a SessionContext<B>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let _req: msg::GetLeaderboardsRequest = decode_payload(payload)?;
        match ctx.backend().get_leaderboards().await {
            Ok(defs) => Outcome::reply(
                FrameHeader::comm(CommType::GetLeaderboardsResponse),
                &msg::GetLeaderboardsResponse {
                    definitions: defs
                        .into_iter()
                        .map(|def| msg::LeaderboardDefinition {
                            leaderboard_id: def.id,
                            key: def.key,
                            name: def.name,
                            sort_method: wire_sort_method(&def.sort_method),
                            display_type: wire_display_type(&def.display_type),
                        })
                        .collect(),
                },
            ),
            Err(err) => {
                warn!(error = %err, "leaderboards fetch failed");
                Ok(Outcome::status_only(
                    FrameHeader::comm(CommType::GetLeaderboardsResponse),
                    err.status_code(),
                ))
            }
        }
    })
}

pub fn get_leaderboard_entries_global<'a, B: AccountBackend>(
    payload: &'a [u8],
    ctx: &'a SessionContext<B>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let req: msg::GetLeaderboardEntriesGlobalRequest = decode_payload(payload)?;
        leaderboard_entries_reply(
            ctx,
            req.leaderboard_id,
            EntriesSelector::Range {
                start: req.range_start,
                end: req.range_end,
            },
        )
        .await
    })
}

pub fn get_leaderboard_entries_around_user<'a, B: AccountBackend>(
    payload: &'a [u8],
    ctx: &'a SessionContext<B>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let req: msg::GetLeaderboardEntriesAroundUserRequest = decode_payload(payload)?;
        leaderboard_entries_reply(
            ctx,
            req.leaderboard_id,
            EntriesSelector::AroundUser {
                user_id: ident::strip_user_id(req.user_id),
                count_before: req.count_before,
                count_after: req.count_after,
            },
        )
        .await
    })
}

// ── shared pieces ───────────────────────────────────────────────────────

async fn leaderboard_entries_reply<B: AccountBackend>(
    ctx: &SessionContext<B>,
    leaderboard_id: u64,
    selector: EntriesSelector,
) -> HandlerResult {
    let header = FrameHeader::comm(CommType::GetLeaderboardEntriesResponse);
    match ctx
        .backend()
        .get_leaderboard_entries(leaderboard_id, selector)
        .await
    {
        Ok(page) => Outcome::reply(
            header,
            &msg::GetLeaderboardEntriesResponse {
                entries: page
                    .items
                    .iter()
                    .map(|row| msg::LeaderboardEntry {
                        user_id: ident::tag_user_id(row.user_id),
                        score: row.score,
                        rank: row.rank,
                    })
                    .collect(),
                leaderboard_entry_total_count: page.total,
            },
        ),
        Err(err) => {
            warn!(leaderboard_id, error = %err, "leaderboard entries fetch failed");
            Ok(Outcome::status_only(header, err.status_code()))
        }
    }
}

/// Re-fetch the achievement list for the local user to keep the unlock
/// cache current. A fetch failure only leaves the cache as it was.
async fn refresh_achievement_cache<B: AccountBackend>(ctx: &SessionContext<B>) {
    match ctx.backend().get_user_achievements(ctx.user_id()).await {
        Ok(list) => ctx.store_achievements(list).await,
        Err(err) => warn!(error = %err, "achievement cache refresh failed"),
    }
}

/// Populate the field set selected by the stat's value type; the other set
/// stays at its zero values.
fn wire_stat(stat: Stat) -> msg::UserStat {
    let mut wire = msg::UserStat {
        stat_id: stat.stat_id,
        key: stat.key,
        window_size: stat.window.unwrap_or(0.0),
        increment_only: stat.increment_only,
        ..Default::default()
    };
    match stat.value {
        StatValue::Int {
            value,
            default_value,
            min_value,
            max_value,
            max_change,
        } => {
            wire.value_type = msg::ValueType::Int;
            wire.int_value = value;
            wire.int_default_value = default_value.unwrap_or(0);
            wire.int_min_value = min_value.unwrap_or(0);
            wire.int_max_value = max_value.unwrap_or(0);
            wire.int_max_change = max_change.unwrap_or(0);
        }
        StatValue::Float {
            value,
            default_value,
            min_value,
            max_value,
            max_change,
        } => {
            wire.value_type = msg::ValueType::Float;
            wire.float_value = value;
            wire.float_default_value = default_value.unwrap_or(0.0);
            wire.float_min_value = min_value.unwrap_or(0.0);
            wire.float_max_value = max_value.unwrap_or(0.0);
            wire.float_max_change = max_change.unwrap_or(0.0);
        }
    }
    wire
}

fn wire_achievement(achievement: &Achievement) -> msg::UserAchievement {
    let unlock_time = achievement
        .date_unlocked
        .as_deref()
        .and_then(|date| chrono::DateTime::parse_from_rfc3339(date).ok())
        .map(|date| date.timestamp() as u32)
        .unwrap_or(0);
    msg::UserAchievement {
        achievement_id: achievement.achievement_id,
        key: achievement.key.clone(),
        name: achievement.name.clone(),
        description: achievement.description.clone(),
        visible_while_locked: achievement.visible_while_locked,
        image_url_locked: achievement.image_url_locked.clone(),
        image_url_unlocked: achievement.image_url_unlocked.clone(),
        unlock_time,
        rarity: achievement.rarity,
        rarity_level_description: achievement.rarity_level_description.clone(),
        rarity_level_slug: achievement.rarity_level_slug.clone(),
    }
}

fn wire_sort_method(raw: &str) -> u32 {
    match raw {
        "asc" | "ascending" => msg::SORT_METHOD_ASCENDING,
        "desc" | "descending" => msg::SORT_METHOD_DESCENDING,
        _ => 0,
    }
}

fn wire_display_type(raw: &str) -> u32 {
    match raw {
        "numeric" => msg::DISPLAY_TYPE_NUMERIC,
        "time_seconds" | "seconds" => msg::DISPLAY_TYPE_TIME_SECONDS,
        "time_milliseconds" | "milliseconds" => msg::DISPLAY_TYPE_TIME_MILLISECONDS,
        _ => 0,
    }
}
