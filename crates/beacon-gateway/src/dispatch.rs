//! Message catalog and dispatcher.
//!
//! The catalog is an immutable table from `(channel, msg_type)` to handler,
//! built once at startup and injected into every session. An unknown key is
//! not an error: the protocol defines no "unsupported operation" reply, so
//! the frame is logged and dropped and the session stays open.

use crate::backend::AccountBackend;
use crate::handlers;
use crate::session::SessionContext;
use beacon_core::catalog::{BrokerType, CommType, CHANNEL_COMM, CHANNEL_WEBBROKER};
use beacon_core::{encode_frame, encode_payload, Frame, FrameHeader, ProtoError};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error, warn};

/// What a handler produced.
pub enum Outcome {
    /// A reply frame; `header.size` and `rseq` are filled in by the
    /// dispatcher before encoding.
    Reply {
        header: FrameHeader,
        payload: Vec<u8>,
    },
    /// No reply is defined for this message (or the operation's "not found"
    /// case applies).
    NoReply,
}

impl Outcome {
    pub fn reply<T: serde::Serialize>(
        header: FrameHeader,
        body: &T,
    ) -> Result<Self, HandlerError> {
        Ok(Outcome::Reply {
            header,
            payload: encode_payload(body)?,
        })
    }

    /// A reply carrying only a status code, with an empty payload.
    pub fn status_only(header: FrameHeader, status: u32) -> Self {
        Outcome::Reply {
            header: header.with_status(status),
            payload: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed payload: {0}")]
    Payload(#[from] ProtoError),
}

pub type HandlerResult = Result<Outcome, HandlerError>;

/// A catalog entry: borrows the request payload and the session for the
/// duration of the call.
pub type Handler<B> =
    for<'a> fn(&'a [u8], &'a SessionContext<B>) -> BoxFuture<'a, HandlerResult>;

pub struct Catalog<B> {
    handlers: HashMap<(u16, u16), Handler<B>>,
}

impl<B: AccountBackend> Catalog<B> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The full handler set the gateway serves.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        catalog.register_comm(CommType::AuthInfoRequest, handlers::comm::auth_info);
        catalog.register_comm(CommType::GetUserStatsRequest, handlers::comm::get_user_stats);
        catalog.register_comm(
            CommType::UpdateUserStatRequest,
            handlers::comm::update_user_stat,
        );
        catalog.register_comm(
            CommType::DeleteUserStatsRequest,
            handlers::comm::delete_user_stats,
        );
        catalog.register_comm(
            CommType::GetUserAchievementsRequest,
            handlers::comm::get_user_achievements,
        );
        catalog.register_comm(
            CommType::UnlockUserAchievementRequest,
            handlers::comm::unlock_user_achievement,
        );
        catalog.register_comm(
            CommType::ClearUserAchievementRequest,
            handlers::comm::clear_user_achievement,
        );
        catalog.register_comm(
            CommType::DeleteUserAchievementsRequest,
            handlers::comm::delete_user_achievements,
        );
        catalog.register_comm(
            CommType::GetLeaderboardsRequest,
            handlers::comm::get_leaderboards,
        );
        catalog.register_comm(
            CommType::GetLeaderboardEntriesGlobalRequest,
            handlers::comm::get_leaderboard_entries_global,
        );
        catalog.register_comm(
            CommType::GetLeaderboardEntriesAroundUserRequest,
            handlers::comm::get_leaderboard_entries_around_user,
        );
        catalog.register(
            CHANNEL_WEBBROKER,
            BrokerType::SubscribeTopicRequest.into(),
            handlers::broker::subscribe_topic,
        );
        catalog
    }

    pub fn register(&mut self, channel: u16, msg_type: u16, handler: Handler<B>) {
        self.handlers.insert((channel, msg_type), handler);
    }

    fn register_comm(&mut self, msg_type: CommType, handler: Handler<B>) {
        self.register(CHANNEL_COMM, msg_type.into(), handler);
    }

    /// Whether a handler exists for the key.
    pub fn resolves(&self, channel: u16, msg_type: u16) -> bool {
        self.handlers.contains_key(&(channel, msg_type))
    }

    /// Dispatch one inbound frame. Returns the encoded reply frame, if the
    /// handler produced one.
    pub async fn dispatch(&self, frame: &Frame, ctx: &SessionContext<B>) -> Option<Vec<u8>> {
        let Some(handler) = self.handlers.get(&frame.key()) else {
            debug!(
                channel = frame.header.channel,
                msg_type = frame.header.msg_type,
                "no handler for message, dropping"
            );
            return None;
        };

        match handler(&frame.payload, ctx).await {
            Ok(Outcome::Reply {
                mut header,
                payload,
            }) => {
                header.size = payload.len() as u32;
                if let Some(oseq) = frame.header.oseq {
                    header.rseq = Some(oseq);
                }
                match encode_frame(&header, &payload) {
                    Ok(bytes) => Some(bytes),
                    Err(err) => {
                        error!(error = %err, "failed to encode reply frame");
                        None
                    }
                }
            }
            Ok(Outcome::NoReply) => None,
            Err(err) => {
                warn!(
                    channel = frame.header.channel,
                    msg_type = frame.header.msg_type,
                    error = %err,
                    "handler rejected payload"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_context, MockBackend};
    use beacon_core::messages as msg;
    use beacon_core::{decode_frame, decode_payload};
    use std::sync::Arc;

    fn request_frame<T: serde::Serialize>(
        channel: u16,
        msg_type: u16,
        oseq: Option<u32>,
        body: &T,
    ) -> Frame {
        let payload = encode_payload(body).unwrap();
        let mut header = FrameHeader::new(channel, msg_type);
        header.size = payload.len() as u32;
        header.oseq = oseq;
        Frame { header, payload }
    }

    #[test]
    fn every_cataloged_key_resolves() {
        let catalog: Catalog<MockBackend> = Catalog::standard();
        for msg_type in [3u16, 15, 17, 19, 23, 25, 27, 29, 31, 33, 34] {
            assert!(catalog.resolves(CHANNEL_COMM, msg_type), "comm {msg_type}");
        }
        assert!(catalog.resolves(CHANNEL_WEBBROKER, 3));
    }

    #[tokio::test]
    async fn unknown_key_yields_no_reply() {
        let catalog: Catalog<MockBackend> = Catalog::standard();
        let (ctx, _rx) = test_context(Arc::new(MockBackend::default()));
        let frame = request_frame(99, 1, Some(5), &msg::GetLeaderboardsRequest {});
        assert!(catalog.dispatch(&frame, &ctx).await.is_none());
    }

    #[tokio::test]
    async fn reply_echoes_request_sequence() {
        let catalog: Catalog<MockBackend> = Catalog::standard();
        let backend = Arc::new(MockBackend::default());
        let (ctx, _rx) = test_context(backend);
        let frame = request_frame(
            CHANNEL_COMM,
            CommType::GetLeaderboardsRequest.into(),
            Some(1234),
            &msg::GetLeaderboardsRequest {},
        );

        let reply = catalog.dispatch(&frame, &ctx).await.unwrap();
        let decoded = decode_frame(&reply).unwrap();
        assert_eq!(decoded.header.rseq, Some(1234));
        assert_eq!(
            decoded.header.msg_type,
            u16::from(CommType::GetLeaderboardsResponse)
        );
        let body: msg::GetLeaderboardsResponse = decode_payload(&decoded.payload).unwrap();
        assert!(body.definitions.is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped() {
        let catalog: Catalog<MockBackend> = Catalog::standard();
        let (ctx, _rx) = test_context(Arc::new(MockBackend::default()));
        let frame = Frame {
            header: {
                let mut h = FrameHeader::new(CHANNEL_COMM, CommType::GetUserStatsRequest.into());
                h.size = 3;
                h
            },
            payload: vec![0xff, 0xfe, 0xfd],
        };
        assert!(catalog.dispatch(&frame, &ctx).await.is_none());
    }
}
