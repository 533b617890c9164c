//! Handlers for the push channel.
//!
//! The game client's own subscribe requests are acknowledged locally; the
//! actual upstream subscriptions are managed by the notification bridge.

use crate::backend::AccountBackend;
use crate::dispatch::{HandlerResult, Outcome};
use crate::session::SessionContext;
use beacon_core::catalog::BrokerType;
use beacon_core::messages as msg;
use beacon_core::{decode_payload, FrameHeader};
use futures_util::future::BoxFuture;
use tracing::debug;

pub fn subscribe_topic<'a, B: AccountBackend>(
    payload: &'a [u8],
    ctx: &'a SessionContext<B>,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let req: msg::SubscribeTopicRequest = decode_payload(payload)?;
        debug!(topic = %req.topic, "acknowledging local subscribe");
        ctx.topics().insert(req.topic.clone()).await;
        Outcome::reply(
            FrameHeader::broker(BrokerType::SubscribeTopicResponse),
            &msg::SubscribeTopicResponse { topic: req.topic },
        )
    })
}
