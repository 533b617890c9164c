//! Notification bridge.
//!
//! A per-session WebSocket client to the remote push endpoint. It
//! authenticates once with the launcher access token, subscribes to a fixed
//! startup topic set, and forwards every topic message byte-for-byte onto
//! the owning session's outbound writer — the client parses the forwarded
//! bytes as its own instance of the same frame format. The bridge never
//! initiates session shutdown; it is torn down through the session's stop
//! signal.

use crate::session::{FrameWriter, TopicSet};
use beacon_core::catalog::{BrokerType, CHANNEL_WEBBROKER};
use beacon_core::messages as msg;
use beacon_core::{decode_frame, decode_payload, encode_frame, encode_payload, FrameHeader, ProtoError};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

/// Topics subscribed right after a successful push authorization.
pub const STARTUP_TOPICS: [&str; 3] = ["chat", "friends", "presence"];

/// Idle interval before probing the upstream connection.
const KEEPALIVE: Duration = Duration::from_secs(60);

/// Redial attempts before the bridge gives up on the endpoint.
const REDIAL_ATTEMPTS: u32 = 5;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
enum BridgeError {
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Proto(#[from] ProtoError),
}

pub struct NotificationBridge {
    endpoint: String,
    access_token: String,
    writer: Arc<FrameWriter>,
    topics: Arc<TopicSet>,
}

impl NotificationBridge {
    pub fn new(
        endpoint: String,
        access_token: String,
        writer: Arc<FrameWriter>,
        topics: Arc<TopicSet>,
    ) -> Self {
        Self {
            endpoint,
            access_token,
            writer,
            topics,
        }
    }

    /// Run until the owning session signals teardown. Upstream connection
    /// loss triggers bounded redialing; giving up leaves the session
    /// without push messages but otherwise intact.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        loop {
            if *stop.borrow() {
                break;
            }
            let Some(ws) = self.connect_with_retries(&mut stop).await else {
                break;
            };
            if !self.drive(ws, &mut stop).await {
                break;
            }
            tokio::select! {
                _ = sleep(Duration::from_secs(5)) => {}
                _ = stop.changed() => break,
            }
        }
        debug!("notification bridge stopped");
    }

    async fn connect_with_retries(&self, stop: &mut watch::Receiver<bool>) -> Option<WsStream> {
        let mut retries = REDIAL_ATTEMPTS;
        loop {
            match self.connect_and_auth().await {
                Ok(ws) => return Some(ws),
                Err(err) if retries == 0 => {
                    error!(error = %err, "giving up on push endpoint");
                    return None;
                }
                Err(err) => {
                    retries -= 1;
                    warn!(error = %err, retries, "push endpoint connect failed, retrying");
                    tokio::select! {
                        _ = sleep(Duration::from_secs(3)) => {}
                        _ = stop.changed() => return None,
                    }
                }
            }
        }
    }

    async fn connect_and_auth(&self) -> Result<WsStream, BridgeError> {
        let (mut ws, _) = connect_async(self.endpoint.as_str()).await?;
        info!("connected to push endpoint");

        let body = encode_payload(&msg::BrokerAuthRequest {
            auth_token: format!("Bearer {}", self.access_token),
        })?;
        let oseq = rand::thread_rng().gen_range(10_000..10_000_000);
        let mut header = FrameHeader::broker(BrokerType::AuthRequest).with_oseq(oseq);
        header.size = body.len() as u32;
        let frame = encode_frame(&header, &body)?;

        ws.send(Message::Binary(frame.into())).await?;
        debug!("sent push authorization");
        Ok(ws)
    }

    /// Drive one upstream connection. Returns `true` when the connection
    /// was lost and a redial should be attempted, `false` on teardown.
    async fn drive(&self, mut ws: WsStream, stop: &mut watch::Receiver<bool>) -> bool {
        let mut pending_ping = false;
        loop {
            let message = tokio::select! {
                msg = ws.next() => {
                    match msg {
                        Some(msg) => msg,
                        None => {
                            debug!("push connection reset");
                            return true;
                        }
                    }
                }
                _ = sleep(KEEPALIVE) => {
                    if pending_ping {
                        warn!("push endpoint went silent, reconnecting");
                        return true;
                    }
                    if ws.send(Message::Ping(Vec::new().into())).await.is_err() {
                        return true;
                    }
                    pending_ping = true;
                    continue;
                }
                _ = stop.changed() => {
                    let _ = ws.close(None).await;
                    return false;
                }
            };

            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    error!(error = %err, "error reading push message");
                    continue;
                }
            };

            match message {
                Message::Binary(data) => self.handle_binary(&mut ws, &data).await,
                Message::Ping(payload) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                }
                Message::Pong(_) => {
                    trace!("keepalive pong");
                    pending_ping = false;
                }
                Message::Close(_) => {
                    debug!("push endpoint closed the connection");
                    return true;
                }
                _ => {}
            }
        }
    }

    async fn handle_binary(&self, ws: &mut WsStream, data: &[u8]) {
        let frame = match decode_frame(data) {
            Ok(frame) => frame,
            Err(err) => {
                error!(error = %err, "unparseable push message, skipping");
                return;
            }
        };
        if frame.header.channel != CHANNEL_WEBBROKER {
            warn!(
                channel = frame.header.channel,
                "push message on unexpected channel"
            );
        }

        match BrokerType::try_from(frame.header.msg_type) {
            Ok(BrokerType::AuthResponse) => {
                if frame.header.status == Some(200) {
                    info!("push authorization accepted, subscribing to startup topics");
                    if let Err(err) = self.send_subscriptions(ws).await {
                        error!(error = %err, "failed to send topic subscriptions");
                    }
                } else {
                    warn!(status = ?frame.header.status, "push authorization rejected");
                }
            }
            Ok(BrokerType::SubscribeTopicResponse) => {
                match decode_payload::<msg::SubscribeTopicResponse>(&frame.payload) {
                    Ok(response) => {
                        info!(topic = %response.topic, "subscribed to topic");
                        self.topics.insert(response.topic).await;
                    }
                    Err(err) => error!(error = %err, "bad subscribe response payload"),
                }
            }
            Ok(BrokerType::MessageFromTopic) => {
                // Forward the received frame unmodified; no re-encoding, no
                // re-validation.
                if let Err(err) = self.writer.write_frame(data).await {
                    error!(error = %err, "failed to forward topic message");
                } else {
                    debug!("forwarded topic message");
                }
            }
            _ => {
                warn!(msg_type = frame.header.msg_type, "unhandled push message type");
            }
        }
    }

    async fn send_subscriptions(&self, ws: &mut WsStream) -> Result<(), BridgeError> {
        let mut oseq = 1020;
        for topic in STARTUP_TOPICS {
            let body = encode_payload(&msg::SubscribeTopicRequest {
                topic: topic.to_string(),
            })?;
            let mut header = FrameHeader::broker(BrokerType::SubscribeTopicRequest).with_oseq(oseq);
            oseq += 1;
            header.size = body.len() as u32;
            let frame = encode_frame(&header, &body)?;
            ws.feed(Message::Binary(frame.into())).await?;
        }
        ws.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::FrameDecoder;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn broker_frame(
        msg_type: BrokerType,
        status: Option<u32>,
        body: &impl serde::Serialize,
    ) -> Vec<u8> {
        let payload = encode_payload(body).unwrap();
        let mut header = FrameHeader::broker(msg_type);
        header.size = payload.len() as u32;
        header.status = status;
        encode_frame(&header, &payload).unwrap()
    }

    /// Fake upstream: accepts one connection, answers the auth and
    /// subscribe sequence, then pushes one topic message.
    async fn fake_push_endpoint(listener: TcpListener, topic_message: Vec<u8>) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // Auth request carries a bearer token and an oseq.
        let auth = match ws.next().await.unwrap().unwrap() {
            Message::Binary(data) => decode_frame(&data).unwrap(),
            other => panic!("expected binary auth frame, got {other:?}"),
        };
        assert_eq!(auth.header.msg_type, u16::from(BrokerType::AuthRequest));
        assert!(auth.header.oseq.is_some());
        let body: msg::BrokerAuthRequest = decode_payload(&auth.payload).unwrap();
        assert!(body.auth_token.starts_with("Bearer "));

        let ok = broker_frame(BrokerType::AuthResponse, Some(200), &());
        ws.send(Message::Binary(ok.into())).await.unwrap();

        // One subscribe per startup topic, acknowledged in order.
        for expected in STARTUP_TOPICS {
            let sub = match ws.next().await.unwrap().unwrap() {
                Message::Binary(data) => decode_frame(&data).unwrap(),
                other => panic!("expected binary subscribe frame, got {other:?}"),
            };
            let body: msg::SubscribeTopicRequest = decode_payload(&sub.payload).unwrap();
            assert_eq!(body.topic, expected);
            let ack = broker_frame(
                BrokerType::SubscribeTopicResponse,
                None,
                &msg::SubscribeTopicResponse {
                    topic: body.topic.clone(),
                },
            );
            ws.send(Message::Binary(ack.into())).await.unwrap();
        }

        ws.send(Message::Binary(topic_message.into())).await.unwrap();

        // Hold the connection open until the bridge is torn down.
        while ws.next().await.is_some() {}
    }

    #[tokio::test]
    async fn bridge_authenticates_subscribes_and_forwards() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let topic_message = broker_frame(
            BrokerType::MessageFromTopic,
            None,
            &msg::SubscribeTopicResponse {
                topic: "presence".into(),
            },
        );
        let upstream = tokio::spawn(fake_push_endpoint(listener, topic_message.clone()));

        let (ours, mut theirs) = tokio::io::duplex(64 * 1024);
        let writer = Arc::new(FrameWriter::new(ours));
        let topics = Arc::new(TopicSet::new());
        let bridge = NotificationBridge::new(
            format!("ws://{addr}"),
            "token".into(),
            writer,
            topics.clone(),
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let bridge_task = tokio::spawn(bridge.run(stop_rx));

        // The forwarded bytes must be exactly the upstream frame.
        let mut forwarded = vec![0u8; topic_message.len()];
        theirs.read_exact(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, topic_message);

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&forwarded).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].header.msg_type,
            u16::from(BrokerType::MessageFromTopic)
        );

        for topic in STARTUP_TOPICS {
            assert!(topics.contains(topic).await, "missing topic {topic}");
        }

        stop_tx.send(true).unwrap();
        bridge_task.await.unwrap();
        upstream.abort();
    }
}
