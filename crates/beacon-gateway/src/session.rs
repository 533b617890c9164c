//! Per-connection session state and the read/dispatch loop.
//!
//! One session owns one accepted socket. All frames leaving the socket,
//! whether request responses or bridged push notifications, pass through
//! the session's [`FrameWriter`], which serializes writes so one frame's
//! bytes are never interleaved with another's.

use crate::backend::{AccountBackend, AchievementList};
use crate::dispatch::Catalog;
use beacon_core::codec;
use beacon_core::ProtoError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, trace};

/// How long one read-loop iteration waits for the next length prefix.
/// A timeout is a scheduling tick, not an error.
const READ_TICK: Duration = Duration::from_secs(10);

/// Serialized writer over the session's outbound socket half.
///
/// Shared between the dispatch path and the notification bridge; a frame
/// write is a single locked `write_all`, which is what keeps concurrent
/// writers from interleaving frame bytes on the wire.
pub struct FrameWriter {
    sink: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl FrameWriter {
    pub fn new(sink: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(sink)),
        }
    }

    /// Write one fully encoded frame as a unit.
    pub async fn write_frame(&self, frame: &[u8]) -> std::io::Result<()> {
        let mut sink = self.sink.lock().await;
        sink.write_all(frame).await?;
        sink.flush().await
    }
}

/// Topics the bridge has confirmed subscriptions for.
#[derive(Default)]
pub struct TopicSet {
    topics: Mutex<HashSet<String>>,
}

impl TopicSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, topic: String) {
        self.topics.lock().await.insert(topic);
    }

    pub async fn contains(&self, topic: &str) -> bool {
        self.topics.lock().await.contains(topic)
    }
}

/// State shared by the read loop, the dispatch handlers, and the bridge.
pub struct SessionContext<B> {
    writer: Arc<FrameWriter>,
    backend: Arc<B>,
    topics: Arc<TopicSet>,
    /// The local platform user's id, from startup identity.
    user_id: u64,
    /// Game client id, present once `AuthInfoRequest` has been handled.
    client_id: Mutex<Option<String>>,
    /// Most recently fetched achievement list; replaced wholesale on every
    /// fetch, consulted by the unlock short-circuit.
    achievements: Mutex<Option<AchievementList>>,
    closed: AtomicBool,
}

impl<B: AccountBackend> SessionContext<B> {
    pub fn new(
        writer: Arc<FrameWriter>,
        backend: Arc<B>,
        topics: Arc<TopicSet>,
        user_id: u64,
    ) -> Self {
        Self {
            writer,
            backend,
            topics,
            user_id,
            client_id: Mutex::new(None),
            achievements: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn writer(&self) -> &FrameWriter {
        &self.writer
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub async fn identify(&self, client_id: &str) {
        *self.client_id.lock().await = Some(client_id.to_string());
    }

    pub async fn client_id(&self) -> Option<String> {
        self.client_id.lock().await.clone()
    }

    pub async fn cached_achievements(&self) -> Option<AchievementList> {
        self.achievements.lock().await.clone()
    }

    /// Replace the achievement cache with a freshly fetched list.
    pub async fn store_achievements(&self, list: AchievementList) {
        *self.achievements.lock().await = Some(list);
    }

    /// Drop the cache entirely (after a backend-side wipe).
    pub async fn invalidate_achievements(&self) {
        *self.achievements.lock().await = None;
    }

    /// Whether the cache already holds an unlocked entry for the id.
    pub async fn is_unlocked_in_cache(&self, achievement_id: u64) -> bool {
        self.achievements
            .lock()
            .await
            .as_ref()
            .is_some_and(|list| list.is_unlocked(achievement_id))
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Run the read/dispatch loop until the peer closes, a transport error
/// occurs, or shutdown is signalled.
///
/// The loop blocks on the 2-byte length prefix with a bounded timeout; a
/// timeout loops straight back to reading (the housekeeping slot is
/// deliberately empty — token refresh happens on demand at call time).
/// Once a prefix arrives, the rest of the frame is read without a timeout.
pub async fn run<B, R>(
    mut reader: R,
    ctx: Arc<SessionContext<B>>,
    catalog: Arc<Catalog<B>>,
    mut shutdown: watch::Receiver<bool>,
) where
    B: AccountBackend,
    R: AsyncRead + Unpin,
{
    loop {
        let header_len = tokio::select! {
            read = timeout(READ_TICK, reader.read_u16()) => {
                match read {
                    Err(_elapsed) => {
                        trace!("read tick");
                        continue;
                    }
                    Ok(Err(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                        let client_id = ctx.client_id().await;
                        info!(client_id = ?client_id, "peer closed connection");
                        break;
                    }
                    Ok(Err(err)) => {
                        error!(error = %err, "socket read failed");
                        break;
                    }
                    Ok(Ok(len)) => len,
                }
            }
            _ = shutdown.changed() => {
                debug!("shutdown signalled, closing session");
                break;
            }
        };

        let frame = match codec::read_frame_body(&mut reader, header_len as usize).await {
            Ok(frame) => frame,
            Err(err @ (ProtoError::MalformedHeader(_)
            | ProtoError::TruncatedPayload { .. }
            | ProtoError::FrameTooLarge(_))) => {
                error!(error = %err, "protocol violation, closing session");
                break;
            }
            Err(err) => {
                error!(error = %err, "transport error, closing session");
                break;
            }
        };

        debug!(
            channel = frame.header.channel,
            msg_type = frame.header.msg_type,
            size = frame.header.size,
            "dispatching frame"
        );
        if let Some(reply) = catalog.dispatch(&frame, &ctx).await {
            if let Err(err) = ctx.writer().write_frame(&reply).await {
                error!(error = %err, "failed to write response");
                break;
            }
        }
    }

    ctx.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Catalog;
    use crate::testutil::MockBackend;
    use beacon_core::catalog::CommType;
    use beacon_core::messages as msg;
    use beacon_core::{decode_payload, encode_frame, encode_payload, FrameDecoder, FrameHeader};
    use tokio::io::duplex;

    fn frame_bytes(tag: u8, len: usize) -> Vec<u8> {
        let payload = vec![tag; len];
        let mut header = FrameHeader::comm(CommType::GetLeaderboardsResponse);
        header.size = payload.len() as u32;
        encode_frame(&header, &payload).unwrap()
    }

    #[tokio::test]
    async fn concurrent_writers_never_interleave_frames() {
        let (client, server) = duplex(64 * 1024);
        let writer = Arc::new(FrameWriter::new(server));

        let n_bridge = 40;
        let m_replies = 40;

        let w1 = writer.clone();
        let bridge = tokio::spawn(async move {
            for i in 0..n_bridge {
                let bytes = frame_bytes(0xbb, 100 + (i % 7) * 33);
                w1.write_frame(&bytes).await.unwrap();
                tokio::task::yield_now().await;
            }
        });
        let w2 = writer.clone();
        let responder = tokio::spawn(async move {
            for i in 0..m_replies {
                let bytes = frame_bytes(0xaa, 50 + (i % 5) * 71);
                w2.write_frame(&bytes).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        bridge.await.unwrap();
        responder.await.unwrap();
        drop(writer);

        let mut reader = client;
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            frames.extend(decoder.feed(&buf[..n]).unwrap());
            if frames.len() == n_bridge + m_replies {
                break;
            }
        }

        assert_eq!(frames.len(), n_bridge + m_replies);
        assert_eq!(decoder.pending(), 0);
        for frame in &frames {
            // A frame's payload is uniformly one writer's fill byte; a mix
            // would mean interleaved writes.
            let first = frame.payload[0];
            assert!(first == 0xaa || first == 0xbb);
            assert!(frame.payload.iter().all(|&b| b == first));
        }
    }

    #[tokio::test]
    async fn session_survives_unknown_frame() {
        let (mut client, server_io) = duplex(64 * 1024);
        let (read_half, write_half) = tokio::io::split(server_io);
        let backend = Arc::new(MockBackend::default());
        let writer = Arc::new(FrameWriter::new(write_half));
        let topics = Arc::new(TopicSet::new());
        let ctx = Arc::new(SessionContext::new(writer, backend, topics, 42));
        let catalog = Arc::new(Catalog::standard());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(read_half, ctx.clone(), catalog, shutdown_rx));

        // Unknown (channel, type): logged and dropped, session stays open.
        let mut header = FrameHeader::new(99, 1);
        header.size = 0;
        client
            .write_all(&encode_frame(&header, &[]).unwrap())
            .await
            .unwrap();

        // A valid request right after is still served.
        let body = encode_payload(&msg::GetLeaderboardsRequest {}).unwrap();
        let mut header = FrameHeader::comm(CommType::GetLeaderboardsRequest).with_oseq(9);
        header.size = body.len() as u32;
        client
            .write_all(&encode_frame(&header, &body).unwrap())
            .await
            .unwrap();

        let reply = codec::read_frame(&mut client).await.unwrap().unwrap();
        assert_eq!(
            reply.header.msg_type,
            u16::from(CommType::GetLeaderboardsResponse)
        );
        assert_eq!(reply.header.rseq, Some(9));
        let body: msg::GetLeaderboardsResponse = decode_payload(&reply.payload).unwrap();
        assert!(body.definitions.is_empty());

        drop(client);
        task.await.unwrap();
        assert!(ctx.is_closed());
    }
}
