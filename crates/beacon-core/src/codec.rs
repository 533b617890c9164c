//! Length-prefixed CBOR framing for the gateway protocol.
//!
//! Wire format: `[2-byte big-endian header length][CBOR header][payload]`,
//! where the payload length is declared inside the header (`header.size`).
//! The same format is spoken on the local TCP socket and on the bridge's
//! WebSocket transport.

use crate::error::{ProtoError, ProtoResult};
use crate::frame::{Frame, FrameHeader};
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on a frame payload (1 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 1_048_576;

/// Serialize a header to its CBOR wire form.
pub fn encode_header(header: &FrameHeader) -> ProtoResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(header, &mut buf)?;
    Ok(buf)
}

/// Decode a header from its CBOR wire form.
pub fn decode_header(data: &[u8]) -> ProtoResult<FrameHeader> {
    ciborium::from_reader(Cursor::new(data))
        .map_err(|e: ciborium::de::Error<std::io::Error>| ProtoError::MalformedHeader(e.to_string()))
}

/// Encode a serializable payload value.
pub fn encode_payload<T: serde::Serialize>(value: &T) -> ProtoResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Decode a payload (without framing) into a typed value.
pub fn decode_payload<T: serde::de::DeserializeOwned>(data: &[u8]) -> ProtoResult<T> {
    let value = ciborium::from_reader(Cursor::new(data))?;
    Ok(value)
}

/// Encode a complete frame: length prefix, header, payload.
///
/// Precondition: the caller has set `header.size` to `payload.len()`. The
/// codec does not enforce this; a mismatch produces a frame the peer will
/// mis-parse.
pub fn encode_frame(header: &FrameHeader, payload: &[u8]) -> ProtoResult<Vec<u8>> {
    let header_buf = encode_header(header)?;
    let header_len: u16 = header_buf
        .len()
        .try_into()
        .map_err(|_| ProtoError::FrameTooLarge(header_buf.len()))?;

    let mut frame = Vec::with_capacity(2 + header_buf.len() + payload.len());
    frame.extend_from_slice(&header_len.to_be_bytes());
    frame.extend_from_slice(&header_buf);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Read one frame from a byte stream.
///
/// Returns `Ok(None)` on a clean close at a frame boundary (no bytes of the
/// next frame were read). A close inside the length prefix, header, or
/// payload is a protocol violation and yields the matching error.
pub async fn read_frame<R>(reader: &mut R) -> ProtoResult<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    let n = reader.read(&mut len_buf[..1]).await?;
    if n == 0 {
        return Ok(None);
    }
    match reader.read_exact(&mut len_buf[1..]).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtoError::TruncatedLength)
        }
        Err(e) => return Err(e.into()),
    }
    let header_len = u16::from_be_bytes(len_buf) as usize;

    read_frame_body(reader, header_len).await.map(Some)
}

/// Read the remainder of a frame once its 2-byte length prefix is known.
///
/// Split out so callers that apply a timeout to the prefix read alone (the
/// session's idle tick) can finish the frame without one.
pub async fn read_frame_body<R>(reader: &mut R, header_len: usize) -> ProtoResult<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = vec![0u8; header_len];
    read_exact_or(reader, &mut header_buf, header_len).await?;
    let header = decode_header(&header_buf)?;

    let payload_len = header.size as usize;
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(ProtoError::FrameTooLarge(payload_len));
    }
    let mut payload = vec![0u8; payload_len];
    read_exact_or(reader, &mut payload, payload_len).await?;

    Ok(Frame { header, payload })
}

async fn read_exact_or<R>(reader: &mut R, buf: &mut [u8], expected: usize) -> ProtoResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(ProtoError::TruncatedPayload {
                expected,
                got: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

/// Decode a frame from one complete buffer (e.g. a WebSocket message).
///
/// Bytes past the declared payload size are ignored.
pub fn decode_frame(data: &[u8]) -> ProtoResult<Frame> {
    if data.len() < 2 {
        return Err(ProtoError::TruncatedLength);
    }
    let header_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    if data.len() < 2 + header_len {
        return Err(ProtoError::MalformedHeader(format!(
            "buffer holds {} of {} header bytes",
            data.len() - 2,
            header_len
        )));
    }
    let header = decode_header(&data[2..2 + header_len])?;
    let payload_len = header.size as usize;
    let start = 2 + header_len;
    if data.len() < start + payload_len {
        return Err(ProtoError::TruncatedPayload {
            expected: payload_len,
            got: data.len() - start,
        });
    }
    let payload = data[start..start + payload_len].to_vec();
    Ok(Frame { header, payload })
}

/// Streaming frame decoder: accumulates bytes and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed bytes into the decoder and return all complete frames.
    pub fn feed(&mut self, data: &[u8]) -> ProtoResult<Vec<Frame>> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            if self.buffer.len() < 2 {
                break;
            }
            let header_len = u16::from_be_bytes([self.buffer[0], self.buffer[1]]) as usize;
            if self.buffer.len() < 2 + header_len {
                break;
            }
            let header = decode_header(&self.buffer[2..2 + header_len])?;
            let payload_len = header.size as usize;
            if payload_len > MAX_PAYLOAD_SIZE {
                return Err(ProtoError::FrameTooLarge(payload_len));
            }
            let total = 2 + header_len + payload_len;
            if self.buffer.len() < total {
                break;
            }
            let payload = self.buffer[2 + header_len..total].to_vec();
            frames.push(Frame { header, payload });
            self.buffer.drain(..total);
        }

        Ok(frames)
    }

    /// Number of bytes waiting in the internal buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Reset internal buffer.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CommType;

    fn sample_frame(payload: &[u8]) -> (FrameHeader, Vec<u8>) {
        let mut header = FrameHeader::comm(CommType::GetLeaderboardsRequest).with_oseq(7);
        header.size = payload.len() as u32;
        (header, payload.to_vec())
    }

    #[test]
    fn round_trip_single() {
        let (header, payload) = sample_frame(b"hello");
        let bytes = encode_frame(&header, &payload).unwrap();
        let frame = decode_frame(&bytes).unwrap();
        assert_eq!(frame.header, header);
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn round_trip_empty_payload() {
        let (header, payload) = sample_frame(b"");
        let bytes = encode_frame(&header, &payload).unwrap();
        let frame = decode_frame(&bytes).unwrap();
        assert_eq!(frame.header.size, 0);
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn read_frame_round_trip() {
        let (header, payload) = sample_frame(b"stream me");
        let bytes = encode_frame(&header, &payload).unwrap();
        let mut reader = Cursor::new(bytes);
        let frame = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(frame.header, header);
        assert_eq!(frame.payload, payload);
    }

    #[tokio::test]
    async fn read_frame_clean_eof() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_frame_truncated_length() {
        let mut reader = Cursor::new(vec![0x00]);
        match read_frame(&mut reader).await {
            Err(ProtoError::TruncatedLength) => {}
            other => panic!("expected TruncatedLength, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_frame_truncated_payload() {
        let (header, payload) = sample_frame(b"full payload");
        let mut bytes = encode_frame(&header, &payload).unwrap();
        bytes.truncate(bytes.len() - 4);
        let mut reader = Cursor::new(bytes);
        match read_frame(&mut reader).await {
            Err(ProtoError::TruncatedPayload { expected, got }) => {
                assert_eq!(expected, payload.len());
                assert_eq!(got, payload.len() - 4);
            }
            other => panic!("expected TruncatedPayload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_frame_malformed_header() {
        // Declares a 4-byte header, but the bytes are not a valid header
        // structure.
        let mut bytes = vec![0x00, 0x04];
        bytes.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        let mut reader = Cursor::new(bytes);
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(ProtoError::MalformedHeader(_))
        ));
    }

    #[test]
    fn incremental_feed() {
        let (header, payload) = sample_frame(b"piecewise");
        let bytes = encode_frame(&header, &payload).unwrap();
        let mut decoder = FrameDecoder::new();

        for i in 0..bytes.len() - 1 {
            let frames = decoder.feed(&bytes[i..i + 1]).unwrap();
            assert!(frames.is_empty());
        }
        let frames = decoder.feed(&bytes[bytes.len() - 1..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, payload);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn feed_multiple_frames_at_once() {
        let mut combined = Vec::new();
        for p in [&b"one"[..], b"two", b"three"] {
            let (header, payload) = sample_frame(p);
            combined.extend(encode_frame(&header, &payload).unwrap());
        }
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&combined).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].payload, b"three");
    }
}
