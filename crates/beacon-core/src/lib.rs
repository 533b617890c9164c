//! beacon-core: Shared protocol library for the beacon gateway.
//!
//! Provides the length-prefixed frame codec, the message catalog (channel
//! and type ids plus payload schemas), tagged user-id encoding, and the
//! protocol error taxonomy shared by the gateway daemon and its tests.

pub mod catalog;
pub mod codec;
pub mod error;
pub mod frame;
pub mod ident;
pub mod messages;

// Re-export commonly used items at crate root.
pub use catalog::{BrokerType, CommType, CHANNEL_COMM, CHANNEL_WEBBROKER};
pub use codec::{decode_frame, decode_payload, encode_frame, encode_payload, read_frame, FrameDecoder};
pub use error::{ProtoError, ProtoResult};
pub use frame::{Frame, FrameHeader};
pub use ident::{strip_user_id, tag_user_id};
