//! Frame header model.

use crate::catalog::{BrokerType, CommType, CHANNEL_COMM, CHANNEL_WEBBROKER};
use serde::{Deserialize, Serialize};

/// Wire header carried in front of every payload.
///
/// `size` declares the payload length in bytes; the codec relies on it when
/// consuming a byte stream. `oseq` is assigned by the sender of a request and
/// echoed back as `rseq` by the responder, which is what allows replies to be
/// correlated on a single stream. `status` carries the responder's result
/// code for operations whose payload schema has no room for one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub channel: u16,
    pub msg_type: u16,
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oseq: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rseq: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u32>,
}

impl FrameHeader {
    pub fn new(channel: u16, msg_type: u16) -> Self {
        Self {
            channel,
            msg_type,
            size: 0,
            oseq: None,
            rseq: None,
            status: None,
        }
    }

    /// Header for a request/response channel message.
    pub fn comm(msg_type: CommType) -> Self {
        Self::new(CHANNEL_COMM, msg_type.into())
    }

    /// Header for a push channel message.
    pub fn broker(msg_type: BrokerType) -> Self {
        Self::new(CHANNEL_WEBBROKER, msg_type.into())
    }

    pub fn with_oseq(mut self, oseq: u32) -> Self {
        self.oseq = Some(oseq);
        self
    }

    pub fn with_status(mut self, status: u32) -> Self {
        self.status = Some(status);
        self
    }

    /// The composite dispatch key.
    pub fn key(&self) -> (u16, u16) {
        (self.channel, self.msg_type)
    }
}

/// One decoded header + payload unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn key(&self) -> (u16, u16) {
        self.header.key()
    }
}
