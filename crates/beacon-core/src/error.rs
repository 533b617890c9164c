use thiserror::Error;

/// Errors produced by the beacon protocol layer.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("stream closed inside the length prefix")]
    TruncatedLength,

    #[error("malformed frame header: {0}")]
    MalformedHeader(String),

    #[error("stream closed inside the payload: wanted {expected} bytes, got {got}")]
    TruncatedPayload { expected: usize, got: usize },

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ciborium::de::Error<std::io::Error>> for ProtoError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        ProtoError::Codec(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for ProtoError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        ProtoError::Codec(e.to_string())
    }
}

pub type ProtoResult<T> = Result<T, ProtoError>;
