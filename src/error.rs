use std::io;

use thiserror::Error;

/// Errors surfaced by the engine to its caller.
///
/// Malformed frames received from a peer never show up here; they are
/// discarded (and possibly answered) by the reader and dispatcher.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("no transport attached to context")]
    NotConnected,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("message of {size} bytes exceeds the limit of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("timed out while waiting for {0}")]
    Timeout(&'static str),

    #[error("secure session setup failed: {0}")]
    Handshake(String),
}

impl From<coap_lite::error::MessageError> for Error {
    fn from(cause: coap_lite::error::MessageError) -> Self {
        Error::Malformed(cause.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
