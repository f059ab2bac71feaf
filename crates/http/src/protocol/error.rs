//! Errors of the engine, one enum per direction plus the connection level [`HttpError`].

use std::fmt::Display;
use std::io;

use thiserror::Error;

use crate::exchange::Reject;

/// Why a connection stopped serving requests.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The peer sent something that is not a request this engine understands
    #[error("bad request: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("cannot send response: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    /// The request broke a lifecycle limit and the connection was dropped without a response
    #[error("request rejected: {source}")]
    Rejected {
        #[from]
        source: Reject,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("request head of {size} bytes exceeds {limit}")]
    HeadTooLarge { size: usize, limit: usize },

    #[error("more than {limit} header fields")]
    TooManyHeaders { limit: usize },

    #[error("malformed header: {reason}")]
    InvalidHeader { reason: String },

    #[error("unsupported http version {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("malformed method")]
    InvalidMethod,

    #[error("malformed request target")]
    InvalidUri,

    #[error("malformed content-length: {reason}")]
    InvalidContentLength { reason: String },

    #[error("transfer-encoding {encoding} is not supported")]
    UnsupportedTransferEncoding { encoding: String },

    #[error("unexpected frame: {reason}")]
    UnexpectedFrame { reason: &'static str },

    #[error("read failed: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn head_too_large(size: usize, limit: usize) -> Self {
        Self::HeadTooLarge { size, limit }
    }

    pub fn invalid_header(reason: impl Display) -> Self {
        Self::InvalidHeader { reason: reason.to_string() }
    }

    pub fn invalid_content_length(reason: impl Display) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }

    pub fn unsupported_transfer_encoding(encoding: impl Display) -> Self {
        Self::UnsupportedTransferEncoding { encoding: encoding.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("response body does not match its length: {reason}")]
    InvalidBody { reason: String },

    #[error("write failed: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body(reason: impl Display) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }
}
