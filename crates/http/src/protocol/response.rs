//! HTTP response types.
//!
//! A handler never builds a raw `http::Response`; it fills a [`Reply`], which knows
//! the only three response headers the engine sets on its own: `Content-Type`,
//! `Allow` and the CORS allow-origin header.

use bytes::Bytes;
use http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CONTENT_TYPE};
use http::{HeaderValue, Response, StatusCode};
use tracing::warn;

use crate::protocol::PayloadSize;

/// The head of an HTTP response, with the body left out.
pub type ResponseHead = Response<()>;

/// A complete, fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub allow: Option<String>,
    pub cors: bool,
    pub body: Bytes,
}

impl Reply {
    /// A plain reply with the given status and body and no extra headers
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self { status, content_type: None, allow: None, cors: false, body: body.into() }
    }

    /// An empty-bodied reply, used for protocol level errors
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, Bytes::new())
    }

    pub fn payload_size(&self) -> PayloadSize {
        PayloadSize::from_length(self.body.len() as u64)
    }

    /// Splits the reply into the head handed to the encoder and the body bytes.
    ///
    /// Header values that are not valid HTTP header text are dropped with a warning.
    pub fn into_parts(self) -> (ResponseHead, Bytes) {
        let mut head = Response::new(());
        *head.status_mut() = self.status;

        let headers = head.headers_mut();
        if let Some(content_type) = self.content_type.as_deref() {
            match HeaderValue::from_str(content_type) {
                Ok(value) => {
                    headers.insert(CONTENT_TYPE, value);
                }
                Err(e) => warn!(cause = %e, content_type, "drop invalid content-type"),
            }
        }
        if let Some(allow) = self.allow.as_deref() {
            match HeaderValue::from_str(allow) {
                Ok(value) => {
                    headers.insert(ALLOW, value);
                }
                Err(e) => warn!(cause = %e, allow, "drop invalid allow header"),
            }
        }
        if self.cors {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }

        (head, self.body)
    }
}
