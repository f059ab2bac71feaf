//! The per-request lifecycle.
//!
//! Every request walks three phases, each a method on [`Exchange`]:
//!
//! 1. [`Exchange::begin`] looks at the head only. The method, the URL length and the
//!    declared `Content-Length` are checked against [`Limits`].
//! 2. [`Exchange::feed`] is called for every body chunk the codec delivers and
//!    accumulates it, refusing anything past the declared length.
//! 3. [`Exchange::finish`] verifies the whole body arrived and hands out the
//!    [`RequestContext`] for dispatch.
//!
//! A [`Reject`] from any phase means the connection is dropped without a response.

mod context;

pub use context::RequestContext;
pub use context::RequestContextBuilder;
pub use context::RequestMethod;

use std::cmp;
use std::net::IpAddr;
use std::ops::RangeInclusive;

use bytes::BytesMut;
use http::header::{ACCEPT, AUTHORIZATION};
use thiserror::Error;
use tracing::trace;

use crate::ensure;
use crate::protocol::RequestHeader;

/// Upper bound for the initial body buffer; larger bodies grow it as they stream in.
const INIT_BODY_CAPACITY: u64 = 64 * 1024;

/// Request limits checked while a request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min_url_len: usize,
    pub max_url_len: usize,
    pub max_body_len: u64,
}

impl Limits {
    pub fn url_len_range(&self) -> RangeInclusive<usize> {
        self.min_url_len..=self.max_url_len
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self { min_url_len: 1, max_url_len: 2048, max_body_len: 10 * 1024 * 1024 }
    }
}

/// Why a request was refused before reaching a handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Reject {
    #[error("unsupported method {method}")]
    Method { method: String },

    #[error("url length {len} outside of [{min}, {max}]")]
    UrlLength { len: usize, min: usize, max: usize },

    #[error("declared content-length {declared} exceeds the limit {max}")]
    BodyTooLarge { declared: u64, max: u64 },

    #[error("body overflow, {received} bytes received while {declared} declared")]
    BodyOverflow { received: u64, declared: u64 },

    #[error("body truncated, {received} bytes received while {declared} declared")]
    BodyTruncated { received: u64, declared: u64 },
}

/// Result of feeding one body chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// More body bytes are expected
    Continue,
    /// The declared length has been reached
    Complete,
    Reject(Reject),
}

/// A request between its head and its dispatch.
#[derive(Debug)]
pub struct Exchange {
    context: RequestContext,
    body: BytesMut,
    declared: u64,
}

impl Exchange {
    /// Starts a request from its head.
    ///
    /// # Errors
    ///
    /// Rejects methods outside GET/POST/PUT/DELETE/OPTIONS, paths whose length is
    /// outside `limits.url_len_range()`, and declared bodies over `limits.max_body_len`.
    pub fn begin(header: &RequestHeader, client_ip: IpAddr, limits: &Limits) -> Result<Self, Reject> {
        let name = header.method().as_str();
        ensure!(
            (RequestMethod::MIN_LEN..=RequestMethod::MAX_LEN).contains(&name.len()),
            Reject::Method { method: name.to_owned() }
        );
        let method = RequestMethod::from_method(header.method()).ok_or_else(|| Reject::Method { method: name.to_owned() })?;

        let path = header.path();
        ensure!(
            limits.url_len_range().contains(&path.len()),
            Reject::UrlLength { len: path.len(), min: limits.min_url_len, max: limits.max_url_len }
        );

        let declared = header.content_length().unwrap_or(0);
        ensure!(declared <= limits.max_body_len, Reject::BodyTooLarge { declared, max: limits.max_body_len });

        let context = RequestContext::new(
            client_ip,
            method,
            path.to_owned(),
            header.header_str(ACCEPT).map(ToOwned::to_owned),
            header.header_str(AUTHORIZATION).map(ToOwned::to_owned),
            declared,
        );

        // bounded by INIT_BODY_CAPACITY, so the cast cannot truncate
        let capacity = cmp::min(declared, INIT_BODY_CAPACITY) as usize;
        Ok(Self { context, body: BytesMut::with_capacity(capacity), declared })
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn received(&self) -> u64 {
        self.body.len() as u64
    }

    /// Appends a body chunk.
    ///
    /// A chunk that would carry the body past its declared length is refused whole.
    pub fn feed(&mut self, chunk: &[u8]) -> Feed {
        let received = self.received() + chunk.len() as u64;
        if received > self.declared {
            return Feed::Reject(Reject::BodyOverflow { received, declared: self.declared });
        }

        self.body.extend_from_slice(chunk);
        trace!(received, declared = self.declared, "body chunk accepted");

        if received == self.declared { Feed::Complete } else { Feed::Continue }
    }

    /// Ends the body phase.
    ///
    /// # Errors
    ///
    /// Rejects a body shorter than the declared `Content-Length`.
    pub fn finish(self) -> Result<RequestContext, Reject> {
        let Self { mut context, body, declared } = self;

        let received = body.len() as u64;
        ensure!(received == declared, Reject::BodyTruncated { received, declared });

        context.set_body(body.freeze());
        Ok(context)
    }
}
