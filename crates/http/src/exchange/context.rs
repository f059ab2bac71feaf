//! Per-request state handed to the dispatcher once a request has completed.

use std::fmt;
use std::net::IpAddr;

use bytes::Bytes;
use http::{Method, StatusCode};

use crate::protocol::Reply;

/// The request methods the lifecycle accepts; anything else is rejected in `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Delete,
    Options,
}

impl RequestMethod {
    /// Shortest and longest accepted method names.
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 7;

    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Self::Get),
            Method::POST => Some(Self::Post),
            Method::PUT => Some(Self::Put),
            Method::DELETE => Some(Self::Delete),
            Method::OPTIONS => Some(Self::Options),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a handler may read about a request, plus the response fields it may set.
///
/// Owned by the connection task; it is consumed into a [`Reply`] once the handler
/// has produced the response body.
#[derive(Debug, Clone)]
pub struct RequestContext {
    client_ip: IpAddr,
    method: RequestMethod,
    path: String,
    accept: Option<String>,
    authorization: Option<String>,
    content_length: u64,
    body: Bytes,

    status: Option<StatusCode>,
    content_type: Option<String>,
    allow: Option<String>,
    cors: bool,
}

impl RequestContext {
    pub(crate) fn new(
        client_ip: IpAddr,
        method: RequestMethod,
        path: String,
        accept: Option<String>,
        authorization: Option<String>,
        content_length: u64,
    ) -> Self {
        Self {
            client_ip,
            method,
            path,
            accept,
            authorization,
            content_length,
            body: Bytes::new(),
            status: None,
            content_type: None,
            allow: None,
            cors: false,
        }
    }

    /// Builds a context directly, for driving handlers without a connection.
    pub fn builder(client_ip: IpAddr, method: RequestMethod, path: impl Into<String>) -> RequestContextBuilder {
        RequestContextBuilder { inner: Self::new(client_ip, method, path.into(), None, None, 0) }
    }

    pub(crate) fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }

    pub fn client_ip(&self) -> IpAddr {
        self.client_ip
    }

    pub fn method(&self) -> RequestMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn accept(&self) -> Option<&str> {
        self.accept.as_deref()
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    /// The declared `Content-Length`, 0 when the header was absent.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn requests_text(&self) -> bool {
        self.accepts(mime::TEXT_PLAIN.as_ref())
    }

    pub fn requests_json(&self) -> bool {
        self.accepts(mime::APPLICATION_JSON.as_ref())
    }

    pub fn requests_xml(&self) -> bool {
        self.accepts("application/xml")
    }

    fn accepts(&self, expected: &str) -> bool {
        self.accept.as_deref().is_some_and(|accept| accept.eq_ignore_ascii_case(expected))
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn set_allow(&mut self, allow: impl Into<String>) {
        self.allow = Some(allow.into());
    }

    pub fn set_cors(&mut self, cors: bool) {
        self.cors = cors;
    }

    /// Turns the handler output into a reply; the status defaults to 200.
    pub fn into_reply(self, body: impl Into<Bytes>) -> Reply {
        Reply {
            status: self.status.unwrap_or(StatusCode::OK),
            content_type: self.content_type,
            allow: self.allow,
            cors: self.cors,
            body: body.into(),
        }
    }
}

/// Test and tooling helper for building a [`RequestContext`] by hand.
#[derive(Debug)]
pub struct RequestContextBuilder {
    inner: RequestContext,
}

impl RequestContextBuilder {
    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.inner.accept = Some(accept.into());
        self
    }

    pub fn authorization(mut self, authorization: impl Into<String>) -> Self {
        self.inner.authorization = Some(authorization.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.inner.content_length = body.len() as u64;
        self.inner.body = body;
        self
    }

    pub fn build(self) -> RequestContext {
        self.inner
    }
}
