//! HTTP request head decoder.
//!
//! Parses the request line and header fields with `httparse`, then converts them into a
//! typed [`RequestHeader`] and the [`PayloadSize`] announced by `Content-Length`.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB
//! - HTTP/1.0 and HTTP/1.1 only
//! - `Transfer-Encoding` is refused, bodies must be framed by `Content-Length`
//!
//! Header names and values are not copied out of the read buffer one by one. Their byte
//! ranges are recorded first, the head is split off the buffer as a single `Bytes`, and
//! each value is then a cheap slice of it.

use bytes::BytesMut;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderName, HeaderValue, Method, Request, Uri};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;

use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Shortest buffer that can hold a complete request head, `GET / HTTP/1.1\r\n\r\n`
const MIN_REQUEST_BYTES: usize = 18;

/// Decoder for HTTP request heads implementing the [`Decoder`] trait.
#[derive(Debug)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    /// Attempts to decode a request head from `src`.
    ///
    /// Returns `Ok(None)` while the head is incomplete. On success the head bytes are
    /// removed from `src`, leaving any body bytes in place.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < MIN_REQUEST_BYTES {
            ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::head_too_large(src.len(), MAX_HEADER_BYTES));
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_result = req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::TooManyHeaders { limit: MAX_HEADER_NUM },
            e => ParseError::invalid_header(e.to_string()),
        });

        let body_offset = match parsed_result? {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::head_too_large(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };

        trace!(header_size = body_offset, "parsed request head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::head_too_large(body_offset, MAX_HEADER_BYTES));

        let version = match req.version {
            Some(0) => http::Version::HTTP_10,
            Some(1) => http::Version::HTTP_11,
            _ => return Err(ParseError::InvalidVersion(req.version)),
        };

        let method = req.method.ok_or(ParseError::InvalidMethod)?;
        let method = Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::InvalidMethod)?;
        let target = req.path.ok_or(ParseError::InvalidUri)?;
        let uri = target.parse::<Uri>().map_err(|_| ParseError::InvalidUri)?;

        let header_count = req.headers.len();
        let mut indices = Vec::with_capacity(header_count);
        HeaderIndex::record(src, req.headers, &mut indices);

        let header_bytes = src.split_to(body_offset).freeze();

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = version;

        let header_map = request.headers_mut();
        header_map.reserve(header_count);
        for index in &indices {
            let name = HeaderName::from_bytes(&header_bytes[index.name.0..index.name.1])
                .map_err(|e| ParseError::invalid_header(e.to_string()))?;
            let value = HeaderValue::from_maybe_shared(header_bytes.slice(index.value.0..index.value.1))
                .map_err(|e| ParseError::invalid_header(e.to_string()))?;
            header_map.append(name, value);
        }

        let header = RequestHeader::from(request);
        let payload_size = parse_payload(&header)?;

        Ok(Some((header, payload_size)))
    }
}

/// Byte ranges of one header's name and value inside the read buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut Vec<HeaderIndex>) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for header in headers {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            indices.push(HeaderIndex {
                name: (name_start, name_start + header.name.len()),
                value: (value_start, value_start + header.value.len()),
            });
        }
    }
}

/// Determines the body size from the request headers.
///
/// Any `Transfer-Encoding` is refused; every request body must be announced with
/// `Content-Length`, whatever the method.
fn parse_payload(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    if let Some(te_value) = header.headers().get(TRANSFER_ENCODING) {
        return Err(ParseError::unsupported_transfer_encoding(String::from_utf8_lossy(te_value.as_bytes())));
    }

    let Some(cl_value) = header.headers().get(CONTENT_LENGTH) else {
        return Ok(PayloadSize::Empty);
    };

    let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
    let length = cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

    Ok(PayloadSize::from_length(length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Version};
    use indoc::indoc;

    #[test]
    fn test_bytes_mut_lens() {
        let str = indoc! {r##"
        POST /store/128/0123456789abcdef0123456789abcdef HTTP/1.1
        Host: 127.0.0.1:8080
        Content-Length: 5

        HelloWorld"##};

        let mut bytes = BytesMut::from(str);
        let (_header, payload_size) = HeaderDecoder.decode(&mut bytes).unwrap().unwrap();

        assert_eq!(payload_size, PayloadSize::Length(5));
        assert_eq!(&bytes[..], &b"HelloWorld"[..]);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /store/256/9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08 HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: text/plain

        "##};

        let mut buf = BytesMut::from(str);
        let (header, payload_size) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();

        assert!(payload_size.is_empty());
        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().path(), "/store/256/9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08");
        assert_eq!(header.headers().len(), 3);
        assert_eq!(header.header_str(http::header::ACCEPT), Some("text/plain"));
        assert_eq!(header.header_str(http::header::USER_AGENT), Some("curl/7.79.1"));
    }

    #[test]
    fn partial_head_needs_more() {
        let mut buf = BytesMut::from("GET /config/all HTTP/1.1\r\nHost: loc");
        assert!(HeaderDecoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 35);
    }

    #[test]
    fn extension_method_is_parsed() {
        let mut buf = BytesMut::from("PATCH /config/all HTTP/1.1\r\n\r\n");
        let (header, _) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(header.method().as_str(), "PATCH");
    }

    #[test]
    fn chunked_is_refused() {
        let str = indoc! {r##"
        POST /store/128/0123456789abcdef0123456789abcdef HTTP/1.1
        Transfer-Encoding: chunked

        "##};

        let mut buf = BytesMut::from(str);
        let result = HeaderDecoder.decode(&mut buf);
        assert!(matches!(result, Err(ParseError::UnsupportedTransferEncoding { .. })));
    }

    #[test]
    fn bad_content_length() {
        let mut buf = BytesMut::from("POST /config/all HTTP/1.1\r\nContent-Length: ten\r\n\r\n");
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn oversized_head() {
        let mut raw = String::from("GET /config/all HTTP/1.1\r\n");
        while raw.len() <= MAX_HEADER_BYTES {
            raw.push_str("X-Filler: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n");
        }
        let mut buf = BytesMut::from(raw.as_str());
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::HeadTooLarge { .. } | ParseError::TooManyHeaders { .. })));
    }
}
