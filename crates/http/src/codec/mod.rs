//! HTTP/1.1 codec.
//!
//! - [`RequestDecoder`]: byte stream into request heads, body chunks and EOF markers
//! - [`ResponseEncoder`]: response heads and body chunks into bytes
//!
//! Both sides plug into `tokio_util::codec::{FramedRead, FramedWrite}`.
//!
//! ```no_run
//! use webstore_http::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("GET /config/all HTTP/1.1\r\n\r\n");
//! let head = decoder.decode(&mut buffer);
//! ```

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
