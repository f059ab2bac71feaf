//! Request head decoding and response head encoding.
//!
//! - [`HeaderDecoder`]: request line and header fields into a [`RequestHeader`](crate::protocol::RequestHeader)
//! - [`HeaderEncoder`]: status line and header fields of a response, with `Content-Length` filled in

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
