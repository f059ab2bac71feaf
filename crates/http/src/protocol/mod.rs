//! Protocol types shared by the codec, the request lifecycle and the connection loop.
//!
//! - [`Message`], [`PayloadItem`], [`PayloadSize`]: frames exchanged with the codec
//! - [`RequestHeader`]: a parsed request head
//! - [`ResponseHead`], [`Reply`]: response head and a fully buffered response
//! - [`HttpError`], [`ParseError`], [`SendError`]: error types

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::Reply;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
