//! RESP2 framing for the store client.
//!
//! Commands go out as arrays of bulk strings; replies come back as one of the five
//! RESP2 types. Nil bulk strings and nil arrays both decode to [`RespValue::Nil`].

use std::fmt;
use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

/// Largest bulk string the decoder accepts, the same cap redis applies.
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum RespError {
    #[error("invalid reply type byte 0x{0:02x}")]
    UnknownType(u8),

    #[error("invalid length or integer line")]
    InvalidInteger,

    #[error("bulk string of {0} bytes exceeds limit")]
    BulkTooLarge(usize),

    #[error("bulk string not terminated by CRLF")]
    MissingTerminator,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// A decoded store reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Nil,
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Whether this is a simple status reply starting with `OK`.
    pub fn is_ok_status(&self) -> bool {
        matches!(self, Self::Simple(status) if status.starts_with("OK"))
    }

    /// The payload of a bulk or simple string reply.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bulk(bytes) => Some(bytes),
            Self::Simple(status) => Some(status.as_bytes()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Simple(_) => "status",
            Self::Error(_) => "error",
            Self::Integer(_) => "integer",
            Self::Bulk(_) => "string",
            Self::Nil => "nil",
            Self::Array(_) => "array",
        }
    }
}

/// One store command: a name followed by binary safe arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: &'static str) -> Self {
        Self { args: vec![Bytes::from_static(name.as_bytes())] }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<Bytes>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn name(&self) -> &str {
        self.args.first().and_then(|name| std::str::from_utf8(name).ok()).unwrap_or_default()
    }

    pub fn args(&self) -> &[Bytes] {
        self.args.get(1..).unwrap_or_default()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // values may be large binary blobs, only keys are worth showing
        write!(f, "{}", self.name())?;
        if let Some(key) = self.args().first() {
            write!(f, " {}", String::from_utf8_lossy(key))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RespCodec;

impl Decoder for RespCodec {
    type Item = RespValue;
    type Error = RespError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match parse(src, 0)? {
            Some((value, consumed)) => {
                src.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Command> for RespCodec {
    type Error = RespError;

    fn encode(&mut self, command: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let needed: usize = command.args.iter().map(|arg| arg.len() + 16).sum();
        dst.reserve(needed + 16);

        put_length_line(dst, b'*', command.args.len());
        for arg in &command.args {
            put_length_line(dst, b'$', arg.len());
            dst.put_slice(arg);
            dst.put_slice(CRLF);
        }
        Ok(())
    }
}

fn put_length_line(dst: &mut BytesMut, prefix: u8, len: usize) {
    dst.put_u8(prefix);
    dst.put_slice(len.to_string().as_bytes());
    dst.put_slice(CRLF);
}

/// The line starting at `pos`, without its CRLF, and the position after it.
fn line(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(pos..)?;
    let end = rest.windows(2).position(|window| window == CRLF)?;
    Some((&rest[..end], pos + end + 2))
}

fn integer(line: &[u8]) -> Result<i64, RespError> {
    std::str::from_utf8(line).ok().and_then(|text| text.parse().ok()).ok_or(RespError::InvalidInteger)
}

/// Parses one value starting at `pos`; `Ok(None)` when the buffer holds only part of it.
fn parse(buf: &[u8], pos: usize) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some(&kind) = buf.get(pos) else {
        return Ok(None);
    };
    let Some((content, next)) = line(buf, pos + 1) else {
        return Ok(None);
    };

    let parsed = match kind {
        b'+' => (RespValue::Simple(String::from_utf8_lossy(content).into_owned()), next),
        b'-' => (RespValue::Error(String::from_utf8_lossy(content).into_owned()), next),
        b':' => (RespValue::Integer(integer(content)?), next),
        b'$' => {
            let Ok(len) = usize::try_from(integer(content)?) else {
                return Ok(Some((RespValue::Nil, next)));
            };
            if len > MAX_BULK_LEN {
                return Err(RespError::BulkTooLarge(len));
            }
            let end = next + len;
            if buf.len() < end + CRLF.len() {
                return Ok(None);
            }
            if &buf[end..end + CRLF.len()] != CRLF {
                return Err(RespError::MissingTerminator);
            }
            (RespValue::Bulk(Bytes::copy_from_slice(&buf[next..end])), end + CRLF.len())
        }
        b'*' => {
            let Ok(count) = usize::try_from(integer(content)?) else {
                return Ok(Some((RespValue::Nil, next)));
            };
            let mut items = Vec::with_capacity(count.min(64));
            let mut cursor = next;
            for _ in 0..count {
                let Some((item, after)) = parse(buf, cursor)? else {
                    return Ok(None);
                };
                items.push(item);
                cursor = after;
            }
            (RespValue::Array(items), cursor)
        }
        other => return Err(RespError::UnknownType(other)),
    };

    Ok(Some(parsed))
}
