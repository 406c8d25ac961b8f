//! RESP Frame Types
//!
//! This module defines the frame values exchanged on the wire and their
//! encoding. Every frame starts with a type prefix byte:
//!
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `*` Array
//!
//! and every non-null frame is self-delimiting: it ends at a located CRLF or
//! after its declared length plus CRLF.
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR unknown command 'FOO'\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Null Bulk String: `$-1\r\n`
//! Null Array: `*-1\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single protocol value.
///
/// Bulk strings and arrays carry an explicit null state (`None`), which is
/// distinct from the empty string and the empty array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Non-binary-safe text without CR or LF.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Same shape as a simple string, tagged as an error.
    /// Format: `-<error message>\r\n`
    Error(String),

    /// 64-bit signed integer.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe, length-prefixed payload.
    /// Format: `$<length>\r\n<data>\r\n`, null is `$-1\r\n`
    BulkString(Option<Bytes>),

    /// Ordered sequence of frames, possibly nested.
    /// Format: `*<count>\r\n<element1><element2>...`, null is `*-1\r\n`
    Array(Option<Vec<Frame>>),
}

impl Frame {
    /// Creates a new simple string frame.
    ///
    /// # Example
    /// ```
    /// use pulsekv::protocol::Frame;
    /// let ok = Frame::simple_string("OK");
    /// assert_eq!(ok.serialize(), b"+OK\r\n");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        Frame::SimpleString(s.into())
    }

    /// Creates a new error frame.
    pub fn error(s: impl Into<String>) -> Self {
        Frame::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Frame::Integer(n)
    }

    /// Creates a non-null bulk string frame.
    ///
    /// # Example
    /// ```
    /// use pulsekv::protocol::Frame;
    /// use bytes::Bytes;
    /// let bulk = Frame::bulk_string(Bytes::from("hello"));
    /// assert_eq!(bulk.serialize(), b"$5\r\nhello\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        Frame::BulkString(Some(data.into()))
    }

    /// The null bulk string, `$-1\r\n`.
    pub fn null_bulk() -> Self {
        Frame::BulkString(None)
    }

    /// Creates a non-null array frame.
    pub fn array(values: Vec<Frame>) -> Self {
        Frame::Array(Some(values))
    }

    /// The null array, `*-1\r\n`.
    pub fn null_array() -> Self {
        Frame::Array(None)
    }

    pub fn ok() -> Self {
        Frame::SimpleString("OK".to_string())
    }

    pub fn pong() -> Self {
        Frame::SimpleString("PONG".to_string())
    }

    /// Serializes the frame to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the frame into an existing buffer.
    ///
    /// This is more efficient than `serialize()` when you want to reuse a buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Frame::SimpleString(s) => write_line(buf, prefix::SIMPLE_STRING, s.as_bytes()),
            Frame::Error(s) => write_line(buf, prefix::ERROR, s.as_bytes()),
            Frame::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            Frame::BulkString(Some(data)) => {
                write_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Frame::BulkString(None) => write_line(buf, prefix::BULK_STRING, b"-1"),
            Frame::Array(Some(values)) => {
                write_line(buf, prefix::ARRAY, values.len().to_string().as_bytes());
                for value in values {
                    value.serialize_into(buf);
                }
            }
            Frame::Array(None) => write_line(buf, prefix::ARRAY, b"-1"),
        }
    }

    /// Returns true for the null bulk string and the null array.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::BulkString(None) | Frame::Array(None))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// Attempts to extract the inner string from SimpleString or BulkString.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Frame::SimpleString(s) => Some(s),
            Frame::BulkString(Some(b)) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Attempts to extract the inner array.
    pub fn as_array(&self) -> Option<&[Frame]> {
        match self {
            Frame::Array(Some(arr)) => Some(arr),
            _ => None,
        }
    }
}

#[inline]
fn write_line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}

/// Encodes a frame into its wire representation.
pub fn encode(frame: &Frame) -> Vec<u8> {
    frame.serialize()
}

/// Encodes a scalar reply, choosing simple-string framing when `is_simple`
/// and bulk-string framing otherwise.
///
/// # Example
/// ```
/// use pulsekv::protocol::encode_reply;
/// assert_eq!(encode_reply("PONG", true), b"+PONG\r\n");
/// assert_eq!(encode_reply("hello", false), b"$5\r\nhello\r\n");
/// ```
pub fn encode_reply(text: &str, is_simple: bool) -> Vec<u8> {
    if is_simple {
        Frame::simple_string(text).serialize()
    } else {
        Frame::bulk_string(Bytes::copy_from_slice(text.as_bytes())).serialize()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::SimpleString(s) => write!(f, "\"{}\"", s),
            Frame::Error(s) => write!(f, "(error) {}", s),
            Frame::Integer(n) => write!(f, "(integer) {}", n),
            Frame::BulkString(Some(data)) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            Frame::BulkString(None) | Frame::Array(None) => write!(f, "(nil)"),
            Frame::Array(Some(values)) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    writeln!(f)?;
                    for (i, v) in values.iter().enumerate() {
                        writeln!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
        }
    }
}
