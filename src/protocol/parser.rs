//! Resumable RESP Decoder
//!
//! This module turns raw bytes into [`Frame`] values. The decoder is pure: it
//! owns no buffer and performs no I/O, so the caller (the connection reactor)
//! appends network data to its own buffer and re-runs the decoder whenever
//! more bytes arrive.
//!
//! ## Result Shape
//!
//! Every decode returns one of three outcomes:
//! - `Ok(Some((value, consumed)))` - a complete frame; advance the buffer by `consumed`
//! - `Ok(None)` - the bytes are a valid prefix of a longer frame; wait for more data
//! - `Err(ParseError)` - the bytes can never become a valid frame; drop the connection
//!
//! The decoder never reads past the end of the slice it is given. Any scan
//! that runs out of bytes before its terminator or declared length reports
//! `Ok(None)`.

use crate::protocol::command::Command;
use crate::protocol::types::{prefix, Frame, CRLF};
use bytes::Bytes;
use std::ops::Range;
use thiserror::Error;

/// Errors that can occur during RESP decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing to decode at the top level
    #[error("no data")]
    EmptyInput,

    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A declared length exceeds the configured limit
    #[error("message too large: {size} (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A well-formed frame that is not a command request
    #[error("invalid command frame: {0}")]
    InvalidCommand(String),
}

/// Result type for decoding operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in a single array
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// A RESP decoder carrying its size limits.
///
/// # Example
///
/// ```
/// use pulsekv::protocol::{Decoder, Frame};
///
/// let decoder = Decoder::new().with_max_bulk_len(1024);
/// let (frame, consumed) = decoder.decode(b"$5\r\nhello\r\n").unwrap().unwrap();
/// assert_eq!(frame, Frame::bulk_string("hello"));
/// assert_eq!(consumed, 11);
///
/// // A truncated frame is not an error, just incomplete.
/// assert!(decoder.decode(b"$5\r\nhel").unwrap().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Decoder {
    max_bulk_len: usize,
    max_array_len: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Creates a decoder with the default limits.
    pub fn new() -> Self {
        Self {
            max_bulk_len: MAX_BULK_SIZE,
            max_array_len: MAX_ARRAY_LEN,
        }
    }

    /// Caps the declared length of any bulk string.
    pub fn with_max_bulk_len(mut self, max: usize) -> Self {
        self.max_bulk_len = max;
        self
    }

    /// Caps the declared element count of any array.
    pub fn with_max_array_len(mut self, max: usize) -> Self {
        self.max_array_len = max;
        self
    }

    /// Attempts to decode one frame from the start of `buf`.
    ///
    /// Empty input is reported as [`ParseError::EmptyInput`].
    pub fn decode(&self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        if buf.is_empty() {
            return Err(ParseError::EmptyInput);
        }
        self.decode_value(buf, 0)
    }

    /// Attempts to decode one command request from the start of `buf`.
    pub fn decode_command(&self, buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
        match self.decode(buf)? {
            Some((frame, consumed)) => Ok(Some((Command::from_frame(frame)?, consumed))),
            None => Ok(None),
        }
    }

    /// Internal recursive decoding function.
    fn decode_value(&self, buf: &[u8], depth: usize) -> ParseResult<Option<(Frame, usize)>> {
        // Nested elements may simply not have arrived yet
        if buf.is_empty() {
            return Ok(None);
        }

        if depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => {
                Ok(decode_line(buf)?.map(|(s, n)| (Frame::SimpleString(s), n)))
            }
            prefix::ERROR => Ok(decode_line(buf)?.map(|(s, n)| (Frame::Error(s), n))),
            prefix::INTEGER => {
                Ok(decode_decimal(&buf[1..])?.map(|(v, n)| (Frame::Integer(v), 1 + n)))
            }
            prefix::BULK_STRING => self.decode_bulk_string(buf),
            prefix::ARRAY => self.decode_array(buf, depth),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Decodes a bulk string: `$<length>\r\n<data>\r\n`
    fn decode_bulk_string(&self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        debug_assert!(buf[0] == prefix::BULK_STRING);

        Ok(self.bulk_span(buf)?.map(|(payload, total)| {
            let data = payload.map(|range| Bytes::copy_from_slice(&buf[range]));
            (Frame::BulkString(data), total)
        }))
    }

    /// Locates a bulk string within `buf` without copying it.
    ///
    /// Returns the payload range (`None` for the null bulk string) and the
    /// total length of the frame, once every byte of it is buffered.
    fn bulk_span(&self, buf: &[u8]) -> ParseResult<Option<(Option<Range<usize>>, usize)>> {
        let (length, header) = match decode_decimal(&buf[1..])? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        // $-1\r\n carries no payload and no trailing CRLF
        if length == -1 {
            return Ok(Some((None, 1 + header)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > self.max_bulk_len {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: self.max_bulk_len,
            });
        }

        let data_start = 1 + header;
        let total_needed = data_start + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[data_start + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        Ok(Some((Some(data_start..data_start + length), total_needed)))
    }

    /// Parses an array header `*<count>\r\n`, returning the element count
    /// (`None` for the null array) and the header length.
    fn array_header(&self, buf: &[u8]) -> ParseResult<Option<(Option<usize>, usize)>> {
        let (count, header) = match decode_decimal(&buf[1..])? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((None, 1 + header)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        if count > self.max_array_len {
            return Err(ParseError::MessageTooLarge {
                size: count,
                max: self.max_array_len,
            });
        }

        Ok(Some((Some(count), 1 + header)))
    }

    /// Decodes an array: `*<count>\r\n<elements...>`
    fn decode_array(&self, buf: &[u8], depth: usize) -> ParseResult<Option<(Frame, usize)>> {
        debug_assert!(buf[0] == prefix::ARRAY);

        let (count, header) = match self.array_header(buf)? {
            Some((Some(count), header)) => (count, header),
            Some((None, header)) => return Ok(Some((Frame::Array(None), header))),
            None => return Ok(None),
        };

        // The declared count is untrusted until the elements actually arrive
        let mut elements = Vec::with_capacity(count.min(64));
        let mut consumed = header;

        for _ in 0..count {
            match self.decode_value(&buf[consumed..], depth + 1)? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((Frame::Array(Some(elements)), consumed)))
    }
}

/// Finds where one top-level frame ends without building it.
///
/// The scanner walks frame headers and skips payloads, remembering how far it
/// got. When more bytes are appended to the same buffer, the next call picks
/// up where the last one stopped, so a large request that trickles in over
/// many reads is walked once in total. It raises the same errors as
/// [`Decoder`] for prefixes, lengths, limits and nesting, so a hopeless
/// stream is rejected as soon as its header arrives.
///
/// # Example
///
/// ```
/// use pulsekv::protocol::{Decoder, FrameScanner};
///
/// let decoder = Decoder::new();
/// let mut scanner = FrameScanner::new();
/// let wire = b"*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n";
///
/// assert_eq!(scanner.scan(&decoder, &wire[..12]).unwrap(), None);
/// assert_eq!(scanner.scan(&decoder, wire).unwrap(), Some(wire.len()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameScanner {
    /// Bytes of the frame already walked
    offset: usize,

    /// Elements still owed by each open array, innermost last
    open_arrays: Vec<usize>,

    /// Where the search for the current line's CR resumes
    line_scanned: usize,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets all progress. Call once the scanned frame has been consumed.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.open_arrays.clear();
        self.line_scanned = 0;
    }

    /// Bytes already known to belong to the current frame.
    pub fn scanned(&self) -> usize {
        self.offset
    }

    /// Continues scanning the frame at the start of `buf`.
    ///
    /// `buf` must hold the same bytes as on the previous call, possibly with
    /// more appended. Returns the total frame length once it is buffered.
    pub fn scan(&mut self, decoder: &Decoder, buf: &[u8]) -> ParseResult<Option<usize>> {
        if buf.is_empty() {
            return Err(ParseError::EmptyInput);
        }

        loop {
            let rest = match buf.get(self.offset..) {
                Some(rest) if !rest.is_empty() => rest,
                _ => return Ok(None),
            };

            if self.open_arrays.len() > MAX_NESTING_DEPTH {
                return Err(ParseError::ProtocolError(format!(
                    "maximum nesting depth exceeded: {}",
                    MAX_NESTING_DEPTH
                )));
            }

            let element_len = match rest[0] {
                prefix::SIMPLE_STRING | prefix::ERROR => match self.scan_line(rest)? {
                    Some(len) => len,
                    None => return Ok(None),
                },
                prefix::INTEGER => match decode_decimal(&rest[1..])? {
                    Some((_, len)) => 1 + len,
                    None => return Ok(None),
                },
                prefix::BULK_STRING => match decoder.bulk_span(rest)? {
                    Some((_, len)) => len,
                    None => return Ok(None),
                },
                prefix::ARRAY => match decoder.array_header(rest)? {
                    Some((Some(count), header)) if count > 0 => {
                        self.offset += header;
                        self.open_arrays.push(count);
                        continue;
                    }
                    Some((_, header)) => header,
                    None => return Ok(None),
                },
                other => return Err(ParseError::UnknownPrefix(other)),
            };

            self.offset += element_len;
            self.line_scanned = 0;

            // A finished element fills one slot of its array; a filled array
            // is itself a finished element of its parent
            while let Some(remaining) = self.open_arrays.last_mut() {
                *remaining -= 1;
                if *remaining > 0 {
                    break;
                }
                self.open_arrays.pop();
            }

            if self.open_arrays.is_empty() {
                return Ok(Some(self.offset));
            }
        }
    }

    /// Length of a `+...\r\n` or `-...\r\n` line once its CRLF is buffered.
    fn scan_line(&mut self, rest: &[u8]) -> ParseResult<Option<usize>> {
        let from = self.line_scanned.clamp(1, rest.len());
        let end = match rest[from..].iter().position(|&b| b == b'\r') {
            Some(pos) => from + pos,
            None => {
                self.line_scanned = rest.len();
                return Ok(None);
            }
        };

        match rest.get(end + 1) {
            None => {
                self.line_scanned = end;
                Ok(None)
            }
            Some(b'\n') => Ok(Some(end + 2)),
            Some(_) => Err(ParseError::ProtocolError(
                "carriage return not followed by line feed".to_string(),
            )),
        }
    }
}

/// Decodes the line body of a simple string or error (`+...\r\n`, `-...\r\n`).
fn decode_line(buf: &[u8]) -> ParseResult<Option<(String, usize)>> {
    let body = &buf[1..];
    let end = match body.iter().position(|&b| b == b'\r') {
        Some(pos) => pos,
        None => return Ok(None),
    };

    match body.get(end + 1) {
        None => return Ok(None),
        Some(b'\n') => {}
        Some(_) => {
            return Err(ParseError::ProtocolError(
                "carriage return not followed by line feed".to_string(),
            ))
        }
    }

    let s = std::str::from_utf8(&body[..end])
        .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;

    // +1 for prefix, +2 for CRLF
    Ok(Some((s.to_string(), 1 + end + 2)))
}

/// Decodes `[+|-]<digits>\r\n` from the start of `buf` by base-10 digit
/// folding. Returns the value and the bytes consumed, CRLF included.
fn decode_decimal(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let (negative, digits_start) = match buf.first() {
        None => return Ok(None),
        Some(b'-') => (true, 1),
        Some(b'+') => (false, 1),
        Some(_) => (false, 0),
    };

    let mut value: i64 = 0;
    let mut pos = digits_start;
    while let Some(&b) = buf.get(pos) {
        if !b.is_ascii_digit() {
            break;
        }
        let digit = i64::from(b - b'0');
        // Fold negatives downwards so i64::MIN stays representable
        value = value
            .checked_mul(10)
            .and_then(|v| {
                if negative {
                    v.checked_sub(digit)
                } else {
                    v.checked_add(digit)
                }
            })
            .ok_or_else(|| ParseError::InvalidInteger("value out of range".to_string()))?;
        pos += 1;
    }

    let terminator = match buf.get(pos) {
        None => return Ok(None),
        Some(&b) => b,
    };

    if pos == digits_start {
        return Err(ParseError::InvalidInteger(format!(
            "expected digit, found {:#04x}",
            terminator
        )));
    }
    if terminator != b'\r' {
        return Err(ParseError::InvalidInteger(format!(
            "unexpected byte {:#04x}",
            terminator
        )));
    }

    match buf.get(pos + 1) {
        None => Ok(None),
        Some(b'\n') => Ok(Some((value, pos + 2))),
        Some(_) => Err(ParseError::ProtocolError(
            "carriage return not followed by line feed".to_string(),
        )),
    }
}

/// Decodes one frame with the default limits.
pub fn decode_one(buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
    Decoder::new().decode(buf)
}

/// Decodes one command request with the default limits.
pub fn decode_command(buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
    Decoder::new().decode_command(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::encode;

    #[test]
    fn test_decode_simple_string() {
        let (frame, consumed) = decode_one(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::SimpleString("OK".to_string()));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_decode_simple_string_incomplete() {
        assert!(decode_one(b"+OK").unwrap().is_none());
        assert!(decode_one(b"+OK\r").unwrap().is_none());
    }

    #[test]
    fn test_decode_simple_string_bare_cr() {
        let result = decode_one(b"+O\rK\r\n");
        assert!(matches!(result, Err(ParseError::ProtocolError(_))));
    }

    #[test]
    fn test_decode_error() {
        let (frame, consumed) = decode_one(b"-Error message\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Error("Error message".to_string()));
        assert_eq!(consumed, 16);
    }

    #[test]
    fn test_decode_integer() {
        let (frame, consumed) = decode_one(b":1000\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Integer(1000));
        assert_eq!(consumed, 7);

        let (frame, _) = decode_one(b":0\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Integer(0));
    }

    #[test]
    fn test_decode_signed_integers() {
        let (frame, _) = decode_one(b":-42\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Integer(-42));

        let (frame, _) = decode_one(b":+7\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Integer(7));

        let (frame, _) = decode_one(b":-9223372036854775808\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Integer(i64::MIN));
    }

    #[test]
    fn test_decode_invalid_integer() {
        assert!(matches!(
            decode_one(b":not_a_number\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
        assert!(matches!(
            decode_one(b":12a\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
        assert!(matches!(
            decode_one(b":-\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
        assert!(matches!(
            decode_one(b":9223372036854775808\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
    }

    #[test]
    fn test_decode_bulk_string() {
        let (frame, consumed) = decode_one(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::bulk_string("hello"));
        assert_eq!(consumed, 11);
    }

    #[test]
    fn test_decode_null_bulk_string() {
        let (frame, consumed) = decode_one(b"$-1\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::BulkString(None));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_decode_empty_bulk_string() {
        let (frame, consumed) = decode_one(b"$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::bulk_string(""));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_decode_bulk_string_incomplete() {
        assert!(decode_one(b"$5\r\nhel").unwrap().is_none());
        assert!(decode_one(b"$5\r\nhello\r").unwrap().is_none());
        assert!(decode_one(b"$12").unwrap().is_none());
    }

    #[test]
    fn test_decode_bulk_string_bad_trailer() {
        assert!(matches!(
            decode_one(b"$5\r\nhelloXY"),
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_decode_bulk_string_bad_length() {
        assert_eq!(
            decode_one(b"$-2\r\n"),
            Err(ParseError::InvalidBulkLength(-2))
        );
        assert!(matches!(
            decode_one(b"$x\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
    }

    #[test]
    fn test_decode_bulk_string_too_large() {
        let decoder = Decoder::new().with_max_bulk_len(4);
        assert_eq!(
            decoder.decode(b"$5\r\n"),
            Err(ParseError::MessageTooLarge { size: 5, max: 4 })
        );
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        let (frame, _) = decode_one(b"$5\r\nhel\x00o\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::bulk_string(&b"hel\x00o"[..]));
    }

    #[test]
    fn test_decode_array() {
        let (frame, consumed) = decode_one(b"*2\r\n$5\r\nhello\r\n$5\r\nworld\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(
            frame,
            Frame::array(vec![Frame::bulk_string("hello"), Frame::bulk_string("world")])
        );
        assert_eq!(consumed, 26);
    }

    #[test]
    fn test_decode_null_and_empty_array() {
        let (frame, consumed) = decode_one(b"*-1\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Array(None));
        assert_eq!(consumed, 5);

        let (frame, consumed) = decode_one(b"*0\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::array(vec![]));
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_decode_nested_array() {
        let input = b"*2\r\n*3\r\n:1\r\n:2\r\n:3\r\n*2\r\n+Hello\r\n-World\r\n";
        let (frame, consumed) = decode_one(input).unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::array(vec![
                Frame::array(vec![Frame::integer(1), Frame::integer(2), Frame::integer(3)]),
                Frame::array(vec![
                    Frame::simple_string("Hello"),
                    Frame::error("World"),
                ]),
            ])
        );
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_decode_mixed_array() {
        let input = b"*5\r\n:1\r\n:2\r\n:3\r\n:4\r\n$5\r\nhello\r\n";
        let (frame, _) = decode_one(input).unwrap().unwrap();
        assert_eq!(frame.as_array().map(|a| a.len()), Some(5));
    }

    #[test]
    fn test_decode_stops_at_frame_boundary() {
        let input = b"+OK\r\n:5\r\n";
        let (frame, consumed) = decode_one(input).unwrap().unwrap();
        assert_eq!(frame, Frame::ok());
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_decode_empty_input() {
        assert_eq!(decode_one(b""), Err(ParseError::EmptyInput));
        assert_eq!(ParseError::EmptyInput.to_string(), "no data");
    }

    #[test]
    fn test_decode_unknown_prefix() {
        assert_eq!(
            decode_one(b"@invalid\r\n"),
            Err(ParseError::UnknownPrefix(b'@'))
        );
    }

    #[test]
    fn test_nesting_limit() {
        let mut input = Vec::new();
        for _ in 0..=MAX_NESTING_DEPTH + 1 {
            input.extend_from_slice(b"*1\r\n");
        }
        input.extend_from_slice(b":1\r\n");
        assert!(matches!(
            decode_one(&input),
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_huge_array_count_does_not_preallocate() {
        let decoder = Decoder::new().with_max_array_len(usize::MAX);
        assert!(decoder.decode(b"*1000000000\r\n:1\r\n").unwrap().is_none());
    }

    #[test]
    fn test_every_truncated_prefix_is_incomplete() {
        let frame = Frame::array(vec![
            Frame::bulk_string("SET"),
            Frame::simple_string("key"),
            Frame::integer(-17),
            Frame::null_bulk(),
            Frame::null_array(),
            Frame::array(vec![Frame::error("ERR nope"), Frame::bulk_string("")]),
        ]);
        let bytes = encode(&frame);

        for end in 1..bytes.len() {
            assert_eq!(
                decode_one(&bytes[..end]),
                Ok(None),
                "prefix of length {} should be incomplete",
                end
            );
        }
        assert_eq!(decode_one(&bytes), Ok(Some((frame, bytes.len()))));
    }

    #[test]
    fn test_roundtrip() {
        let frames = vec![
            Frame::simple_string("OK"),
            Frame::error("ERR unknown command 'FOO'"),
            Frame::integer(i64::MAX),
            Frame::bulk_string(&b"\r\nbinary\x00\r\n"[..]),
            Frame::null_bulk(),
            Frame::null_array(),
            Frame::array(vec![Frame::bulk_string("GET"), Frame::bulk_string("key")]),
        ];

        for frame in frames {
            let bytes = encode(&frame);
            assert_eq!(decode_one(&bytes), Ok(Some((frame, bytes.len()))));
        }
    }

    #[test]
    fn test_decode_command() {
        let input = b"*3\r\n$3\r\nset\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        let (command, consumed) = decode_command(input).unwrap().unwrap();
        assert_eq!(command.name, "SET");
        assert_eq!(command.args, vec![Bytes::from("foo"), Bytes::from("bar")]);
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_decode_command_incomplete() {
        assert!(decode_command(b"*1\r\n$4\r\nPI").unwrap().is_none());
    }

    #[test]
    fn test_decode_command_rejects_non_array() {
        assert!(matches!(
            decode_command(b"+PING\r\n"),
            Err(ParseError::InvalidCommand(_))
        ));
        assert!(matches!(
            decode_command(b"*-1\r\n"),
            Err(ParseError::InvalidCommand(_))
        ));
        assert!(matches!(
            decode_command(b"*0\r\n"),
            Err(ParseError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_decode_command_rejects_non_string_elements() {
        assert!(matches!(
            decode_command(b"*2\r\n$3\r\nGET\r\n:1\r\n"),
            Err(ParseError::InvalidCommand(_))
        ));
        assert!(matches!(
            decode_command(b"*2\r\n$3\r\nGET\r\n$-1\r\n"),
            Err(ParseError::InvalidCommand(_))
        ));
    }

    fn scan_all(wire: &[u8]) -> ParseResult<Option<usize>> {
        FrameScanner::new().scan(&Decoder::new(), wire)
    }

    #[test]
    fn test_scanner_agrees_with_decoder() {
        let frames: &[&[u8]] = &[
            b"+OK\r\n",
            b"-ERR bad\r\n",
            b":-12\r\n",
            b"$5\r\nhello\r\n",
            b"$0\r\n\r\n",
            b"$-1\r\n",
            b"*-1\r\n",
            b"*0\r\n",
            b"*2\r\n*1\r\n:1\r\n*0\r\n",
            b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n",
        ];

        for wire in frames {
            let (_, consumed) = decode_one(wire).unwrap().unwrap();
            assert_eq!(scan_all(wire).unwrap(), Some(consumed));
        }
    }

    #[test]
    fn test_scanner_stops_at_frame_boundary() {
        let wire = b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n";
        assert_eq!(scan_all(wire).unwrap(), Some(14));
    }

    #[test]
    fn test_scanner_resumes_byte_by_byte() {
        let decoder = Decoder::new();
        let wire = b"*3\r\n$4\r\nECHO\r\n+hi there\r\n*2\r\n:1\r\n$-1\r\n";
        let mut scanner = FrameScanner::new();

        for end in 1..wire.len() {
            assert_eq!(
                scanner.scan(&decoder, &wire[..end]).unwrap(),
                None,
                "prefix of {} bytes",
                end
            );
        }
        assert_eq!(scanner.scan(&decoder, wire).unwrap(), Some(wire.len()));
    }

    #[test]
    fn test_scanner_keeps_progress_across_calls() {
        let decoder = Decoder::new();
        let mut wire = b"*1001\r\n$3\r\nDEL\r\n".to_vec();
        for _ in 0..1000 {
            wire.extend_from_slice(b"$1\r\nx\r\n");
        }

        let half = wire.len() / 2;
        let mut scanner = FrameScanner::new();
        assert_eq!(scanner.scan(&decoder, &wire[..half]).unwrap(), None);

        // Whole elements already walked are not walked again
        let walked = scanner.scanned();
        assert!(walked > half - 7 && walked <= half);

        assert_eq!(scanner.scan(&decoder, &wire).unwrap(), Some(wire.len()));

        scanner.reset();
        assert_eq!(scanner.scanned(), 0);
    }

    #[test]
    fn test_scanner_rejects_what_decoder_rejects() {
        assert_eq!(scan_all(b""), Err(ParseError::EmptyInput));
        assert_eq!(scan_all(b"!x\r\n"), Err(ParseError::UnknownPrefix(b'!')));
        assert!(matches!(
            scan_all(b"*2\r\n$3\r\nSET\r\n?"),
            Err(ParseError::UnknownPrefix(b'?'))
        ));
        assert!(matches!(scan_all(b"+a\rb"), Err(ParseError::ProtocolError(_))));
        assert!(matches!(scan_all(b"$-2\r\n"), Err(ParseError::InvalidBulkLength(-2))));

        let decoder = Decoder::new().with_max_bulk_len(16);
        assert!(matches!(
            FrameScanner::new().scan(&decoder, b"*2\r\n$3\r\nSET\r\n$100\r\n"),
            Err(ParseError::MessageTooLarge { size: 100, max: 16 })
        ));

        let deep = "*1\r\n".repeat(MAX_NESTING_DEPTH + 2);
        assert!(matches!(
            scan_all(deep.as_bytes()),
            Err(ParseError::ProtocolError(_))
        ));
    }
}
