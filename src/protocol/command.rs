//! Command requests decoded from the wire.

use crate::protocol::parser::ParseError;
use crate::protocol::types::Frame;
use bytes::Bytes;

/// A client request: an uppercased command name plus its raw arguments.
///
/// Built once per request from a decoded frame and consumed by the
/// evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<Bytes>,
}

impl Command {
    /// Builds a command from string tokens. Handy for tests and tools.
    ///
    /// # Example
    /// ```
    /// use pulsekv::protocol::Command;
    /// let cmd = Command::new("ping", &["hello"]);
    /// assert_eq!(cmd.name, "PING");
    /// ```
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_uppercase(),
            args: args
                .iter()
                .map(|a| Bytes::copy_from_slice(a.as_bytes()))
                .collect(),
        }
    }

    /// Requires `frame` to be a non-null, non-empty array whose elements are
    /// all non-null bulk strings or simple strings.
    pub fn from_frame(frame: Frame) -> Result<Self, ParseError> {
        let elements = match frame {
            Frame::Array(Some(elements)) => elements,
            Frame::Array(None) => {
                return Err(ParseError::InvalidCommand("null array".to_string()))
            }
            other => {
                return Err(ParseError::InvalidCommand(format!(
                    "expected array, got {}",
                    kind(&other)
                )))
            }
        };

        let mut tokens = Vec::with_capacity(elements.len());
        for element in elements {
            let token = match element {
                Frame::BulkString(Some(data)) => data,
                Frame::SimpleString(s) => Bytes::from(s),
                other => {
                    return Err(ParseError::InvalidCommand(format!(
                        "expected bulk string element, got {}",
                        kind(&other)
                    )))
                }
            };
            tokens.push(token);
        }

        if tokens.is_empty() {
            return Err(ParseError::InvalidCommand("empty command".to_string()));
        }

        let args = tokens.split_off(1);
        let name = String::from_utf8_lossy(&tokens[0]).to_uppercase();

        Ok(Self { name, args })
    }
}

fn kind(frame: &Frame) -> &'static str {
    match frame {
        Frame::SimpleString(_) => "simple string",
        Frame::Error(_) => "error",
        Frame::Integer(_) => "integer",
        Frame::BulkString(Some(_)) => "bulk string",
        Frame::BulkString(None) => "null bulk string",
        Frame::Array(Some(_)) => "array",
        Frame::Array(None) => "null array",
    }
}
