//! RESP Protocol Codec
//!
//! Pure conversion between wire bytes and typed frames. Nothing in this module
//! performs I/O or holds shared state.
//!
//! ## Modules
//!
//! - `types`: the [`Frame`] enum and its encoding
//! - `parser`: the resumable [`Decoder`] and the allocation-free [`FrameScanner`]
//! - `command`: the [`Command`] request built from a decoded frame
//!
//! ## Example
//!
//! ```
//! use pulsekv::protocol::{decode_command, Frame};
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (command, consumed) = decode_command(data).unwrap().unwrap();
//! assert_eq!(command.name, "GET");
//! assert_eq!(consumed, data.len());
//!
//! let reply = Frame::bulk_string("Ariz").serialize();
//! assert_eq!(reply, b"$4\r\nAriz\r\n");
//! ```

pub mod command;
pub mod parser;
pub mod types;

pub use command::Command;
pub use parser::{decode_command, decode_one, Decoder, FrameScanner, ParseError, ParseResult};
pub use types::{encode, encode_reply, Frame};
