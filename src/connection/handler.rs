//! Per-Connection State
//!
//! A [`Connection`] is one accepted client socket plus the buffers that let
//! the reactor serve it without blocking:
//!
//! - `inbound` keeps bytes across readiness events, so a frame split over many
//!   reads is decoded once it is complete, and a read holding several
//!   pipelined commands is decoded in a loop.
//! - `outbound` holds encoded replies the socket has not accepted yet.
//!
//! ## Readiness Handling
//!
//! ```text
//!   readable ──> read chunk ──> decode loop ──> evaluate ──> queue reply
//!       ▲            │              │                           │
//!       │            │ WouldBlock   │ Incomplete                ▼
//!       │            ▼              ▼                        flush
//!       └──────── wait for the next event ◄──────────────────────┘
//! ```
//!
//! TCP is a stream protocol: a read may return half a command or ten of them.
//! A [`FrameScanner`] remembers how much of a partial frame has been walked,
//! so a request spread over many reads is neither re-scanned nor built until
//! its last byte arrives. Undecoded bytes are simply discarded when the
//! connection closes, so a partial command never runs.
//!
//! One event reads at most `read_budget` bytes. A connection that stops at
//! the budget reports [`Progress::Yielded`] and the reactor comes back to it
//! after serving everyone else.

use crate::commands::Evaluator;
use crate::protocol::{Decoder, Frame, FrameScanner, ParseError};
use bytes::{Buf, BufMut, BytesMut};
use mio::net::TcpStream;
use mio::{Interest, Token};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use super::poller::Poller;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Connections closed straight after accept because of the limit
    pub connections_rejected: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }
}

/// Everything a connection needs from the reactor to serve one event.
pub struct ServeContext<'a> {
    pub evaluator: &'a Evaluator,
    pub decoder: &'a Decoder,
    pub stats: &'a ConnectionStats,
    pub read_chunk_size: usize,
    pub read_budget: usize,
    pub max_buffer_size: usize,
}

/// What a connection needs from the reactor after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Nothing until the poller reports this socket again
    Idle,
    /// Stopped at the read budget; the socket may still hold input
    Yielded,
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// The byte stream can never become a valid frame
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// End of stream with a partial command buffered
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Inbound bytes exceeded the per-connection limit without forming a command
    #[error("Buffer size limit exceeded: {size} bytes")]
    BufferFull { size: usize },
}

impl ConnectionError {
    /// The error reply owed to the client before closing, if any.
    pub fn reply(&self) -> Option<Frame> {
        match self {
            ConnectionError::ParseError(e) => {
                Some(Frame::error(format!("ERR Protocol error: {}", e)))
            }
            ConnectionError::BufferFull { .. } => {
                Some(Frame::error("ERR Protocol error: request too large"))
            }
            _ => None,
        }
    }
}

/// One accepted client socket and its buffers.
pub struct Connection {
    socket: TcpStream,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes received but not yet decoded
    inbound: BytesMut,

    /// Progress through the frame at the front of `inbound`
    scanner: FrameScanner,

    /// Encoded replies not yet accepted by the socket
    outbound: BytesMut,

    /// Whether the poller currently watches this socket for writability
    write_registered: bool,

    /// Reading stopped because the client is not draining its replies
    read_paused: bool,

    /// The client shut down its write side; replies are still being drained
    peer_closed: bool,
}

impl Connection {
    pub fn new(socket: TcpStream, addr: SocketAddr) -> Self {
        Self {
            socket,
            addr,
            inbound: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            scanner: FrameScanner::new(),
            outbound: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            write_registered: false,
            read_paused: false,
            peer_closed: false,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn socket_mut(&mut self) -> &mut TcpStream {
        &mut self.socket
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.inbound.len()
    }

    /// Services one readiness event.
    pub fn on_ready(
        &mut self,
        readable: bool,
        writable: bool,
        ctx: &ServeContext<'_>,
    ) -> Result<Progress, ConnectionError> {
        if writable {
            self.flush(ctx.stats)?;
        }

        if self.peer_closed {
            return if self.outbound.is_empty() {
                Err(self.end_of_stream())
            } else {
                Ok(Progress::Idle)
            };
        }

        if readable || (self.read_paused && self.outbound.len() < ctx.max_buffer_size) {
            self.read_paused = false;
            return self.on_readable(ctx);
        }
        Ok(Progress::Idle)
    }

    /// Reads until the socket would block or the read budget is spent,
    /// decoding and answering every complete command as it arrives.
    fn on_readable(&mut self, ctx: &ServeContext<'_>) -> Result<Progress, ConnectionError> {
        let mut read_total = 0;

        loop {
            if self.outbound.len() >= ctx.max_buffer_size {
                // Resumed from on_ready once the replies drain
                trace!(client = %self.addr, pending = self.outbound.len(), "Pausing reads");
                self.read_paused = true;
                return Ok(Progress::Idle);
            }

            match self.read_chunk(ctx.read_chunk_size) {
                Ok(0) => return self.on_peer_closed(ctx.stats),
                Ok(n) => {
                    read_total += n;
                    ctx.stats.bytes_read(n);
                    trace!(client = %self.addr, bytes = n, "Read data");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            self.process_buffer(ctx)?;
            self.flush(ctx.stats)?;

            if self.inbound.len() > ctx.max_buffer_size {
                return Err(ConnectionError::BufferFull {
                    size: self.inbound.len(),
                });
            }

            if read_total >= ctx.read_budget {
                trace!(client = %self.addr, bytes = read_total, "Read budget spent, yielding");
                return Ok(Progress::Yielded);
            }
        }

        self.flush(ctx.stats)?;
        Ok(Progress::Idle)
    }

    /// The client shut down its write side. Replies already queued are still
    /// delivered; the connection ends once they are flushed.
    fn on_peer_closed(&mut self, stats: &ConnectionStats) -> Result<Progress, ConnectionError> {
        self.peer_closed = true;
        self.flush(stats)?;

        if self.outbound.is_empty() {
            return Err(self.end_of_stream());
        }
        trace!(
            client = %self.addr,
            pending = self.outbound.len(),
            "Client closed its side, draining replies"
        );
        Ok(Progress::Idle)
    }

    fn end_of_stream(&self) -> ConnectionError {
        if self.inbound.is_empty() {
            ConnectionError::ClientDisconnected
        } else {
            ConnectionError::UnexpectedEof
        }
    }

    /// Appends up to `chunk` bytes from the socket to the inbound buffer.
    fn read_chunk(&mut self, chunk: usize) -> io::Result<usize> {
        let start = self.inbound.len();
        self.inbound.resize(start + chunk, 0);

        let result = self.socket.read(&mut self.inbound[start..]);
        let filled = *result.as_ref().unwrap_or(&0);
        self.inbound.truncate(start + filled);
        result
    }

    /// Decodes and evaluates every complete command in the inbound buffer,
    /// in arrival order.
    ///
    /// Frames are only built once the scanner has seen their last byte.
    fn process_buffer(&mut self, ctx: &ServeContext<'_>) -> Result<(), ConnectionError> {
        while !self.inbound.is_empty() {
            let Some(frame_len) = self.scanner.scan(ctx.decoder, &self.inbound)? else {
                trace!(
                    client = %self.addr,
                    buffered = self.inbound.len(),
                    scanned = self.scanner.scanned(),
                    "Incomplete command, need more data"
                );
                break;
            };
            self.scanner.reset();

            let command = match ctx.decoder.decode_command(&self.inbound[..frame_len])? {
                Some((command, _)) => command,
                None => {
                    return Err(ParseError::ProtocolError(
                        "frame ended before its scanned length".to_string(),
                    )
                    .into())
                }
            };
            self.inbound.advance(frame_len);
            trace!(
                client = %self.addr,
                consumed = frame_len,
                remaining = self.inbound.len(),
                "Parsed command"
            );

            let mut out = (&mut self.outbound).writer();
            ctx.evaluator.eval_and_respond(&command, &mut out)?;
            ctx.stats.command_processed();
        }
        Ok(())
    }

    /// Writes pending replies until done or the socket would block.
    pub fn flush(&mut self, stats: &ConnectionStats) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.socket.write(&self.outbound) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.outbound.advance(n);
                    stats.bytes_written(n);
                    trace!(client = %self.addr, bytes = n, "Sent response");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Queues `frame` and makes one attempt to send everything pending.
    /// Used right before closing, so failures are ignored.
    pub fn send_final(&mut self, frame: &Frame, stats: &ConnectionStats) {
        let mut buf = Vec::new();
        frame.serialize_into(&mut buf);
        self.outbound.extend_from_slice(&buf);
        let _ = self.flush(stats);
    }

    /// Watches for writability only while replies are pending.
    pub fn sync_interest(&mut self, poller: &Poller, token: Token) -> io::Result<()> {
        let wants_write = !self.outbound.is_empty();
        if wants_write == self.write_registered {
            return Ok(());
        }

        let interest = if wants_write {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        poller.reregister(&mut self.socket, token, interest)?;
        self.write_registered = wants_write;
        Ok(())
    }
}
