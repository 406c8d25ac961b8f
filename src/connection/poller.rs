//! I/O Multiplexer
//!
//! A thin wrapper over `mio::Poll`, which uses epoll on Linux, kqueue on the
//! BSDs and macOS, and IOCP on Windows. The reactor only ever talks to this
//! type: it registers sources under a [`Token`], waits for readiness, and
//! deregisters sources it closes.
//!
//! mio notifications are edge-triggered. A source that reports readable must
//! be read until `WouldBlock`, or no further event will arrive for it.

use mio::event::Source;
use mio::{Events, Interest, Poll, Token, Waker};
use std::io;
use std::time::Duration;

/// What a single registered source is ready for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: Token,
    /// Data, end-of-stream or an error is waiting to be read
    pub readable: bool,
    pub writable: bool,
}

/// Readiness notification over many sources.
pub struct Poller {
    poll: Poll,
    events: Events,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("event_capacity", &self.events.capacity())
            .finish()
    }
}

impl Poller {
    /// Creates a poller that reports at most `event_capacity` events per wait.
    pub fn new(event_capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(event_capacity.max(1)),
        })
    }

    pub fn register<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().register(source, token, interest)
    }

    pub fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn deregister<S>(&self, source: &mut S) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().deregister(source)
    }

    /// Creates a waker that makes a blocked [`wait`](Self::wait) return with
    /// an event for `token`.
    pub fn waker(&self, token: Token) -> io::Result<Waker> {
        Waker::new(self.poll.registry(), token)
    }

    /// Blocks until at least one source is ready or `timeout` elapses.
    ///
    /// A wait interrupted by a signal returns no events rather than an error.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Readiness>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        Ok(self
            .events
            .iter()
            .map(|event| Readiness {
                token: event.token(),
                readable: event.is_readable() || event.is_read_closed() || event.is_error(),
                writable: event.is_writable(),
            })
            .collect())
    }
}
