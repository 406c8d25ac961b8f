//! Connection Reactor
//!
//! A single thread owns the listening socket, every client connection and the
//! evaluator. It blocks in the [`Poller`] until some socket is ready, then
//! services each ready socket synchronously:
//!
//! 1. Listener readable: accept every pending connection. Past
//!    `max_connections`, an accepted socket is closed at once instead of
//!    registered.
//! 2. Client readable: read into that connection's buffer, decode and
//!    evaluate every complete command, queue and flush the replies.
//! 3. Client writable: flush replies the socket refused earlier.
//! 4. Framing error, end-of-stream, I/O error or buffer overflow: send an
//!    error reply where one is owed, then deregister and drop the connection.
//!
//! A client that exhausts its read budget is revisited after the other ready
//! sockets, with a zero wait timeout so the poller cannot park the loop while
//! input is still queued. A failed accept is retried after a short delay,
//! since the edge-triggered listener will not report the waiting backlog again.
//!
//! The store is the only state shared with other threads.

use crate::commands::Evaluator;
use crate::config::ServerConfig;
use crate::protocol::Decoder;
use crate::storage::Store;
use mio::net::TcpListener;
use mio::{Interest, Token, Waker};
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::handler::{Connection, ConnectionError, ConnectionStats, Progress, ServeContext};
use super::poller::{Poller, Readiness};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CLIENT_TOKEN: usize = 2;

/// Pause before accepting again after an accept failure such as `EMFILE`
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Stops a running [`Server`] from any thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Asks the reactor to stop. It returns from `run` after finishing the
    /// events of its current wait.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            error!(error = %e, "Failed to wake reactor for shutdown");
        }
    }
}

/// The readiness-driven server.
///
/// # Example
///
/// ```no_run
/// use pulsekv::config::ServerConfig;
/// use pulsekv::connection::Server;
/// use pulsekv::storage::Store;
/// use std::sync::Arc;
///
/// let store = Arc::new(Store::new());
/// let server = Server::bind(ServerConfig::default(), store)?;
/// let handle = server.shutdown_handle();
///
/// let reactor = std::thread::spawn(move || server.run());
/// // ... later, from any thread
/// handle.shutdown();
/// reactor.join().unwrap()?;
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    poller: Poller,
    shutdown: ShutdownHandle,
    connections: HashMap<Token, Connection>,
    /// Connections that stopped at their read budget
    yielded: HashSet<Token>,
    next_token: usize,
    accept_retry_at: Option<Instant>,
    evaluator: Evaluator,
    decoder: Decoder,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Binds the listening socket and prepares the poller.
    pub fn bind(config: ServerConfig, store: Arc<Store>) -> io::Result<Self> {
        let addr = resolve(&config.bind_address())?;
        let mut listener = TcpListener::bind(addr)?;

        let poller = Poller::new(config.event_capacity)?;
        poller.register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(poller.waker(WAKER)?);

        let decoder = Decoder::new().with_max_bulk_len(config.max_buffer_size);

        Ok(Self {
            config,
            listener,
            poller,
            shutdown: ShutdownHandle {
                flag: Arc::new(AtomicBool::new(false)),
                waker,
            },
            connections: HashMap::new(),
            yielded: HashSet::new(),
            next_token: FIRST_CLIENT_TOKEN,
            accept_retry_at: None,
            evaluator: Evaluator::new(store),
            decoder,
            stats: Arc::new(ConnectionStats::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Connection statistics, readable from other threads.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the event loop until shutdown is requested.
    ///
    /// Only a failure of the poller itself ends the loop with an error;
    /// per-connection failures just close that connection.
    pub fn run(mut self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "Reactor listening");

        while !self.shutdown.flag.load(Ordering::SeqCst) {
            let ready = self.poller.wait(self.next_timeout())?;

            for readiness in ready {
                match readiness.token {
                    LISTENER => self.accept_pending(),
                    WAKER => {}
                    token => self.service(token, readiness),
                }
            }

            if self.accept_retry_at.is_some_and(|at| Instant::now() >= at) {
                self.accept_retry_at = None;
                self.accept_pending();
            }

            self.resume_yielded();
        }

        let open = self.connections.len();
        for (_, mut connection) in self.connections.drain() {
            let _ = self.poller.deregister(connection.socket_mut());
            self.stats.connection_closed();
        }
        info!(closed = open, "Reactor stopped");
        Ok(())
    }

    /// How long the next wait may block.
    fn next_timeout(&self) -> Option<Duration> {
        if !self.yielded.is_empty() {
            return Some(Duration::ZERO);
        }
        self.accept_retry_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Gives every connection that stopped at its read budget another turn.
    fn resume_yielded(&mut self) {
        let tokens: Vec<Token> = self.yielded.drain().collect();
        for token in tokens {
            let readiness = Readiness {
                token,
                readable: true,
                writable: false,
            };
            self.service(token, readiness);
        }
    }

    /// Accepts until the listener would block.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut socket, addr)) => {
                    if self.connections.len() >= self.config.max_connections {
                        self.stats.connection_rejected();
                        warn!(
                            client = %addr,
                            limit = self.config.max_connections,
                            "Connection limit reached, closing new connection"
                        );
                        continue;
                    }

                    if let Err(e) = socket.set_nodelay(true) {
                        debug!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = self.poller.register(&mut socket, token, Interest::READABLE) {
                        warn!(client = %addr, error = %e, "Failed to register connection");
                        continue;
                    }

                    self.stats.connection_opened();
                    self.connections.insert(token, Connection::new(socket, addr));
                    debug!(
                        client = %addr,
                        active = self.connections.len(),
                        "Client connected"
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.on_accept_error(e);
                    break;
                }
            }
        }
    }

    /// Schedules another accept pass; connections already queued in the
    /// backlog produce no new listener event.
    fn on_accept_error(&mut self, e: io::Error) {
        error!(
            error = %e,
            retry_ms = ACCEPT_RETRY_DELAY.as_millis() as u64,
            "Failed to accept connection"
        );
        self.accept_retry_at = Some(Instant::now() + ACCEPT_RETRY_DELAY);
    }

    /// Services one ready client socket.
    fn service(&mut self, token: Token, readiness: Readiness) {
        // Events for a connection closed earlier in this batch
        let Some(connection) = self.connections.get_mut(&token) else {
            return;
        };

        let ctx = ServeContext {
            evaluator: &self.evaluator,
            decoder: &self.decoder,
            stats: &self.stats,
            read_chunk_size: self.config.read_chunk_size,
            read_budget: self.config.read_budget,
            max_buffer_size: self.config.max_buffer_size,
        };

        let result = connection
            .on_ready(readiness.readable, readiness.writable, &ctx)
            .and_then(|progress| {
                connection.sync_interest(&self.poller, token)?;
                Ok(progress)
            });

        match result {
            Ok(Progress::Yielded) => {
                self.yielded.insert(token);
            }
            Ok(Progress::Idle) => {}
            Err(e) => self.close(token, e),
        }
    }

    /// Sends any owed error reply, then deregisters and drops the connection.
    fn close(&mut self, token: Token, reason: ConnectionError) {
        self.yielded.remove(&token);
        let Some(mut connection) = self.connections.remove(&token) else {
            return;
        };
        let client = connection.addr();

        if let Some(reply) = reason.reply() {
            connection.send_final(&reply, &self.stats);
        }

        match &reason {
            ConnectionError::ClientDisconnected => {
                debug!(client = %client, "Client disconnected")
            }
            ConnectionError::IoError(io_err)
                if io_err.kind() == io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %client, "Connection reset by client")
            }
            ConnectionError::ParseError(e) => {
                warn!(client = %client, error = %e, "Protocol error, closing connection")
            }
            ConnectionError::BufferFull { size } => {
                warn!(client = %client, size = size, "Buffer size limit exceeded")
            }
            _ => debug!(
                client = %client,
                error = %reason,
                discarded = connection.buffered(),
                "Connection closed"
            ),
        }

        if let Err(e) = self.poller.deregister(connection.socket_mut()) {
            debug!(client = %client, error = %e, "Failed to deregister connection");
        }
        self.stats.connection_closed();
    }
}

fn resolve(address: &str) -> io::Result<SocketAddr> {
    address.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no address resolved for {}", address),
        )
    })
}
