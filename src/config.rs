//! Server configuration with sensible defaults.

/// Default host: listen on all interfaces
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port
pub const DEFAULT_PORT: u16 = 8379;

/// Configuration for the connection reactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,

    /// Active connections beyond this are closed right after accept
    pub max_connections: usize,

    /// Per-connection cap on buffered inbound or pending outbound bytes.
    /// Also bounds the declared length of a single bulk string.
    pub max_buffer_size: usize,

    /// Bytes requested per socket read
    pub read_chunk_size: usize,

    /// Bytes read from one connection per readiness event before the reactor
    /// moves on to other clients
    pub read_budget: usize,

    /// Readiness events drained per wait
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: 10_000,
            max_buffer_size: 8 * 1024 * 1024, // 8 MB
            read_chunk_size: 16 * 1024,
            read_budget: 256 * 1024,
            event_capacity: 1024,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the bind address as `host:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`ServerConfig`]
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    pub fn max_buffer_size(mut self, bytes: usize) -> Self {
        self.config.max_buffer_size = bytes;
        self
    }

    /// Set the read chunk size (clamped to at least 1 byte)
    pub fn read_chunk_size(mut self, bytes: usize) -> Self {
        self.config.read_chunk_size = bytes.max(1);
        self
    }

    /// Set the per-event read budget (clamped to at least 1 byte)
    pub fn read_budget(mut self, bytes: usize) -> Self {
        self.config.read_budget = bytes.max(1);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
