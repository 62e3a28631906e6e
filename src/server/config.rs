use crate::network::Address;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Configuration for the idle-timeout echo server
///
/// # Examples
///
/// ```
/// use timeoutconn::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::new("127.0.0.1:8080".parse().unwrap())
///     .with_idle_timeout(Duration::from_secs(5))
///     .with_max_connections(200);
///
/// assert_eq!(config.idle_timeout, Duration::from_secs(5));
/// assert_eq!(config.max_connections, 200);
/// assert_eq!(config.buffer_size, 1024);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_addr: Address,
    /// Connections without reads or writes for this long are closed
    pub idle_timeout: Duration,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Buffer size for reading/writing data
    pub buffer_size: usize,
}

impl ServerConfig {
    /// Create a new configuration with the given address
    pub fn new(bind_addr: Address) -> Self {
        Self {
            bind_addr,
            idle_timeout: Duration::from_secs(30),
            max_connections: 100,
            buffer_size: 1024,
        }
    }

    /// Set the idle timeout
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Set the buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        // Port 0 for testing
        Self::new(Address::Network(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))))
    }
}
