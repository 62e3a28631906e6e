//! Idle-timeout decorators for Tokio listeners and stream connections.
//!
//! A [`TimeoutListener`] wraps any [`Listener`] and hands out
//! [`TimeoutStream`]s. Each stream owns a watchdog that closes it when no
//! read or write has been attempted for the configured idle duration. Any
//! I/O after that fails with the ordinary "use of closed connection" error.
//!
//! ```no_run
//! use std::time::Duration;
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let address = "127.0.0.1:8080".parse()?;
//!     let mut listener = timeoutconn::listen(&address, Duration::from_secs(30)).await?;
//!
//!     loop {
//!         let (mut stream, _peer) = listener.accept().await?;
//!         tokio::spawn(async move {
//!             let mut buf = [0u8; 1024];
//!             while let Ok(n) = stream.read(&mut buf).await {
//!                 if n == 0 || stream.write_all(&buf[..n]).await.is_err() {
//!                     break;
//!                 }
//!             }
//!         });
//!     }
//! }
//! ```

use thiserror::Error;

/// Error types for the timeoutconn library
///
/// I/O on an established connection reports `std::io::Error` directly so the
/// decorators remain substitutable for the streams they wrap. This type
/// covers construction, configuration and binding.
#[derive(Error, Debug)]
pub enum TimeoutError {
    /// Errors from the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binding a listener to an address failed
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No Tokio runtime is available to host the watchdog
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Unsupported transport or operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Result type for the timeoutconn library
pub type Result<T> = std::result::Result<T, TimeoutError>;

pub mod network;
pub mod server;
pub mod timeout;

pub use network::{Address, BoundListener, BoundStream, Connection, Listener, listen, listen_network};
pub use server::{EchoServer, ServerConfig};
pub use timeout::{
    CloseHandle, IdleTimeout, TimeoutListener, TimeoutStream, WatchdogState, is_closed_error,
};
