use super::ServerConfig;
use crate::network::{Listener, listen};
use crate::timeout::{TimeoutListener, TimeoutStream, is_closed_error};
use crate::{Result, TimeoutError};
use bytes::BytesMut;
use std::fmt::Display;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{Instrument, error, info, warn};

/// Echo server whose connections are closed after a period of inactivity
///
/// Every accepted connection is a [`TimeoutStream`], so a client that
/// connects and goes silent is disconnected after `idle_timeout` without
/// any per-read timeout in the connection handler.
///
/// # Examples
///
/// ```no_run
/// use timeoutconn::{EchoServer, ServerConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServerConfig::new("127.0.0.1:8080".parse()?)
///         .with_idle_timeout(Duration::from_secs(10));
///     let server = EchoServer::new(config);
///     let shutdown_signal = server.shutdown_signal();
///
///     let server_handle = tokio::spawn(async move { server.run().await });
///
///     // Do other work...
///
///     let _ = shutdown_signal.send(());
///     server_handle.await??;
///     Ok(())
/// }
/// ```
pub struct EchoServer {
    config: ServerConfig,
    shutdown_signal: Arc<broadcast::Sender<()>>,
}

impl EchoServer {
    /// Creates a new echo server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_signal, _) = broadcast::channel(1);
        Self {
            config,
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    /// Binds the configured address and serves until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = listen(&self.config.bind_addr, self.config.idle_timeout).await?;
        info!(
            address = %self.config.bind_addr,
            idle_ms = self.config.idle_timeout.as_millis() as u64,
            "Echo server listening"
        );
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener until shutdown
    pub async fn serve<L>(&self, mut listener: TimeoutListener<L>) -> Result<()>
    where
        L: Listener,
        L::Addr: Display,
    {
        if self.config.buffer_size == 0 {
            return Err(TimeoutError::Config(
                "Buffer size must be greater than zero".to_string(),
            ));
        }

        let connection_count = Arc::new(AtomicUsize::new(0));
        let mut shutdown_rx = self.shutdown_signal.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let current_count = connection_count.load(Ordering::SeqCst);
                            if current_count >= self.config.max_connections {
                                warn!(%addr, current = current_count, limit = self.config.max_connections, "Connection rejected: limit reached");
                                continue;
                            }

                            let new_count = connection_count.fetch_add(1, Ordering::SeqCst) + 1;
                            info!(%addr, current = new_count, "Accepted connection");

                            let buffer_size = self.config.buffer_size;
                            let connection_count = connection_count.clone();
                            let addr = addr.to_string();
                            let span = tracing::info_span!("connection", %addr);
                            tokio::spawn(async move {
                                match Self::handle_connection(stream, buffer_size).instrument(span).await {
                                    Ok(()) => {}
                                    Err(e) if is_closed_error(&e) => {
                                        info!(%addr, "Connection closed after idle timeout");
                                    }
                                    Err(e) => {
                                        error!(%addr, error = %e, "Error handling connection");
                                    }
                                }
                                let final_count = connection_count.fetch_sub(1, Ordering::SeqCst) - 1;
                                info!(%addr, current = final_count, "Connection closed");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal, stopping server");
                    break;
                }
            }
        }

        info!("Echo server stopped");
        Ok(())
    }

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }

    /// Echoes until the client disconnects or the watchdog closes the stream
    async fn handle_connection<S>(mut stream: TimeoutStream<S>, buffer_size: usize) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut buffer = BytesMut::with_capacity(buffer_size);

        loop {
            buffer.clear();
            let n = stream.read_buf(&mut buffer).await?;
            if n == 0 {
                info!("Client closed connection");
                break;
            }

            stream.write_all(&buffer[..n]).await?;
            stream.flush().await?;
            info!(size = n, "Echoed data");
        }

        Ok(())
    }
}
