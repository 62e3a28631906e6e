use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

use super::config::IdleTimeout;
use super::stream::TimeoutStream;
use crate::Result;
use crate::network::Listener;

/// A listener whose accepted connections close themselves when idle
///
/// Wraps any [`Listener`]. Every connection returned by [`accept`] is a
/// [`TimeoutStream`] whose watchdog is already armed, so no activity can
/// happen before the countdown starts. Accept failures from the wrapped
/// listener are returned unchanged. The listener is closed by dropping it.
///
/// [`accept`]: TimeoutListener::accept
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use timeoutconn::TimeoutListener;
/// use tokio::net::TcpListener;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let tcp = TcpListener::bind("127.0.0.1:0").await?;
///     let mut listener = TimeoutListener::new(tcp, Duration::from_secs(10))?;
///
///     let (stream, peer) = listener.accept().await?;
///     println!("{peer} connected, idle limit {:?}", stream.idle_timeout());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct TimeoutListener<L> {
    listener: L,
    idle_timeout: IdleTimeout,
}

impl<L: Listener> TimeoutListener<L> {
    /// Wraps an already bound listener
    ///
    /// Fails with [`TimeoutError::Config`](crate::TimeoutError::Config) for a
    /// zero `idle_timeout`.
    pub fn new(listener: L, idle_timeout: Duration) -> Result<Self> {
        Ok(Self::with_idle_timeout(listener, IdleTimeout::new(idle_timeout)?))
    }

    /// Wraps an already bound listener with a validated idle timeout
    pub fn with_idle_timeout(listener: L, idle_timeout: IdleTimeout) -> Self {
        Self {
            listener,
            idle_timeout,
        }
    }

    /// Waits for a connection and returns it with its watchdog armed
    pub async fn accept(&mut self) -> io::Result<(TimeoutStream<L::Stream>, L::Addr)> {
        self.accept_armed().await
    }

    async fn accept_armed(&mut self) -> io::Result<(TimeoutStream<L::Stream>, L::Addr)> {
        let (stream, addr) = self.listener.accept().await?;
        let handle = Handle::try_current().map_err(io::Error::other)?;
        let stream = TimeoutStream::arm(stream, self.idle_timeout, &handle);
        debug!(
            peer = ?addr,
            idle_ms = self.idle_timeout.as_duration().as_millis() as u64,
            "Accepted connection"
        );
        Ok((stream, addr))
    }

    /// Local address of the wrapped listener
    pub fn local_addr(&self) -> io::Result<L::Addr> {
        self.listener.local_addr()
    }

    /// The idle duration applied to every accepted connection
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout.as_duration()
    }

    /// Returns a reference to the wrapped listener
    pub fn get_ref(&self) -> &L {
        &self.listener
    }

    /// Unwraps the listener; connections already accepted keep their watchdogs
    pub fn into_inner(self) -> L {
        self.listener
    }
}

#[async_trait]
impl<L: Listener> Listener for TimeoutListener<L> {
    type Stream = TimeoutStream<L::Stream>;
    type Addr = L::Addr;

    async fn accept(&mut self) -> io::Result<(Self::Stream, Self::Addr)> {
        self.accept_armed().await
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.listener.local_addr()
    }
}
