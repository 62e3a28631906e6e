use std::fmt;
use std::io::{self, IoSlice};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::runtime::Handle;
use tracing::debug;

use super::config::IdleTimeout;
use super::watchdog::{self, Expire, Watchdog, WatchdogState};
use crate::network::Connection;
use crate::{Result, TimeoutError};

const CLOSED_MESSAGE: &str = "use of closed connection";

/// The error returned by any operation on a closed connection.
///
/// Idle-timeout closure and explicit closure report the same error.
pub(crate) fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, CLOSED_MESSAGE)
}

/// Returns true if `err` is the error reported for I/O on a closed connection
///
/// # Examples
///
/// ```
/// use std::io;
/// use timeoutconn::is_closed_error;
///
/// let err = io::Error::from(io::ErrorKind::NotConnected);
/// assert!(is_closed_error(&err));
/// assert!(!is_closed_error(&io::Error::from(io::ErrorKind::TimedOut)));
/// ```
pub fn is_closed_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotConnected
}

/// A stream that closes itself after a period without reads or writes
///
/// Starting a read, write or flush pushes the idle deadline back before
/// delegating to the wrapped stream, so idle time is measured from the last
/// I/O attempt rather than the last completed transfer. Polling an operation
/// that is already pending does not count again, so a read waiting on a
/// silent peer cannot keep the connection alive on its own. When
/// the deadline passes, a background watchdog task drops the wrapped stream,
/// which releases the socket and wakes any pending read or write. From then
/// on every operation fails with `io::ErrorKind::NotConnected`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use timeoutconn::{TimeoutStream, WatchdogState};
///
/// #[tokio::main]
/// async fn main() -> timeoutconn::Result<()> {
///     let (local, _remote) = tokio::io::duplex(64);
///     let stream = TimeoutStream::new(local, Duration::from_millis(20))?;
///
///     tokio::time::sleep(Duration::from_millis(100)).await;
///     assert_eq!(stream.state(), WatchdogState::Fired);
///     assert!(stream.is_closed());
///     Ok(())
/// }
/// ```
pub struct TimeoutStream<S> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    slot: Mutex<Slot<S>>,
    watchdog: Watchdog,
}

struct Slot<S> {
    stream: Option<S>,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
    // Set while an operation in that direction is pending.
    read_pending: bool,
    write_pending: bool,
}

impl<S> Inner<S> {
    fn lock(&self) -> MutexGuard<'_, Slot<S>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the wrapped stream and wakes pending I/O.
    ///
    /// Returns false if the stream had already been closed.
    fn shutdown(&self) -> bool {
        let (stream, wakers) = {
            let mut slot = self.lock();
            let stream = slot.stream.take();
            let wakers = [slot.read_waker.take(), slot.write_waker.take()];
            (stream, wakers)
        };

        for waker in wakers.into_iter().flatten() {
            waker.wake();
        }

        match stream {
            Some(stream) => {
                drop(stream);
                true
            }
            None => false,
        }
    }

    fn close(&self) -> io::Result<()> {
        self.watchdog.stop();
        if self.shutdown() {
            debug!("Connection closed");
            Ok(())
        } else {
            Err(closed_error())
        }
    }

    fn is_closed(&self) -> bool {
        self.lock().stream.is_none()
    }
}

impl<S: Send + 'static> Expire for Inner<S> {
    fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    fn expire(&self) {
        if self.shutdown() {
            debug!(
                idle_ms = self.watchdog.idle_timeout().as_duration().as_millis() as u64,
                "Idle timeout elapsed, connection closed"
            );
        }
    }
}

trait Close: Send + Sync {
    fn close(&self) -> io::Result<()>;
    fn is_closed(&self) -> bool;
}

impl<S: Send + 'static> Close for Inner<S> {
    fn close(&self) -> io::Result<()> {
        Inner::close(self)
    }

    fn is_closed(&self) -> bool {
        Inner::is_closed(self)
    }
}

impl<S: Send + 'static> TimeoutStream<S> {
    /// Wraps `stream` and arms its watchdog
    ///
    /// Fails with [`TimeoutError::Config`] for a zero `idle_timeout` and with
    /// [`TimeoutError::Runtime`] when called outside a Tokio runtime.
    pub fn new(stream: S, idle_timeout: Duration) -> Result<Self> {
        let idle = IdleTimeout::new(idle_timeout)?;
        let handle = Handle::try_current().map_err(|e| TimeoutError::Runtime(e.to_string()))?;
        Ok(Self::arm(stream, idle, &handle))
    }

    /// Wraps `stream` with an already validated idle timeout.
    pub(crate) fn arm(stream: S, idle: IdleTimeout, handle: &Handle) -> Self {
        let inner = Arc::new(Inner {
            slot: Mutex::new(Slot {
                stream: Some(stream),
                read_waker: None,
                write_waker: None,
                read_pending: false,
                write_pending: false,
            }),
            watchdog: Watchdog::new(idle),
        });
        watchdog::spawn(&inner, handle);
        Self { inner }
    }

    /// Closes the connection
    ///
    /// The wrapped stream is dropped, which releases the underlying socket,
    /// and the watchdog is stopped. Closing an already closed connection,
    /// whether closed explicitly or by the watchdog, returns the same
    /// `NotConnected` error as any other use of a closed connection.
    pub fn close(&self) -> io::Result<()> {
        self.inner.close()
    }

    /// Returns a handle that can close this connection from elsewhere,
    /// for instance after the stream was moved into `tokio::io::split`
    pub fn close_handle(&self) -> CloseHandle {
        let weak: Weak<Inner<S>> = Arc::downgrade(&self.inner);
        CloseHandle { inner: weak }
    }
}

impl<S> TimeoutStream<S> {
    /// The configured idle duration
    pub fn idle_timeout(&self) -> Duration {
        self.inner.watchdog.idle_timeout().as_duration()
    }

    /// The current watchdog state
    pub fn state(&self) -> WatchdogState {
        self.inner.watchdog.state()
    }

    /// Returns true once the connection has been closed, explicitly or by the watchdog
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Returns true if the watchdog closed this connection
    pub fn timed_out(&self) -> bool {
        self.state() == WatchdogState::Fired
    }

    /// Runs `f` against the wrapped stream, e.g. to read or set socket options
    ///
    /// Does not count as activity. Fails with `NotConnected` once closed.
    pub fn with_inner<R>(&self, f: impl FnOnce(&S) -> R) -> io::Result<R> {
        self.inner.lock().stream.as_ref().map(f).ok_or_else(closed_error)
    }

    /// Local address of the wrapped stream
    pub fn local_addr(&self) -> io::Result<S::Addr>
    where
        S: Connection,
    {
        self.with_inner(|stream| stream.local_addr())?
    }

    /// Remote address of the wrapped stream
    pub fn peer_addr(&self) -> io::Result<S::Addr>
    where
        S: Connection,
    {
        self.with_inner(|stream| stream.peer_addr())?
    }
}

impl<S> Drop for TimeoutStream<S> {
    fn drop(&mut self) {
        self.inner.watchdog.stop();
    }
}

impl<S> fmt::Debug for TimeoutStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutStream")
            .field("idle_timeout", &self.idle_timeout())
            .field("state", &self.state())
            .finish()
    }
}

impl<S: Connection> Connection for TimeoutStream<S> {
    type Addr = S::Addr;

    fn local_addr(&self) -> io::Result<S::Addr> {
        TimeoutStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<S::Addr> {
        TimeoutStream::peer_addr(self)
    }
}

fn register(slot: &mut Option<Waker>, waker: &Waker) {
    match slot {
        Some(current) if current.will_wake(waker) => {}
        _ => *slot = Some(waker.clone()),
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TimeoutStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut guard = self.inner.lock();
        let slot = &mut *guard;
        let Some(stream) = slot.stream.as_mut() else {
            return Poll::Ready(Err(closed_error()));
        };
        if !slot.read_pending {
            self.inner.watchdog.reset();
        }

        let poll = Pin::new(stream).poll_read(cx, buf);
        slot.read_pending = poll.is_pending();
        if slot.read_pending {
            register(&mut slot.read_waker, cx.waker());
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TimeoutStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.poll_writer(cx, true, |stream, cx| stream.poll_write(cx, buf))
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.poll_writer(cx, true, |stream, cx| stream.poll_write_vectored(cx, bufs))
    }

    fn is_write_vectored(&self) -> bool {
        self.inner
            .lock()
            .stream
            .as_ref()
            .is_some_and(|stream| stream.is_write_vectored())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_writer(cx, true, |stream, cx| stream.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_writer(cx, false, |stream, cx| stream.poll_shutdown(cx))
    }
}

impl<S: AsyncWrite + Unpin> TimeoutStream<S> {
    /// Runs a write-side operation, resetting the deadline when `activity`
    /// is set and no write is already pending.
    fn poll_writer<T>(
        &self,
        cx: &mut Context<'_>,
        activity: bool,
        op: impl FnOnce(Pin<&mut S>, &mut Context<'_>) -> Poll<io::Result<T>>,
    ) -> Poll<io::Result<T>> {
        let mut guard = self.inner.lock();
        let slot = &mut *guard;
        let Some(stream) = slot.stream.as_mut() else {
            return Poll::Ready(Err(closed_error()));
        };
        if activity && !slot.write_pending {
            self.inner.watchdog.reset();
        }

        let poll = op(Pin::new(stream), cx);
        slot.write_pending = poll.is_pending();
        if slot.write_pending {
            register(&mut slot.write_waker, cx.waker());
        }
        poll
    }
}

/// Closes a [`TimeoutStream`] without access to the stream itself
///
/// Holds only a weak reference: once the stream is dropped, `close` reports
/// the closed-connection error and `is_closed` returns true.
#[derive(Clone)]
pub struct CloseHandle {
    inner: Weak<dyn Close>,
}

impl CloseHandle {
    /// Closes the connection, with the same semantics as [`TimeoutStream::close`]
    pub fn close(&self) -> io::Result<()> {
        match self.inner.upgrade() {
            Some(inner) => inner.close(),
            None => Err(closed_error()),
        }
    }

    /// Returns true once the connection has been closed or dropped
    pub fn is_closed(&self) -> bool {
        self.inner.upgrade().is_none_or(|inner| inner.is_closed())
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}
