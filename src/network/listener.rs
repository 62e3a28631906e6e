// Listener and stream abstractions the timeout decorators are generic over,
// with implementations for Tokio's TCP and Unix domain sockets.

use super::Address;
use crate::{Result, TimeoutError};
use async_trait::async_trait;
use std::fmt;
use std::io::{self, IoSlice};
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// A source of incoming stream connections
///
/// This is the accept side of a transport. [`TimeoutListener`] wraps any
/// implementation and itself implements the trait, so it can be passed
/// wherever a plain listener is expected.
///
/// [`TimeoutListener`]: crate::TimeoutListener
#[async_trait]
pub trait Listener: Send {
    /// Connection type produced by `accept`
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    /// Address type reported for peers and the local socket
    type Addr: fmt::Debug + Send + 'static;

    /// Waits for the next connection
    async fn accept(&mut self) -> io::Result<(Self::Stream, Self::Addr)>;

    /// Returns the address this listener is bound to
    fn local_addr(&self) -> io::Result<Self::Addr>;
}

/// Address introspection for established connections
pub trait Connection {
    type Addr;

    fn local_addr(&self) -> io::Result<Self::Addr>;
    fn peer_addr(&self) -> io::Result<Self::Addr>;
}

#[async_trait]
impl Listener for TcpListener {
    type Stream = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(&*self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

impl Connection for TcpStream {
    type Addr = SocketAddr;

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }
}

#[cfg(unix)]
#[async_trait]
impl Listener for UnixListener {
    type Stream = UnixStream;
    type Addr = tokio::net::unix::SocketAddr;

    async fn accept(&mut self) -> io::Result<(UnixStream, tokio::net::unix::SocketAddr)> {
        UnixListener::accept(&*self).await
    }

    fn local_addr(&self) -> io::Result<tokio::net::unix::SocketAddr> {
        UnixListener::local_addr(self)
    }
}

#[cfg(unix)]
impl Connection for UnixStream {
    type Addr = tokio::net::unix::SocketAddr;

    fn local_addr(&self) -> io::Result<tokio::net::unix::SocketAddr> {
        UnixStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<tokio::net::unix::SocketAddr> {
        UnixStream::peer_addr(self)
    }
}

#[cfg(unix)]
fn unix_address(addr: &tokio::net::unix::SocketAddr) -> Address {
    Address::Unix(addr.as_pathname().map(|p| p.to_path_buf()).unwrap_or_default())
}

/// A listener bound from an [`Address`]: TCP or Unix domain
#[derive(Debug)]
pub enum BoundListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

/// A connection accepted by a [`BoundListener`]
#[derive(Debug)]
pub enum BoundStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl BoundListener {
    /// Binds a listener of the kind selected by `address`
    pub async fn bind(address: &Address) -> Result<Self> {
        match address {
            Address::Network(addr) => TcpListener::bind(*addr)
                .await
                .map(BoundListener::Tcp)
                .map_err(|source| TimeoutError::Bind {
                    address: address.to_string(),
                    source,
                }),
            Address::Unix(path) => Self::bind_unix(address, path),
        }
    }

    #[cfg(unix)]
    fn bind_unix(address: &Address, path: &std::path::Path) -> Result<Self> {
        UnixListener::bind(path)
            .map(BoundListener::Unix)
            .map_err(|source| TimeoutError::Bind {
                address: address.to_string(),
                source,
            })
    }

    #[cfg(not(unix))]
    fn bind_unix(address: &Address, _path: &std::path::Path) -> Result<Self> {
        Err(TimeoutError::Unsupported(format!(
            "Unix domain sockets are not available on this platform: {address}"
        )))
    }
}

#[async_trait]
impl Listener for BoundListener {
    type Stream = BoundStream;
    type Addr = Address;

    async fn accept(&mut self) -> io::Result<(BoundStream, Address)> {
        match self {
            BoundListener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                Ok((BoundStream::Tcp(stream), Address::Network(addr)))
            }
            #[cfg(unix)]
            BoundListener::Unix(listener) => {
                let (stream, addr) = listener.accept().await?;
                Ok((BoundStream::Unix(stream), unix_address(&addr)))
            }
        }
    }

    fn local_addr(&self) -> io::Result<Address> {
        match self {
            BoundListener::Tcp(listener) => listener.local_addr().map(Address::Network),
            #[cfg(unix)]
            BoundListener::Unix(listener) => listener.local_addr().map(|a| unix_address(&a)),
        }
    }
}

impl Connection for BoundStream {
    type Addr = Address;

    fn local_addr(&self) -> io::Result<Address> {
        match self {
            BoundStream::Tcp(stream) => stream.local_addr().map(Address::Network),
            #[cfg(unix)]
            BoundStream::Unix(stream) => stream.local_addr().map(|a| unix_address(&a)),
        }
    }

    fn peer_addr(&self) -> io::Result<Address> {
        match self {
            BoundStream::Tcp(stream) => stream.peer_addr().map(Address::Network),
            #[cfg(unix)]
            BoundStream::Unix(stream) => stream.peer_addr().map(|a| unix_address(&a)),
        }
    }
}

impl AsyncRead for BoundStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            BoundStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            BoundStream::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for BoundStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            BoundStream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            BoundStream::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            BoundStream::Tcp(stream) => Pin::new(stream).poll_write_vectored(cx, bufs),
            #[cfg(unix)]
            BoundStream::Unix(stream) => Pin::new(stream).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            BoundStream::Tcp(stream) => stream.is_write_vectored(),
            #[cfg(unix)]
            BoundStream::Unix(stream) => stream.is_write_vectored(),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            BoundStream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            BoundStream::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            BoundStream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            BoundStream::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
