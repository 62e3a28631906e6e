//! Network addressing, listener abstractions and bind helpers

pub mod address;
pub mod listener;

pub use address::Address;
pub use listener::{BoundListener, BoundStream, Connection, Listener};

use crate::timeout::{IdleTimeout, TimeoutListener};
use crate::{Result, TimeoutError};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::lookup_host;
use tracing::debug;

/// Binds `address` and wraps the listener with an idle timeout
///
/// Equivalent to [`BoundListener::bind`] followed by
/// [`TimeoutListener::new`]. The idle timeout is validated before any socket
/// is created.
pub async fn listen(
    address: &Address,
    idle_timeout: Duration,
) -> Result<TimeoutListener<BoundListener>> {
    let idle = IdleTimeout::new(idle_timeout)?;
    let listener = BoundListener::bind(address).await?;
    debug!(%address, idle_ms = idle_timeout.as_millis() as u64, "Listening with idle timeout");
    Ok(TimeoutListener::with_idle_timeout(listener, idle))
}

/// Binds a listener from a network name and an address string
///
/// `network` is one of `tcp`, `tcp4`, `tcp6` or `unix`. For the TCP kinds,
/// `address` is `host:port` and every resolved address is tried in turn;
/// `tcp4` and `tcp6` keep only addresses of that family. An empty host means
/// every interface: `[::]` for `tcp` (dual-stack where the host allows it,
/// falling back to `0.0.0.0`), `0.0.0.0` for `tcp4` and `[::]` for `tcp6`.
/// For `unix`, `address` is the socket path.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> timeoutconn::Result<()> {
///     let listener = timeoutconn::listen_network("tcp", ":0", Duration::from_millis(500)).await?;
///     println!("listening on {}", listener.local_addr()?);
///     Ok(())
/// }
/// ```
pub async fn listen_network(
    network: &str,
    address: &str,
    idle_timeout: Duration,
) -> Result<TimeoutListener<BoundListener>> {
    let idle = IdleTimeout::new(idle_timeout)?;
    let listener = match network {
        "tcp" | "tcp4" | "tcp6" => bind_first(address, resolve(network, address).await?).await?,
        "unix" => {
            if address.is_empty() {
                return Err(TimeoutError::Config(
                    "Unix socket path must not be empty".to_string(),
                ));
            }
            BoundListener::bind(&Address::Unix(PathBuf::from(address))).await?
        }
        other => {
            return Err(TimeoutError::Unsupported(format!("Unknown network: {other}")));
        }
    };
    debug!(%network, %address, "Listening with idle timeout");
    Ok(TimeoutListener::with_idle_timeout(listener, idle))
}

/// Resolves a TCP `host:port` into the candidates to bind, in order
async fn resolve(network: &str, address: &str) -> Result<Vec<SocketAddr>> {
    let bind_error = |source: io::Error| TimeoutError::Bind {
        address: address.to_string(),
        source,
    };

    if let Some(port) = address.strip_prefix(':') {
        let port: u16 = port.parse().map_err(|_| {
            bind_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid port in {address}"),
            ))
        })?;
        let v6 = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
        let v4 = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        return Ok(match network {
            "tcp4" => vec![v4],
            "tcp6" => vec![v6],
            _ => vec![v6, v4],
        });
    }

    let candidates: Vec<SocketAddr> = lookup_host(address)
        .await
        .map_err(bind_error)?
        .filter(|addr| match network {
            "tcp4" => addr.is_ipv4(),
            "tcp6" => addr.is_ipv6(),
            _ => true,
        })
        .collect();
    if candidates.is_empty() {
        return Err(bind_error(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {network} address for {address}"),
        )));
    }
    Ok(candidates)
}

/// Binds the first candidate that succeeds, reporting the last failure otherwise
async fn bind_first(address: &str, candidates: Vec<SocketAddr>) -> Result<BoundListener> {
    let mut last_error = None;
    for candidate in candidates {
        match BoundListener::bind(&Address::Network(candidate)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!(%candidate, error = %e, "Bind attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| TimeoutError::Bind {
        address: address.to_string(),
        source: io::Error::new(io::ErrorKind::AddrNotAvailable, "no address to bind"),
    }))
}
