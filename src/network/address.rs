use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Unified address type that supports both network and Unix domain sockets
///
/// Used both as a bind target and as the peer/local address of connections
/// accepted through a [`BoundListener`](super::BoundListener). Unnamed Unix
/// peers carry an empty path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Network address (TCP)
    Network(SocketAddr),
    /// Unix domain socket path
    Unix(PathBuf),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Network(addr) => write!(f, "{addr}"),
            Address::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Network(addr)
    }
}

impl From<PathBuf> for Address {
    fn from(path: PathBuf) -> Self {
        Address::Unix(path)
    }
}

impl FromStr for Address {
    type Err = crate::TimeoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(stripped) = s.strip_prefix("unix:") {
            if stripped.is_empty() {
                return Err(crate::TimeoutError::Config(
                    "Unix socket path must not be empty".to_string(),
                ));
            }
            Ok(Address::Unix(PathBuf::from(stripped)))
        } else {
            s.parse::<SocketAddr>()
                .map(Address::Network)
                .map_err(|e| crate::TimeoutError::Config(format!("Invalid socket address: {e}")))
        }
    }
}

impl Address {
    /// Returns true if this is a network address
    pub fn is_network(&self) -> bool {
        matches!(self, Address::Network(_))
    }

    /// Returns true if this is a Unix domain socket address
    pub fn is_unix(&self) -> bool {
        matches!(self, Address::Unix(_))
    }

    /// Get the network address if this is a network address
    pub fn as_network(&self) -> Option<&SocketAddr> {
        match self {
            Address::Network(addr) => Some(addr),
            _ => None,
        }
    }

    /// Get the Unix path if this is a Unix domain socket
    pub fn as_unix(&self) -> Option<&PathBuf> {
        match self {
            Address::Unix(path) => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_address() {
        let addr: Address = "127.0.0.1:8080".parse().unwrap();
        assert!(addr.is_network());
        assert!(!addr.is_unix());
        assert_eq!(addr.as_network(), Some(&"127.0.0.1:8080".parse().unwrap()));
        assert!(addr.as_unix().is_none());
    }

    #[test]
    fn test_unix_address() {
        let addr: Address = "unix:/tmp/test.sock".parse().unwrap();
        assert!(!addr.is_network());
        assert!(addr.is_unix());
        assert!(addr.as_network().is_none());
        assert_eq!(addr.as_unix(), Some(&PathBuf::from("/tmp/test.sock")));
    }

    #[test]
    fn test_invalid_addresses_are_config_errors() {
        assert!(matches!(
            "not an address".parse::<Address>(),
            Err(crate::TimeoutError::Config(_))
        ));
        assert!(matches!(
            "unix:".parse::<Address>(),
            Err(crate::TimeoutError::Config(_))
        ));
    }

    #[test]
    fn test_display() {
        let net_addr: Address = "127.0.0.1:8080".parse().unwrap();
        let unix_addr: Address = "unix:/tmp/test.sock".parse().unwrap();

        assert_eq!(net_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(unix_addr.to_string(), "unix:/tmp/test.sock");
    }
}
