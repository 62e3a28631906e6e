//! Echo server built on the idle-timeout listener
//!
//! Used by the `timeoutconn` binary and handy for trying the watchdog out
//! with `nc` or `telnet`.

pub mod config;
pub mod echo;


pub use config::ServerConfig;
pub use echo::EchoServer;
