//! Idle-timeout decorators
//!
//! [`TimeoutListener`] wraps a listener and arms a watchdog on every
//! connection it accepts. [`TimeoutStream`] wraps a single connection: reads
//! and writes reset its watchdog, and the watchdog closes it once the idle
//! duration passes without activity.

pub mod config;
pub mod listener;
pub mod stream;
pub mod watchdog;


pub use config::IdleTimeout;
pub use listener::TimeoutListener;
pub use stream::{CloseHandle, TimeoutStream, is_closed_error};
pub use watchdog::WatchdogState;
