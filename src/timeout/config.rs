use crate::{Result, TimeoutError};
use std::fmt;
use std::time::Duration;

/// A validated, non-zero idle duration
///
/// A zero duration would close every connection as soon as it is accepted,
/// so it is rejected at construction rather than treated as "disabled".
///
/// # Examples
///
/// ```
/// use timeoutconn::IdleTimeout;
/// use std::time::Duration;
///
/// let idle = IdleTimeout::new(Duration::from_secs(30)).unwrap();
/// assert_eq!(idle.as_duration(), Duration::from_secs(30));
///
/// assert!(IdleTimeout::new(Duration::ZERO).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdleTimeout(Duration);

impl IdleTimeout {
    /// Creates an idle timeout, failing with [`TimeoutError::Config`] for a zero duration
    pub fn new(duration: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(TimeoutError::Config(
                "Idle timeout must be greater than zero".to_string(),
            ));
        }
        Ok(Self(duration))
    }

    /// Creates an idle timeout from a number of milliseconds
    pub fn from_millis(millis: u64) -> Result<Self> {
        Self::new(Duration::from_millis(millis))
    }

    /// Returns the wrapped duration
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl TryFrom<Duration> for IdleTimeout {
    type Error = TimeoutError;

    fn try_from(duration: Duration) -> Result<Self> {
        Self::new(duration)
    }
}

impl From<IdleTimeout> for Duration {
    fn from(idle: IdleTimeout) -> Self {
        idle.0
    }
}

impl fmt::Display for IdleTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_rejected() {
        let err = IdleTimeout::new(Duration::ZERO).unwrap_err();
        assert!(matches!(err, TimeoutError::Config(_)));
        assert!(IdleTimeout::from_millis(0).is_err());
    }

    #[test]
    fn test_conversions() {
        let idle = IdleTimeout::try_from(Duration::from_millis(50)).unwrap();
        assert_eq!(Duration::from(idle), Duration::from_millis(50));
        assert_eq!(idle, IdleTimeout::from_millis(50).unwrap());
        assert_eq!(idle.to_string(), "50ms");
    }
}
