// Per-connection idle watchdog.
//
// A reset is a single atomic store of the activity timestamp. The watchdog
// task sleeps until the deadline derived from the last stored timestamp and,
// on waking, either fires or goes back to sleep until the newer deadline.
// The timer is therefore re-armed lazily and never recreated per reset.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::config::IdleTimeout;

/// Lifecycle of a connection's watchdog
///
/// `Fired` and `Stopped` are terminal: once the watchdog has closed the
/// connection or has been stopped by an explicit close, it never re-arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Counting down; any read or write pushes the deadline back
    Armed,
    /// The idle duration elapsed and the connection was closed
    Fired,
    /// The connection was closed or dropped before the watchdog fired
    Stopped,
}

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const STOPPED: u8 = 2;

// Thirty years, the same "never" tokio uses for far-future deadlines.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Implemented by the owner of a watchdog so the watchdog task can close it.
pub(crate) trait Expire: Send + Sync + 'static {
    fn watchdog(&self) -> &Watchdog;

    /// Called at most once, from the watchdog task, after `Watchdog::fire` won.
    fn expire(&self);
}

#[derive(Debug)]
pub(crate) struct Watchdog {
    idle: IdleTimeout,
    origin: Instant,
    // Nanoseconds since `origin` of the most recent I/O attempt.
    last_activity: AtomicU64,
    state: AtomicU8,
    cancel: CancellationToken,
}

impl Watchdog {
    pub(crate) fn new(idle: IdleTimeout) -> Self {
        Self {
            idle,
            origin: Instant::now(),
            last_activity: AtomicU64::new(0),
            state: AtomicU8::new(ARMED),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn idle_timeout(&self) -> IdleTimeout {
        self.idle
    }

    /// Pushes the deadline back to one idle duration from now.
    pub(crate) fn reset(&self) {
        let elapsed = Instant::now().saturating_duration_since(self.origin);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.last_activity.fetch_max(nanos, Ordering::AcqRel);
    }

    pub(crate) fn deadline(&self) -> Instant {
        let last = Duration::from_nanos(self.last_activity.load(Ordering::Acquire));
        self.origin
            .checked_add(last)
            .and_then(|at| at.checked_add(self.idle.as_duration()))
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE)
    }

    pub(crate) fn state(&self) -> WatchdogState {
        match self.state.load(Ordering::Acquire) {
            ARMED => WatchdogState::Armed,
            FIRED => WatchdogState::Fired,
            _ => WatchdogState::Stopped,
        }
    }

    /// Armed -> Fired. Returns false if the watchdog was already stopped.
    fn fire(&self) -> bool {
        self.state
            .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Armed -> Stopped, and releases the timer. No effect once fired.
    pub(crate) fn stop(&self) {
        let _ = self
            .state
            .compare_exchange(ARMED, STOPPED, Ordering::AcqRel, Ordering::Acquire);
        self.cancel.cancel();
    }
}

/// Starts the watchdog task for `target` on the given runtime.
///
/// The task only holds a weak reference, so dropping the owner ends it even
/// if `stop` was never called.
pub(crate) fn spawn<T: Expire>(owner: &Arc<T>, handle: &Handle) {
    let cancel = owner.watchdog().cancel.clone();
    handle.spawn(run(Arc::downgrade(owner), cancel));
}

async fn run<T: Expire>(target: Weak<T>, cancel: CancellationToken) {
    loop {
        let deadline = match target.upgrade() {
            Some(owner) => owner.watchdog().deadline(),
            None => return,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = time::sleep_until(deadline) => {}
        }

        let Some(owner) = target.upgrade() else {
            return;
        };
        let watchdog = owner.watchdog();
        if watchdog.deadline() <= Instant::now() {
            if watchdog.fire() {
                owner.expire();
            }
            return;
        }
    }
}
