use proptest::prelude::*;
use std::time::Duration;
use timeoutconn::{TimeoutStream, WatchdogState};
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

const IDLE_MS: u64 = 50;

/// Runs `future` on a current-thread runtime with a paused clock, so
/// millisecond gaps are exact and the tests do not depend on scheduling.
fn block_on_paused<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .expect("failed to build runtime")
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: activity more often than the idle duration never trips the watchdog,
    /// and silence afterwards always does
    #[test]
    fn activity_within_idle_window_keeps_alive(
        gaps in prop::collection::vec(1..IDLE_MS, 1..20),
        writes in prop::collection::vec(any::<bool>(), 20),
    ) {
        block_on_paused(async {
            let (local, mut remote) = duplex(4096);
            let mut stream = TimeoutStream::new(local, Duration::from_millis(IDLE_MS))
                .map_err(|e| TestCaseError::fail(format!("wrap failed: {e}")))?;
            let mut byte = [0u8; 1];

            for (gap, write) in gaps.iter().zip(writes.iter()) {
                tokio::time::sleep(Duration::from_millis(*gap)).await;
                prop_assert_eq!(stream.state(), WatchdogState::Armed);

                if *write {
                    stream.write_all(b"w").await
                        .map_err(|e| TestCaseError::fail(format!("write failed: {e}")))?;
                } else {
                    remote.write_all(b"r").await
                        .map_err(|e| TestCaseError::fail(format!("peer write failed: {e}")))?;
                    stream.read_exact(&mut byte).await
                        .map_err(|e| TestCaseError::fail(format!("read failed: {e}")))?;
                }
            }

            tokio::time::sleep(Duration::from_millis(IDLE_MS * 2)).await;
            prop_assert!(stream.timed_out());
            Ok(())
        })?;
    }

    /// Property: the connection survives until the deadline measured from the last activity
    #[test]
    fn closes_only_after_last_activity_plus_idle(last_ms in 0..IDLE_MS) {
        block_on_paused(async {
            let (local, _remote) = duplex(64);
            let mut stream = TimeoutStream::new(local, Duration::from_millis(IDLE_MS))
                .map_err(|e| TestCaseError::fail(format!("wrap failed: {e}")))?;

            tokio::time::sleep(Duration::from_millis(last_ms)).await;
            stream.write_all(b"x").await
                .map_err(|e| TestCaseError::fail(format!("write failed: {e}")))?;

            tokio::time::sleep(Duration::from_millis(IDLE_MS - 1)).await;
            prop_assert_eq!(stream.state(), WatchdogState::Armed);

            tokio::time::sleep(Duration::from_millis(2)).await;
            prop_assert!(stream.timed_out());
            Ok(())
        })?;
    }
}
