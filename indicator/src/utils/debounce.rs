//! Debounce utility for coalescing bursts of change signals.
//!
//! File-system notification backends report every write syscall, and a tool
//! rewriting a file typically produces several events (truncate, one or more
//! writes, close, sometimes a rename). [`settle`] waits until the signals stop
//! arriving for a quiet period and reports the burst as one logical change.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use vagrant_indicator::utils::debounce::settle;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, mut rx) = mpsc::channel(16);
//!     tx.send(()).await.unwrap();
//!     tx.send(()).await.unwrap();
//!
//!     // Both signals are reported as one burst.
//!     let burst = settle(&mut rx, Duration::from_millis(100), Duration::from_secs(1)).await;
//!     assert_eq!(burst, Some(2));
//! }
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::trace;

/// Waits for the next burst of signals and for it to go quiet.
///
/// Blocks until at least one signal arrives, then keeps draining signals until
/// none has arrived for `quiet`, or until `max_wait` has passed since the
/// first signal of the burst. Returns the number of signals in the burst.
///
/// `max_wait` bounds how long a steady stream of writes can defer a re-read;
/// it is never shorter than `quiet`.
///
/// Returns `None` once the sending side is closed; a burst cut short by the
/// close is dropped, since the closing side no longer wants updates.
pub async fn settle<T>(
    rx: &mut mpsc::Receiver<T>,
    quiet: Duration,
    max_wait: Duration,
) -> Option<usize> {
    rx.recv().await?;
    let deadline = Instant::now() + max_wait.max(quiet);
    let mut signals = 1;

    loop {
        let quiet_until = (Instant::now() + quiet).min(deadline);
        match timeout_at(quiet_until, rx.recv()).await {
            Ok(Some(_)) => {
                signals += 1;
                if Instant::now() >= deadline {
                    trace!(signals, max_wait_ms = max_wait.as_millis(), "Burst hit max wait");
                    return Some(signals);
                }
                trace!(signals, "Burst still active, extending quiet period");
            }
            Ok(None) => return None,
            Err(_) => {
                trace!(
                    signals,
                    quiet_ms = quiet.as_millis(),
                    "Burst settled"
                );
                return Some(signals);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    const LONG_WAIT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_single_signal_settles_after_quiet_period() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(()).await.unwrap();

        let started = Instant::now();
        let burst = settle(&mut rx, Duration::from_millis(50), LONG_WAIT).await;

        assert_eq!(burst, Some(1));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_rapid_signals_coalesced() {
        let (tx, mut rx) = mpsc::channel(16);
        for _ in 0..5 {
            tx.send(()).await.unwrap();
        }

        let burst = settle(&mut rx, Duration::from_millis(50), LONG_WAIT).await;
        assert_eq!(burst, Some(5));

        // Nothing left over for a second burst.
        let next = timeout(Duration::from_millis(100), settle(&mut rx, Duration::from_millis(10), LONG_WAIT)).await;
        assert!(next.is_err(), "Should not report a second burst");
    }

    #[tokio::test]
    async fn test_quiet_period_extends_while_signals_arrive() {
        let (tx, mut rx) = mpsc::channel(16);

        let sender = tokio::spawn(async move {
            for _ in 0..3 {
                tx.send(()).await.unwrap();
                sleep(Duration::from_millis(30)).await;
            }
            // Keep the channel open past the burst.
            sleep(Duration::from_millis(500)).await;
            drop(tx);
        });

        let burst = settle(&mut rx, Duration::from_millis(100), LONG_WAIT).await;
        assert_eq!(burst, Some(3));

        sender.abort();
    }

    #[tokio::test]
    async fn test_separate_bursts_reported_separately() {
        let (tx, mut rx) = mpsc::channel(16);

        tx.send(()).await.unwrap();
        assert_eq!(settle(&mut rx, Duration::from_millis(20), LONG_WAIT).await, Some(1));

        tx.send(()).await.unwrap();
        tx.send(()).await.unwrap();
        assert_eq!(settle(&mut rx, Duration::from_millis(20), LONG_WAIT).await, Some(2));
    }

    #[tokio::test]
    async fn test_closed_channel_returns_none() {
        let (tx, mut rx) = mpsc::channel::<()>(16);
        drop(tx);

        assert_eq!(settle(&mut rx, Duration::from_millis(20), LONG_WAIT).await, None);
    }

    #[tokio::test]
    async fn test_close_mid_burst_returns_none() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(()).await.unwrap();
        drop(tx);

        assert_eq!(settle(&mut rx, Duration::from_millis(200), LONG_WAIT).await, None);
    }

    #[tokio::test]
    async fn test_steady_signals_settle_at_max_wait() {
        let (tx, mut rx) = mpsc::channel(16);

        // A writer that never pauses for as long as the quiet period.
        let sender = tokio::spawn(async move {
            loop {
                if tx.send(()).await.is_err() {
                    break;
                }
                sleep(Duration::from_millis(10)).await;
            }
        });

        let started = Instant::now();
        let burst = timeout(
            Duration::from_secs(2),
            settle(&mut rx, Duration::from_millis(50), Duration::from_millis(300)),
        )
        .await
        .expect("Steady signals must not defer the burst past max wait");

        assert!(burst.unwrap() > 1);
        assert!(started.elapsed() >= Duration::from_millis(300));

        // The stream keeps going, so the next burst is bounded as well.
        let next = timeout(
            Duration::from_secs(2),
            settle(&mut rx, Duration::from_millis(50), Duration::from_millis(300)),
        )
        .await;
        assert!(matches!(next, Ok(Some(_))));

        sender.abort();
    }

    #[tokio::test]
    async fn test_max_wait_shorter_than_quiet_uses_quiet() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(()).await.unwrap();

        let started = Instant::now();
        let burst = settle(&mut rx, Duration::from_millis(60), Duration::ZERO).await;

        assert_eq!(burst, Some(1));
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_zero_quiet_period() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(()).await.unwrap();

        let burst = timeout(Duration::from_millis(100), settle(&mut rx, Duration::ZERO, LONG_WAIT)).await;
        assert_eq!(burst.unwrap(), Some(1));
    }
}
