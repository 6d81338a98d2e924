//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::info;

/// Shared flag a running computation polls between input lines.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel this token once `timeout` elapses.
    ///
    /// The watcher thread is detached; it is harmless if the computation
    /// finishes first. A zero timeout cancels immediately.
    pub fn cancel_after(&self, timeout: Duration) {
        if timeout.is_zero() {
            info!("zero timeout, cancelling");
            self.cancel();
            return;
        }
        let token = self.clone();
        thread::spawn(move || {
            thread::sleep(timeout);
            if !token.is_cancelled() {
                info!(timeout_ms = timeout.as_millis() as u64, "deadline reached, cancelling");
                token.cancel();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn zero_timeout_cancels_immediately() {
        let token = CancellationToken::new();
        token.cancel_after(Duration::ZERO);
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_after_fires() {
        let token = CancellationToken::new();
        token.cancel_after(Duration::from_millis(10));
        let start = std::time::Instant::now();
        while !token.is_cancelled() {
            assert!(start.elapsed() < Duration::from_secs(5), "token never cancelled");
            thread::sleep(Duration::from_millis(5));
        }
    }
}
