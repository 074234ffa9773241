//! Anonymity circuit manager
//!
//! Owns the rotation counter and the single lock that serializes every
//! rotation. Rotations happen only between URL processings; the worker pool
//! calls [`CircuitManager::maybe_rotate_after`] before dispatching each URL.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::control::ControlConnection;
use crate::proxy::{TorConfig, TorError};

/// Why a rotation was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// The URL counter reached the configured threshold
    Scheduled,
    /// A connection-class failure was observed
    ConnectionError,
}

/// One completed (or failed) rotation
#[derive(Debug, Clone)]
pub struct RotationEvent {
    pub at: DateTime<Utc>,
    pub reason: RotationReason,
    /// Counter value when the rotation was issued
    pub counter: u64,
    pub succeeded: bool,
}

/// Serializes identity rotation and tracks the URL counter
pub struct CircuitManager {
    config: TorConfig,
    /// URLs processed since the last rotation; monotonic between rotations
    counter: AtomicU64,
    /// Single writer: rotations never run concurrently. Held across the
    /// control-port exchange on purpose.
    rotation_lock: Mutex<Vec<RotationEvent>>,
}

impl CircuitManager {
    pub fn new(config: TorConfig) -> Self {
        Self {
            config,
            counter: AtomicU64::new(0),
            rotation_lock: Mutex::new(Vec::new()),
        }
    }

    /// URLs seen since the last rotation
    pub fn urls_since_rotation(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Rotation history so far
    pub async fn events(&self) -> Vec<RotationEvent> {
        self.rotation_lock.lock().await.clone()
    }

    /// Issue a NEWNYM under the rotation lock, then let the circuit settle
    pub async fn rotate(&self, reason: RotationReason) -> Result<(), TorError> {
        let mut events = self.rotation_lock.lock().await;
        let counter = self.counter.load(Ordering::SeqCst);

        let result = self.rotate_inner().await;
        events.push(RotationEvent {
            at: Utc::now(),
            reason,
            counter,
            succeeded: result.is_ok(),
        });

        match &result {
            Ok(()) => info!("circuit rotated ({:?}, counter={})", reason, counter),
            Err(e) => warn!("circuit rotation failed: {}", e),
        }

        result
    }

    async fn rotate_inner(&self) -> Result<(), TorError> {
        let mut conn = ControlConnection::connect(&self.config.control_addr).await?;
        conn.authenticate(&self.config.control_password).await?;
        conn.signal_newnym().await?;
        conn.quit().await;

        // Give Tor a moment to build the new circuit
        tokio::time::sleep(Duration::from_secs(self.config.settle_secs)).await;
        Ok(())
    }

    /// Count one processed URL; rotate and reset when the threshold is hit
    ///
    /// Returns whether a rotation was attempted. A failed rotation is
    /// non-fatal: the counter still resets so the next window is full-length.
    pub async fn maybe_rotate_after(&self, url: &str) -> bool {
        let count = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        if count < self.config.rotate_after_urls {
            return false;
        }

        info!("rotation threshold reached after {} ({} URLs)", url, count);
        if let Err(e) = self.rotate(RotationReason::Scheduled).await {
            warn!("scheduled rotation failed, continuing on current circuit: {}", e);
        }
        self.counter.store(0, Ordering::SeqCst);
        true
    }

    /// Immediate rotation on a connection-class failure, regardless of counter
    pub async fn on_connection_error(&self) {
        if let Err(e) = self.rotate(RotationReason::ConnectionError).await {
            warn!("error-triggered rotation failed: {}", e);
        }
        self.counter.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_threshold(threshold: u64) -> CircuitManager {
        let config = TorConfig {
            rotate_after_urls: threshold,
            // Point at a closed port so rotate() fails fast instead of hanging
            control_addr: "127.0.0.1:1".to_string(),
            settle_secs: 0,
            ..TorConfig::default()
        };
        CircuitManager::new(config)
    }

    #[tokio::test]
    async fn test_counter_increments_below_threshold() {
        let mgr = manager_with_threshold(5);
        for _ in 0..4 {
            assert!(!mgr.maybe_rotate_after("http://x.onion").await);
        }
        assert_eq!(mgr.urls_since_rotation(), 4);
        assert!(mgr.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_triggers_rotation_and_reset() {
        let mgr = manager_with_threshold(3);
        assert!(!mgr.maybe_rotate_after("http://a.onion").await);
        assert!(!mgr.maybe_rotate_after("http://b.onion").await);
        assert!(mgr.maybe_rotate_after("http://c.onion").await);

        // Counter reset even though the rotation itself failed (closed port)
        assert_eq!(mgr.urls_since_rotation(), 0);

        let events = mgr.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, RotationReason::Scheduled);
        assert!(events[0].counter >= 3);
        assert!(!events[0].succeeded);
    }

    #[tokio::test]
    async fn test_connection_error_rotates_regardless_of_counter() {
        let mgr = manager_with_threshold(100);
        mgr.maybe_rotate_after("http://a.onion").await;
        mgr.on_connection_error().await;

        let events = mgr.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, RotationReason::ConnectionError);
        assert_eq!(mgr.urls_since_rotation(), 0);
    }
}
