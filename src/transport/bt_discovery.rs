//! Bluetooth discovery sessions owned by this process
//!
//! BlueZ reference-counts discovery per D-Bus client, so the only discovery
//! we can cancel is one we started. The session runs in a background task
//! and stops when that task is aborted (dropping the event stream).

use anyhow::Result;
use bluer::{Adapter, AdapterEvent, Address};
use futures::{Stream, StreamExt};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

const FINISH_POLL: Duration = Duration::from_millis(100);

/// Configuration for a discovery session
#[derive(Debug, Clone)]
pub struct BtDiscoveryConfig {
    /// How long to scan before stopping on its own
    pub scan_duration: Duration,
}

impl Default for BtDiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(10),
        }
    }
}

/// Tracks at most one running discovery session
#[derive(Debug, Default)]
pub struct BtDiscovery {
    config: BtDiscoveryConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BtDiscovery {
    /// Create a tracker with the given configuration
    pub fn new(config: BtDiscoveryConfig) -> Self {
        Self {
            config,
            task: Mutex::new(None),
        }
    }

    /// Start scanning on `adapter`, replacing any session already running.
    ///
    /// With a `target` the session ends as soon as that device shows up.
    pub async fn start(&self, adapter: &Adapter, target: Option<Address>) -> Result<()> {
        let events = adapter.discover_devices().await?;
        self.track(events, target);
        Ok(())
    }

    /// Run a session over an adapter event stream
    pub(crate) fn track<S>(&self, events: S, target: Option<Address>)
    where
        S: Stream<Item = AdapterEvent> + Send + 'static,
    {
        let scan_duration = self.config.scan_duration;

        let task = tokio::spawn(async move {
            tokio::pin!(events);
            let scan = timeout(scan_duration, async {
                while let Some(evt) = events.next().await {
                    if let AdapterEvent::DeviceAdded(addr) = evt {
                        debug!("[BT] Discovered {}", addr);
                        if target == Some(addr) {
                            info!("[BT] Found {}", addr);
                            return;
                        }
                    }
                }
            })
            .await;

            // Timeout is the normal end of an untargeted scan
            if scan.is_err() {
                info!("[BT] Discovery scan completed");
            }
        });

        if let Some(previous) = self.replace(Some(task)) {
            previous.abort();
        }
    }

    /// Stop the running session, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.replace(None) {
            Some(task) if !task.is_finished() => {
                task.abort();
                info!("[BT] Discovery cancelled");
                true
            }
            _ => false,
        }
    }

    /// Whether a session started here is still scanning
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|task| task.as_ref().is_some_and(|t| !t.is_finished()))
            .unwrap_or(false)
    }

    /// Wait until the running session ends on its own or is cancelled
    pub async fn finished(&self) {
        while self.is_running() {
            sleep(FINISH_POLL).await;
        }
    }

    fn replace(&self, task: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        match self.task.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, task),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    const TARGET: Address = Address([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    const OTHER: Address = Address([0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB]);

    #[test]
    fn test_default_config() {
        let config = BtDiscoveryConfig::default();
        assert_eq!(config.scan_duration, Duration::from_secs(10));
    }

    #[test]
    fn test_cancel_without_session() {
        let discovery = BtDiscovery::default();
        assert!(!discovery.is_running());
        assert!(!discovery.cancel());
    }

    #[tokio::test]
    async fn test_cancel_aborts_running_task() {
        let discovery = BtDiscovery::default();
        let task = tokio::spawn(std::future::pending::<()>());
        discovery.replace(Some(task));

        assert!(discovery.is_running());
        assert!(discovery.cancel());
        assert!(!discovery.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_targeted_scan_ends_when_peer_found() {
        let discovery = BtDiscovery::default();
        let events = stream::iter([
            AdapterEvent::DeviceAdded(OTHER),
            AdapterEvent::DeviceAdded(TARGET),
        ])
        .chain(stream::pending());
        discovery.track(events, Some(TARGET));

        let started = tokio::time::Instant::now();
        discovery.finished().await;
        assert!(!discovery.is_running());
        assert!(started.elapsed() < BtDiscoveryConfig::default().scan_duration);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_stops_after_scan_duration() {
        let discovery = BtDiscovery::new(BtDiscoveryConfig {
            scan_duration: Duration::from_secs(2),
        });
        discovery.track(stream::pending(), Some(TARGET));
        assert!(discovery.is_running());

        let started = tokio::time::Instant::now();
        discovery.finished().await;
        assert!(started.elapsed() >= Duration::from_secs(2));
        // Already over; nothing left to cancel
        assert!(!discovery.cancel());
    }

    #[tokio::test]
    async fn test_new_session_replaces_running_one() {
        let discovery = BtDiscovery::default();
        discovery.track(stream::pending(), None);
        discovery.track(stream::pending(), None);

        assert!(discovery.cancel());
        assert!(!discovery.is_running());
    }
}
