//! Remote reachability tracking
//!
//! The monitor keeps a single two-valued flag. It starts optimistic so the
//! first write attempts the remote store, re-probes on a fixed interval, and
//! publishes every change of the flag on a broadcast channel. A `true` read
//! from the monitor is only a snapshot: callers still have to handle a remote
//! operation failing right after it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Capacity of the transition channel; slow subscribers only miss stale flips.
const TRANSITION_BUFFER: usize = 16;

/// Something that can tell whether the remote store answers right now.
#[async_trait]
pub trait RemoteProbe: Send + Sync {
    /// Open, use and drop a connection. Every failure is `false`.
    async fn ping(&self) -> bool;
}

/// Probe used when no remote store is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl RemoteProbe for Unconfigured {
    async fn ping(&self) -> bool {
        false
    }
}

pub struct AvailabilityMonitor {
    probe: Arc<dyn RemoteProbe>,
    available: AtomicBool,
    transitions: broadcast::Sender<bool>,
    interval: Duration,
    timeout: Duration,
}

impl AvailabilityMonitor {
    pub fn new(probe: Arc<dyn RemoteProbe>, interval: Duration, timeout: Duration) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            probe,
            available: AtomicBool::new(true),
            transitions,
            interval,
            timeout,
        }
    }

    /// Probe once within the timeout; does not touch the recorded flag.
    pub async fn probe(&self) -> bool {
        match tokio::time::timeout(self.timeout, self.probe.ping()).await {
            Ok(reachable) => reachable,
            Err(_) => {
                tracing::debug!("Remote probe timed out after {:?}", self.timeout);
                false
            }
        }
    }

    /// Flag recorded by the most recent refresh
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Receive the new flag value on every transition
    pub fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.transitions.subscribe()
    }

    /// Probe, record the result and publish it if it differs from the last one.
    pub async fn refresh(&self) -> bool {
        let reachable = self.probe().await;
        let previous = self.available.swap(reachable, Ordering::SeqCst);
        if previous != reachable {
            if reachable {
                tracing::info!("Remote store is reachable again");
            } else {
                tracing::warn!("Remote store became unreachable; working locally");
            }
            // No receivers is fine
            let _ = self.transitions.send(reachable);
        }
        reachable
    }

    /// Run `refresh` on the configured interval until the handle is stopped.
    pub fn start(self: &Arc<Self>) -> MonitorHandle {
        let monitor = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = interval(monitor.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        monitor.refresh().await;
                    }
                }
            }
            tracing::debug!("Availability monitor stopped");
        });

        MonitorHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

impl std::fmt::Debug for AvailabilityMonitor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AvailabilityMonitor")
            .field("available", &self.is_available())
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Stops the background probe loop
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(error) = self.task.await {
            tracing::warn!("Availability monitor task ended abnormally: {error}");
        }
    }
}
