//! Shared fixtures for unit tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::db::{Store, StoreRole};
use crate::facade::StoreFacade;
use crate::monitor::{AvailabilityMonitor, RemoteProbe};

/// Probe whose answer the test flips by hand
#[derive(Debug)]
pub struct ToggleProbe {
    reachable: AtomicBool,
}

impl ToggleProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteProbe for ToggleProbe {
    async fn ping(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Two in-memory stores behind a facade, with a switch for reachability
pub struct Harness {
    pub local: Store,
    pub remote: Store,
    pub probe: Arc<ToggleProbe>,
    pub facade: Arc<StoreFacade>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_remote_timeout(Duration::from_secs(5)).await
    }

    pub async fn with_remote_timeout(remote_timeout: Duration) -> Self {
        let local = Store::open_in_memory(StoreRole::Local).await.unwrap();
        let remote = Store::open_in_memory(StoreRole::Remote).await.unwrap();
        let probe = Arc::new(ToggleProbe::new(true));
        let monitor = Arc::new(AvailabilityMonitor::new(
            Arc::clone(&probe) as Arc<dyn RemoteProbe>,
            Duration::from_secs(30),
            remote_timeout,
        ));
        let facade = Arc::new(StoreFacade::new(
            local.clone(),
            Some(remote.clone()),
            monitor,
            remote_timeout,
        ));
        Self {
            local,
            remote,
            probe,
            facade,
        }
    }

    pub fn go_offline(&self) {
        self.probe.set(false);
    }

    pub fn go_online(&self) {
        self.probe.set(true);
    }
}
