//! In-memory snapshot store
//!
//! Readers clone an `Arc<Snapshot>` under a read lock held only for the
//! clone, so `current()` never waits on a refresh. `install` swaps the
//! pointer; installs are serialized by an async mutex so the key-value
//! mirror and the in-memory pointer always end up holding the same
//! snapshot, and the last install to start wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{error, info};

use super::kv::KvMirror;
use crate::model::{Admin, Device, Network, Organization, Snapshot};

/// Owner of the current [`Snapshot`]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
    install_lock: Mutex<()>,
    generation: AtomicU64,
    mirror: Option<KvMirror>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// Store serving [`Snapshot::empty`] until the first install
    pub fn new() -> Self {
        Self::with_snapshot(Snapshot::empty())
    }

    /// Store pre-loaded with a snapshot, mostly for tests
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            install_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            mirror: None,
        }
    }

    /// Mirror every installed snapshot into a key-value store
    pub fn with_mirror(mut self, mirror: KvMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// The most recently installed snapshot
    pub fn current(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Number of installs so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Replace the current snapshot. Returns the new generation.
    pub async fn install(&self, snapshot: Snapshot) -> u64 {
        let _guard = self.install_lock.lock().await;

        if let Some(mirror) = &self.mirror {
            // Mirror failures do not block serving the fresh snapshot
            if let Err(e) = mirror.write_snapshot(&snapshot).await {
                error!(error = %e, "Failed to mirror snapshot to key-value store");
            }
        }

        let stats = snapshot.stats();
        let next = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(generation, %stats, "Installed snapshot");
        generation
    }

    pub fn get_all_organizations(&self) -> Vec<Organization> {
        self.current().organizations().to_vec()
    }

    pub fn get_all_networks(&self) -> Vec<Network> {
        self.current().networks().into_iter().cloned().collect()
    }

    pub fn get_networks_for_org(&self, org_id: &str) -> Vec<Network> {
        self.current()
            .networks_for_org(org_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn get_admins_for_org(&self, org_id: &str) -> Vec<Admin> {
        self.current()
            .admins_for_org(org_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn get_devices_for_network(&self, net_id: &str) -> Vec<Device> {
        self.current()
            .devices_for_network(net_id)
            .into_iter()
            .cloned()
            .collect()
    }
}
