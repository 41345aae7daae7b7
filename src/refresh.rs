//! Snapshot refresh pipeline
//!
//! Rebuilds the whole hierarchy from the management API and installs it
//! into the [`SnapshotStore`]:
//!
//! ```text
//! list organizations
//!   └─ per organization: list networks, list admins
//!        └─ per network: list devices
//! assemble + check ──► SnapshotStore::install
//! ```
//!
//! Every upstream call goes through the [`RetryExecutor`]. The first
//! refresh at startup must succeed; later scheduled refreshes that fail are
//! logged and the previous snapshot stays in service.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::RefreshError;
use crate::model::{Admin, Device, Network, Organization, Snapshot, SnapshotBuilder, SnapshotStats};
use crate::retry::RetryExecutor;
use crate::snapshot::SnapshotStore;
use crate::upstream::ManagementApi;

/// Clears the running flag when a refresh ends, however it ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fetches the hierarchy and installs it
pub struct RefreshPipeline {
    api: Arc<dyn ManagementApi>,
    executor: RetryExecutor,
    store: Arc<SnapshotStore>,
    running: AtomicBool,
}

impl RefreshPipeline {
    pub fn new(
        api: Arc<dyn ManagementApi>,
        executor: RetryExecutor,
        store: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            api,
            executor,
            store,
            running: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Fetch the full hierarchy without installing it
    pub async fn build_snapshot(&self) -> Result<Snapshot, RefreshError> {
        let api = self.api.as_ref();
        let mut builder = SnapshotBuilder::new();
        let mut seen_devices: HashSet<String> = HashSet::new();

        let orgs = self
            .executor
            .execute_upstream("list_organizations", || api.list_organizations())
            .await?;
        debug!(count = orgs.len(), "Fetched organizations");

        for api_org in orgs {
            let org_id = api_org.id.as_str();

            let networks = self
                .executor
                .execute_upstream("list_networks", || api.list_networks(org_id))
                .await?;
            let admins = self
                .executor
                .execute_upstream("list_admins", || api.list_admins(org_id))
                .await?;

            let mut network_ids = Vec::with_capacity(networks.len());
            for api_net in networks {
                let net_id = api_net.id.as_str();
                let devices = self
                    .executor
                    .execute_upstream("list_devices", || api.list_devices(net_id))
                    .await?;

                let mut serials = Vec::with_capacity(devices.len());
                for api_device in devices {
                    if !seen_devices.insert(api_device.serial.clone()) {
                        warn!(serial = %api_device.serial, network = net_id, "Device listed in more than one network");
                    }
                    serials.push(api_device.serial.clone());
                    builder.add_device(Device {
                        serial: api_device.serial,
                        name: api_device.name,
                        model: api_device.model,
                    });
                }

                if let Some(owner) = api_net.organization_id.as_deref() {
                    if owner != org_id {
                        warn!(network = net_id, owner, org = org_id, "Network reports a different owner");
                    }
                }

                network_ids.push(api_net.id.clone());
                builder.add_network(Network {
                    id: api_net.id,
                    name: api_net.name.trim().to_string(),
                    organization_id: api_org.id.clone(),
                    device_serials: serials,
                });
            }

            let admin_ids = admins.iter().map(|a| a.id.clone()).collect();
            for api_admin in admins {
                builder.add_admin(Admin {
                    id: api_admin.id,
                    name: api_admin.name,
                    email: api_admin.email,
                    organization_id: api_org.id.clone(),
                });
            }

            builder.add_organization(Organization {
                name: api_org.name.trim().to_string(),
                network_ids,
                admin_ids,
                id: api_org.id,
            });
        }

        builder.build().map_err(RefreshError::InconsistentSnapshot)
    }

    /// Run one refresh cycle. Skipped with [`RefreshError::AlreadyRunning`]
    /// when another cycle is in flight.
    pub async fn refresh(&self) -> Result<SnapshotStats, RefreshError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh already in progress, skipping trigger");
            return Err(RefreshError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        let start = Instant::now();
        info!("Refreshing snapshot");
        let snapshot = self.build_snapshot().await?;
        let stats = snapshot.stats();
        let generation = self.store.install(snapshot).await;

        info!(
            generation,
            organizations = stats.organizations,
            networks = stats.networks,
            devices = stats.devices,
            admins = stats.admins,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Refresh complete"
        );
        Ok(stats)
    }

    /// Startup refresh; any failure means the process must not serve
    pub async fn initial_refresh(&self) -> Result<SnapshotStats, RefreshError> {
        self.refresh()
            .await
            .map_err(|e| RefreshError::StaleInitialCache(Box::new(e)))
    }
}

/// Refresh every `interval` until the task is dropped.
///
/// The first tick fires one interval after the call, since the initial
/// refresh happens before serving starts. Failures keep the previous
/// snapshot.
pub async fn run_refresh_loop(pipeline: Arc<RefreshPipeline>, interval: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_secs = interval.as_secs(), "Starting refresh loop");

    loop {
        ticker.tick().await;
        match pipeline.refresh().await {
            Ok(_) => {}
            Err(RefreshError::AlreadyRunning) => {
                debug!("Scheduled refresh skipped, previous one still running");
            }
            Err(e) => {
                error!(error = %e, "Scheduled refresh failed, keeping previous snapshot");
            }
        }
    }
}
