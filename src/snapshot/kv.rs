//! Key-value mirror of the snapshot
//!
//! Collections are hashes of `id -> value`, replaced wholesale
//! (delete, then bulk set). Keys:
//!
//! | key | entries |
//! |---|---|
//! | `orgs` | org id -> name |
//! | `networks` | network id -> name, all organizations |
//! | `networks-{orgId}` | network id -> name |
//! | `admins-{orgId}` | admin id -> `{"name","email"}` JSON |
//! | `devices-{netId}` | serial -> `{"name","model"}` JSON |
//!
//! Every write replaces every collection of the new snapshot, empty ones
//! included, and clears the collections of organizations and networks that
//! are gone. An empty collection is stored as an absent key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::model::{Admin, Device, Network, Organization, Snapshot, SnapshotBuilder};

#[derive(Error, Debug)]
pub enum KvError {
    #[error("Key-value backend error: {0}")]
    Backend(String),

    #[error("Malformed entry {key}/{id}: {message}")]
    Malformed {
        key: String,
        id: String,
        message: String,
    },
}

/// Hash-of-strings storage with whole-collection replace
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Delete `key` and set all `entries` in its place; empty `entries`
    /// just deletes
    async fn replace_collection(
        &self,
        key: &str,
        entries: BTreeMap<String, String>,
    ) -> Result<(), KvError>;

    /// All entries under `key`; empty when the key does not exist
    async fn get_collection(&self, key: &str) -> Result<BTreeMap<String, String>, KvError>;
}

/// Process-local [`KvStore`]
#[derive(Default)]
pub struct InMemoryKvStore {
    collections: RwLock<HashMap<String, BTreeMap<String, String>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn replace_collection(
        &self,
        key: &str,
        entries: BTreeMap<String, String>,
    ) -> Result<(), KvError> {
        let mut collections = self.collections.write().await;
        collections.remove(key);
        if !entries.is_empty() {
            collections.insert(key.to_string(), entries);
        }
        Ok(())
    }

    async fn get_collection(&self, key: &str) -> Result<BTreeMap<String, String>, KvError> {
        Ok(self
            .collections
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Serialize, Deserialize)]
struct AdminEntry {
    name: String,
    email: String,
}

#[derive(Serialize, Deserialize)]
struct DeviceEntry {
    name: Option<String>,
    model: String,
}

pub fn networks_key(org_id: &str) -> String {
    format!("networks-{org_id}")
}

pub fn admins_key(org_id: &str) -> String {
    format!("admins-{org_id}")
}

pub fn devices_key(net_id: &str) -> String {
    format!("devices-{net_id}")
}

/// Writes snapshots to, and rebuilds them from, a [`KvStore`]
#[derive(Clone)]
pub struct KvMirror {
    store: Arc<dyn KvStore>,
}

impl KvMirror {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), KvError> {
        let previous_orgs = self.store.get_collection("orgs").await?;
        let previous_networks = self.store.get_collection("networks").await?;

        for org in snapshot.organizations() {
            let networks = snapshot
                .networks_for_org(&org.id)
                .iter()
                .map(|n| (n.id.clone(), n.name.clone()))
                .collect();
            self.store
                .replace_collection(&networks_key(&org.id), networks)
                .await?;

            let mut admins = BTreeMap::new();
            for admin in snapshot.admins_for_org(&org.id) {
                admins.insert(
                    admin.id.clone(),
                    encode(&AdminEntry {
                        name: admin.name.clone(),
                        email: admin.email.clone(),
                    })?,
                );
            }
            self.store
                .replace_collection(&admins_key(&org.id), admins)
                .await?;
        }

        for net in snapshot.networks() {
            let mut devices = BTreeMap::new();
            for device in snapshot.devices_for_network(&net.id) {
                devices.insert(
                    device.serial.clone(),
                    encode(&DeviceEntry {
                        name: device.name.clone(),
                        model: device.model.clone(),
                    })?,
                );
            }
            self.store
                .replace_collection(&devices_key(&net.id), devices)
                .await?;
        }

        let orgs: BTreeMap<String, String> = snapshot
            .organizations()
            .iter()
            .map(|o| (o.id.clone(), o.name.clone()))
            .collect();
        let all_networks: BTreeMap<String, String> = snapshot
            .networks()
            .iter()
            .map(|n| (n.id.clone(), n.name.clone()))
            .collect();

        let gone_orgs: BTreeSet<&String> = previous_orgs
            .keys()
            .filter(|id| !orgs.contains_key(*id))
            .collect();
        for org_id in &gone_orgs {
            self.store
                .replace_collection(&networks_key(org_id), BTreeMap::new())
                .await?;
            self.store
                .replace_collection(&admins_key(org_id), BTreeMap::new())
                .await?;
        }
        let gone_networks: BTreeSet<&String> = previous_networks
            .keys()
            .filter(|id| !all_networks.contains_key(*id))
            .collect();
        for net_id in &gone_networks {
            self.store
                .replace_collection(&devices_key(net_id), BTreeMap::new())
                .await?;
        }
        if !gone_orgs.is_empty() || !gone_networks.is_empty() {
            debug!(
                organizations = gone_orgs.len(),
                networks = gone_networks.len(),
                "Cleared mirror collections of removed parents"
            );
        }

        self.store.replace_collection("networks", all_networks).await?;
        self.store.replace_collection("orgs", orgs).await?;

        Ok(())
    }

    /// Rebuild a snapshot from the mirror.
    ///
    /// Collections come back in key order; upstream order is not preserved.
    pub async fn read_snapshot(&self) -> Result<Snapshot, KvError> {
        let mut builder = SnapshotBuilder::new();

        for (org_id, org_name) in self.store.get_collection("orgs").await? {
            let networks = self.store.get_collection(&networks_key(&org_id)).await?;
            let admins = self.store.get_collection(&admins_key(&org_id)).await?;

            for (net_id, net_name) in &networks {
                let devices = self.store.get_collection(&devices_key(net_id)).await?;
                let mut serials = Vec::with_capacity(devices.len());
                for (serial, raw) in devices {
                    let entry: DeviceEntry = decode(&devices_key(net_id), &serial, &raw)?;
                    serials.push(serial.clone());
                    builder.add_device(Device {
                        serial,
                        name: entry.name,
                        model: entry.model,
                    });
                }
                builder.add_network(Network {
                    id: net_id.clone(),
                    name: net_name.clone(),
                    organization_id: org_id.clone(),
                    device_serials: serials,
                });
            }

            let mut admin_ids = Vec::with_capacity(admins.len());
            for (admin_id, raw) in admins {
                let entry: AdminEntry = decode(&admins_key(&org_id), &admin_id, &raw)?;
                admin_ids.push(admin_id.clone());
                builder.add_admin(Admin {
                    id: admin_id,
                    name: entry.name,
                    email: entry.email,
                    organization_id: org_id.clone(),
                });
            }

            builder.add_organization(Organization {
                network_ids: networks.into_keys().collect(),
                admin_ids,
                id: org_id,
                name: org_name,
            });
        }

        builder.build().map_err(KvError::Backend)
    }
}

fn encode<T: Serialize>(entry: &T) -> Result<String, KvError> {
    serde_json::to_string(entry).map_err(|e| KvError::Backend(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(key: &str, id: &str, raw: &str) -> Result<T, KvError> {
    serde_json::from_str(raw).map_err(|e| KvError::Malformed {
        key: key.to_string(),
        id: id.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;

    #[tokio::test]
    async fn test_write_uses_hierarchical_keys() {
        let kv = Arc::new(InMemoryKvStore::new());
        let mirror = KvMirror::new(kv.clone());
        mirror.write_snapshot(&sample_snapshot()).await.unwrap();

        let nets = kv.get_collection("networks-o1").await.unwrap();
        assert_eq!(nets.len(), 2);
        assert_eq!(nets["n2"], "Main Street Branch");

        assert_eq!(kv.get_collection("networks").await.unwrap().len(), 3);

        let devices = kv.get_collection("devices-n1").await.unwrap();
        let unnamed: serde_json::Value = serde_json::from_str(&devices["Q2"]).unwrap();
        assert_eq!(unnamed["name"], serde_json::Value::Null);
        assert_eq!(unnamed["model"], "MX64");

        // n3 has no devices, so nothing is written for it
        assert!(kv.get_collection("devices-n3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shrunken_snapshot_leaves_no_stale_collections() {
        let kv = Arc::new(InMemoryKvStore::new());
        let mirror = KvMirror::new(kv.clone());
        mirror.write_snapshot(&sample_snapshot()).await.unwrap();

        // Acme lost every network and admin; Globex kept only its network
        let shrunken = SnapshotBuilder::new()
            .organization(org("o1", "Acme Corp", &[], &[]))
            .organization(org("o2", "Globex", &["n3"], &["a3"]))
            .network(net("n3", "Warehouse", "o2", &[]))
            .admin(admin("a3", "Carol", "carol@globex.test", "o2"))
            .build()
            .unwrap();
        mirror.write_snapshot(&shrunken).await.unwrap();

        let restored = mirror.read_snapshot().await.unwrap();
        assert_eq!(restored.stats(), shrunken.stats());
        assert!(restored.networks_for_org("o1").is_empty());
        assert!(kv.get_collection("networks-o1").await.unwrap().is_empty());
        assert!(kv.get_collection("admins-o1").await.unwrap().is_empty());
        assert!(kv.get_collection("devices-n1").await.unwrap().is_empty());
        assert!(kv.get_collection("devices-n2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_removed_organization_collections_are_cleared() {
        let kv = Arc::new(InMemoryKvStore::new());
        let mirror = KvMirror::new(kv.clone());
        mirror.write_snapshot(&sample_snapshot()).await.unwrap();

        let only_globex = SnapshotBuilder::new()
            .organization(org("o2", "Globex", &["n3"], &[]))
            .network(net("n3", "Warehouse", "o2", &[]))
            .build()
            .unwrap();
        mirror.write_snapshot(&only_globex).await.unwrap();

        assert!(kv.get_collection("networks-o1").await.unwrap().is_empty());
        assert!(kv.get_collection("admins-o1").await.unwrap().is_empty());
        assert!(kv.get_collection("admins-o2").await.unwrap().is_empty());
        assert!(kv.get_collection("devices-n1").await.unwrap().is_empty());
        // orgs, networks, networks-o2
        assert_eq!(kv.collections.read().await.len(), 3);

        let restored = mirror.read_snapshot().await.unwrap();
        assert_eq!(restored.stats(), only_globex.stats());
    }

    #[tokio::test]
    async fn test_replace_drops_stale_entries() {
        let kv = InMemoryKvStore::new();
        kv.replace_collection("orgs", BTreeMap::from([("o1".into(), "Old".into()), ("o9".into(), "Gone".into())]))
            .await
            .unwrap();
        kv.replace_collection("orgs", BTreeMap::from([("o1".into(), "New".into())]))
            .await
            .unwrap();
        let orgs = kv.get_collection("orgs").await.unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs["o1"], "New");
    }

    #[tokio::test]
    async fn test_read_back_matches_written_hierarchy() {
        let kv = Arc::new(InMemoryKvStore::new());
        let mirror = KvMirror::new(kv);
        let original = sample_snapshot();
        mirror.write_snapshot(&original).await.unwrap();

        let restored = mirror.read_snapshot().await.unwrap();
        assert_eq!(restored.stats(), original.stats());
        assert_eq!(
            restored.device("Q1").map(|d| d.display_name()),
            Some("Lobby AP")
        );
        assert_eq!(restored.admin("a2").map(|a| a.email.as_str()), Some("bob@acme.test"));
        assert_eq!(restored.network("n3").map(|n| n.organization_id.as_str()), Some("o2"));
    }

    #[tokio::test]
    async fn test_malformed_entry_is_reported() {
        let kv = Arc::new(InMemoryKvStore::new());
        kv.replace_collection("orgs", BTreeMap::from([("o1".into(), "Acme".into())]))
            .await
            .unwrap();
        kv.replace_collection("admins-o1", BTreeMap::from([("a1".into(), "Alice:alice@x".into())]))
            .await
            .unwrap();

        let err = KvMirror::new(kv).read_snapshot().await.unwrap_err();
        assert!(matches!(err, KvError::Malformed { ref id, .. } if id == "a1"));
    }
}
