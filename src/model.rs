//! Resource hierarchy types
//!
//! Organizations own networks and admins, networks own devices. A
//! [`Snapshot`] bundles one complete copy of the hierarchy as fetched in a
//! single refresh cycle. Snapshots are built once and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// An organization on the management platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    /// Network ids in upstream order
    pub network_ids: Vec<String>,
    /// Admin ids in upstream order
    pub admin_ids: Vec<String>,
}

/// A network inside an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub organization_id: String,
    /// Device serials in upstream order
    pub device_serials: Vec<String>,
}

/// A device, keyed by its globally unique serial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub serial: String,
    pub name: Option<String>,
    pub model: String,
}

impl Device {
    /// Name shown to users: the device name, or its model when unnamed.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.model,
        }
    }
}

/// An administrator of an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub id: String,
    pub name: String,
    pub email: String,
    pub organization_id: String,
}

/// Entity kinds the resolver can look up by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Organization,
    Network,
}

impl EntityKind {
    /// Singular noun used in user-facing messages
    pub fn noun(&self) -> &'static str {
        match self {
            EntityKind::Organization => "organization",
            EntityKind::Network => "network",
        }
    }

    /// Plural noun used in user-facing messages
    pub fn plural(&self) -> &'static str {
        match self {
            EntityKind::Organization => "organizations",
            EntityKind::Network => "networks",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun())
    }
}

/// Immutable, internally consistent copy of the whole hierarchy.
///
/// Construct through [`SnapshotBuilder`], which checks that every id an
/// organization or network refers to is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Organizations in upstream order
    organizations: Vec<Organization>,
    networks: HashMap<String, Network>,
    devices: HashMap<String, Device>,
    admins: HashMap<String, Admin>,
    /// When the refresh that produced this snapshot completed
    refreshed_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// The snapshot served before the first refresh completes
    pub fn empty() -> Self {
        Self {
            organizations: Vec::new(),
            networks: HashMap::new(),
            devices: HashMap::new(),
            admins: HashMap::new(),
            refreshed_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.refreshed_at.is_none()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn organizations(&self) -> &[Organization] {
        &self.organizations
    }

    pub fn organization(&self, id: &str) -> Option<&Organization> {
        self.organizations.iter().find(|org| org.id == id)
    }

    pub fn network(&self, id: &str) -> Option<&Network> {
        self.networks.get(id)
    }

    pub fn device(&self, serial: &str) -> Option<&Device> {
        self.devices.get(serial)
    }

    pub fn admin(&self, id: &str) -> Option<&Admin> {
        self.admins.get(id)
    }

    /// All networks, ordered by organization and then upstream order
    pub fn networks(&self) -> Vec<&Network> {
        self.organizations
            .iter()
            .flat_map(|org| org.network_ids.iter())
            .filter_map(|id| self.networks.get(id))
            .collect()
    }

    pub fn networks_for_org(&self, org_id: &str) -> Vec<&Network> {
        self.organization(org_id)
            .map(|org| {
                org.network_ids
                    .iter()
                    .filter_map(|id| self.networks.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn admins_for_org(&self, org_id: &str) -> Vec<&Admin> {
        self.organization(org_id)
            .map(|org| {
                org.admin_ids
                    .iter()
                    .filter_map(|id| self.admins.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn devices_for_network(&self, net_id: &str) -> Vec<&Device> {
        self.networks
            .get(net_id)
            .map(|net| {
                net.device_serials
                    .iter()
                    .filter_map(|serial| self.devices.get(serial))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Counts for logging
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            organizations: self.organizations.len(),
            networks: self.networks.len(),
            devices: self.devices.len(),
            admins: self.admins.len(),
        }
    }
}

/// Snapshot statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotStats {
    pub organizations: usize,
    pub networks: usize,
    pub devices: usize,
    pub admins: usize,
}

impl fmt::Display for SnapshotStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} organizations, {} networks, {} devices, {} admins",
            self.organizations, self.networks, self.devices, self.admins
        )
    }
}

/// Accumulates one refresh cycle's records and produces a checked [`Snapshot`].
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    organizations: Vec<Organization>,
    networks: HashMap<String, Network>,
    devices: HashMap<String, Device>,
    admins: HashMap<String, Admin>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn organization(mut self, org: Organization) -> Self {
        self.add_organization(org);
        self
    }

    pub fn network(mut self, net: Network) -> Self {
        self.add_network(net);
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.add_device(device);
        self
    }

    pub fn admin(mut self, admin: Admin) -> Self {
        self.add_admin(admin);
        self
    }

    pub fn add_organization(&mut self, org: Organization) {
        self.organizations.push(org);
    }

    pub fn add_network(&mut self, net: Network) {
        self.networks.insert(net.id.clone(), net);
    }

    pub fn add_device(&mut self, device: Device) {
        self.devices.insert(device.serial.clone(), device);
    }

    pub fn add_admin(&mut self, admin: Admin) {
        self.admins.insert(admin.id.clone(), admin);
    }

    /// Check referential integrity and seal the snapshot.
    ///
    /// Returns a description of the first dangling reference on failure.
    pub fn build(self) -> Result<Snapshot, String> {
        for org in &self.organizations {
            if let Some(missing) = org
                .network_ids
                .iter()
                .find(|id| !self.networks.contains_key(*id))
            {
                return Err(format!(
                    "organization {} references unknown network {}",
                    org.id, missing
                ));
            }
            if let Some(missing) = org.admin_ids.iter().find(|id| !self.admins.contains_key(*id)) {
                return Err(format!(
                    "organization {} references unknown admin {}",
                    org.id, missing
                ));
            }
        }

        for net in self.networks.values() {
            if let Some(missing) = net
                .device_serials
                .iter()
                .find(|serial| !self.devices.contains_key(*serial))
            {
                return Err(format!(
                    "network {} references unknown device {}",
                    net.id, missing
                ));
            }
        }

        Ok(Snapshot {
            organizations: self.organizations,
            networks: self.networks,
            devices: self.devices,
            admins: self.admins,
            refreshed_at: Some(Utc::now()),
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn org(id: &str, name: &str, networks: &[&str], admins: &[&str]) -> Organization {
        Organization {
            id: id.to_string(),
            name: name.to_string(),
            network_ids: networks.iter().map(|s| s.to_string()).collect(),
            admin_ids: admins.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn net(id: &str, name: &str, org_id: &str, devices: &[&str]) -> Network {
        Network {
            id: id.to_string(),
            name: name.to_string(),
            organization_id: org_id.to_string(),
            device_serials: devices.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn device(serial: &str, name: Option<&str>, model: &str) -> Device {
        Device {
            serial: serial.to_string(),
            name: name.map(str::to_string),
            model: model.to_string(),
        }
    }

    pub fn admin(id: &str, name: &str, email: &str, org_id: &str) -> Admin {
        Admin {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            organization_id: org_id.to_string(),
        }
    }

    /// Two organizations, three networks, a handful of devices and admins
    pub fn sample_snapshot() -> Snapshot {
        SnapshotBuilder::new()
            .organization(org("o1", "Acme Corp", &["n1", "n2"], &["a1", "a2"]))
            .organization(org("o2", "Globex", &["n3"], &["a3"]))
            .network(net("n1", "Main Office", "o1", &["Q1", "Q2"]))
            .network(net("n2", "Main Street Branch", "o1", &["Q3"]))
            .network(net("n3", "Warehouse", "o2", &[]))
            .device(device("Q1", Some("Lobby AP"), "MR33"))
            .device(device("Q2", None, "MX64"))
            .device(device("Q3", Some("Branch Switch"), "MS220"))
            .admin(admin("a1", "Alice", "alice@acme.test", "o1"))
            .admin(admin("a2", "Bob", "bob@acme.test", "o1"))
            .admin(admin("a3", "Carol", "carol@globex.test", "o2"))
            .build()
            .expect("fixture snapshot is consistent")
    }
}
