use object_model::Device;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadOutcome {
    Inserted,
    Unchanged,
    Replaced,
}

#[derive(Debug, Clone)]
struct Entry {
    device: Device,
    fingerprint: String,
}

/// Loaded devices in load order, keyed by id.
///
/// Contents only change through [`DeviceRepository::reload`] and
/// [`DeviceRepository::remove`]; edits to the source configuration are not observed.
#[derive(Debug, Clone, Default)]
pub struct DeviceRepository {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl DeviceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reload(&mut self, device: Device) -> ReloadOutcome {
        let fingerprint = fingerprint(&device);
        let id = device.id.clone();
        let outcome = match self.index.get(&device.id) {
            Some(&pos) if self.entries[pos].fingerprint == fingerprint => ReloadOutcome::Unchanged,
            Some(&pos) => {
                self.entries[pos] = Entry {
                    device,
                    fingerprint,
                };
                ReloadOutcome::Replaced
            }
            None => {
                self.index.insert(device.id.clone(), self.entries.len());
                self.entries.push(Entry {
                    device,
                    fingerprint,
                });
                ReloadOutcome::Inserted
            }
        };
        info!(device = %id, ?outcome, "device loaded");
        outcome
    }

    pub fn remove(&mut self, id: &str) -> Option<Device> {
        let pos = self.index.remove(id)?;
        let entry = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        info!(device = id, "device unloaded");
        Some(entry.device)
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.index.get(id).map(|&pos| &self.entries[pos].device)
    }

    /// Like [`get`](Self::get) but logs a missing device.
    pub fn require(&self, id: &str) -> Option<&Device> {
        let found = self.get(id);
        if found.is_none() {
            error!(device = id, "device data not loaded");
        }
        found
    }

    pub fn fingerprint(&self, id: &str) -> Option<&str> {
        self.index
            .get(id)
            .map(|&pos| self.entries[pos].fingerprint.as_str())
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.entries.iter().map(|e| &e.device)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_routes(&self) -> bool {
        self.devices().any(|d| !d.routes.is_empty())
    }
}

impl FromIterator<Device> for DeviceRepository {
    fn from_iter<I: IntoIterator<Item = Device>>(iter: I) -> Self {
        let mut repo = DeviceRepository::new();
        for device in iter {
            repo.reload(device);
        }
        repo
    }
}

fn fingerprint(device: &Device) -> String {
    match serde_json::to_vec(device) {
        Ok(bytes) => hex::encode(Sha256::digest(&bytes)),
        Err(e) => {
            error!(device = %device.id, error = %e, "cannot fingerprint device");
            String::new()
        }
    }
}
