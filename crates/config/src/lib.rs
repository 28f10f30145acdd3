#![forbid(unsafe_code)]

use object_model::{Device, DeviceSnapshot};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

const MAX_BACKUPS_DEFAULT: usize = 5;
pub const RUNTIME_FILE: &str = "fortipath.yaml";
const SNAPSHOT_EXT: &str = "json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("snapshot file name {0} has no usable device id")]
    BadFileName(PathBuf),
}

fn io_err(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError {
    let path = path.to_path_buf();
    move |source| ConfigError::Io {
        action,
        path,
        source,
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub root: PathBuf,
    /// One `<device-id>.json` snapshot per firewall.
    pub devices_dir: PathBuf,
    pub runtime_file: PathBuf,
    pub state_dir: PathBuf,
    versions_dir: PathBuf,
    meta_file: PathBuf,
}

impl ConfigPaths {
    pub fn new(root: PathBuf) -> Self {
        let state_dir = root.join("state");
        ConfigPaths {
            devices_dir: root.join("devices"),
            runtime_file: root.join(RUNTIME_FILE),
            versions_dir: state_dir.join("versions"),
            meta_file: state_dir.join("config_meta"),
            state_dir,
            root,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigMeta {
    pub version: u64,
    pub hash_hex: String,
    pub updated_at: u64,
}

#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub hash_hex: String,
    /// Tracked files differ from the last recorded version.
    pub tampered: bool,
    pub device_files: Vec<PathBuf>,
}

/// On-disk device snapshots plus their recorded versions.
pub struct ConfigManager {
    pub paths: ConfigPaths,
    max_backups: usize,
}

impl ConfigManager {
    pub fn new_with_backups(root: PathBuf, max_backups: usize) -> Result<Self, ConfigError> {
        let mgr = ConfigManager {
            paths: ConfigPaths::new(root),
            max_backups: max_backups.max(1),
        };
        mgr.ensure_layout()?;
        Ok(mgr)
    }

    pub fn new(root: PathBuf) -> Result<Self, ConfigError> {
        Self::new_with_backups(root, MAX_BACKUPS_DEFAULT)
    }

    fn ensure_layout(&self) -> Result<(), ConfigError> {
        let dirs = [
            self.paths.root.as_path(),
            self.paths.devices_dir.as_path(),
            self.paths.state_dir.as_path(),
            self.paths.versions_dir.as_path(),
        ];
        for d in dirs {
            fs::create_dir_all(d).map_err(io_err("create dir", d))?;
        }
        Ok(())
    }

    /// Snapshot files in the devices directory, sorted by name.
    pub fn device_snapshots(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let dir = &self.paths.devices_dir;
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(io_err("read devices dir", dir))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == SNAPSHOT_EXT))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Loads every snapshot in name order; the first unreadable file aborts the load.
    pub fn load_devices(&self) -> Result<Vec<Device>, ConfigError> {
        let devices = self
            .device_snapshots()?
            .iter()
            .map(|p| load_device_snapshot(p))
            .collect::<Result<Vec<_>, _>>()?;
        info!(count = devices.len(), root = %self.paths.root.display(), "device snapshots loaded");
        Ok(devices)
    }

    fn load_meta(&self) -> ConfigMeta {
        let mut meta = ConfigMeta {
            version: 0,
            hash_hex: String::new(),
            updated_at: 0,
        };
        let Ok(mut f) = File::open(&self.paths.meta_file) else {
            return meta;
        };
        let mut buf = String::new();
        if f.read_to_string(&mut buf).is_err() {
            warn!(path = %self.paths.meta_file.display(), "unreadable config meta, treating as unversioned");
            return meta;
        }
        for line in buf.lines() {
            if let Some(rest) = line.strip_prefix("version=") {
                meta.version = rest.trim().parse().unwrap_or(0);
            } else if let Some(rest) = line.strip_prefix("hash=") {
                meta.hash_hex = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("updated_at=") {
                meta.updated_at = rest.trim().parse().unwrap_or(0);
            }
        }
        meta
    }

    fn write_meta(&self, meta: &ConfigMeta) -> Result<(), ConfigError> {
        let path = &self.paths.meta_file;
        let mut f = File::create(path).map_err(io_err("write meta", path))?;
        let body = format!(
            "version={}\nhash={}\nupdated_at={}\n",
            meta.version, meta.hash_hex, meta.updated_at
        );
        f.write_all(body.as_bytes())
            .map_err(io_err("write meta", path))
    }

    fn tracked_files(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let mut files = self.device_snapshots()?;
        if self.paths.runtime_file.is_file() {
            files.push(self.paths.runtime_file.clone());
        }
        Ok(files)
    }

    /// Hash over tracked file names and contents. Names are root-relative so a moved
    /// root keeps its hash.
    fn hash_files(&self, files: &[PathBuf]) -> String {
        let mut hasher = Sha256::new();
        for path in files {
            let Ok(mut f) = File::open(path) else {
                continue;
            };
            let name = path.strip_prefix(&self.paths.root).unwrap_or(path);
            hasher.update(name.to_string_lossy().as_bytes());
            let mut buf = [0u8; 8192];
            loop {
                match f.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => hasher.update(&buf[..n]),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "short read while hashing");
                        break;
                    }
                }
            }
        }
        hex::encode(hasher.finalize())
    }

    pub fn snapshot(&self) -> Result<ConfigSnapshot, ConfigError> {
        let meta = self.load_meta();
        let tracked = self.tracked_files()?;
        let hash = self.hash_files(&tracked);
        let tampered = !meta.hash_hex.is_empty() && meta.hash_hex != hash;
        if tampered {
            warn!(version = meta.version, "device snapshots changed since last recorded version");
        }
        Ok(ConfigSnapshot {
            version: meta.version,
            hash_hex: hash,
            tampered,
            device_files: tracked
                .into_iter()
                .filter(|p| p.starts_with(&self.paths.devices_dir))
                .collect(),
        })
    }

    /// Copies the tracked files into a new numbered backup and makes it current.
    pub fn record_version(&self) -> Result<ConfigMeta, ConfigError> {
        let mut meta = self.load_meta();
        let tracked = self.tracked_files()?;
        meta.version = meta.version.saturating_add(1);
        meta.hash_hex = self.hash_files(&tracked);
        meta.updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let version_dir = self.paths.versions_dir.join(meta.version.to_string());
        for path in &tracked {
            let rel = path.strip_prefix(&self.paths.root).unwrap_or(path);
            let dest = version_dir.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(io_err("create version dir", parent))?;
            }
            fs::copy(path, &dest).map_err(io_err("back up", path))?;
        }

        self.prune_backups()?;
        self.write_meta(&meta)?;
        info!(version = meta.version, files = tracked.len(), "config version recorded");
        Ok(meta)
    }

    fn prune_backups(&self) -> Result<(), ConfigError> {
        let dir = &self.paths.versions_dir;
        let mut entries: Vec<_> = fs::read_dir(dir)
            .map_err(io_err("read versions dir", dir))?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.file_name()
                    .to_string_lossy()
                    .parse::<u64>()
                    .ok()
                    .map(|ver| (ver, e.path()))
            })
            .collect();
        entries.sort_by_key(|(ver, _)| *ver);
        let excess = entries.len().saturating_sub(self.max_backups);
        for (ver, path) in entries.into_iter().take(excess) {
            debug!(version = ver, "pruning backup");
            if let Err(e) = fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %e, "cannot prune backup");
            }
        }
        Ok(())
    }

    /// Backup versions still on disk, oldest first.
    pub fn versions(&self) -> Result<Vec<u64>, ConfigError> {
        let dir = &self.paths.versions_dir;
        let mut versions: Vec<u64> = fs::read_dir(dir)
            .map_err(io_err("read versions dir", dir))?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_string_lossy().parse().ok())
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }
}

/// Device id for a snapshot path: the file stem.
pub fn device_id_for(path: &Path) -> Result<String, ConfigError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::BadFileName(path.to_path_buf()))
}

pub fn load_device_snapshot(path: &Path) -> Result<Device, ConfigError> {
    let id = device_id_for(path)?;
    let body = fs::read_to_string(path).map_err(io_err("read snapshot", path))?;
    let snapshot: DeviceSnapshot =
        serde_json::from_str(&body).map_err(|source| ConfigError::Snapshot {
            path: path.to_path_buf(),
            source,
        })?;
    let device = snapshot.into_device(&id);
    debug!(
        device = %device.id,
        policies = device.policies.len(),
        routes = device.routes.len(),
        "snapshot parsed"
    );
    Ok(device)
}
