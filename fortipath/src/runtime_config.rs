use fortipath_core::{AnalyzerSettings, DEFAULT_MAX_WALK, ZoneConfig};
use object_model::{Ipv4Network, parse_network};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use utils::env_list;

pub const DMZ_NETWORKS_ENV: &str = "FORTIPATH_DMZ_NETWORKS";
pub const INTERNAL_NETWORKS_ENV: &str = "FORTIPATH_INTERNAL_NETWORKS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub max_walk: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        TopologyConfig {
            max_walk: DEFAULT_MAX_WALK,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub zones: ZoneConfig,
    pub topology: TopologyConfig,
}

impl RuntimeConfig {
    /// Zone ranges from the environment replace the file's, list by list.
    pub fn apply_env_overrides(&mut self) -> Result<(), String> {
        if let Some(list) = env_list(DMZ_NETWORKS_ENV) {
            self.zones.dmz = parse_networks(DMZ_NETWORKS_ENV, &list)?;
        }
        if let Some(list) = env_list(INTERNAL_NETWORKS_ENV) {
            self.zones.internal = parse_networks(INTERNAL_NETWORKS_ENV, &list)?;
        }
        Ok(())
    }

    pub fn settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            zones: self.zones.clone(),
            max_walk: self.topology.max_walk,
        }
    }
}

fn parse_networks(var: &str, items: &[String]) -> Result<Vec<Ipv4Network>, String> {
    items
        .iter()
        .map(|item| parse_network(item).map_err(|e| format!("{var}: {e}")))
        .collect()
}

pub fn load_runtime_config(root: &Path) -> Result<RuntimeConfig, String> {
    let path = root.join(fortipath_config::RUNTIME_FILE);
    let mut cfg = if path.exists() {
        let body = fs::read_to_string(&path)
            .map_err(|e| format!("read runtime config {}: {e}", path.display()))?;
        if body.trim().is_empty() {
            RuntimeConfig::default()
        } else {
            serde_yaml::from_str(&body)
                .map_err(|e| format!("parse runtime config {}: {e}", path.display()))?
        }
    } else {
        RuntimeConfig::default()
    };
    cfg.apply_env_overrides()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let cfg = load_runtime_config(dir.path()).unwrap();
        assert_eq!(cfg.topology.max_walk, DEFAULT_MAX_WALK);
        assert_eq!(cfg.zones, ZoneConfig::default());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("fortipath.yaml"),
            "zones:\n  dmz:\n    - 10.20.0.0 255.255.0.0\ntopology:\n  max_walk: 4\n",
        )
        .unwrap();
        let cfg = load_runtime_config(dir.path()).unwrap();
        assert_eq!(cfg.topology.max_walk, 4);
        assert_eq!(cfg.zones.dmz.len(), 1);
        assert_eq!(cfg.zones.dmz[0].to_string(), "10.20.0.0/16");
        assert_eq!(cfg.zones.internal, ZoneConfig::default().internal);
        assert_eq!(cfg.settings().max_walk, 4);
    }

    #[test]
    fn bad_network_in_yaml_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("fortipath.yaml"), "zones:\n  dmz: [\"10.0.0.0/40\"]\n").unwrap();
        let err = load_runtime_config(dir.path()).unwrap_err();
        assert!(err.contains("parse runtime config"));
    }

    #[test]
    fn env_lists_parse_as_networks() {
        let nets = parse_networks("X", &["10.1.0.0/16".to_string(), "192.0.2.0 255.255.255.0".to_string()])
            .unwrap();
        assert_eq!(nets[1].to_string(), "192.0.2.0/24");
        assert!(parse_networks("X", &["nope".to_string()]).unwrap_err().starts_with("X:"));
    }
}
