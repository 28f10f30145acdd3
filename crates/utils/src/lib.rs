#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_ROOT_ENV: &str = "FORTIPATH_CONFIG_ROOT";
pub const CONFIG_READONLY_ENV: &str = "FORTIPATH_CONFIG_READONLY";
const DEFAULT_ROOT: &str = "/etc/fortipath";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("configuration is read-only (FORTIPATH_CONFIG_READONLY=1)")]
    ReadOnlyRoot,
    #[error("path {0} is read-only")]
    ReadOnlyPath(PathBuf),
}

pub fn config_root() -> PathBuf {
    std::env::var(CONFIG_ROOT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT))
}

pub fn enforce_writable(path: &Path) -> Result<(), PathError> {
    if std::env::var(CONFIG_READONLY_ENV).is_ok_and(|v| v == "1") {
        return Err(PathError::ReadOnlyRoot);
    }
    if let Ok(meta) = std::fs::metadata(path)
        && meta.permissions().readonly()
    {
        return Err(PathError::ReadOnlyPath(path.to_path_buf()));
    }
    Ok(())
}

/// Comma-separated values of `name`, trimmed, empties dropped. `None` when unset or blank.
pub fn env_list(name: &str) -> Option<Vec<String>> {
    split_list(&std::env::var(name).ok()?)
}

fn split_list(raw: &str) -> Option<Vec<String>> {
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!items.is_empty()).then_some(items)
}
