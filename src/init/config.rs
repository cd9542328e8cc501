// SPDX-License-Identifier: Apache-2.0

//! Startup inputs: broker hosts, source configs and saved statuses.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::init::BoxError;
use crate::receivers::file::config::SourceConfig;
use crate::receivers::file::status::{StatusStore, TEMP_FILE_PREFIX};

/// Name of the broker host list inside the kafka directory.
pub const HOSTS_FILE: &str = "hosts.txt";

/// Reserved file stem, ignored in the config and var directories.
const README_STEM: &str = "readme";

/// Read `<kafka_dir>/hosts.txt`, a JSON array of `host:port` strings.
pub fn load_hosts(kafka_dir: &Path) -> Result<Vec<String>, BoxError> {
    let path = kafka_dir.join(HOSTS_FILE);
    let bytes = fs::read(&path)
        .map_err(|e| format!("unable to read broker host list {}: {}", path.display(), e))?;
    let hosts: Vec<String> = serde_json::from_slice(&bytes)
        .map_err(|e| format!("malformed broker host list {}: {}", path.display(), e))?;
    Ok(hosts)
}

/// Load every source config in `conf_dir`, each named after its file.
///
/// Unreadable or malformed files are logged and skipped.
pub fn load_source_configs(conf_dir: &Path) -> Result<Vec<SourceConfig>, BoxError> {
    let mut configs = Vec::new();
    for (name, path) in list_files(conf_dir)? {
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = ?path, error = %e, "Unable to read config file, skipping");
                continue;
            }
        };
        match SourceConfig::from_json(&name, &bytes) {
            Ok(config) => configs.push(config),
            Err(e) => warn!(path = ?path, error = %e, "Unable to parse config file, skipping"),
        }
    }

    info!(dir = ?conf_dir, sources = configs.len(), "Loaded source configs");
    Ok(configs)
}

/// Load the saved status store of every source, keyed by source name.
///
/// Creates `var_dir` if it does not exist. Unreadable or malformed files are
/// logged and skipped; their source starts with an empty store.
pub fn load_status_stores(var_dir: &Path) -> Result<HashMap<String, StatusStore>, BoxError> {
    fs::create_dir_all(var_dir)
        .map_err(|e| format!("unable to create var directory {}: {}", var_dir.display(), e))?;

    let mut stores = HashMap::new();
    for (name, path) in list_files(var_dir)? {
        if name.starts_with(TEMP_FILE_PREFIX) {
            continue;
        }
        match StatusStore::load(&path) {
            Ok(store) => {
                stores.insert(name, store);
            }
            Err(e) => warn!(path = ?path, error = %e, "Unable to load status file, skipping"),
        }
    }
    Ok(stores)
}

/// Regular files in `dir`, sorted by name, without the reserved readme.
fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, BoxError> {
    let entries =
        fs::read_dir(dir).map_err(|e| format!("unable to list {}: {}", dir.display(), e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || is_readme(&path) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = ?path, "Skipping non UTF-8 file name");
            continue;
        };
        files.push((name.to_string(), path.clone()));
    }
    files.sort();
    Ok(files)
}

fn is_readme(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.eq_ignore_ascii_case(README_STEM))
}
