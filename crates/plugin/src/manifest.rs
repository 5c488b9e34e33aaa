// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin discovery: scan a directory for `<plugin>/manifest.toml`.

use cf_core::{PluginManifest, PROTOCOL_VERSION};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Manifest file name inside each plugin directory.
pub const MANIFEST_FILE: &str = "manifest.toml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("plugin {id} speaks protocol {declared}, kernel speaks {kernel}")]
    ProtocolMismatch { id: String, declared: u32, kernel: u32 },
}

/// A discovered plugin: manifest plus the directory it was found in
/// (the launch command resolves relative to it).
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub manifest: PluginManifest,
    pub dir: PathBuf,
}

/// Scan `dir` for plugin subdirectories carrying a manifest.
///
/// Unparseable manifests are skipped with a warning rather than failing
/// the whole scan; a missing directory is an empty result.
pub fn discover_manifests(dir: &Path) -> Result<Vec<DiscoveredPlugin>, ManifestError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ManifestError::Io { path: dir.to_owned(), source: e }),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ManifestError::Io { path: dir.to_owned(), source: e })?;
        let plugin_dir = entry.path();
        if !plugin_dir.is_dir() {
            continue;
        }
        let manifest_path = plugin_dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            continue;
        }
        match load_manifest(&manifest_path) {
            Ok(manifest) => {
                debug!(id = %manifest.id, dir = %plugin_dir.display(), "discovered plugin");
                found.push(DiscoveredPlugin { manifest, dir: plugin_dir });
            }
            Err(e) => {
                warn!(path = %manifest_path.display(), error = %e, "skipping invalid manifest");
            }
        }
    }
    found.sort_by(|a, b| a.manifest.id.cmp(&b.manifest.id));
    Ok(found)
}

/// Load and parse one manifest file.
pub fn load_manifest(path: &Path) -> Result<PluginManifest, ManifestError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ManifestError::Io { path: path.to_owned(), source: e })?;
    toml::from_str(&text).map_err(|e| ManifestError::Parse { path: path.to_owned(), source: e })
}

/// Protocol gate applied before handshake; a mismatching plugin stays
/// Disabled rather than launched.
pub fn check_protocol(manifest: &PluginManifest) -> Result<(), ManifestError> {
    if manifest.protocol_version != PROTOCOL_VERSION {
        return Err(ManifestError::ProtocolMismatch {
            id: manifest.id.clone(),
            declared: manifest.protocol_version,
            kernel: PROTOCOL_VERSION,
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
