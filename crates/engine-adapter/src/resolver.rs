//! Maps an engine name and version to an installed binary.
//!
//! Binaries live in the engine store as `<name>_v<major>-<minor>-<patch>_<flavour>`
//! (plus `.exe` on Windows). When the store also holds a `<name>.json`
//! manifest listing the flavours of each version, the best flavour for this
//! host is chosen: it must match OS and architecture, every capability it
//! requires must be present, and among those the one using the most
//! capabilities wins.

use engine_com::test_flow::{Hardware, Version};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No installed build of {name} {version} fits this device")]
    NotFound { name: String, version: Version },
    #[error("Failed to read engine store: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid manifest {path:?}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One build of an engine version.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Flavour {
    pub id: String,
    pub os: String,
    pub arch: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Variation {
    pub version: Version,
    #[serde(default)]
    pub flavours: Vec<Flavour>,
}

/// Contents of `<store>/<name>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub variations: Vec<Variation>,
}

/// What a flavour is matched against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
    /// Lowercase capability tags.
    pub capabilities: Vec<String>,
}

impl Platform {
    pub fn from_hardware(hardware: &Hardware) -> Self {
        Self {
            os: hardware.os.clone(),
            arch: hardware.arch.clone(),
            capabilities: hardware
                .cpu
                .first()
                .map(|cpu| cpu.capabilities.iter().map(|c| c.to_lowercase()).collect())
                .unwrap_or_default(),
        }
    }

    /// Number of capabilities `flavour` uses, or `None` if it does not fit.
    fn score(&self, flavour: &Flavour) -> Option<usize> {
        if flavour.os != self.os || flavour.arch != self.arch {
            return None;
        }
        let fits = flavour
            .capabilities
            .iter()
            .all(|cap| self.capabilities.contains(&cap.to_lowercase()));
        fits.then_some(flavour.capabilities.len())
    }
}

/// File name of a flavour inside the engine store.
pub fn file_name(name: &str, version: &Version, flavour: &str) -> String {
    format!(
        "{}_{}_{}{}",
        name,
        version.url_safe(),
        flavour,
        std::env::consts::EXE_SUFFIX
    )
}

/// Resolves engines against one store, remembering earlier answers.
pub struct EngineResolver {
    store: PathBuf,
    platform: Platform,
    cache: HashMap<(String, Version), PathBuf>,
}

impl EngineResolver {
    pub fn new(store: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            store: store.into(),
            platform,
            cache: HashMap::new(),
        }
    }

    /// Path of the best installed build of `name` at `version`.
    pub fn resolve(&mut self, name: &str, version: Version) -> Result<PathBuf, ResolveError> {
        let key = (name.to_string(), version);
        if let Some(path) = self.cache.get(&key) {
            return Ok(path.clone());
        }

        let manifest_path = self.store.join(format!("{}.json", name));
        let path = if manifest_path.is_file() {
            self.from_manifest(&manifest_path, name, &version)?
        } else {
            self.scan_store(name, &version)?
        };

        let path = path.ok_or_else(|| ResolveError::NotFound {
            name: name.to_string(),
            version,
        })?;
        tracing::debug!("Resolved {} {} to {:?}", name, version, path);
        self.cache.insert(key, path.clone());
        Ok(path)
    }

    fn from_manifest(
        &self,
        manifest_path: &Path,
        name: &str,
        version: &Version,
    ) -> Result<Option<PathBuf>, ResolveError> {
        let content = std::fs::read_to_string(manifest_path)?;
        let manifest: Manifest =
            serde_json::from_str(&content).map_err(|source| ResolveError::Manifest {
                path: manifest_path.to_path_buf(),
                source,
            })?;

        let best = manifest
            .variations
            .iter()
            .filter(|variation| variation.version == *version)
            .flat_map(|variation| &variation.flavours)
            .filter_map(|flavour| {
                let path = self.store.join(file_name(name, version, &flavour.id));
                let score = self.platform.score(flavour)?;
                path.is_file().then_some((score, path))
            })
            // Earlier flavours win ties.
            .fold(None, |best: Option<(usize, PathBuf)>, candidate| match best {
                Some(current) if current.0 >= candidate.0 => Some(current),
                _ => Some(candidate),
            });

        Ok(best.map(|(_, path)| path))
    }

    /// First installed file for `name` at `version`, in name order.
    fn scan_store(&self, name: &str, version: &Version) -> Result<Option<PathBuf>, ResolveError> {
        if !self.store.is_dir() {
            return Ok(None);
        }

        let prefix = format!("{}_{}_", name, version.url_safe());
        let suffix = std::env::consts::EXE_SUFFIX;
        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(&self.store)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.starts_with(&prefix)
                && file_name.ends_with(suffix)
                && entry.file_type()?.is_file()
            {
                candidates.push(entry.path());
            }
        }

        candidates.sort();
        Ok(candidates.into_iter().next())
    }
}
