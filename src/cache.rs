//! Cache store (C6): a per-project directory holding one rewritten artifact
//! per source file plus a JSON manifest.
//!
//! Persists a `BTreeMap<PathBuf, CacheEntry>` to a single JSON file and
//! rebases paths relative to the project root before writing.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use crate::{error::CacheError, file_record::Layer, paths};

pub const MANIFEST_VERSION: &str = "1.0.0";
pub const CACHE_DIR_NAME: &str = ".warlock";

/// One entry in the persisted manifest, keyed by project-relative path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFileEntry {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub hash: String,
    pub last_modified: u64,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub version: u64,
    #[serde(rename = "type")]
    pub file_type: String,
    pub layer: Layer,
    pub cache_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestStats {
    pub total_files: usize,
    pub total_dependencies: usize,
}

/// The persisted `.warlock/manifest.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub last_build_time: u64,
    pub stats: ManifestStats,
    pub files: BTreeMap<String, ManifestFileEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            last_build_time: 0,
            stats: ManifestStats::default(),
            files: BTreeMap::new(),
        }
    }
}

impl Manifest {
    /// Reads and parses the manifest at `path`. Per §7, a corrupted or
    /// missing manifest is treated identically to "no manifest": both
    /// return `None` rather than propagating the read/parse error, so the
    /// orchestrator always has a clean cold-start path available.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn read(path: &Path) -> Option<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                debug!(%err, "no manifest found, treating as cold start");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                warn!(%err, "manifest corrupted, treating as cold start");
                None
            }
        }
    }

    /// Serializes then writes the whole file in one call, matching the
    /// "persisted atomically" requirement in §5 (no partial-write window
    /// visible to a concurrently-starting reader of the same file).
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn write(&self, path: &Path) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(self).expect("manifest is always serializable");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CacheError::WriteManifest { path: path.to_path_buf(), source })?;
        }
        fs::write(path, json).map_err(|source| CacheError::WriteManifest { path: path.to_path_buf(), source })?;
        trace!(files = self.files.len(), "manifest written");
        Ok(())
    }

    pub fn recompute_stats(&mut self) {
        self.stats.total_files = self.files.len();
        self.stats.total_dependencies = self.files.values().map(|f| f.dependencies.len()).sum();
    }
}

/// Owns the `.warlock/` directory layout: `cache/<name>.js[.map]` artifacts
/// and `manifest.json`.
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(project_root: &Path) -> Self {
        Self { root: project_root.join(CACHE_DIR_NAME) }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    pub fn artifact_path(&self, cache_name: &str) -> PathBuf {
        self.cache_dir().join(cache_name)
    }

    pub fn source_map_path(&self, cache_name: &str) -> PathBuf {
        self.cache_dir().join(format!("{cache_name}.map"))
    }

    /// Removes and recreates the cache directory. Used on a true cold start
    /// (no manifest at all), per §4.9 step 3.
    pub fn recreate(&self) -> Result<(), CacheError> {
        let _ = fs::remove_dir_all(&self.root);
        fs::create_dir_all(self.cache_dir())
            .map_err(|source| CacheError::WriteArtifact { path: self.cache_dir(), source })
    }

    pub fn ensure_dirs(&self) -> Result<(), CacheError> {
        fs::create_dir_all(self.cache_dir())
            .map_err(|source| CacheError::WriteArtifact { path: self.cache_dir(), source })
    }

    pub fn write_artifact(&self, cache_name: &str, code: &str, source_map: Option<&str>) -> Result<(), CacheError> {
        self.ensure_dirs()?;
        let artifact_path = self.artifact_path(cache_name);
        fs::write(&artifact_path, code).map_err(|source| CacheError::WriteArtifact { path: artifact_path.clone(), source })?;
        if let Some(map) = source_map {
            let map_path = self.source_map_path(cache_name);
            fs::write(&map_path, map).map_err(|source| CacheError::WriteArtifact { path: map_path, source })?;
        }
        Ok(())
    }

    pub fn remove_artifact(&self, cache_name: &str) {
        let _ = fs::remove_file(self.artifact_path(cache_name));
        let _ = fs::remove_file(self.source_map_path(cache_name));
    }

    pub fn read_artifact(&self, cache_name: &str) -> Option<String> {
        fs::read_to_string(self.artifact_path(cache_name)).ok()
    }
}

/// Builds a [`ManifestFileEntry`] from a file record's current state.
/// Lives here (not on `FileRecord`) so the dependency direction stays
/// `cache → file_record`, matching the ancestor's `CacheEntry` being built
/// from `Source`/`Project` data rather than the reverse.
pub fn entry_for(record: &crate::file_record::FileRecord, _project_root: &Path) -> ManifestFileEntry {
    ManifestFileEntry {
        absolute_path: record.absolute_path.clone(),
        relative_path: record.relative_path.clone(),
        hash: record.hash.clone(),
        last_modified: record.last_modified,
        dependencies: record.dependencies.iter().cloned().collect(),
        dependents: record.dependents.iter().cloned().collect(),
        version: record.version,
        file_type: record.file_type.as_str().to_string(),
        layer: record.layer,
        cache_path: record.cache_name.clone(),
    }
}

/// Splits the current filesystem file set and the manifest's file set into
/// (new, deleted, existing) project-relative path buckets, per §4.9 step 4.
pub fn reconcile(fs_files: &[String], manifest: &Manifest) -> (Vec<String>, Vec<String>, Vec<String>) {
    let fs_set: std::collections::BTreeSet<&String> = fs_files.iter().collect();
    let manifest_set: std::collections::BTreeSet<&String> = manifest.files.keys().collect();

    let new: Vec<String> = fs_set.difference(&manifest_set).map(|s| s.to_string()).collect();
    let deleted: Vec<String> = manifest_set.difference(&fs_set).map(|s| s.to_string()).collect();
    let existing: Vec<String> = fs_set.intersection(&manifest_set).map(|s| s.to_string()).collect();
    (new, deleted, existing)
}

/// Derives the on-disk relative path form used in the manifest, always
/// forward-slash separated regardless of host platform.
pub fn relative_key(project_root: &Path, absolute: &Path) -> String {
    paths::project_relative(project_root, absolute).map(|p| paths::to_slash(&p)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(file_type: &str) -> ManifestFileEntry {
        ManifestFileEntry {
            absolute_path: PathBuf::from("/p/src/app/x.ts"),
            relative_path: "src/app/x.ts".to_string(),
            hash: "a".into(),
            last_modified: 0,
            dependencies: vec![],
            dependents: vec![],
            version: 1,
            file_type: file_type.into(),
            layer: Layer::Hmr,
            cache_path: "src-app-x.js".into(),
        }
    }

    #[test]
    fn reconcile_splits_new_deleted_existing() {
        let mut manifest = Manifest::default();
        manifest.files.insert("src/app/stale.ts".to_string(), entry("other"));
        manifest.files.insert("src/app/main.ts".to_string(), entry("main"));

        let fs_files = vec!["src/app/main.ts".to_string(), "src/app/fresh.ts".to_string()];
        let (new, deleted, existing) = reconcile(&fs_files, &manifest);
        assert_eq!(new, vec!["src/app/fresh.ts".to_string()]);
        assert_eq!(deleted, vec!["src/app/stale.ts".to_string()]);
        assert_eq!(existing, vec!["src/app/main.ts".to_string()]);
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let mut manifest = Manifest::default();
        manifest.last_build_time = 123;
        manifest.recompute_stats();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        manifest.write(&path).unwrap();
        let read_back = Manifest::read(&path).unwrap();
        assert_eq!(read_back.version, manifest.version);
        assert_eq!(read_back.last_build_time, 123);
    }

    #[test]
    fn corrupted_manifest_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Manifest::read(&path).is_none());
    }

    #[test]
    fn missing_manifest_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Manifest::read(&dir.path().join("manifest.json")).is_none());
    }
}
