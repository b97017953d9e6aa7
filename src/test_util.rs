//! Temporary project workspace fixture (A4 ambient), gated behind the
//! `test-util` feature. Grounded in the ancestor's own `project_util`
//! module: a builder over a `tempfile::TempDir` that writes source files
//! and returns the root path ready for [`crate::orchestrator::Orchestrator::start`].

use std::{collections::BTreeMap, fs, path::PathBuf};

use tempfile::TempDir;

/// A scratch project directory populated with source files for a test,
/// torn down when dropped.
pub struct TempWorkspace {
    dir: TempDir,
    files: BTreeMap<PathBuf, String>,
}

impl TempWorkspace {
    pub fn new() -> Self {
        Self { dir: tempfile::tempdir().expect("tempdir creation"), files: BTreeMap::new() }
    }

    #[must_use]
    pub fn file(mut self, relative_path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.insert(relative_path.into(), contents.into());
        self
    }

    /// Writes every staged file to disk and returns the project root.
    pub fn build(self) -> BuiltWorkspace {
        for (relative, contents) in &self.files {
            let absolute = self.dir.path().join(relative);
            if let Some(parent) = absolute.parent() {
                fs::create_dir_all(parent).expect("create parent dirs");
            }
            fs::write(&absolute, contents).expect("write fixture file");
        }
        BuiltWorkspace { dir: self.dir }
    }
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// A workspace whose files have been written to disk.
pub struct BuiltWorkspace {
    dir: TempDir,
}

impl BuiltWorkspace {
    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_staged_files_under_project_root() {
        let workspace = TempWorkspace::new()
            .file("src/app/main.ts", "export const x = 1;")
            .file("src/config/database.ts", "export const url = 'sqlite://';")
            .build();
        assert!(workspace.root().join("src/app/main.ts").exists());
        assert!(workspace.root().join("src/config/database.ts").exists());
    }
}
