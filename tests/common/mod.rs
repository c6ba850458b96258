#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use data_unifier::{pipeline::SourceInput, registry::ProfileRegistry};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// The sample profile set shipped with the tests.
pub fn sample_registry() -> ProfileRegistry {
    ProfileRegistry::load(&fixture_path("profiles.yaml")).expect("load sample profiles")
}

/// Reads a fixture as a [`SourceInput`] identified by its file name.
pub fn fixture_source(name: &str) -> SourceInput {
    let bytes = fs::read(fixture_path(name)).expect("read fixture");
    SourceInput::new(name, bytes)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` under the workspace, creating parent directories.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.temp_dir.path().join(name)).expect("read workspace file")
    }
}
