#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use stowage_core::{BackendSettings, LocalSettings};
use stowage_storage::{BackendConfig, LocalStorage, Storage, UploadHooks};
use tempfile::TempDir;

pub const BASE_URL: &str = "http://x/up";

/// Local storage rooted in a temporary directory that lives as long as the value.
pub struct TestStorage {
    pub storage: Arc<LocalStorage>,
    pub root: PathBuf,
    _temp_dir: TempDir,
}

impl TestStorage {
    pub fn as_storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Number of regular files anywhere under the root
    pub fn file_count(&self) -> usize {
        count_files(&self.root)
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| {
                    let path = entry.path();
                    if path.is_dir() {
                        count_files(&path)
                    } else {
                        1
                    }
                })
                .sum()
        })
        .unwrap_or(0)
}

pub async fn setup_storage() -> TestStorage {
    setup_storage_with_hooks(UploadHooks::default()).await
}

pub async fn setup_storage_with_hooks(hooks: UploadHooks) -> TestStorage {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let root = temp_dir.path().join("up");
    let storage = LocalStorage::new(root.clone(), BASE_URL.to_string())
        .await
        .expect("Failed to create local storage")
        .with_hooks(hooks);

    TestStorage {
        root: storage.root().to_path_buf(),
        storage: Arc::new(storage),
        _temp_dir: temp_dir,
    }
}

/// Declarative local backend config rooted at `root`
pub fn local_config(root: &Path) -> BackendConfig {
    BackendConfig::new(BackendSettings::Local(LocalSettings {
        root: root.to_path_buf(),
        base_url: BASE_URL.to_string(),
    }))
}
