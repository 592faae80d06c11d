#[cfg(feature = "storage-azure")]
use crate::AzureStorage;
#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::naming::UploadHooks;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use stowage_core::BackendSettings;

/// Everything needed to build one backend instance.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub settings: BackendSettings,
    pub hooks: UploadHooks,
}

impl BackendConfig {
    pub fn new(settings: BackendSettings) -> Self {
        BackendConfig {
            settings,
            hooks: UploadHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: UploadHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn backend(&self) -> StorageBackend {
        self.settings.backend()
    }
}

/// Parse a backend selector, accepting the usual aliases.
pub fn parse_backend(name: &str) -> StorageResult<StorageBackend> {
    name.parse()
        .map_err(|_| StorageError::UnsupportedBackend(name.to_string()))
}

/// Error for a backend whose cargo feature was not enabled.
#[cfg_attr(
    all(
        feature = "storage-local",
        feature = "storage-s3",
        feature = "storage-azure"
    ),
    allow(dead_code)
)]
pub(crate) fn missing_dependency(backend: StorageBackend) -> StorageError {
    let (feature, package) = match backend {
        StorageBackend::Local => ("storage-local", "tokio/fs"),
        StorageBackend::S3 => ("storage-s3", "object_store/aws"),
        StorageBackend::Azure => ("storage-azure", "object_store/azure"),
    };
    StorageError::MissingDependency {
        backend,
        feature,
        package,
    }
}

/// Create a storage backend from its settings
pub async fn create_storage(config: &BackendConfig) -> StorageResult<Arc<dyn Storage>> {
    config
        .settings
        .validate()
        .map_err(|e| StorageError::Config(e.to_string()))?;

    match config.settings {
        #[cfg(feature = "storage-local")]
        BackendSettings::Local(ref settings) => {
            let storage = LocalStorage::new(settings.root.clone(), settings.base_url.clone())
                .await?
                .with_hooks(config.hooks.clone());
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        BackendSettings::Local(_) => Err(missing_dependency(StorageBackend::Local)),

        #[cfg(feature = "storage-s3")]
        BackendSettings::S3(ref settings) => {
            let storage = S3Storage::new(settings)
                .await?
                .with_hooks(config.hooks.clone());
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        BackendSettings::S3(_) => Err(missing_dependency(StorageBackend::S3)),

        #[cfg(feature = "storage-azure")]
        BackendSettings::Azure(ref settings) => {
            let storage = AzureStorage::new(settings)
                .await?
                .with_hooks(config.hooks.clone());
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-azure"))]
        BackendSettings::Azure(_) => Err(missing_dependency(StorageBackend::Azure)),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    backend: StorageBackend,
    settings_digest: String,
    hooks: [usize; 3],
}

impl CacheKey {
    fn for_config(config: &BackendConfig) -> StorageResult<Self> {
        let settings = serde_json::to_vec(&config.settings)
            .map_err(|e| StorageError::Config(format!("Failed to serialize settings: {}", e)))?;
        Ok(CacheKey {
            backend: config.backend(),
            settings_digest: hex::encode(Sha256::digest(&settings)),
            hooks: config.hooks.identity(),
        })
    }
}

/// Builds backends and hands out one shared instance per distinct configuration.
#[derive(Default)]
pub struct StorageFactory {
    cache: Mutex<HashMap<CacheKey, Arc<dyn Storage>>>,
}

impl StorageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached instance for `config`, creating it on first use.
    ///
    /// Two concurrent first calls may both construct a backend; the first
    /// one inserted wins and is returned to both callers.
    pub async fn get_or_create(&self, config: &BackendConfig) -> StorageResult<Arc<dyn Storage>> {
        let key = CacheKey::for_config(config)?;

        let cached = self.lock()?.get(&key).cloned();
        if let Some(storage) = cached {
            return Ok(storage);
        }

        let storage = create_storage(config).await?;

        tracing::debug!(
            backend = %key.backend,
            settings_digest = %key.settings_digest,
            "Created storage backend"
        );

        let mut cache = self.lock()?;
        Ok(Arc::clone(cache.entry(key).or_insert(storage)))
    }

    /// Drop every cached instance; later calls build fresh ones.
    pub fn clear_cache(&self) -> StorageResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<CacheKey, Arc<dyn Storage>>>> {
        self.cache
            .lock()
            .map_err(|_| StorageError::Config("storage cache lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend() {
        assert_eq!(parse_backend("fs").unwrap(), StorageBackend::Local);
        assert_eq!(parse_backend("objectstore").unwrap(), StorageBackend::S3);
        assert!(matches!(
            parse_backend("ftp"),
            Err(StorageError::UnsupportedBackend(name)) if name == "ftp"
        ));
    }

    #[test]
    fn test_missing_dependency_names_feature_and_package() {
        let err = missing_dependency(StorageBackend::S3);
        assert!(matches!(
            err,
            StorageError::MissingDependency {
                backend: StorageBackend::S3,
                feature: "storage-s3",
                package: "object_store/aws",
            }
        ));
        assert_eq!(
            err.to_string(),
            "Storage backend 's3' is not available: enable the 'storage-s3' feature (object_store/aws)"
        );
        assert!(matches!(
            missing_dependency(StorageBackend::Azure),
            StorageError::MissingDependency {
                package: "object_store/azure",
                ..
            }
        ));
    }

    #[cfg(feature = "storage-local")]
    mod local {
        use super::*;
        use stowage_core::LocalSettings;

        fn config(root: &std::path::Path) -> BackendConfig {
            BackendConfig::new(BackendSettings::Local(LocalSettings {
                root: root.to_path_buf(),
                base_url: "http://localhost/files".to_string(),
            }))
        }

        #[tokio::test]
        async fn test_same_config_shares_instance() {
            let dir = tempfile::tempdir().unwrap();
            let factory = StorageFactory::new();

            let a = factory.get_or_create(&config(dir.path())).await.unwrap();
            let b = factory.get_or_create(&config(dir.path())).await.unwrap();
            assert!(Arc::ptr_eq(&a, &b));
            assert_eq!(factory.len(), 1);
        }

        #[tokio::test]
        async fn test_clear_cache_builds_fresh_instance() {
            let dir = tempfile::tempdir().unwrap();
            let factory = StorageFactory::new();

            let a = factory.get_or_create(&config(dir.path())).await.unwrap();
            factory.clear_cache().unwrap();
            assert!(factory.is_empty());
            let b = factory.get_or_create(&config(dir.path())).await.unwrap();
            assert!(!Arc::ptr_eq(&a, &b));
        }

        #[tokio::test]
        async fn test_distinct_hooks_get_distinct_instances() {
            let dir = tempfile::tempdir().unwrap();
            let factory = StorageFactory::new();
            let hooks = UploadHooks::new().with_file_name(|_, _| Ok("fixed.bin".to_string()));

            let plain = factory.get_or_create(&config(dir.path())).await.unwrap();
            let hooked = factory
                .get_or_create(&config(dir.path()).with_hooks(hooks.clone()))
                .await
                .unwrap();
            let hooked_again = factory
                .get_or_create(&config(dir.path()).with_hooks(hooks))
                .await
                .unwrap();

            assert!(!Arc::ptr_eq(&plain, &hooked));
            assert!(Arc::ptr_eq(&hooked, &hooked_again));
        }

        #[tokio::test]
        async fn test_invalid_settings_are_rejected() {
            let factory = StorageFactory::new();
            let config = BackendConfig::new(BackendSettings::Local(LocalSettings {
                root: std::path::PathBuf::from("/tmp/x"),
                base_url: "not a url".to_string(),
            }));
            assert!(matches!(
                factory.get_or_create(&config).await,
                Err(StorageError::Config(_))
            ));
            assert!(factory.is_empty());
        }
    }
}
