//! Storage options and backend resolution
//!
//! A [`StorageRegistry`] owns one set of [`StorageOptions`] and resolves a
//! backend selector to a shared adapter instance. Applications that want a
//! single process-wide registry can install one with [`set_options`].

use crate::factory::{parse_backend, BackendConfig, StorageFactory};
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, OnceLock};
use stowage_core::StorageConfig;

/// Builds adapters for custom storage options.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn create(
        &self,
        backend: Option<StorageBackend>,
        options: &serde_json::Value,
    ) -> StorageResult<Arc<dyn Storage>>;
}

/// Either a declarative backend list or a caller-supplied provider.
#[derive(Clone)]
pub enum StorageOptions {
    Declarative {
        default_backend: Option<StorageBackend>,
        backends: Vec<BackendConfig>,
    },
    Custom {
        provider: Arc<dyn StorageProvider>,
        options: serde_json::Value,
    },
}

impl StorageOptions {
    /// Declarative options for every backend in `config`, without hooks.
    pub fn from_config(config: StorageConfig) -> Self {
        StorageOptions::Declarative {
            default_backend: config.default_backend,
            backends: config.backends.into_iter().map(BackendConfig::new).collect(),
        }
    }

    pub fn default_backend(&self) -> Option<StorageBackend> {
        match self {
            StorageOptions::Declarative {
                default_backend, ..
            } => *default_backend,
            StorageOptions::Custom { .. } => None,
        }
    }
}

impl fmt::Debug for StorageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageOptions::Declarative {
                default_backend,
                backends,
            } => f
                .debug_struct("Declarative")
                .field("default_backend", default_backend)
                .field("backends", backends)
                .finish(),
            StorageOptions::Custom { options, .. } => f
                .debug_struct("Custom")
                .field("options", options)
                .finish_non_exhaustive(),
        }
    }
}

/// Resolves backend selectors against one set of options.
pub struct StorageRegistry {
    options: StorageOptions,
    factory: StorageFactory,
}

impl StorageRegistry {
    pub fn new(options: StorageOptions) -> Self {
        StorageRegistry {
            options,
            factory: StorageFactory::new(),
        }
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn factory(&self) -> &StorageFactory {
        &self.factory
    }

    /// Resolve `backend`, falling back to the configured default.
    pub async fn get_storage(
        &self,
        backend: Option<StorageBackend>,
    ) -> StorageResult<Arc<dyn Storage>> {
        match self.options {
            StorageOptions::Declarative {
                default_backend,
                ref backends,
            } => {
                let backend = backend.or(default_backend).ok_or_else(|| {
                    StorageError::Config(
                        "No storage backend requested and no default configured".to_string(),
                    )
                })?;
                let config = backends
                    .iter()
                    .find(|config| config.backend() == backend)
                    .ok_or_else(|| {
                        StorageError::Config(format!(
                            "Storage backend '{}' is not configured",
                            backend
                        ))
                    })?;
                self.factory.get_or_create(config).await
            }
            StorageOptions::Custom {
                ref provider,
                ref options,
            } => provider.create(backend, options).await,
        }
    }

    /// Resolve a backend by selector string (`local`, `fs`, `s3`, ...).
    pub async fn get_storage_named(&self, name: &str) -> StorageResult<Arc<dyn Storage>> {
        let backend = parse_backend(name)?;
        self.get_storage(Some(backend)).await
    }
}

impl fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("options", &self.options)
            .field("cached", &self.factory.len())
            .finish()
    }
}

static GLOBAL: OnceLock<StorageRegistry> = OnceLock::new();

/// Install process-wide storage options. Succeeds once per process.
pub fn set_options(options: StorageOptions) -> StorageResult<()> {
    GLOBAL
        .set(StorageRegistry::new(options))
        .map_err(|_| StorageError::AlreadyInitialized)
}

pub fn get_options() -> Option<&'static StorageOptions> {
    GLOBAL.get().map(StorageRegistry::options)
}

pub fn global() -> StorageResult<&'static StorageRegistry> {
    GLOBAL
        .get()
        .ok_or_else(|| StorageError::Config("Storage options are not initialized".to_string()))
}

/// Resolve a backend through the process-wide registry.
pub async fn get_storage(backend: Option<StorageBackend>) -> StorageResult<Arc<dyn Storage>> {
    global()?.get_storage(backend).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StorageProvider for CountingProvider {
        async fn create(
            &self,
            backend: Option<StorageBackend>,
            options: &serde_json::Value,
        ) -> StorageResult<Arc<dyn Storage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Validation(format!(
                "{:?} {}",
                backend, options["bucket"]
            )))
        }
    }

    #[tokio::test]
    async fn test_missing_default_is_config_error() {
        let registry = StorageRegistry::new(StorageOptions::Declarative {
            default_backend: None,
            backends: Vec::new(),
        });
        assert!(matches!(
            registry.get_storage(None).await,
            Err(StorageError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_backend_is_config_error() {
        let registry = StorageRegistry::new(StorageOptions::Declarative {
            default_backend: None,
            backends: Vec::new(),
        });
        let err = registry.get_storage(Some(StorageBackend::S3)).await.err().unwrap();
        assert!(err.to_string().contains("'s3' is not configured"));
    }

    #[tokio::test]
    async fn test_unknown_selector() {
        let registry = StorageRegistry::new(StorageOptions::from_config(StorageConfig::default()));
        assert!(matches!(
            registry.get_storage_named("ftp").await,
            Err(StorageError::UnsupportedBackend(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_provider_receives_override_and_options() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let registry = StorageRegistry::new(StorageOptions::Custom {
            provider: provider.clone(),
            options: serde_json::json!({ "bucket": "media" }),
        });

        let err = registry
            .get_storage(Some(StorageBackend::Azure))
            .await
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Validation failed: Some(Azure) \"media\""
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(format!("{:?}", registry.options()).starts_with("Custom"));
    }
}
