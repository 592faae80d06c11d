//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement,
//! the optional capability traits some backends add on top of it, and the
//! error type shared by every backend.

use crate::naming::UploadHooks;
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{backend} backend error for '{key}': {source}")]
    Backend {
        backend: StorageBackend,
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("Storage backend '{backend}' is not available: enable the '{feature}' feature ({package})")]
    MissingDependency {
        backend: StorageBackend,
        feature: &'static str,
        package: &'static str,
    },

    #[error("Unsupported storage backend: {0}")]
    UnsupportedBackend(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage options are already initialized")]
    AlreadyInitialized,
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Metadata describing a stored file, returned by every write and copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedFile {
    /// Leaf name, derived from the key
    pub file_name: String,
    /// Name supplied by the caller before any renaming
    pub original_name: String,
    /// Size in bytes as reported by the backend
    pub size: u64,
    pub mime_type: Option<String>,
    pub key: String,
    pub url: String,
    /// Backend-internal locator: filesystem path or object path
    pub full_path: String,
    #[serde(skip)]
    pub buffer: Option<Bytes>,
}

/// Per-call options for [`Storage::put_file`]
#[derive(Debug, Clone, Default)]
pub struct PutFileOptions {
    /// Name before renaming; defaults to the leaf of the key
    pub original_name: Option<String>,
    /// Content type hint, stored as-is
    pub mime_type: Option<String>,
    /// Return the written bytes in [`UploadedFile::buffer`]
    pub keep_buffer: bool,
}

impl PutFileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = Some(name.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn keep_buffer(mut self, keep: bool) -> Self {
        self.keep_buffer = keep;
        self
    }
}

/// Default validity of a signed URL
pub const DEFAULT_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// Maximum signed URL validity (7 days, the S3 limit)
pub const MAX_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignedProtocol {
    #[default]
    Https,
    HttpsAndHttp,
}

/// Caller overrides for signed URL generation
#[derive(Debug, Clone, Default)]
pub struct SignedUrlOptions {
    pub expires_in: Option<Duration>,
    /// Start of the validity window; backends that support it default to "now"
    pub starts_on: Option<DateTime<Utc>>,
    /// Backend permission string (e.g. "r" for Azure read-only)
    pub permissions: Option<String>,
    pub protocol: Option<SignedProtocol>,
}

impl SignedUrlOptions {
    pub fn expires_in(expires_in: Duration) -> Self {
        Self {
            expires_in: Some(expires_in),
            ..Self::default()
        }
    }

    /// Resolve the requested expiry, rejecting zero and anything above the maximum.
    pub fn validated_expiry(&self) -> StorageResult<Duration> {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_SIGNED_URL_EXPIRY);
        if expires_in.is_zero() {
            return Err(StorageError::Validation(
                "Signed URL expiry must be greater than zero".to_string(),
            ));
        }
        if expires_in > MAX_SIGNED_URL_EXPIRY {
            return Err(StorageError::Validation(format!(
                "Signed URL expiry {:?} exceeds maximum allowed {:?}",
                expires_in, MAX_SIGNED_URL_EXPIRY
            )));
        }
        Ok(expires_in)
    }
}

/// Storage abstraction trait
///
/// All storage backends (local filesystem, S3, Azure) implement this trait so
/// that calling code can stay backend agnostic.
///
/// **Key format:** keys are forward-slash separated segments without a leading
/// slash, e.g. `2024/01/31/3f2a...-report.pdf`. See the crate root documentation.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` under `key` and describe the stored file.
    async fn put_file(
        &self,
        data: Vec<u8>,
        key: &str,
        options: PutFileOptions,
    ) -> StorageResult<UploadedFile>;

    /// Read a file by its key
    async fn get_file(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete a file by its key
    async fn delete_file(&self, key: &str) -> StorageResult<()>;

    /// Copy a file to a new key, leaving the source in place
    async fn copy_file(&self, from_key: &str, to_key: &str) -> StorageResult<UploadedFile>;

    /// Check if a file exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Public URL of the file stored under `key`
    fn get_url(&self, key: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Naming, placement and post-write hooks configured for this backend
    fn hooks(&self) -> &UploadHooks;

    /// Signed URL capability, if the backend has one
    fn as_signed_url(&self) -> Option<&dyn SignedUrlStorage> {
        None
    }

    /// Filesystem path capability, if the backend has one
    fn as_path_storage(&self) -> Option<&dyn PathStorage> {
        None
    }
}

/// Backends that can hand out time-limited URLs for private files
#[async_trait]
pub trait SignedUrlStorage: Send + Sync {
    async fn get_signed_url(&self, key: &str, options: SignedUrlOptions) -> StorageResult<String>;
}

/// Backends whose files live at a resolvable filesystem path
pub trait PathStorage: Send + Sync {
    fn path(&self, key: &str) -> StorageResult<PathBuf>;
}
