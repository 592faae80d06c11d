//! Stowage Storage Library
//!
//! This crate provides the storage abstraction and its backends: the local
//! filesystem, S3-compatible object stores and Azure Blob Storage. Each remote
//! backend sits behind a cargo feature; a backend that was compiled out is
//! reported as [`StorageError::MissingDependency`] when it is requested.
//!
//! # Storage key format
//!
//! All backends use the same key layout:
//!
//! - `{placement}/{file name}`, e.g. `2024/01/31/3f2a...-report.pdf`
//! - segments are separated by `/`, never `\`
//! - no leading `/`, no empty, `.` or `..` segments
//!
//! Placement and naming are decided by [`UploadHooks`]; the defaults place
//! files under the current UTC date and prefix the original name with a UUID.

#[cfg(feature = "storage-azure")]
pub mod azure;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod naming;
pub mod registry;
#[cfg(any(feature = "storage-s3", feature = "storage-azure"))]
mod remote;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;
pub mod upload;

// Re-export commonly used types
#[cfg(feature = "storage-azure")]
pub use azure::AzureStorage;
pub use factory::{create_storage, parse_backend, BackendConfig, StorageFactory};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use naming::{IncomingFile, RequestContext, UploadHooks};
pub use registry::{StorageOptions, StorageProvider, StorageRegistry};
#[cfg(any(feature = "storage-s3", feature = "storage-azure"))]
pub use remote::content_disposition;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use stowage_core::StorageBackend;
pub use traits::{
    PathStorage, PutFileOptions, SignedProtocol, SignedUrlOptions, SignedUrlStorage, Storage,
    StorageError, StorageResult, UploadedFile,
};
pub use upload::{store_file, store_file_with};
