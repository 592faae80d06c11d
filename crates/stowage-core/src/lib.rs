//! Stowage Core Library
//!
//! This crate provides the backend selector and the configuration types shared
//! by the storage adapters and the command-line front end.

pub mod config;
pub mod storage_types;

// Re-export commonly used types
pub use config::{AzureSettings, BackendSettings, LocalSettings, S3Settings, StorageConfig};
pub use storage_types::StorageBackend;
