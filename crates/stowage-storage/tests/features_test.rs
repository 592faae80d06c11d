//! Backends left out at compile time. The `MissingDependency` cases only
//! compile with a backend disabled, e.g.
//! `cargo test -p stowage-storage --no-default-features --features storage-local`.

use stowage_core::{AzureSettings, BackendSettings, S3Settings};
use stowage_storage::{create_storage, BackendConfig, StorageBackend, StorageError};

#[allow(dead_code)]
fn s3_config() -> BackendConfig {
    BackendConfig::new(BackendSettings::S3(S3Settings {
        bucket: "media".to_string(),
        region: "us-east-1".to_string(),
        access_key_id: None,
        secret_access_key: None,
        session_token: None,
        endpoint: None,
        cdn_url: None,
    }))
}

#[allow(dead_code)]
fn azure_config() -> BackendConfig {
    BackendConfig::new(BackendSettings::Azure(AzureSettings {
        account: "acct".to_string(),
        access_key: "c3Rvd2FnZS10ZXN0LWtleQ==".to_string(),
        container: "files".to_string(),
        cdn_url: None,
        use_emulator: false,
    }))
}

#[cfg(not(feature = "storage-s3"))]
#[tokio::test]
async fn test_s3_compiled_out() {
    let err = create_storage(&s3_config()).await.err().unwrap();
    assert!(matches!(
        err,
        StorageError::MissingDependency {
            backend: StorageBackend::S3,
            package: "object_store/aws",
            ..
        }
    ));
    assert!(err.to_string().contains("storage-s3"));
}

#[cfg(not(feature = "storage-azure"))]
#[tokio::test]
async fn test_azure_compiled_out() {
    let err = create_storage(&azure_config()).await.err().unwrap();
    assert!(matches!(
        err,
        StorageError::MissingDependency {
            backend: StorageBackend::Azure,
            package: "object_store/azure",
            ..
        }
    ));
}

#[cfg(feature = "storage-azure")]
#[tokio::test]
async fn test_azure_builds_without_network() {
    let storage = create_storage(&azure_config()).await.unwrap();
    assert_eq!(storage.backend_type(), StorageBackend::Azure);
    assert!(storage.as_signed_url().is_some());
    assert!(storage.as_path_storage().is_none());
}

#[tokio::test]
async fn test_invalid_settings_fail_before_construction() {
    let mut config = s3_config();
    if let BackendSettings::S3(ref mut s3) = config.settings {
        s3.access_key_id = Some("AKIA".to_string());
    }
    assert!(matches!(
        create_storage(&config).await,
        Err(StorageError::Config(_))
    ));
}
