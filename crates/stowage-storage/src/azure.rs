//! Azure Blob Storage backend.
//!
//! Data I/O goes through `object_store`'s Azure client scoped to one
//! container. Signed URLs are service SAS tokens computed locally from the
//! shared account key, so signing never touches the network.

use crate::keys::{file_name_of, is_absolute_url, join_url, normalize_key};
use crate::naming::UploadHooks;
use crate::remote::{build_record, map_store_error, object_path, upload_attributes, RecordParts};
use crate::traits::{
    PutFileOptions, SignedProtocol, SignedUrlOptions, SignedUrlStorage, Storage, StorageError,
    StorageResult, UploadedFile,
};
use crate::StorageBackend;
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use object_store::azure::MicrosoftAzureBuilder;
use object_store::path::Path as ObjectPath;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStore, ObjectStoreExt, PutOptions, PutPayload};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use stowage_core::AzureSettings;

/// Storage service version the SAS string-to-sign layout follows.
const SAS_VERSION: &str = "2022-11-02";
const SAS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const DEFAULT_SAS_PERMISSIONS: &str = "r";
const EMULATOR_ENDPOINT: &str = "http://127.0.0.1:10000";

const DEFAULT_COPY_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_COPY_POLL_ATTEMPTS: u32 = 20;

/// Unreserved characters stay as-is in SAS query values.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Azure Blob Storage implementation
#[derive(Clone)]
pub struct AzureStorage {
    store: Arc<dyn ObjectStore>,
    account: String,
    access_key: String,
    container: String,
    cdn_url: Option<String>,
    use_emulator: bool,
    copy_poll_interval: Duration,
    copy_poll_attempts: u32,
    hooks: UploadHooks,
}

impl AzureStorage {
    /// Create a new AzureStorage instance scoped to `settings.container`
    pub async fn new(settings: &AzureSettings) -> StorageResult<Self> {
        let mut builder = MicrosoftAzureBuilder::new()
            .with_account(settings.account.clone())
            .with_access_key(settings.access_key.clone())
            .with_container_name(settings.container.clone());

        if settings.use_emulator {
            builder = builder.with_use_emulator(true).with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        tracing::debug!(
            account = %settings.account,
            container = %settings.container,
            "Created Azure blob storage"
        );

        Ok(Self::from_parts(Arc::new(store), settings))
    }

    /// Assemble an adapter around an existing store.
    pub fn from_parts(store: Arc<dyn ObjectStore>, settings: &AzureSettings) -> Self {
        AzureStorage {
            store,
            account: settings.account.clone(),
            access_key: settings.access_key.clone(),
            container: settings.container.clone(),
            cdn_url: settings.cdn_url.clone(),
            use_emulator: settings.use_emulator,
            copy_poll_interval: DEFAULT_COPY_POLL_INTERVAL,
            copy_poll_attempts: DEFAULT_COPY_POLL_ATTEMPTS,
            hooks: UploadHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: UploadHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// How often and how many times a copy destination is polled.
    pub fn with_copy_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.copy_poll_interval = interval;
        self.copy_poll_attempts = attempts.max(1);
        self
    }

    fn store_error(&self, key: &str, operation: &str, e: ObjectStoreError) -> StorageError {
        map_store_error(StorageBackend::Azure, key, operation, e)
    }

    fn container_url(&self) -> String {
        if self.use_emulator {
            format!("{}/{}/{}", EMULATOR_ENDPOINT, self.account, self.container)
        } else {
            format!(
                "https://{}.blob.core.windows.net/{}",
                self.account, self.container
            )
        }
    }

    async fn head_size(&self, key: &str, location: &ObjectPath) -> StorageResult<u64> {
        let meta = self
            .store
            .head(location)
            .await
            .map_err(|e| self.store_error(key, "head", e))?;
        Ok(meta.size as u64)
    }

    /// Poll the copy destination until it is visible.
    ///
    /// Visibility stands in for copy completion: a same-account Copy Blob
    /// finishes synchronously, so the destination only appears once its
    /// content is complete. Cross-account copies would need `x-ms-copy-status`.
    async fn wait_for_copy(&self, key: &str, location: &ObjectPath) -> StorageResult<u64> {
        for attempt in 1..=self.copy_poll_attempts {
            match self.store.head(location).await {
                Ok(meta) => return Ok(meta.size as u64),
                Err(ObjectStoreError::NotFound { .. }) => {
                    tracing::debug!(
                        container = %self.container,
                        key = %key,
                        attempt = attempt,
                        "Azure copy still pending"
                    );
                    tokio::time::sleep(self.copy_poll_interval).await;
                }
                Err(e) => return Err(self.store_error(key, "copy", e)),
            }
        }

        tracing::error!(
            container = %self.container,
            key = %key,
            attempts = self.copy_poll_attempts,
            "Azure copy did not complete"
        );
        Err(StorageError::Backend {
            backend: StorageBackend::Azure,
            key: key.to_string(),
            source: format!(
                "copy did not complete after {} polls",
                self.copy_poll_attempts
            )
            .into(),
        })
    }

    /// Build a service SAS query string for a single blob.
    fn sas_query(&self, key: &str, options: &SignedUrlOptions) -> StorageResult<String> {
        let expires_in = options.validated_expiry()?;
        let start = options.starts_on;
        let expiry = start.unwrap_or_else(Utc::now)
            + chrono::Duration::from_std(expires_in)
                .map_err(|e| StorageError::Validation(format!("Invalid expiry duration: {}", e)))?;

        let permissions = options
            .permissions
            .as_deref()
            .unwrap_or(DEFAULT_SAS_PERMISSIONS);
        let protocol = match options.protocol.unwrap_or_default() {
            SignedProtocol::Https => "https",
            SignedProtocol::HttpsAndHttp => "https,http",
        };
        let start = start.map(format_sas_time).unwrap_or_default();
        let expiry = format_sas_time(expiry);

        let resource = format!("/blob/{}/{}/{}", self.account, self.container, key);
        let string_to_sign = [
            permissions,
            start.as_str(),
            expiry.as_str(),
            resource.as_str(),
            "", // signed identifier
            "", // signed IP
            protocol,
            SAS_VERSION,
            "b",
            "", // snapshot time
            "", // encryption scope
            "", // rscc
            "", // rscd
            "", // rsce
            "", // rscl
            "", // rsct
        ]
        .join("\n");

        let signature = sign(&self.access_key, &string_to_sign)?;

        let mut params = vec![("sv", SAS_VERSION), ("sr", "b"), ("sp", permissions)];
        if !start.is_empty() {
            params.push(("st", start.as_str()));
        }
        params.push(("se", expiry.as_str()));
        params.push(("spr", protocol));
        params.push(("sig", signature.as_str()));

        Ok(params
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, utf8_percent_encode(value, QUERY_VALUE)))
            .collect::<Vec<_>>()
            .join("&"))
    }
}

fn format_sas_time(time: DateTime<Utc>) -> String {
    time.format(SAS_TIME_FORMAT).to_string()
}

/// HMAC-SHA256 over `string_to_sign` with the base64 account key.
fn sign(access_key: &str, string_to_sign: &str) -> StorageResult<String> {
    let engine = base64::engine::general_purpose::STANDARD;
    let key = engine
        .decode(access_key)
        .map_err(|e| StorageError::Config(format!("Azure access key is not valid base64: {}", e)))?;
    let mut mac = Hmac::<Sha256>::new_from_slice(&key)
        .map_err(|e| StorageError::Config(format!("Invalid Azure access key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(engine.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl Storage for AzureStorage {
    async fn put_file(
        &self,
        data: Vec<u8>,
        key: &str,
        options: PutFileOptions,
    ) -> StorageResult<UploadedFile> {
        let (key, location) = object_path(key)?;
        let original_name = options
            .original_name
            .unwrap_or_else(|| file_name_of(&key).to_string());
        let bytes = Bytes::from(data);
        let start = std::time::Instant::now();

        let put_options = PutOptions {
            attributes: upload_attributes(&original_name, options.mime_type.as_deref()),
            ..Default::default()
        };

        self.store
            .put_opts(&location, PutPayload::from(bytes.clone()), put_options)
            .await
            .map_err(|e| self.store_error(&key, "put", e))?;

        let size = self.head_size(&key, &location).await?;

        tracing::info!(
            container = %self.container,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Azure upload successful"
        );

        Ok(build_record(RecordParts {
            url: self.get_url(&key),
            key,
            path: location,
            size,
            original_name: Some(original_name),
            mime_type: options.mime_type,
            buffer: options.keep_buffer.then_some(bytes),
        }))
    }

    async fn get_file(&self, key: &str) -> StorageResult<Vec<u8>> {
        let (key, location) = object_path(key)?;
        let start = std::time::Instant::now();

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| self.store_error(&key, "get", e))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| self.store_error(&key, "get", e))?;

        tracing::info!(
            container = %self.container,
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Azure download successful"
        );

        Ok(bytes.to_vec())
    }

    async fn delete_file(&self, key: &str) -> StorageResult<()> {
        let (key, location) = object_path(key)?;
        let start = std::time::Instant::now();

        self.store
            .delete(&location)
            .await
            .map_err(|e| self.store_error(&key, "delete", e))?;

        tracing::info!(
            container = %self.container,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Azure delete successful"
        );

        Ok(())
    }

    async fn copy_file(&self, from_key: &str, to_key: &str) -> StorageResult<UploadedFile> {
        let (from_key, from) = object_path(from_key)?;
        let (to_key, to) = object_path(to_key)?;
        let start = std::time::Instant::now();

        self.store
            .copy(&from, &to)
            .await
            .map_err(|e| self.store_error(&from_key, "copy", e))?;

        let size = self.wait_for_copy(&to_key, &to).await?;

        tracing::info!(
            container = %self.container,
            from_key = %from_key,
            to_key = %to_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Azure copy successful"
        );

        Ok(build_record(RecordParts {
            url: self.get_url(&to_key),
            original_name: Some(file_name_of(&from_key).to_string()),
            key: to_key,
            path: to,
            size,
            mime_type: None,
            buffer: None,
        }))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let (key, location) = object_path(key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(self.store_error(&key, "head", e)),
        }
    }

    fn get_url(&self, key: &str) -> String {
        if is_absolute_url(key) {
            return key.to_string();
        }
        let key = normalize_key(key);
        match self.cdn_url {
            Some(ref cdn) => join_url(cdn, &key),
            None => join_url(&self.container_url(), &key),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Azure
    }

    fn hooks(&self) -> &UploadHooks {
        &self.hooks
    }

    fn as_signed_url(&self) -> Option<&dyn SignedUrlStorage> {
        Some(self)
    }
}

#[async_trait]
impl SignedUrlStorage for AzureStorage {
    /// CDN-fronted containers get the CDN URL; everything else a read-only SAS.
    async fn get_signed_url(&self, key: &str, options: SignedUrlOptions) -> StorageResult<String> {
        let (key, _) = object_path(key)?;

        if let Some(ref cdn) = self.cdn_url {
            return Ok(join_url(cdn, &key));
        }

        let query = self.sas_query(&key, &options)?;

        tracing::debug!(
            container = %self.container,
            key = %key,
            "Azure SAS URL generated"
        );

        Ok(format!("{}?{}", join_url(&self.container_url(), &key), query))
    }
}
