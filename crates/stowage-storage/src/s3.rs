use crate::keys::{encode_key_path, file_name_of, is_absolute_url, join_url, normalize_key};
use crate::naming::UploadHooks;
use crate::remote::{build_record, map_store_error, object_path, upload_attributes, RecordParts};
use crate::traits::{
    PutFileOptions, SignedUrlOptions, SignedUrlStorage, Storage, StorageError, StorageResult,
    UploadedFile,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::aws::AmazonS3Builder;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStore, ObjectStoreExt, PutOptions, PutPayload};
use std::sync::Arc;
use stowage_core::S3Settings;

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
    cdn_url: Option<String>,
    hooks: UploadHooks,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// Credentials not present in `settings` are taken from the standard AWS
    /// environment variables. A custom `endpoint` targets S3-compatible
    /// providers (e.g. "http://localhost:9000" for MinIO).
    pub async fn new(settings: &S3Settings) -> StorageResult<Self> {
        // Build AmazonS3 object store from environment and explicit settings.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(settings.region.clone())
            .with_bucket_name(settings.bucket.clone());

        if let (Some(ref key_id), Some(ref secret)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            builder = builder
                .with_access_key_id(key_id.clone())
                .with_secret_access_key(secret.clone());
        }

        if let Some(ref token) = settings.session_token {
            builder = builder.with_token(token.clone());
        }

        if let Some(ref endpoint) = settings.endpoint {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;
        let store = Arc::new(store);
        let signer: Arc<dyn Signer> = store.clone();

        Ok(Self::from_parts(store, Some(signer), settings))
    }

    /// Assemble an adapter around an existing store and optional URL signer.
    pub fn from_parts(
        store: Arc<dyn ObjectStore>,
        signer: Option<Arc<dyn Signer>>,
        settings: &S3Settings,
    ) -> Self {
        S3Storage {
            store,
            signer,
            bucket: settings.bucket.clone(),
            region: settings.region.clone(),
            endpoint_url: settings.endpoint.clone(),
            cdn_url: settings.cdn_url.clone(),
            hooks: UploadHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: UploadHooks) -> Self {
        self.hooks = hooks;
        self
    }

    fn store_error(&self, key: &str, operation: &str, e: ObjectStoreError) -> StorageError {
        map_store_error(StorageBackend::S3, key, operation, e)
    }

    /// Fetch the authoritative size; write responses do not carry it.
    async fn head_size(&self, key: &str, location: &object_store::path::Path) -> StorageResult<u64> {
        let meta = self
            .store
            .head(location)
            .await
            .map_err(|e| self.store_error(key, "head", e))?;
        Ok(meta.size as u64)
    }
}

#[async_trait]
impl Storage for S3Storage {
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
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
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
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
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
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
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

        let size = self.head_size(&to_key, &to).await?;

        tracing::info!(
            bucket = %self.bucket,
            from_key = %from_key,
            to_key = %to_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 copy successful"
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

    /// Public URL for an S3 object
    ///
    /// A configured CDN wins. For S3-compatible providers the path-style URL
    /// `{endpoint}/{bucket}/{key}` is used; otherwise the AWS virtual-hosted
    /// form `https://{bucket}.s3.{region}.amazonaws.com/{key}`.
    fn get_url(&self, key: &str) -> String {
        if is_absolute_url(key) {
            return key.to_string();
        }
        let key = normalize_key(key);

        if let Some(ref cdn) = self.cdn_url {
            join_url(cdn, &key)
        } else if let Some(ref endpoint) = self.endpoint_url {
            join_url(&join_url(endpoint, &self.bucket), &key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket,
                self.region,
                encode_key_path(&key)
            )
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }

    fn hooks(&self) -> &UploadHooks {
        &self.hooks
    }

    fn as_signed_url(&self) -> Option<&dyn SignedUrlStorage> {
        Some(self)
    }
}

#[async_trait]
impl SignedUrlStorage for S3Storage {
    async fn get_signed_url(&self, key: &str, options: SignedUrlOptions) -> StorageResult<String> {
        let (key, location) = object_path(key)?;
        let expires_in = options.validated_expiry()?;

        let signer = self.signer.as_ref().ok_or_else(|| {
            StorageError::Config("S3 storage was built without a URL signer".to_string())
        })?;

        let url = signer
            .signed_url(Method::GET, &location, expires_in)
            .await
            .map_err(|e| self.store_error(&key, "sign", e))?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            expires_in_secs = expires_in.as_secs(),
            "S3 signed URL generated"
        );

        Ok(url.to_string())
    }
}
