use crate::keys::{file_name_of, is_absolute_url, join_url, KeyCodec};
use crate::naming::UploadHooks;
use crate::traits::{PathStorage, PutFileOptions, Storage, StorageError, StorageResult, UploadedFile};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    codec: KeyCodec,
    base_url: String,
    hooks: UploadHooks,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `root` - Root directory for file storage (e.g., "/var/lib/stowage/uploads")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:3000/uploads")
    pub async fn new(root: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let root = root.into();

        fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::io(&root, e))?;

        let root = fs::canonicalize(&root)
            .await
            .map_err(|e| StorageError::io(&root, e))?;

        Ok(LocalStorage {
            codec: KeyCodec::new(root),
            base_url,
            hooks: UploadHooks::default(),
        })
    }

    pub fn with_hooks(mut self, hooks: UploadHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn root(&self) -> &Path {
        self.codec.root()
    }

    /// Key for a path under the root (the inverse of [`PathStorage::path`])
    pub fn key_for(&self, path: impl AsRef<Path>) -> String {
        self.codec.to_key(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(parent, e))?;
        }
        Ok(())
    }

    /// Log unexpected filesystem failures and convert them.
    fn io_error(&self, path: &Path, e: std::io::Error) -> StorageError {
        tracing::error!(
            error = %e,
            path = %path.display(),
            "Local storage IO error"
        );
        StorageError::io(path, e)
    }

    fn not_found_or_io(&self, key: &str, path: &Path, e: std::io::Error) -> StorageError {
        if is_missing(&e) {
            StorageError::NotFound(key.to_string())
        } else {
            self.io_error(path, e)
        }
    }

    async fn record(
        &self,
        key: String,
        path: &Path,
        original_name: String,
        mime_type: Option<String>,
        buffer: Option<Bytes>,
    ) -> StorageResult<UploadedFile> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| self.io_error(path, e))?;

        Ok(UploadedFile {
            file_name: file_name_of(&key).to_string(),
            original_name,
            size: meta.len(),
            mime_type,
            url: self.get_url(&key),
            full_path: path.display().to_string(),
            key,
            buffer,
        })
    }
}

/// A missing entry, or a path whose parent segment is a regular file.
fn is_missing(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put_file(
        &self,
        data: Vec<u8>,
        key: &str,
        options: PutFileOptions,
    ) -> StorageResult<UploadedFile> {
        let path = self.codec.resolve(key)?;
        let key = self.codec.to_key(&path);
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&path).await?;

        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| self.io_error(&path, e))?;

        file.write_all(&data)
            .await
            .map_err(|e| self.io_error(&path, e))?;

        file.sync_all()
            .await
            .map_err(|e| self.io_error(&path, e))?;

        let original_name = options
            .original_name
            .unwrap_or_else(|| file_name_of(&key).to_string());
        let buffer = options.keep_buffer.then(|| Bytes::from(data));
        let record = self
            .record(key, &path, original_name, options.mime_type, buffer)
            .await?;

        tracing::info!(
            path = %path.display(),
            key = %record.key,
            size_bytes = record.size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(record)
    }

    async fn get_file(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.codec.resolve(key)?;
        let start = std::time::Instant::now();

        let data = fs::read(&path)
            .await
            .map_err(|e| self.not_found_or_io(key, &path, e))?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(data)
    }

    async fn delete_file(&self, key: &str) -> StorageResult<()> {
        let path = self.codec.resolve(key)?;
        let start = std::time::Instant::now();

        fs::remove_file(&path)
            .await
            .map_err(|e| self.not_found_or_io(key, &path, e))?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn copy_file(&self, from_key: &str, to_key: &str) -> StorageResult<UploadedFile> {
        let from_path = self.codec.resolve(from_key)?;
        let to_path = self.codec.resolve(to_key)?;
        let start = std::time::Instant::now();

        let data = fs::read(&from_path)
            .await
            .map_err(|e| self.not_found_or_io(from_key, &from_path, e))?;

        self.ensure_parent_dir(&to_path).await?;

        fs::write(&to_path, &data)
            .await
            .map_err(|e| self.io_error(&to_path, e))?;

        let to_key = self.codec.to_key(&to_path);
        let original_name = file_name_of(from_key).to_string();
        let record = self
            .record(to_key, &to_path, original_name, None, None)
            .await?;

        tracing::info!(
            from_key = %from_key,
            to_key = %record.key,
            from_path = %from_path.display(),
            to_path = %to_path.display(),
            size_bytes = record.size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage copy successful"
        );

        Ok(record)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.codec.resolve(key)?;
        match fs::try_exists(&path).await {
            Ok(found) => Ok(found),
            Err(e) if is_missing(&e) => Ok(false),
            Err(e) => Err(self.io_error(&path, e)),
        }
    }

    fn get_url(&self, key: &str) -> String {
        if is_absolute_url(key) {
            return key.to_string();
        }
        join_url(&self.base_url, key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn hooks(&self) -> &UploadHooks {
        &self.hooks
    }

    fn as_path_storage(&self) -> Option<&dyn PathStorage> {
        Some(self)
    }
}

impl PathStorage for LocalStorage {
    fn path(&self, key: &str) -> StorageResult<PathBuf> {
        self.codec.resolve(key)
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn storage(dir: &Path) -> LocalStorage {
        LocalStorage::new(dir, "http://localhost:3000/uploads/".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_local_storage_put_get_delete() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let data = b"test data".to_vec();

        let record = storage
            .put_file(data.clone(), "a/b/c.txt", PutFileOptions::new().mime_type("text/plain"))
            .await
            .unwrap();

        assert_eq!(record.key, "a/b/c.txt");
        assert_eq!(record.file_name, "c.txt");
        assert_eq!(record.original_name, "c.txt");
        assert_eq!(record.size, data.len() as u64);
        assert_eq!(record.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(record.url, "http://localhost:3000/uploads/a/b/c.txt");
        assert!(record.buffer.is_none());

        assert_eq!(storage.get_file("a/b/c.txt").await.unwrap(), data);

        storage.delete_file("a/b/c.txt").await.unwrap();
        let result = storage.get_file("a/b/c.txt").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_put_normalizes_key() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let record = storage
            .put_file(b"x".to_vec(), "/a//b\\c.txt", PutFileOptions::new().keep_buffer(true))
            .await
            .unwrap();

        assert_eq!(record.key, "a/b/c.txt");
        assert_eq!(record.buffer.as_deref(), Some(&b"x"[..]));
        assert!(storage.root().join("a").join("b").join("c.txt").exists());
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let result = storage.get_file("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete_file("").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.put_file(b"x".to_vec(), "/", PutFileOptions::new()).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let result = storage.delete_file("nonexistent/file.txt").await;
        assert!(matches!(result, Err(StorageError::NotFound(ref k)) if k == "nonexistent/file.txt"));
    }

    #[tokio::test]
    async fn test_local_storage_exists() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        storage
            .put_file(b"test".to_vec(), "exists.txt", PutFileOptions::new())
            .await
            .unwrap();

        assert!(storage.exists("exists.txt").await.unwrap());
        assert!(!storage.exists("nonexistent.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_storage_copy() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let data = b"original content".to_vec();

        storage
            .put_file(data.clone(), "src.txt", PutFileOptions::new())
            .await
            .unwrap();

        let record = storage.copy_file("src.txt", "nested/dst.txt").await.unwrap();

        assert_eq!(record.key, "nested/dst.txt");
        assert_eq!(record.size, data.len() as u64);
        assert_eq!(record.original_name, "src.txt");
        assert_eq!(storage.get_file("nested/dst.txt").await.unwrap(), data);
        assert_eq!(storage.get_file("src.txt").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_copy_missing_source() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let result = storage.copy_file("missing.txt", "dst.txt").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert!(!storage.exists("dst.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_root_under_regular_file_is_io_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let result = LocalStorage::new(blocker.join("root"), "http://h".to_string()).await;
        assert!(matches!(result, Err(StorageError::Io { ref path, .. }) if path.ends_with("root")));
    }

    #[tokio::test]
    async fn test_get_url() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        assert_eq!(storage.get_url("/a/b.txt"), "http://localhost:3000/uploads/a/b.txt");
        assert_eq!(
            storage.get_url("https://cdn.example.com/a/b.txt"),
            "https://cdn.example.com/a/b.txt"
        );
    }

    #[tokio::test]
    async fn test_path_capability() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let paths = storage.as_path_storage().expect("local storage resolves paths");
        let path = paths.path("x/y.bin").unwrap();
        assert_eq!(path, storage.root().join("x").join("y.bin"));
        assert_eq!(storage.key_for(&path), "x/y.bin");
        assert!(storage.as_signed_url().is_none());
    }
}
