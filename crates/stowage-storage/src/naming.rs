//! File naming and placement strategy.
//!
//! Every incoming file gets a generated leaf name and a destination directory.
//! The defaults are `{uuid}-{original name}` placed under `YYYY/MM/DD`; both can
//! be replaced per backend configuration. Overrides may reject a file by
//! returning [`StorageError::Validation`], which aborts the upload before any
//! byte reaches the backend.

use crate::keys::file_name_of;
use crate::traits::{StorageError, StorageResult, UploadedFile};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A file received from the upload layer, before it is stored.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

impl IncomingFile {
    pub fn new(original_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            original_name: original_name.into(),
            mime_type: None,
            data,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Lowercased extension of the original name, if any
    pub fn extension(&self) -> Option<String> {
        let leaf = file_name_of(&self.original_name);
        leaf.rsplit_once('.')
            .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
            .map(|(_, ext)| ext.to_lowercase())
    }
}

/// Request-scoped values handed to naming and placement overrides
/// (tenant, user id, route parameters, ...).
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    values: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

pub type FileNameFn =
    Arc<dyn Fn(&IncomingFile, Option<&RequestContext>) -> StorageResult<String> + Send + Sync>;
pub type FileDistFn =
    Arc<dyn Fn(&IncomingFile, Option<&RequestContext>) -> StorageResult<String> + Send + Sync>;
pub type TransformFn = Arc<dyn Fn(UploadedFile) -> UploadedFile + Send + Sync>;

/// Naming, placement and post-write overrides for one backend.
#[derive(Clone, Default)]
pub struct UploadHooks {
    file_name: Option<FileNameFn>,
    file_dist: Option<FileDistFn>,
    transform: Option<TransformFn>,
}

impl UploadHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file_name<F>(mut self, f: F) -> Self
    where
        F: Fn(&IncomingFile, Option<&RequestContext>) -> StorageResult<String> + Send + Sync + 'static,
    {
        self.file_name = Some(Arc::new(f));
        self
    }

    pub fn with_file_dist<F>(mut self, f: F) -> Self
    where
        F: Fn(&IncomingFile, Option<&RequestContext>) -> StorageResult<String> + Send + Sync + 'static,
    {
        self.file_dist = Some(Arc::new(f));
        self
    }

    pub fn with_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(UploadedFile) -> UploadedFile + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    /// Generated leaf name for `file`
    pub fn file_name(
        &self,
        file: &IncomingFile,
        ctx: Option<&RequestContext>,
    ) -> StorageResult<String> {
        let name = match self.file_name {
            Some(ref f) => f(file, ctx)?,
            None => default_file_name(file),
        };
        if file_name_of(&name).is_empty() {
            return Err(StorageError::Validation(
                "generated file name is empty".to_string(),
            ));
        }
        Ok(name)
    }

    /// Destination directory for `file`
    pub fn file_dist(
        &self,
        file: &IncomingFile,
        ctx: Option<&RequestContext>,
    ) -> StorageResult<String> {
        match self.file_dist {
            Some(ref f) => f(file, ctx),
            None => Ok(default_file_dist(Utc::now())),
        }
    }

    pub fn transform(&self, record: UploadedFile) -> UploadedFile {
        match self.transform {
            Some(ref f) => f(record),
            None => record,
        }
    }

    /// These hooks with every closure set in `overrides` taking precedence.
    pub fn overridden_by(&self, overrides: &UploadHooks) -> UploadHooks {
        UploadHooks {
            file_name: overrides.file_name.clone().or_else(|| self.file_name.clone()),
            file_dist: overrides.file_dist.clone().or_else(|| self.file_dist.clone()),
            transform: overrides.transform.clone().or_else(|| self.transform.clone()),
        }
    }

    /// Pointer identity of the configured closures.
    ///
    /// Two hook sets built from the same `Arc`s compare equal; closures
    /// themselves cannot be compared or serialized.
    pub fn identity(&self) -> [usize; 3] {
        fn addr<T: ?Sized>(f: &Option<Arc<T>>) -> usize {
            f.as_ref()
                .map(|f| Arc::as_ptr(f).cast::<()>() as usize)
                .unwrap_or(0)
        }
        [
            addr(&self.file_name),
            addr(&self.file_dist),
            addr(&self.transform),
        ]
    }
}

impl fmt::Debug for UploadHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadHooks")
            .field("file_name", &self.file_name.is_some())
            .field("file_dist", &self.file_dist.is_some())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// `{uuid}-{leaf of original name}`
pub fn default_file_name(file: &IncomingFile) -> String {
    let original = file_name_of(&file.original_name);
    if original.is_empty() {
        Uuid::new_v4().simple().to_string()
    } else {
        format!("{}-{}", Uuid::new_v4().simple(), original)
    }
}

/// `YYYY/MM/DD` for the given instant
pub fn default_file_dist(now: DateTime<Utc>) -> String {
    now.format("%Y/%m/%d").to_string()
}
