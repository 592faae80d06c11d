//! Helpers shared by the `object_store` backed adapters.

use crate::keys::{file_name_of, require_key};
use crate::traits::{StorageError, StorageResult, UploadedFile};
use crate::StorageBackend;
use bytes::Bytes;
use object_store::path::Path;
use object_store::{Attribute, Attributes, Error as ObjectStoreError};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// RFC 5987 `attr-char` minus the alphanumerics, which stay unescaped.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Normalize a key and convert it to an object path.
pub(crate) fn object_path(key: &str) -> StorageResult<(String, Path)> {
    let key = require_key(key)?;
    let path = Path::parse(&key).map_err(|e| StorageError::InvalidKey(e.to_string()))?;
    Ok((key, path))
}

/// `Content-Disposition` carrying both an ASCII fallback and the UTF-8 name.
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = utf8_percent_encode(file_name, ATTR_CHAR);
    format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

/// Object attributes written alongside the payload.
pub(crate) fn upload_attributes(original_name: &str, mime_type: Option<&str>) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(mime_type) = mime_type {
        attributes.insert(Attribute::ContentType, mime_type.to_string().into());
    }
    attributes.insert(
        Attribute::ContentDisposition,
        content_disposition(original_name).into(),
    );
    attributes
}

/// Translate an `object_store` failure, logging anything but a missing object.
pub(crate) fn map_store_error(
    backend: StorageBackend,
    key: &str,
    operation: &str,
    e: ObjectStoreError,
) -> StorageError {
    match e {
        ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
        other => {
            tracing::error!(
                error = %other,
                backend = %backend,
                key = %key,
                operation = operation,
                "Object storage operation failed"
            );
            StorageError::Backend {
                backend,
                key: key.to_string(),
                source: Box::new(other),
            }
        }
    }
}

pub(crate) struct RecordParts {
    pub key: String,
    pub path: Path,
    pub size: u64,
    pub url: String,
    pub original_name: Option<String>,
    pub mime_type: Option<String>,
    pub buffer: Option<Bytes>,
}

pub(crate) fn build_record(parts: RecordParts) -> UploadedFile {
    let file_name = file_name_of(&parts.key).to_string();
    UploadedFile {
        original_name: parts.original_name.unwrap_or_else(|| file_name.clone()),
        file_name,
        size: parts.size,
        mime_type: parts.mime_type,
        url: parts.url,
        full_path: parts.path.to_string(),
        key: parts.key,
        buffer: parts.buffer,
    }
}
