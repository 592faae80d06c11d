use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// This enum is the selector that chooses which adapter serves a request.
/// It lives in core because both configuration and the adapters use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
    Azure,
}

impl StorageBackend {
    pub const ALL: [StorageBackend; 3] = [
        StorageBackend::Local,
        StorageBackend::S3,
        StorageBackend::Azure,
    ];
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "fs" => Ok(StorageBackend::Local),
            "s3" | "objectstore" => Ok(StorageBackend::S3),
            "azure" | "blobstore" => Ok(StorageBackend::Azure),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Azure => write!(f, "azure"),
        }
    }
}
