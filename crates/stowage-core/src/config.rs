//! Configuration module
//!
//! Storage configuration is read either from the environment (optionally via a
//! `.env` file) or from a JSON document. Each backend has its own settings
//! block; the blocks are mutually exclusive and reject fields that belong to
//! another backend.

use std::env;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::storage_types::StorageBackend;

const REDACTED: &str = "***";

/// Filesystem backend settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalSettings {
    /// Root directory for stored files (e.g. "./uploads")
    pub root: PathBuf,
    /// Base URL the root directory is served under (e.g. "http://localhost:3000/uploads")
    pub base_url: String,
}

/// S3-style object storage settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, DigitalOcean Spaces, etc.)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Edge distribution URL used instead of the bucket URL when set
    #[serde(default)]
    pub cdn_url: Option<String>,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| REDACTED),
            )
            .field("session_token", &self.session_token.as_ref().map(|_| REDACTED))
            .field("endpoint", &self.endpoint)
            .field("cdn_url", &self.cdn_url)
            .finish()
    }
}

/// Azure-style blob storage settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureSettings {
    pub account: String,
    /// Base64 encoded shared account key
    pub access_key: String,
    pub container: String,
    /// CDN domain used for public and signed URLs when set
    #[serde(default)]
    pub cdn_url: Option<String>,
    /// Talk to a local Azurite emulator instead of the public endpoint
    #[serde(default)]
    pub use_emulator: bool,
}

impl fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSettings")
            .field("account", &self.account)
            .field("access_key", &REDACTED)
            .field("container", &self.container)
            .field("cdn_url", &self.cdn_url)
            .field("use_emulator", &self.use_emulator)
            .finish()
    }
}

/// Settings for exactly one backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendSettings {
    Local(LocalSettings),
    S3(S3Settings),
    Azure(AzureSettings),
}

impl BackendSettings {
    pub fn backend(&self) -> StorageBackend {
        match self {
            BackendSettings::Local(_) => StorageBackend::Local,
            BackendSettings::S3(_) => StorageBackend::S3,
            BackendSettings::Azure(_) => StorageBackend::Azure,
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self {
            BackendSettings::Local(local) => {
                if local.root.as_os_str().is_empty() {
                    return Err(anyhow::anyhow!("Local storage root must not be empty"));
                }
                require_http_url("Local storage base_url", &local.base_url)?;
            }
            BackendSettings::S3(s3) => {
                require_non_empty("S3 bucket", &s3.bucket)?;
                require_non_empty("S3 region", &s3.region)?;
                if s3.access_key_id.is_some() != s3.secret_access_key.is_some() {
                    return Err(anyhow::anyhow!(
                        "S3 access_key_id and secret_access_key must be set together"
                    ));
                }
                if let Some(ref endpoint) = s3.endpoint {
                    require_http_url("S3 endpoint", endpoint)?;
                }
                if let Some(ref cdn) = s3.cdn_url {
                    require_http_url("S3 cdn_url", cdn)?;
                }
            }
            BackendSettings::Azure(azure) => {
                require_non_empty("Azure account", &azure.account)?;
                require_non_empty("Azure access_key", &azure.access_key)?;
                require_non_empty("Azure container", &azure.container)?;
                if let Some(ref cdn) = azure.cdn_url {
                    require_http_url("Azure cdn_url", cdn)?;
                }
            }
        }
        Ok(())
    }
}

/// Storage configuration: the default selector plus one settings block per configured backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub default_backend: Option<StorageBackend>,
    #[serde(default)]
    pub backends: Vec<BackendSettings>,
}

impl StorageConfig {
    /// Load configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Parse configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, anyhow::Error> {
        let config: StorageConfig = serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("Invalid storage configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// A backend block is only produced when its anchor variable is present
    /// (`LOCAL_STORAGE_PATH`, `S3_BUCKET`, `AZURE_STORAGE_ACCOUNT`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let default_backend = var("STORAGE_BACKEND")
            .map(|s| s.parse::<StorageBackend>())
            .transpose()?;

        let mut backends = Vec::new();

        if let Some(root) = var("LOCAL_STORAGE_PATH") {
            let base_url = var("LOCAL_STORAGE_BASE_URL").ok_or_else(|| {
                anyhow::anyhow!("LOCAL_STORAGE_BASE_URL must be set when LOCAL_STORAGE_PATH is set")
            })?;
            backends.push(BackendSettings::Local(LocalSettings {
                root: PathBuf::from(root),
                base_url,
            }));
        }

        if let Some(bucket) = var("S3_BUCKET") {
            let region = var("S3_REGION")
                .or_else(|| var("AWS_REGION"))
                .ok_or_else(|| anyhow::anyhow!("S3_REGION or AWS_REGION must be set"))?;
            backends.push(BackendSettings::S3(S3Settings {
                bucket,
                region,
                access_key_id: var("AWS_ACCESS_KEY_ID"),
                secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
                session_token: var("AWS_SESSION_TOKEN"),
                endpoint: var("S3_ENDPOINT"),
                cdn_url: var("S3_CDN_URL"),
            }));
        }

        if let Some(account) = var("AZURE_STORAGE_ACCOUNT") {
            backends.push(BackendSettings::Azure(AzureSettings {
                account,
                access_key: var("AZURE_STORAGE_KEY")
                    .ok_or_else(|| anyhow::anyhow!("AZURE_STORAGE_KEY must be set"))?,
                container: var("AZURE_STORAGE_CONTAINER")
                    .ok_or_else(|| anyhow::anyhow!("AZURE_STORAGE_CONTAINER must be set"))?,
                cdn_url: var("AZURE_CDN_URL"),
                use_emulator: var("AZURE_USE_EMULATOR")
                    .map(|v| v.to_lowercase().parse().unwrap_or(false))
                    .unwrap_or(false),
            }));
        }

        let config = StorageConfig {
            default_backend,
            backends,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        for (i, settings) in self.backends.iter().enumerate() {
            settings.validate()?;
            if self.backends[..i]
                .iter()
                .any(|other| other.backend() == settings.backend())
            {
                return Err(anyhow::anyhow!(
                    "Storage backend '{}' is configured more than once",
                    settings.backend()
                ));
            }
        }

        if let Some(backend) = self.default_backend {
            if self.settings_for(backend).is_none() {
                return Err(anyhow::anyhow!(
                    "STORAGE_BACKEND is '{}' but no settings for it are configured",
                    backend
                ));
            }
        }

        Ok(())
    }

    pub fn settings_for(&self, backend: StorageBackend) -> Option<&BackendSettings> {
        self.backends.iter().find(|s| s.backend() == backend)
    }
}

fn require_non_empty(what: &str, value: &str) -> Result<(), anyhow::Error> {
    if value.trim().is_empty() {
        return Err(anyhow::anyhow!("{} must not be empty", what));
    }
    Ok(())
}

fn require_http_url(what: &str, value: &str) -> Result<(), anyhow::Error> {
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(anyhow::anyhow!(
            "{} must be an http(s) URL, got '{}'",
            what,
            value
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn loads_local_backend_from_vars() {
        let config = StorageConfig::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "local"),
            ("LOCAL_STORAGE_PATH", "./up"),
            ("LOCAL_STORAGE_BASE_URL", "http://x/up"),
        ]))
        .unwrap();

        assert_eq!(config.default_backend, Some(StorageBackend::Local));
        assert_eq!(
            config.settings_for(StorageBackend::Local),
            Some(&BackendSettings::Local(LocalSettings {
                root: PathBuf::from("./up"),
                base_url: "http://x/up".to_string(),
            }))
        );
        assert!(config.settings_for(StorageBackend::S3).is_none());
    }

    #[test]
    fn s3_region_falls_back_to_aws_region() {
        let config = StorageConfig::from_lookup(lookup(&[
            ("S3_BUCKET", "media"),
            ("AWS_REGION", "eu-west-1"),
        ]))
        .unwrap();

        match config.settings_for(StorageBackend::S3) {
            Some(BackendSettings::S3(s3)) => assert_eq!(s3.region, "eu-west-1"),
            other => panic!("unexpected settings: {:?}", other),
        }
    }

    #[test]
    fn missing_required_vars_are_errors() {
        assert!(StorageConfig::from_lookup(lookup(&[("LOCAL_STORAGE_PATH", "./up")])).is_err());
        assert!(StorageConfig::from_lookup(lookup(&[("S3_BUCKET", "media")])).is_err());
        assert!(StorageConfig::from_lookup(lookup(&[
            ("AZURE_STORAGE_ACCOUNT", "acct"),
            ("AZURE_STORAGE_KEY", "a2V5"),
        ]))
        .is_err());
    }

    #[test]
    fn default_backend_must_be_configured() {
        let result = StorageConfig::from_lookup(lookup(&[("STORAGE_BACKEND", "s3")]));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_selector_is_rejected() {
        let result = StorageConfig::from_lookup(lookup(&[("STORAGE_BACKEND", "ftp")]));
        assert!(result.is_err());
    }

    #[test]
    fn json_rejects_fields_from_another_backend() {
        let json = r#"{
            "backends": [
                { "backend": "local", "root": "./up", "base_url": "http://x/up", "bucket": "media" }
            ]
        }"#;
        assert!(StorageConfig::from_json(json).is_err());
    }

    #[test]
    fn json_accepts_all_three_shapes() {
        let json = r#"{
            "default_backend": "azure",
            "backends": [
                { "backend": "local", "root": "./up", "base_url": "http://x/up" },
                { "backend": "s3", "bucket": "media", "region": "us-east-1", "cdn_url": "https://cdn.example.com" },
                { "backend": "azure", "account": "acct", "access_key": "a2V5", "container": "files" }
            ]
        }"#;
        let config = StorageConfig::from_json(json).unwrap();
        assert_eq!(config.backends.len(), 3);
        assert_eq!(config.default_backend, Some(StorageBackend::Azure));
    }

    #[test]
    fn duplicate_backends_are_rejected() {
        let json = r#"{
            "backends": [
                { "backend": "local", "root": "./a", "base_url": "http://x/a" },
                { "backend": "local", "root": "./b", "base_url": "http://x/b" }
            ]
        }"#;
        assert!(StorageConfig::from_json(json).is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let settings = AzureSettings {
            account: "acct".to_string(),
            access_key: "c2VjcmV0".to_string(),
            container: "files".to_string(),
            cdn_url: None,
            use_emulator: false,
        };
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("c2VjcmV0"));
        assert!(rendered.contains("acct"));
    }
}
