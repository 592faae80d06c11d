//! Stowage CLI: put, fetch and link files through the configured storage backend.
//!
//! Backends are configured from the environment (and `.env`): set
//! `STORAGE_BACKEND` plus the variables of each backend to enable.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stowage_cli::{init_tracing, mime_type_for};
use stowage_core::StorageConfig;
use stowage_storage::registry;
use stowage_storage::{
    parse_backend, store_file, IncomingFile, PutFileOptions, SignedUrlOptions, Storage,
    StorageOptions,
};

#[derive(Parser)]
#[command(name = "stowage", about = "Pluggable file storage CLI")]
struct Cli {
    /// Backend to use instead of STORAGE_BACKEND: local, s3, azure
    #[arg(long, global = true)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a local file
    Put {
        /// Path to the file to store
        file: PathBuf,
        /// Explicit key; generated from the file name when omitted
        #[arg(long)]
        key: Option<String>,
    },
    /// Download a file
    Get {
        key: String,
        /// Write to this path instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete a file
    Rm { key: String },
    /// Copy a file to a new key
    Cp { from: String, to: String },
    /// Print the public URL of a key
    Url { key: String },
    /// Print a time-limited URL for a key
    Sign {
        key: String,
        /// Validity in seconds
        #[arg(long, default_value = "3600")]
        expires_secs: u64,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

async fn open_storage(backend: Option<&str>) -> anyhow::Result<Arc<dyn Storage>> {
    let config = StorageConfig::from_env().context("Failed to load storage configuration")?;
    registry::set_options(StorageOptions::from_config(config))?;

    let backend = backend.map(parse_backend).transpose()?;
    let storage = registry::get_storage(backend)
        .await
        .context("Failed to open storage backend")?;
    tracing::debug!(backend = %storage.backend_type(), "Storage backend ready");
    Ok(storage)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let storage = open_storage(cli.backend.as_deref()).await?;

    match cli.command {
        Commands::Put { file, key } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let original_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .context("Input path has no file name")?;
            let mime_type = mime_type_for(&file);

            let record = match key {
                Some(key) => {
                    let mut options = PutFileOptions::new().original_name(original_name);
                    if let Some(mime_type) = mime_type {
                        options = options.mime_type(mime_type);
                    }
                    storage.put_file(data, &key, options).await?
                }
                None => {
                    let mut incoming = IncomingFile::new(original_name, data);
                    if let Some(mime_type) = mime_type {
                        incoming = incoming.with_mime_type(mime_type);
                    }
                    store_file(storage.as_ref(), incoming, None).await?
                }
            };
            print_json(&record)?;
        }
        Commands::Get { key, out } => {
            let data = storage.get_file(&key).await?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, &data)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    print_json(&serde_json::json!({
                        "key": key,
                        "size": data.len(),
                        "out": path,
                    }))?;
                }
                None => {
                    use tokio::io::AsyncWriteExt;
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&data).await?;
                    stdout.flush().await?;
                }
            }
        }
        Commands::Rm { key } => {
            storage.delete_file(&key).await?;
            print_json(&serde_json::json!({ "deleted": key }))?;
        }
        Commands::Cp { from, to } => {
            let record = storage.copy_file(&from, &to).await?;
            print_json(&record)?;
        }
        Commands::Url { key } => {
            print_json(&serde_json::json!({ "key": key, "url": storage.get_url(&key) }))?;
        }
        Commands::Sign { key, expires_secs } => {
            let signer = storage.as_signed_url().with_context(|| {
                format!(
                    "The {} backend does not support signed URLs",
                    storage.backend_type()
                )
            })?;
            let options = SignedUrlOptions::expires_in(Duration::from_secs(expires_secs));
            let url = signer.get_signed_url(&key, options).await?;
            print_json(&serde_json::json!({
                "key": key,
                "url": url,
                "expires_in_secs": expires_secs,
            }))?;
        }
    }

    Ok(())
}
