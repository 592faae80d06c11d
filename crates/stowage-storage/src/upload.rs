use crate::keys::join_key;
use crate::naming::{IncomingFile, RequestContext, UploadHooks};
use crate::traits::{PutFileOptions, Storage, StorageResult, UploadedFile};

/// Name, place and write an incoming file using the backend's hooks.
///
/// Naming and placement run before any write, so a failing hook leaves the
/// backend untouched and its error is returned as-is.
pub async fn store_file(
    storage: &dyn Storage,
    file: IncomingFile,
    ctx: Option<&RequestContext>,
) -> StorageResult<UploadedFile> {
    store_file_with(storage, file, ctx, None).await
}

/// Like [`store_file`], with per-call hooks that replace the backend's
/// hooks wherever they are set.
pub async fn store_file_with(
    storage: &dyn Storage,
    file: IncomingFile,
    ctx: Option<&RequestContext>,
    overrides: Option<&UploadHooks>,
) -> StorageResult<UploadedFile> {
    let hooks = match overrides {
        Some(overrides) => storage.hooks().overridden_by(overrides),
        None => storage.hooks().clone(),
    };
    let file_name = hooks.file_name(&file, ctx)?;
    let dist = hooks.file_dist(&file, ctx)?;
    let key = join_key(&dist, &file_name);

    tracing::debug!(
        backend = %storage.backend_type(),
        key = %key,
        original_name = %file.original_name,
        size_bytes = file.size(),
        "Storing incoming file"
    );

    let IncomingFile {
        original_name,
        mime_type,
        data,
    } = file;

    let mut options = PutFileOptions::new().original_name(original_name);
    if let Some(mime_type) = mime_type {
        options = options.mime_type(mime_type);
    }

    let record = storage.put_file(data, &key, options).await?;
    Ok(hooks.transform(record))
}
