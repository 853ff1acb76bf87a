use crate::bridge::{chunk_channel, receiver_stream, ChunkReader, ChunkWriter};
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use api_shared::{DownloadManyReq, HealthRes, HealthService, UploadManyRes, UploadRes};
use axum::body::Body;
use axum::extract::multipart::{Field, Multipart, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use nimbus_files::{FileKey, FileStore, FilesResult, ARCHIVE_FILENAME, ARCHIVE_MEDIA_TYPE};
use std::io;
use std::sync::Arc;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Advances `$multipart` to the next part named `$field_name`, skipping any others.
///
/// Evaluates to `ApiResult<Option<Field<'_>>>`, borrowing the caller's `Multipart` only for the
/// life of the returned part.
macro_rules! next_file_field {
    ($multipart:expr, $field_name:expr) => {
        loop {
            match $multipart.next_field().await {
                Ok(Some(field)) if field.name() == Some($field_name) => break Ok(Some(field)),
                Ok(Some(_)) => continue,
                Ok(None) => break Ok(None),
                Err(e) => break Err(ApiError::BadRequest(e.body_text())),
            }
        }
    };
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/upload",
    responses(
        (status = 201, description = "File stored", body = UploadRes),
        (status = 400, description = "Missing file part, no extension, or too large", body = ErrorRes),
        (status = 415, description = "Extension not permitted", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Store one uploaded file
///
/// Reads a `multipart/form-data` body and stores the first part whose name matches the configured
/// file field. The part's filename decides the extension of the returned key and its
/// `Content-Type` is replayed on download.
///
/// # Returns
/// * `201 Created` with the new key
///
/// # Errors
/// Returns `400 Bad Request` if:
/// - the body is not multipart or has no matching part,
/// - the filename has no extension and those are not allowed, or
/// - the file is larger than the configured maximum.
///
/// Returns `415 Unsupported Media Type` if the extension is not in the allow-list.
#[axum::debug_handler]
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<UploadRes>)> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let field_name = state.store().config().file_field().to_owned();

    let field: Option<Field<'_>> = next_file_field!(multipart, field_name.as_str())?;
    let field = field.ok_or_else(|| missing_file_part(&field_name))?;
    let key = store_field(state.store(), field).await?;

    tracing::info!(%key, "upload stored");
    Ok((
        StatusCode::CREATED,
        Json(UploadRes {
            key: key.into_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/upload-many",
    responses(
        (status = 201, description = "All files stored", body = UploadManyRes),
        (status = 400, description = "Missing file part, no extension, or too large", body = ErrorRes),
        (status = 415, description = "Extension not permitted", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Store every file part of one request
///
/// All-or-nothing: if any part fails, the files already stored for this request are deleted
/// before the error is returned.
#[axum::debug_handler]
pub async fn upload_many(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<UploadManyRes>)> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let field_name = state.store().config().file_field().to_owned();

    let mut keys: Vec<FileKey> = Vec::new();
    loop {
        let next: ApiResult<Option<Field<'_>>> = next_file_field!(multipart, field_name.as_str());
        let stored = match next {
            Ok(Some(field)) => store_field(state.store(), field).await.map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        match stored {
            Ok(Some(key)) => keys.push(key),
            Ok(None) => break,
            Err(e) => {
                discard(state.store(), keys).await;
                return Err(e);
            }
        }
    }

    if keys.is_empty() {
        return Err(missing_file_part(&field_name));
    }

    tracing::info!(count = keys.len(), "uploads stored");
    Ok((
        StatusCode::CREATED,
        Json(UploadManyRes {
            keys: keys.into_iter().map(FileKey::into_string).collect(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/download",
    params(
        ("_file_" = String, Query, description = "Key returned by upload; the parameter is named after the configured file field")
    ),
    responses(
        (status = 200, description = "File content with its recorded Content-Type"),
        (status = 400, description = "Missing key", body = ErrorRes),
        (status = 404, description = "No file stored under the key", body = ErrorRes)
    )
)]
/// Stream one stored file
///
/// The body is produced chunk by chunk while the client reads it; `Content-Type` carries the
/// value(s) recorded at upload.
#[axum::debug_handler]
pub async fn download(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let config = state.store().config();
    let key = key_param(&params, config.file_field())?;
    let chunk_size = config.chunk_size();

    let store = Arc::clone(state.store());
    let handle = run_blocking(move || store.download(&key)).await?;

    let size = handle.size();
    let content_types = handle.content_types().to_vec();
    let key = handle.key().clone();

    let (tx, rx) = chunk_channel();
    tokio::task::spawn_blocking(move || {
        let mut handle = handle;
        let mut writer = ChunkWriter::new(tx);
        match handle.copy_to(&mut writer, chunk_size) {
            Ok(bytes) => tracing::debug!(%key, bytes, "download sent"),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!(%key, "client went away during download");
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "download aborted");
                writer.fail(e);
            }
        }
    });

    let mut response = Body::from_stream(receiver_stream(rx)).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    for value in content_types.iter().filter_map(|ct| HeaderValue::from_str(ct).ok()) {
        headers.append(CONTENT_TYPE, value);
    }
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
    }
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/download-many",
    request_body = DownloadManyReq,
    responses(
        (status = 200, description = "Zip archive of the requested files", body = Vec<u8>, content_type = "application/zip"),
        (status = 400, description = "Malformed request", body = ErrorRes),
        (status = 404, description = "One of the keys is not stored", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Download several files as one zip archive
///
/// Entries appear in request order, each named by its key. If any key is missing nothing is sent
/// but the error.
#[axum::debug_handler]
pub async fn download_many(
    State(state): State<AppState>,
    req: Result<Json<DownloadManyReq>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = req.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let store = Arc::clone(state.store());
    let archive = run_blocking(move || store.archive(&req.filenames)).await?;

    Ok((
        [
            (CONTENT_TYPE, ARCHIVE_MEDIA_TYPE.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{ARCHIVE_FILENAME}\""),
            ),
        ],
        archive,
    )
        .into_response())
}

#[utoipa::path(
    delete,
    path = "/delete",
    params(
        ("_file_" = String, Query, description = "Key returned by upload; the parameter is named after the configured file field")
    ),
    responses(
        (status = 204, description = "File removed"),
        (status = 400, description = "Missing key", body = ErrorRes),
        (status = 404, description = "No file stored under the key", body = ErrorRes)
    )
)]
/// Remove one stored file. Also routed for `POST`.
#[axum::debug_handler]
pub async fn delete_file(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<StatusCode> {
    let key = key_param(&params, state.store().config().file_field())?;

    let store = Arc::clone(state.store());
    run_blocking(move || store.delete(&key)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// First non-empty value of the query parameter named after the file field.
fn key_param(params: &[(String, String)], field_name: &str) -> ApiResult<String> {
    params
        .iter()
        .find(|(name, _)| name == field_name)
        .map(|(_, value)| value.clone())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::BadRequest("expected file name".into()))
}

fn missing_file_part(field_name: &str) -> ApiError {
    ApiError::BadRequest(format!("expected a file part named {field_name:?}"))
}

/// Streams one multipart part into the store.
///
/// The part is pumped chunk by chunk into a blocking upload; if the store stops reading early
/// (policy rejection, size limit) the rest of the part is left unread.
async fn store_field(store: &Arc<dyn FileStore>, mut field: Field<'_>) -> ApiResult<FileKey> {
    let filename = field.file_name().unwrap_or_default().to_owned();
    let content_types: Vec<String> = field
        .content_type()
        .map(|ct| vec![ct.to_owned()])
        .unwrap_or_default();

    let (tx, rx) = chunk_channel();
    let store = Arc::clone(store);
    let upload = tokio::task::spawn_blocking(move || {
        let mut reader = ChunkReader::new(rx);
        store.upload(&mut reader, &filename, content_types)
    });

    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if tx.send(Ok(chunk)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(io::Error::other(e.body_text()))).await;
                break;
            }
        }
    }
    drop(tx);

    let key = upload
        .await
        .map_err(|e| ApiError::Internal(format!("upload task failed: {e}")))??;
    Ok(key)
}

/// Best-effort removal of files stored earlier in a failed request.
async fn discard(store: &Arc<dyn FileStore>, keys: Vec<FileKey>) {
    if keys.is_empty() {
        return;
    }
    let store = Arc::clone(store);
    let result = tokio::task::spawn_blocking(move || {
        for key in &keys {
            if let Err(e) = store.delete(key.as_str()) {
                tracing::warn!(%key, error = %e, "failed to discard partial upload");
            }
        }
    })
    .await;
    if let Err(e) = result {
        tracing::warn!(error = %e, "discard task failed");
    }
}

async fn run_blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> FilesResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
        .map_err(ApiError::from)
}
