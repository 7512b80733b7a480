//! 文件列表、删除与静态下载处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use serde::Serialize;
use std::io::{self, SeekFrom};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};

use crate::error::ApiError;
use crate::etag::{etag_from_metadata, is_not_modified};
use crate::storage::{Storage, StorageError, StoredFile};

#[derive(Debug, Serialize)]
pub(crate) struct MessageResponse {
    message: &'static str,
}

/// 列出存储目录中的全部文件。
pub async fn list_files(
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<Vec<StoredFile>>, ApiError> {
    let files = storage.list_files().await.map_err(|err| {
        error!(error = %err, "error reading directory");
        ApiError::DirectoryReadError
    })?;
    info!(count = files.len(), "list files");
    Ok(JsonResponse(files))
}

/// 按文件名删除文件。
pub async fn delete_file(
    Path(filename): Path<String>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<MessageResponse>, ApiError> {
    let (target, _) = storage
        .resolve_file(&filename)
        .await
        .map_err(|err| ApiError::from_lookup(err, ApiError::FileDeleteError))?;
    storage
        .remove_file(&target)
        .await
        .map_err(|err| delete_failed(&filename, err))?;
    info!(filename, "file deleted");
    Ok(JsonResponse(MessageResponse {
        message: "File deleted successfully",
    }))
}

fn delete_failed(filename: &str, err: io::Error) -> ApiError {
    error!(filename, error = %err, "error deleting file");
    ApiError::FileDeleteError
}

/// 静态下载文件，支持 Range 请求与缓存相关头。
pub async fn fetch_file(
    Path(filename): Path<String>,
    request_headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let (target, metadata) = storage.resolve_file(&filename).await?;
    let file_size = metadata.len();
    let mime = mime_guess::from_path(&filename).first_or_octet_stream();
    let etag = etag_from_metadata(&metadata);

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(value) = HeaderValue::from_str(&etag) {
        response_headers.insert(header::ETAG, value);
    }
    if let Some(value) = metadata
        .modified()
        .ok()
        .map(httpdate::fmt_http_date)
        .and_then(|value| HeaderValue::from_str(&value).ok())
    {
        response_headers.insert(header::LAST_MODIFIED, value);
    }

    if is_not_modified(&request_headers, &etag) {
        debug!(filename, "fetch not modified");
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    if let Ok(value) = HeaderValue::from_str(mime.essence_str()) {
        response_headers.insert(header::CONTENT_TYPE, value);
    }
    let range = parse_range(request_headers.get(header::RANGE), file_size)?;

    let mut file = File::open(&target)
        .await
        .map_err(|err| ApiError::from(StorageError::Io(err)))?;

    if let Some((start, end)) = range {
        let length = end - start + 1;
        debug!(filename, start, end, length, "fetch range request accepted");
        file.seek(SeekFrom::Start(start)).await.map_err(|err| {
            error!(filename, error = %err, "failed to seek stored file");
            ApiError::FileReadError
        })?;
        if let Ok(value) = HeaderValue::from_str(&format!("bytes {start}-{end}/{file_size}")) {
            response_headers.insert(header::CONTENT_RANGE, value);
        }
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        let stream = ReaderStream::new(file.take(length));
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            response_headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file_size));
    debug!(filename, size = file_size, "fetch full file");
    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}

/// 解析单段 Range 头；无法理解的 Range 按 RFC 9110 忽略并返回完整内容。
fn parse_range(value: Option<&HeaderValue>, file_size: u64) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(range) = value
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("bytes="))
    else {
        return Ok(None);
    };
    if range.contains(',') {
        return Ok(None);
    }
    let Some((start_part, end_part)) = range.split_once('-') else {
        return Ok(None);
    };
    let (start_part, end_part) = (start_part.trim(), end_part.trim());

    let (start, end) = if start_part.is_empty() {
        let Ok(suffix) = end_part.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || file_size == 0 {
            return Err(ApiError::RangeNotSatisfiable(file_size));
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let Ok(start) = start_part.parse::<u64>() else {
            return Ok(None);
        };
        let end = if end_part.is_empty() {
            file_size.saturating_sub(1)
        } else {
            let Ok(end) = end_part.parse::<u64>() else {
                return Ok(None);
            };
            end.min(file_size.saturating_sub(1))
        };
        (start, end)
    };

    if start >= file_size || start > end {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }
    Ok(Some((start, end)))
}
