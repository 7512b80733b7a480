//! 多文件 multipart 上传处理器。

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Extension, Multipart};
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use futures_util::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::UPLOAD_FIELD_NAME;
use crate::error::ApiError;
use crate::mimetype::OCTET_STREAM;
use crate::staging::StagedFile;
use crate::storage::Storage;

#[derive(Debug)]
pub struct UploadConfig {
    pub staging_dir: PathBuf,
    pub staging_ttl: Duration,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadedFile {
    filename: String,
    size: u64,
    mimetype: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadResponse {
    message: &'static str,
    files: Vec<UploadedFile>,
}

/// 已暂存、等待转存的文件分段。
struct PendingFile {
    staged: StagedFile,
    original_name: String,
    mimetype: String,
}

/// 接收 `file` 字段下的一个或多个文件。
///
/// 各分段先顺序暂存，再并发转存；所有转存结束后才产生唯一的响应。
/// 只有全部成功时返回 200，否则返回 `FileSaveError`，已成功的文件保留在磁盘上。
pub async fn upload_files(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<JsonResponse<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        debug!(error = %rejection, "request is not a multipart upload");
        ApiError::NoFilesProvided
    })?;

    let mut pending = Vec::new();
    if let Err(err) = stage_parts(&upload.staging_dir, &mut multipart, &mut pending).await {
        for file in pending {
            file.staged.discard().await;
        }
        return Err(err);
    }
    if pending.is_empty() {
        return Err(ApiError::NoFilesProvided);
    }

    let storage = storage.as_ref();
    let outcomes = join_all(pending.into_iter().map(|file| async move {
        let result = file.staged.persist(storage, &file.original_name).await;
        (file.original_name, file.mimetype, result)
    }))
    .await;

    let total = outcomes.len();
    let mut files = Vec::with_capacity(total);
    for (original_name, mimetype, result) in outcomes {
        match result {
            Ok(persisted) => {
                info!(
                    filename = persisted.filename,
                    size = persisted.size,
                    "file stored"
                );
                files.push(UploadedFile {
                    filename: persisted.filename,
                    size: persisted.size,
                    mimetype,
                });
            }
            Err(err) => error!(original_name, error = %err, "error saving file"),
        }
    }

    if files.len() != total {
        warn!(
            stored = files.len(),
            failed = total - files.len(),
            "upload partially failed"
        );
        return Err(ApiError::FileSaveError);
    }

    info!(count = total, "upload complete");
    Ok(JsonResponse(UploadResponse {
        message: "Files uploaded successfully",
        files,
    }))
}

/// 顺序读取 multipart 流，把文件分段写入暂存目录。
async fn stage_parts(
    staging_dir: &Path,
    multipart: &mut Multipart,
    pending: &mut Vec<PendingFile>,
) -> Result<(), ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD_NAME) {
            continue;
        }
        // 浏览器对空的文件输入框会发送 filename=""。
        let Some(original_name) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
        else {
            continue;
        };
        let mimetype = field.content_type().unwrap_or(OCTET_STREAM).to_owned();

        let mut staged = StagedFile::create(staging_dir).await.map_err(|err| {
            error!(error = %err, "failed to create staged part");
            ApiError::FileSaveError
        })?;
        let write_result: Result<(), ApiError> = async {
            while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                staged.write_chunk(&chunk).await.map_err(|err| {
                    error!(error = %err, "failed to write staged part");
                    ApiError::FileSaveError
                })?;
            }
            Ok(())
        }
        .await;
        if let Err(err) = write_result {
            staged.discard().await;
            return Err(err);
        }

        debug!(original_name, size = staged.size(), mimetype, "part staged");
        pending.push(PendingFile {
            staged,
            original_name,
            mimetype,
        });
    }
    Ok(())
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("upload exceeds size limit");
        ApiError::PayloadTooLarge
    } else {
        warn!(error = %err, "malformed multipart body");
        ApiError::MalformedUpload(err.body_text())
    }
}
