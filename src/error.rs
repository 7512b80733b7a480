//! 统一的 API 错误类型与转换。

use axum::Json;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::io::ErrorKind;
use tracing::error;

use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    NoFilesProvided,
    MalformedUpload(String),
    PayloadTooLarge,
    FileSaveError,
    DirectoryReadError,
    InvalidFilename,
    FileNotFound,
    FileDeleteError,
    FileReadError,
    RangeNotSatisfiable(u64),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFilesProvided | ApiError::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::FileSaveError
            | ApiError::DirectoryReadError
            | ApiError::FileDeleteError
            | ApiError::FileReadError => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidFilename | ApiError::FileNotFound => StatusCode::NOT_FOUND,
            ApiError::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::NoFilesProvided => "No files uploaded".into(),
            ApiError::MalformedUpload(reason) => reason.clone(),
            ApiError::PayloadTooLarge => "Payload too large".into(),
            ApiError::FileSaveError => "Error saving file".into(),
            ApiError::DirectoryReadError => "Error reading directory".into(),
            ApiError::InvalidFilename => "Invalid filename".into(),
            ApiError::FileNotFound => "File not found".into(),
            ApiError::FileDeleteError => "Error deleting file".into(),
            ApiError::FileReadError => "Error reading file".into(),
            ApiError::RangeNotSatisfiable(_) => "Range not satisfiable".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.message() }));
        match self {
            ApiError::RangeNotSatisfiable(size) => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
                (status, headers, body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

impl ApiError {
    /// 查找失败的映射：名称非法或文件不存在为 404，其余 I/O 错误交给 `io_failure`。
    pub fn from_lookup(err: StorageError, io_failure: ApiError) -> Self {
        match err {
            StorageError::InvalidName => ApiError::InvalidFilename,
            StorageError::Io(err) if err.kind() == ErrorKind::NotFound => ApiError::FileNotFound,
            StorageError::Io(err) => {
                error!(error = %err, "file lookup failed");
                io_failure
            }
        }
    }
}

/// 下载类请求的默认映射。
impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::from_lookup(err, ApiError::FileReadError)
    }
}
