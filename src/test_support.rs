//! 测试辅助：临时目录与 multipart 请求构造。

use axum::body::Body as AxumBody;
use axum::http::{Request, header};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

use crate::storage::Storage;
use crate::upload::UploadConfig;

pub const BOUNDARY: &str = "drop-store-test-boundary";

pub struct Part<'a> {
    pub field: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn file(filename: &'a str, content_type: &'a str, data: &'a [u8]) -> Self {
        Self {
            field: "file",
            filename: Some(filename),
            content_type: Some(content_type),
            data,
        }
    }

    pub fn text(field: &'a str, data: &'a [u8]) -> Self {
        Self {
            field,
            filename: None,
            content_type: None,
            data,
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.field);
        if let Some(filename) = part.filename {
            disposition.push_str(&format!("; filename=\"{filename}\""));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<AxumBody> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(AxumBody::from(multipart_body(parts)))
        .expect("build multipart request")
}

pub fn make_dirs() -> (TempDir, Arc<Storage>, Arc<UploadConfig>) {
    let temp = tempdir().expect("tempdir");
    let root = temp.path().join("uploads");
    let staging = temp.path().join("staging");
    std::fs::create_dir_all(&root).expect("create store root");
    std::fs::create_dir_all(&staging).expect("create staging dir");
    let upload = UploadConfig {
        staging_dir: staging,
        staging_ttl: Duration::from_secs(60),
    };
    (temp, Arc::new(Storage::new(root)), Arc::new(upload))
}

pub fn store_entries(storage: &Storage) -> Vec<String> {
    let mut names = std::fs::read_dir(storage.root_path())
        .expect("read store")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .to_string()
        })
        .collect::<Vec<_>>();
    names.sort();
    names
}
