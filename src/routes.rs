//! 路由装配：上传、列表、删除与静态下载。

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::config::MAX_UPLOAD_SIZE;
use crate::http::{add_security_headers, build_cors_layer, client_ip};
use crate::storage::Storage;
use crate::upload::UploadConfig;
use crate::{files, upload};

/// 构建完整的 HTTP 路由。
pub fn build_router(
    storage: Arc<Storage>,
    upload_config: Arc<UploadConfig>,
    cors_origins: Option<&str>,
) -> Router {
    Router::new()
        .route(
            "/upload",
            post(upload::upload_files).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
        )
        .route("/files", get(files::list_files))
        .route(
            "/files/{filename}",
            get(files::fetch_file).delete(files::delete_file),
        )
        .layer(middleware::from_fn(add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip = client_ip(request),
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(upload_config))
        .layer(build_cors_layer(cors_origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body as AxumBody;
    use axum::http::{StatusCode, header};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::test_support::{Part, make_dirs, multipart_request, store_entries};

    async fn send(router: &Router, request: Request<AxumBody>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, bytes.to_vec())
    }

    fn plain(method: &str, uri: &str) -> Request<AxumBody> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(AxumBody::empty())
            .expect("request")
    }

    fn json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).expect("json body")
    }

    #[tokio::test]
    async fn upload_list_fetch_delete_round_trip() {
        let (_temp, storage, upload) = make_dirs();
        let router = build_router(storage.clone(), upload, None);

        let (status, body) = send(
            &router,
            multipart_request(
                "/upload",
                &[
                    Part::file("a.png", "application/octet-stream", b"\x89PNG data"),
                    Part::file("b.txt", "application/x-whatever", b"plain text"),
                ],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let uploaded = json(&body);
        assert_eq!(uploaded["message"], "Files uploaded successfully");
        let names: Vec<String> = uploaded["files"]
            .as_array()
            .expect("files array")
            .iter()
            .map(|file| file["filename"].as_str().expect("filename").to_string())
            .collect();
        assert_eq!(names.len(), 2);

        let (status, body) = send(&router, plain("GET", "/files")).await;
        assert_eq!(status, StatusCode::OK);
        let listed = json(&body);
        let listed = listed.as_array().expect("list array");
        assert_eq!(listed.len(), 2);
        for entry in listed {
            let filename = entry["filename"].as_str().expect("filename");
            let expected = if filename.ends_with(".png") { "image/png" } else { "text/plain" };
            assert_eq!(entry["mimetype"], expected);
            assert!(entry["uploadedAt"].is_string());
        }

        let text_name = names
            .iter()
            .find(|name| name.ends_with("_b.txt"))
            .expect("text upload");
        let (status, body) = send(&router, plain("GET", &format!("/files/{text_name}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"plain text");

        let (status, body) = send(&router, plain("DELETE", &format!("/files/{text_name}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["message"], "File deleted successfully");
        assert_eq!(store_entries(&storage).len(), 1);

        let (status, body) = send(&router, plain("DELETE", &format!("/files/{text_name}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["error"], "File not found");

        let (status, _) = send(&router, plain("GET", &format!("/files/{text_name}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_upload_is_bad_request() {
        let (_temp, storage, upload) = make_dirs();
        let router = build_router(storage.clone(), upload, None);

        let (status, body) = send(&router, multipart_request("/upload", &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"], "No files uploaded");
        assert!(store_entries(&storage).is_empty());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let (_temp, storage, upload) = make_dirs();
        let router = build_router(storage.clone(), upload.clone(), None);
        let data = vec![b'x'; MAX_UPLOAD_SIZE + 1];

        let (status, body) = send(
            &router,
            multipart_request("/upload", &[Part::file("big.bin", "application/octet-stream", &data)]),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json(&body)["error"], "Payload too large");
        assert!(store_entries(&storage).is_empty());
        assert_eq!(std::fs::read_dir(&upload.staging_dir).expect("staging").count(), 0);
    }

    #[tokio::test]
    async fn encoded_traversal_is_not_found() {
        let (temp, storage, upload) = make_dirs();
        std::fs::write(temp.path().join("secret.txt"), b"s").expect("write");
        let router = build_router(storage, upload, None);

        let (status, body) = send(&router, plain("DELETE", "/files/..%2Fsecret.txt")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["error"], "Invalid filename");
        assert!(temp.path().join("secret.txt").exists());
    }

    #[tokio::test]
    async fn responses_carry_cors_and_security_headers() {
        let (_temp, storage, upload) = make_dirs();
        let router = build_router(storage, upload, None);
        let request = Request::builder()
            .method("GET")
            .uri("/files")
            .header(header::ORIGIN, "https://anywhere.example")
            .body(AxumBody::empty())
            .expect("request");

        let response = router.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    }
}
