//! ETag 计算与条件请求校验。

use axum::http::{HeaderMap, header};
use std::fs::Metadata;
use std::time::UNIX_EPOCH;

/// 根据文件元数据生成弱 ETag。
pub fn etag_from_metadata(metadata: &Metadata) -> String {
    let size = metadata.len();
    let modified = metadata.modified().ok();
    if let Some(modified) = modified
        && let Ok(duration) = modified.duration_since(UNIX_EPOCH)
    {
        return format!(
            "W/\"{}-{}-{}\"",
            size,
            duration.as_secs(),
            duration.subsec_nanos()
        );
    }
    format!("W/\"{}\"", size)
}

/// 判断 If-None-Match 是否命中当前 ETag（命中时应返回 304）。
pub fn is_not_modified(headers: &HeaderMap, current_etag: &str) -> bool {
    let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    if value.trim() == "*" {
        return true;
    }
    value
        .split(',')
        .map(|item| item.trim())
        .any(|item| weak_eq(item, current_etag))
}

// If-None-Match 使用弱比较。
fn weak_eq(a: &str, b: &str) -> bool {
    a.trim_start_matches("W/") == b.trim_start_matches("W/")
}
