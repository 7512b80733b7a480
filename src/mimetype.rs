//! 按扩展名推断列表接口中的 MIME 类型。

use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// 固定扩展名映射表，未知扩展名返回 `application/octet-stream`。
pub fn mimetype_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        _ => OCTET_STREAM,
    }
}
