//! 暂存分段清理的后台任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::STAGING_CLEAN_INTERVAL_SECS;
use crate::staging::cleanup_stale_parts;
use crate::upload::UploadConfig;

/// 启动后台任务（清理上传中断遗留的暂存分段）。
pub fn spawn_background_tasks(upload: Arc<UploadConfig>) {
    if upload.staging_ttl.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(STAGING_CLEAN_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(err) = cleanup_stale_parts(&upload.staging_dir, upload.staging_ttl).await {
                warn!(error = %err, "staging cleanup failed");
            }
        }
    });
}
