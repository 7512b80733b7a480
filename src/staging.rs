//! 上传分段的临时落盘与最终转存。

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::storage::{Storage, StorageError};

const PART_EXTENSION: &str = "part";

/// 写入暂存目录的单个上传分段。
pub struct StagedFile {
    path: PathBuf,
    file: File,
    size: u64,
}

/// 分段转存到存储目录后的结果。
#[derive(Debug)]
pub struct PersistedFile {
    pub filename: String,
    pub size: u64,
}

impl StagedFile {
    /// 在暂存目录中创建 `<uuid>.part`。
    pub async fn create(staging_dir: &Path) -> io::Result<Self> {
        let path = staging_dir.join(format!("{}.{PART_EXTENSION}", Uuid::new_v4()));
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            file,
            size: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// 放弃并清理暂存文件。
    pub async fn discard(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.path).await;
    }

    /// 为客户端文件名保留最终名称并把内容移入存储目录。
    ///
    /// 优先 rename；跨文件系统等 rename 失败的情况退回复制后删除。
    /// 失败时清理暂存文件与已保留的空文件。
    pub async fn persist(
        mut self,
        storage: &Storage,
        original_name: &str,
    ) -> Result<PersistedFile, StorageError> {
        if let Err(err) = self.file.sync_all().await {
            self.discard().await;
            return Err(err.into());
        }
        let StagedFile { path, file, size } = self;
        drop(file);

        let (filename, target) = match storage.reserve_name(original_name).await {
            Ok(reserved) => reserved,
            Err(err) => {
                let _ = fs::remove_file(&path).await;
                return Err(err);
            }
        };

        if fs::rename(&path, &target).await.is_err()
            && let Err(err) = copy_into(&path, &target).await
        {
            let _ = fs::remove_file(&path).await;
            let _ = fs::remove_file(&target).await;
            return Err(err.into());
        }
        if let Some(parent) = target.parent()
            && let Err(err) = sync_dir(parent).await
        {
            warn!(path = ?parent, error = %err, "failed to sync store directory");
        }

        Ok(PersistedFile { filename, size })
    }
}

async fn copy_into(source: &Path, target: &Path) -> io::Result<()> {
    let mut reader = File::open(source).await?;
    let mut writer = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(target)
        .await?;
    tokio::io::copy(&mut reader, &mut writer).await?;
    writer.sync_all().await?;
    drop(reader);
    fs::remove_file(source).await
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}

/// 清理超过 `ttl` 未修改的暂存分段。
pub async fn cleanup_stale_parts(staging_dir: &Path, ttl: Duration) -> io::Result<()> {
    if ttl.is_zero() || fs::metadata(staging_dir).await.is_err() {
        return Ok(());
    }

    let now = SystemTime::now();
    let mut dir = fs::read_dir(staging_dir).await?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(PART_EXTENSION) {
            continue;
        }
        let metadata = entry.metadata().await?;
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };
        if age >= ttl {
            if let Err(err) = fs::remove_file(&path).await {
                warn!(path = ?path, error = %err, "failed to remove stale staged part");
            } else {
                info!(path = ?path, "removed stale staged part");
            }
        }
    }

    Ok(())
}
