//! 存储目录：目录本身即唯一数据源，没有额外索引。

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::ErrorKind;
use tracing::{debug, warn};

use crate::mimetype::mimetype_for;

const MAX_RESERVE_ATTEMPTS: u32 = 64;
const FALLBACK_CLIENT_NAME: &str = "file";

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 校验公开文件名：只允许单个普通路径段。
    pub fn validate_name(name: &str) -> Result<(), StorageError> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0'])
        {
            return Err(StorageError::InvalidName);
        }
        Ok(())
    }

    /// 解析存储目录中的普通文件，拒绝符号链接与目录。
    pub async fn resolve_file(&self, name: &str) -> Result<(PathBuf, Metadata), StorageError> {
        Self::validate_name(name)?;
        let target = self.root.join(name);
        let metadata = fs::symlink_metadata(&target).await?;
        if metadata.file_type().is_symlink() {
            return Err(StorageError::InvalidName);
        }
        if !metadata.is_file() {
            return Err(StorageError::Io(io::Error::from(ErrorKind::NotFound)));
        }
        Ok((target, metadata))
    }

    /// 枚举目录并并发获取每个条目的元数据。
    ///
    /// 只返回普通文件；单个条目 stat 失败（例如列举期间被删除）时跳过该条目，
    /// 只有目录本身读取失败才返回错误。结果按文件名排序。
    pub async fn list_files(&self) -> io::Result<Vec<StoredFile>> {
        let mut dir = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!(name = ?raw, "skipping non utf-8 store entry"),
            }
        }

        let stats = join_all(names.into_iter().map(|name| async move {
            let result = fs::symlink_metadata(self.root.join(&name)).await;
            (name, result)
        }))
        .await;

        let mut files = Vec::with_capacity(stats.len());
        for (name, result) in stats {
            match result {
                Ok(metadata) if metadata.is_file() => files.push(StoredFile::new(name, &metadata)),
                Ok(_) => continue,
                Err(err) => debug!(filename = name, error = %err, "store entry vanished during listing"),
            }
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    pub async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    /// 以独占方式创建 `<毫秒时间戳>_<客户端文件名>`。
    ///
    /// 同一毫秒内出现同名上传时递增时间戳重试，已存在的文件永远不会被覆盖。
    pub async fn reserve_name(&self, original: &str) -> Result<(String, PathBuf), StorageError> {
        let client_name = client_file_name(original);
        let mut millis = Utc::now().timestamp_millis();
        for _ in 0..MAX_RESERVE_ATTEMPTS {
            let filename = format!("{millis}_{client_name}");
            Self::validate_name(&filename)?;
            let target = self.root.join(&filename);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .await
            {
                Ok(_) => return Ok((filename, target)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => millis += 1,
                Err(err) => return Err(StorageError::Io(err)),
            }
        }
        Err(StorageError::Io(io::Error::new(
            ErrorKind::AlreadyExists,
            "no free file name after retries",
        )))
    }
}

/// 只保留客户端文件名的最后一个路径段。
pub fn client_file_name(original: &str) -> String {
    let last = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .replace('\0', "");
    if last.is_empty() || last == "." || last == ".." {
        FALLBACK_CLIENT_NAME.to_string()
    } else {
        last
    }
}

fn format_timestamp(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug)]
pub enum StorageError {
    InvalidName,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::InvalidName => f.write_str("invalid file name"),
            StorageError::Io(err) => write!(f, "{err}"),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub filename: String,
    pub size: u64,
    pub mimetype: &'static str,
    pub uploaded_at: Option<String>,
}

impl StoredFile {
    fn new(filename: String, metadata: &Metadata) -> Self {
        // 部分文件系统不提供创建时间，退回到修改时间。
        let uploaded_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .map(format_timestamp);
        Self {
            mimetype: mimetype_for(&filename),
            size: metadata.len(),
            uploaded_at,
            filename,
        }
    }
}
