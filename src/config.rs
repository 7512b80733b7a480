//! 命令行参数与服务默认配置。

use clap::Parser;
use shadow_rs::formatcp;
use std::path::{Path, PathBuf};

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;
pub const UPLOAD_FIELD_NAME: &str = "file";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_STORE_DIR: &str = "uploads";
pub const DEFAULT_STAGING_DIR: &str = ".upload_tmp";
pub const DEFAULT_STAGING_TTL_SECS: u64 = 24 * 60 * 60;
pub const STAGING_CLEAN_INTERVAL_SECS: u64 = 900;
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "drop-store", version = VERSION_INFO, about = "Drop-in file store server")]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "STORE_DIR",
        default_value = DEFAULT_STORE_DIR,
        help = "Directory holding uploaded files"
    )]
    pub store_dir: String,
    #[arg(
        long,
        env = "STAGING_DIR",
        default_value = DEFAULT_STAGING_DIR,
        help = "Directory for in-flight upload parts"
    )]
    pub staging_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "HOST",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "CORS_ORIGINS",
        help = "Comma separated CORS origins (any origin when unset)"
    )]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "STAGING_TTL_SECS",
        default_value_t = DEFAULT_STAGING_TTL_SECS,
        help = "Staged part cleanup threshold in seconds (0 to disable)"
    )]
    pub staging_ttl_secs: u64,
}

/// 加载 `.env` 文件到进程环境，已存在的环境变量不会被覆盖。
///
/// 未指定路径时从工作目录向上查找 `.env`；返回实际加载的文件。
pub fn load_env_file(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => dotenvy::from_path(path).ok().map(|_| path.to_path_buf()),
        None => dotenvy::dotenv().ok(),
    }
}
