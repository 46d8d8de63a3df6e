use crate::record::BackupStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackupError>;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("不支持的数据库引擎: {0}")]
    UnsupportedEngine(String),

    #[error("无法生成数据库转储: {0}")]
    DumpUnavailable(String),

    #[error("归档写入失败: {0}")]
    ArchiveWrite(String),

    #[error("恢复失败: {0}")]
    Restore(String),

    #[error("备份记录 {id} 状态为 {status}，无法执行该操作: {reason}")]
    InvalidState {
        id: i64,
        status: BackupStatus,
        reason: String,
    },

    #[error("非法状态转换: {from} -> {to}")]
    InvalidTransition { from: BackupStatus, to: BackupStatus },

    #[error("备份记录不存在: {0}")]
    RecordNotFound(i64),

    #[error("备份记录 {0} 正在被恢复或删除，请稍后再试")]
    RecordBusy(i64),

    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("配置序列化错误: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("配置文件未找到")]
    ConfigNotFound,

    #[error("DuckDB数据库错误: {0}")]
    DuckDb(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("ZIP 文件错误: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("目录遍历错误: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("路径错误: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    #[error("自定义错误: {0}")]
    Custom(String),
}

// 为DuckDB错误实现From trait
impl From<duckdb::Error> for BackupError {
    fn from(err: duckdb::Error) -> Self {
        BackupError::DuckDb(err.to_string())
    }
}

impl BackupError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn archive_write(msg: impl Into<String>) -> Self {
        Self::ArchiveWrite(msg.into())
    }

    pub fn restore(msg: impl Into<String>) -> Self {
        Self::Restore(msg.into())
    }

    pub fn dump_unavailable(msg: impl Into<String>) -> Self {
        Self::DumpUnavailable(msg.into())
    }
}
