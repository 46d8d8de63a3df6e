use crate::error::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 备份类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// 数据库 + 应用目录
    Full,
    /// 仅数据库
    Database,
    /// 仅应用目录
    Files,
}

/// 备份状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Full => "full",
            BackupKind::Database => "database",
            BackupKind::Files => "files",
        }
    }

    /// 该类型是否包含数据库转储
    pub fn includes_database(&self) -> bool {
        matches!(self, BackupKind::Full | BackupKind::Database)
    }

    /// 该类型是否包含应用目录
    pub fn includes_files(&self) -> bool {
        matches!(self, BackupKind::Full | BackupKind::Files)
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(BackupKind::Full),
            "database" => Ok(BackupKind::Database),
            "files" => Ok(BackupKind::Files),
            other => Err(BackupError::custom(format!("未知的备份类型: {other}"))),
        }
    }
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Pending => "pending",
            BackupStatus::InProgress => "in_progress",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
        }
    }

    /// 终止状态之后只允许删除
    pub fn is_terminal(&self) -> bool {
        matches!(self, BackupStatus::Completed | BackupStatus::Failed)
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupStatus {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(BackupStatus::Pending),
            "in_progress" => Ok(BackupStatus::InProgress),
            "completed" => Ok(BackupStatus::Completed),
            "failed" => Ok(BackupStatus::Failed),
            other => Err(BackupError::custom(format!("未知的备份状态: {other}"))),
        }
    }
}

/// 备份选项
///
/// 除了引擎识别的几个键之外，调用方可以附带任意键值，原样持久化。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackupOptions {
    /// 要备份的目录列表，为空时使用配置中的默认目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directories: Option<Vec<PathBuf>>,
    /// 是否压缩，为空时使用配置中的默认值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl BackupOptions {
    pub fn with_directories(mut self, directories: Vec<PathBuf>) -> Self {
        self.directories = Some(directories);
        self
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|value| value.as_str())
    }
}

/// 备份记录
///
/// 字段只能通过生命周期方法修改：
/// `Pending -> InProgress -> Completed | Failed`，以及 `Pending -> Failed`。
/// 进入终止状态后记录不可再变更，只能删除。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupRecord {
    id: i64,
    name: String,
    kind: BackupKind,
    status: BackupStatus,
    options: BackupOptions,
    description: Option<String>,
    file_path: Option<PathBuf>,
    file_name: Option<String>,
    file_size: Option<u64>,
    file_hash: Option<String>,
    is_compressed: bool,
    error_message: Option<String>,
    created_by: Option<i64>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

/// 数据库中读出的原始字段，仅供存储层重建记录
#[derive(Debug, Clone)]
pub(crate) struct StoredRecord {
    pub id: i64,
    pub name: String,
    pub kind: BackupKind,
    pub status: BackupStatus,
    pub options: BackupOptions,
    pub description: Option<String>,
    pub file_path: Option<PathBuf>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub file_hash: Option<String>,
    pub is_compressed: bool,
    pub error_message: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BackupRecord {
    /// 创建一条待执行的备份记录，id 由存储层分配
    ///
    /// 只有数据库备份可以选择不压缩，文件和完整备份始终是 ZIP 归档。
    pub fn create_scheduled(
        name: impl Into<String>,
        kind: BackupKind,
        options: BackupOptions,
        description: Option<String>,
        requested_by: Option<i64>,
    ) -> Self {
        let is_compressed = kind != BackupKind::Database || options.compress != Some(false);
        Self {
            id: 0,
            name: name.into(),
            kind,
            status: BackupStatus::Pending,
            options,
            description,
            file_path: None,
            file_name: None,
            file_size: None,
            file_hash: None,
            is_compressed,
            error_message: None,
            created_by: requested_by,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub(crate) fn assign_id(&mut self, id: i64) {
        self.id = id;
    }

    pub(crate) fn from_stored(stored: StoredRecord) -> Self {
        Self {
            id: stored.id,
            name: stored.name,
            kind: stored.kind,
            status: stored.status,
            options: stored.options,
            description: stored.description,
            file_path: stored.file_path,
            file_name: stored.file_name,
            file_size: stored.file_size,
            file_hash: stored.file_hash,
            is_compressed: stored.is_compressed,
            error_message: stored.error_message,
            created_by: stored.created_by,
            created_at: stored.created_at,
            completed_at: stored.completed_at,
        }
    }

    /// 构建期间记录额外信息（例如实际使用的转储策略）
    pub(crate) fn annotate(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        if !self.status.is_terminal() {
            self.options.extra.insert(key.to_string(), value.into());
        }
    }

    /// 开始执行
    pub fn mark_as_in_progress(&mut self) -> Result<()> {
        self.transition(BackupStatus::InProgress)?;
        Ok(())
    }

    /// 执行成功，登记备份文件信息
    pub fn mark_as_completed(
        &mut self,
        file_path: impl Into<PathBuf>,
        file_size: u64,
        file_hash: impl Into<String>,
    ) -> Result<()> {
        self.transition(BackupStatus::Completed)?;

        let file_path = file_path.into();
        self.file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string());
        self.file_path = Some(file_path);
        self.file_size = Some(file_size);
        self.file_hash = Some(file_hash.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// 执行失败，记录错误信息
    pub fn mark_as_failed(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(BackupStatus::Failed)?;

        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, to: BackupStatus) -> Result<()> {
        let allowed = matches!(
            (self.status, to),
            (BackupStatus::Pending, BackupStatus::InProgress)
                | (BackupStatus::InProgress, BackupStatus::Completed)
                | (BackupStatus::Pending, BackupStatus::Failed)
                | (BackupStatus::InProgress, BackupStatus::Failed)
        );

        if !allowed {
            return Err(BackupError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        self.status = to;
        Ok(())
    }

    /// 备份文件是否存在
    pub fn file_exists(&self) -> bool {
        self.file_path.as_deref().is_some_and(Path::is_file)
    }

    /// 是否超过保留期限
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.status.is_terminal() && self.created_at < cutoff
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BackupKind {
        self.kind
    }

    pub fn status(&self) -> BackupStatus {
        self.status
    }

    pub fn options(&self) -> &BackupOptions {
        &self.options
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    pub fn file_hash(&self) -> Option<&str> {
        self.file_hash.as_deref()
    }

    pub fn is_compressed(&self) -> bool {
        self.is_compressed
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn created_by(&self) -> Option<i64> {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}
