// 备份编排
//
// - mod.rs: 创建、校验、删除、保留期清理
// - build.rs: 按备份类型生成备份文件
// - restore.rs: 恢复
// - claims.rs: 恢复与删除之间的互斥

mod build;
mod claims;
mod restore;


use crate::config::AppConfig;
use crate::constants::backup::PARTIAL_SUFFIX;
use crate::db::BackupRepository;
use crate::dump::DumpProducer;
use crate::integrity;
use crate::record::{BackupKind, BackupOptions, BackupRecord};
use crate::scratch::ScratchSpace;
use crate::{BackupError, Result};
use claims::ClaimTable;
use chrono::{Duration, Utc};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 备份编排器
///
/// 持有配置、记录存储和转储生成器，对外提供 create / restore / verify。
/// 可以克隆后在多个任务中并发使用，克隆之间共享恢复和删除的占用表。
#[derive(Debug, Clone)]
pub struct BackupOrchestrator {
    config: AppConfig,
    repository: BackupRepository,
    dump_producer: DumpProducer,
    claims: ClaimTable,
}

impl BackupOrchestrator {
    /// 创建编排器，并确保备份目录和临时目录存在
    pub fn new(config: AppConfig, repository: BackupRepository) -> Result<Self> {
        config.ensure_storage_dirs()?;

        let dump_producer = DumpProducer::new(config.database.clone());
        Ok(Self {
            config,
            repository,
            dump_producer,
            claims: Arc::default(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 创建备份
    ///
    /// 记录依次经过 Pending、InProgress，成功后为 Completed。
    /// 任何失败都会先把记录标记为 Failed 并保存，然后把错误返回给调用方。
    pub async fn create(
        &self,
        kind: BackupKind,
        name: Option<String>,
        mut options: BackupOptions,
        description: Option<String>,
        requested_by: Option<i64>,
    ) -> Result<BackupRecord> {
        if kind == BackupKind::Database && options.compress.is_none() {
            options.compress = Some(self.config.backup.compress);
        }
        let name = name.unwrap_or_else(|| default_backup_name(kind));

        let mut record = self
            .repository
            .create_scheduled(name, kind, options, description, requested_by)
            .await?;
        info!(record_id = record.id(), kind = %kind, "开始创建备份: {}", record.name());

        match self.run_backup(&mut record).await {
            Ok(()) => {
                info!(
                    record_id = record.id(),
                    kind = %kind,
                    "✅ 备份创建成功: {}",
                    record.file_path().map(|p| p.display().to_string()).unwrap_or_default()
                );
                Ok(record)
            }
            Err(e) => {
                error!(record_id = record.id(), kind = %kind, "❌ 备份创建失败: {}", e);

                if let Err(mark_err) = record.mark_as_failed(e.to_string()) {
                    warn!(record_id = record.id(), "无法标记备份失败: {}", mark_err);
                }
                if let Err(save_err) = self.repository.save(&record).await {
                    error!(record_id = record.id(), "保存失败状态出错: {}", save_err);
                }
                Err(e)
            }
        }
    }

    async fn run_backup(&self, record: &mut BackupRecord) -> Result<()> {
        record.mark_as_in_progress()?;
        self.repository.save(record).await?;

        let scratch = ScratchSpace::acquire(self.config.get_temp_dir(), record.kind().as_str())?;
        let artifact = match record.kind() {
            BackupKind::Database => self.build_database(record, &scratch).await?,
            BackupKind::Files => self.build_files(record, &scratch).await?,
            BackupKind::Full => self.build_full(record, &scratch).await?,
        };

        self.finalize(record, &artifact).await?;
        scratch.release();
        Ok(())
    }

    /// 计算哈希，把备份文件移入备份目录，标记为 Completed 并保存
    ///
    /// 保存失败时删除已移入的备份文件，`record` 保持 InProgress，
    /// 由调用方标记为 Failed。
    async fn finalize(&self, record: &mut BackupRecord, artifact: &Path) -> Result<()> {
        let file_hash = integrity::hash_file(artifact).await?;
        let file_size = tokio::fs::metadata(artifact).await?.len();

        let destination = self
            .config
            .get_backup_dir()
            .join(build::artifact_file_name(record.kind(), record.is_compressed()));
        promote_artifact(artifact, &destination).await?;

        let mut completed = record.clone();
        let committed = match completed.mark_as_completed(&destination, file_size, file_hash) {
            Ok(()) => self.repository.save(&completed).await,
            Err(e) => Err(e),
        };

        if let Err(e) = committed {
            if let Err(remove_err) = tokio::fs::remove_file(&destination).await {
                warn!(
                    record_id = record.id(),
                    "删除未登记的备份文件失败 {}: {}",
                    destination.display(),
                    remove_err
                );
            }
            return Err(e);
        }

        *record = completed;
        Ok(())
    }

    /// 校验备份文件
    ///
    /// 没有记录哈希时视为通过；文件缺失或内容不一致时返回 `false`。
    pub async fn verify(&self, record: &BackupRecord) -> Result<bool> {
        let Some(expected_hash) = record.file_hash() else {
            debug!(record_id = record.id(), "备份没有记录哈希，跳过校验");
            return Ok(true);
        };

        let Some(path) = record.file_path().filter(|path| path.is_file()) else {
            warn!(record_id = record.id(), "备份文件不存在，校验失败");
            return Ok(false);
        };

        let matches = integrity::verify_file(path, expected_hash).await?;
        if matches {
            info!(record_id = record.id(), "✅ 备份文件校验通过");
        }
        Ok(matches)
    }

    /// 获取所有备份记录，最新的在前
    pub async fn list(&self) -> Result<Vec<BackupRecord>> {
        self.repository.list().await
    }

    /// 根据ID获取备份记录
    pub async fn get(&self, id: i64) -> Result<BackupRecord> {
        self.repository
            .get(id)
            .await?
            .ok_or(BackupError::RecordNotFound(id))
    }

    /// 删除备份文件和记录
    ///
    /// 记录正在被恢复时拒绝删除，删除期间新的恢复也会被拒绝。
    pub async fn delete(&self, id: i64) -> Result<()> {
        let _claim = self.claim_for_removal(id)?;

        let record = self.get(id).await?;
        if !record.status().is_terminal() {
            warn!(record_id = id, "删除未结束的备份记录 (状态: {})", record.status());
        }

        remove_artifact(&record).await?;
        self.repository.delete(id).await?;
        info!(record_id = id, "已删除备份");
        Ok(())
    }

    /// 配置的保留期限
    pub fn retention_period(&self) -> Duration {
        Duration::days(i64::from(self.config.backup.retention_days))
    }

    /// 删除早于 `max_age` 的已结束备份，返回删除的数量
    ///
    /// 正在恢复的备份会被跳过，留给下一次清理。
    pub async fn sweep_expired(&self, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_age;
        let candidates = self.repository.list_created_before(cutoff).await?;

        let mut removed = 0;
        for record in candidates.iter().filter(|record| record.is_expired(cutoff)) {
            let Ok(_claim) = self.claim_for_removal(record.id()) else {
                info!(record_id = record.id(), "备份正在恢复，本次清理跳过");
                continue;
            };

            if let Err(e) = remove_artifact(record).await {
                warn!(record_id = record.id(), "删除过期备份文件失败: {}", e);
                continue;
            }
            self.repository.delete(record.id()).await?;
            removed += 1;
        }

        info!("过期备份清理完成: 删除 {} 个 (截止 {})", removed, cutoff);
        Ok(removed)
    }
}

fn default_backup_name(kind: BackupKind) -> String {
    format!("{}-{}", kind, Utc::now().format("%Y-%m-%d %H:%M:%S"))
}

/// 把临时目录中的备份文件落盘后移动到最终位置
///
/// 先写到同目录下的 `.partial` 文件，再重命名到最终文件名，
/// 最终路径上只会出现完整的文件。
async fn promote_artifact(source: &Path, destination: &Path) -> Result<()> {
    let source = source.to_path_buf();
    let destination = destination.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let partial = partial_path(&destination);
        if let Err(e) = move_into_place(&source, &partial, &destination) {
            let _ = std::fs::remove_file(&partial);
            return Err(BackupError::archive_write(format!(
                "无法移动备份文件到 {}: {e}",
                destination.display()
            )));
        }

        debug!("备份文件已就位: {}", destination.display());
        Ok(())
    })
    .await?
}

fn move_into_place(source: &Path, partial: &Path, destination: &Path) -> std::io::Result<()> {
    std::fs::File::open(source)?.sync_all()?;
    if let Some(parent) = partial.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if std::fs::rename(source, partial).is_err() {
        // 临时目录和备份目录不在同一文件系统时只能复制
        std::fs::copy(source, partial)?;
        std::fs::File::open(partial)?.sync_all()?;
    }
    std::fs::rename(partial, destination)
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

async fn remove_artifact(record: &BackupRecord) -> Result<()> {
    let Some(path) = record.file_path() else {
        return Ok(());
    };

    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!("删除备份文件: {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
