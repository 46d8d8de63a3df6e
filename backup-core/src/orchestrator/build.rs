use super::BackupOrchestrator;
use crate::archive::{ArchiveWriter, join_archive_name};
use crate::constants::archive::{
    ARCHIVED_DIRECTORIES_KEY, DATABASE_DIR, DATABASE_DUMP_ENTRY, EXTERNAL_PREFIX,
};
use crate::constants::backup::{ARCHIVE_EXTENSION, BACKUP_PREFIX, DUMP_EXTENSION};
use crate::constants::dump::STRATEGY_OPTION_KEY;
use crate::dump::DumpOutcome;
use crate::record::{BackupKind, BackupOptions, BackupRecord};
use crate::scratch::ScratchSpace;
use crate::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 临时目录中归档文件的名称，最终名称在落盘时生成
const SCRATCH_ARCHIVE_NAME: &str = "artifact.zip";

/// 生成备份文件名: `backup_{kind}_{时间}_{随机后缀}.{zip|sql}`
pub(super) fn artifact_file_name(kind: BackupKind, compressed: bool) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
    let suffix = Uuid::new_v4().simple().to_string();
    let extension = if compressed {
        ARCHIVE_EXTENSION
    } else {
        DUMP_EXTENSION
    };
    format!("{BACKUP_PREFIX}{kind}_{timestamp}_{}.{extension}", &suffix[..8])
}

impl BackupOrchestrator {
    /// 仅数据库：转储，按需打包成只含一个条目的归档
    pub(super) async fn build_database(
        &self,
        record: &mut BackupRecord,
        scratch: &ScratchSpace,
    ) -> Result<PathBuf> {
        let dump = self.produce_dump(record, scratch).await?;

        if !record.is_compressed() {
            debug!(record_id = record.id(), "数据库备份不压缩，直接使用转储文件");
            return Ok(dump.path);
        }

        let archive_path = scratch.join(SCRATCH_ARCHIVE_NAME);
        let compression_level = self.config.backup.compression_level;
        let dump_path = dump.path.clone();

        tokio::task::spawn_blocking(move || {
            let mut writer = ArchiveWriter::open(&archive_path, compression_level)?;
            writer.add_file(&dump_path, DATABASE_DUMP_ENTRY)?;
            writer.close()
        })
        .await?
    }

    /// 仅应用目录：把每个目录打包到归档中各自的前缀下
    pub(super) async fn build_files(
        &self,
        record: &mut BackupRecord,
        scratch: &ScratchSpace,
    ) -> Result<PathBuf> {
        let plan = self.plan_directories(record)?;
        let archive_path = scratch.join(SCRATCH_ARCHIVE_NAME);
        let compression_level = self.config.backup.compression_level;

        tokio::task::spawn_blocking(move || {
            let mut writer = ArchiveWriter::open(&archive_path, compression_level)?;
            add_directories(&mut writer, &plan)?;
            writer.close()
        })
        .await?
    }

    /// 完整备份：数据库转储加上应用目录，放进同一个归档
    ///
    /// 无论打包是否成功，临时转储文件都会被删除。
    pub(super) async fn build_full(
        &self,
        record: &mut BackupRecord,
        scratch: &ScratchSpace,
    ) -> Result<PathBuf> {
        let plan = self.plan_directories(record)?;
        let dump = self.produce_dump(record, scratch).await?;

        let archive_path = scratch.join(SCRATCH_ARCHIVE_NAME);
        let compression_level = self.config.backup.compression_level;
        let dump_path = dump.path.clone();

        let result = tokio::task::spawn_blocking(move || {
            let mut writer = ArchiveWriter::open(&archive_path, compression_level)?;
            writer.add_file(&dump_path, DATABASE_DUMP_ENTRY)?;
            add_directories(&mut writer, &plan)?;
            writer.close()
        })
        .await;

        if let Err(e) = tokio::fs::remove_file(&dump.path).await {
            warn!("删除临时转储文件失败 {}: {}", dump.path.display(), e);
        }

        result?
    }

    /// 生成数据库转储，并在记录中登记实际使用的策略
    async fn produce_dump(
        &self,
        record: &mut BackupRecord,
        scratch: &ScratchSpace,
    ) -> Result<DumpOutcome> {
        let outcome = self
            .dump_producer
            .produce_dump(&scratch.join(DATABASE_DIR))
            .await?;

        record.annotate(STRATEGY_OPTION_KEY, outcome.strategy.as_str());
        if outcome.is_synthetic() {
            warn!(
                record_id = record.id(),
                kind = %record.kind(),
                "⚠️  备份使用了合成转储，不包含真实数据库数据"
            );
        }

        Ok(outcome)
    }

    /// 确定要备份的目录及其在归档中的前缀，并登记到记录中供恢复使用
    fn plan_directories(&self, record: &mut BackupRecord) -> Result<BTreeMap<String, PathBuf>> {
        let plan = self.directory_plan(record.options());

        let recorded: BTreeMap<&str, String> = plan
            .iter()
            .map(|(prefix, source)| (prefix.as_str(), source.to_string_lossy().to_string()))
            .collect();
        record.annotate(ARCHIVED_DIRECTORIES_KEY, serde_json::to_value(recorded)?);

        Ok(plan)
    }

    /// 目录前缀规划
    ///
    /// 应用根目录下的目录使用相对路径作为前缀（例如 `storage/app`），
    /// 其它目录放到 `external/<目录名>` 下。
    pub(super) fn directory_plan(&self, options: &BackupOptions) -> BTreeMap<String, PathBuf> {
        let directories = options
            .directories
            .clone()
            .unwrap_or_else(|| self.config.backup.directories.clone());

        let mut plan: BTreeMap<String, PathBuf> = BTreeMap::new();
        for dir in directories {
            let source = self.config.resolve_app_path(&dir);
            if plan.values().any(|existing| existing == &source) {
                continue;
            }

            let relative = source
                .strip_prefix(&self.config.storage.app_root)
                .map(|relative| join_archive_name("", relative))
                .unwrap_or_default();

            let base = if relative.is_empty() || relative.split('/').next() == Some(DATABASE_DIR) {
                let name = source
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| "root".to_string());
                join_archive_name(EXTERNAL_PREFIX, Path::new(&name))
            } else {
                relative
            };

            let mut prefix = base.clone();
            let mut n = 1;
            while plan.contains_key(&prefix) {
                n += 1;
                prefix = format!("{base}-{n}");
            }
            plan.insert(prefix, source);
        }

        plan
    }
}

fn add_directories(writer: &mut ArchiveWriter, plan: &BTreeMap<String, PathBuf>) -> Result<()> {
    for (prefix, source) in plan {
        let added = writer.add_tree(source, prefix)?;
        info!("打包目录 {} -> {}/ ({} 个条目)", source.display(), prefix, added);
    }

    if writer.entry_count() == 0 {
        warn!("所有备份目录都不存在，归档为空");
    }
    Ok(())
}
