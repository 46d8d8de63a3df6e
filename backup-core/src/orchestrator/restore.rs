use super::BackupOrchestrator;
use crate::archive::extract_all;
use crate::constants::archive::{ARCHIVED_DIRECTORIES_KEY, DATABASE_DUMP_ENTRY};
use crate::record::{BackupKind, BackupRecord, BackupStatus};
use crate::scratch::ScratchSpace;
use crate::{BackupError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

impl BackupOrchestrator {
    /// 恢复备份，目录写回原来的位置
    pub async fn restore(&self, record: &BackupRecord) -> Result<bool> {
        self.restore_into(record, None).await
    }

    /// 恢复备份，目录写到 `target_root` 下各自的前缀中
    ///
    /// 数据库部分仍然回放到配置的数据库。
    pub async fn restore_to(&self, record: &BackupRecord, target_root: &Path) -> Result<bool> {
        self.restore_into(record, Some(target_root)).await
    }

    async fn restore_into(&self, record: &BackupRecord, target_root: Option<&Path>) -> Result<bool> {
        let _lease = self.acquire_restore_lease(record.id())?;
        let artifact = ensure_restorable(record)?;

        info!(
            record_id = record.id(),
            kind = %record.kind(),
            "开始恢复备份: {}",
            artifact.display()
        );

        let scratch = ScratchSpace::acquire(self.config.get_temp_dir(), "restore")?;
        let result = self
            .restore_from_artifact(record, &artifact, &scratch, target_root)
            .await;
        scratch.release();

        match result {
            Ok(()) => {
                info!(record_id = record.id(), kind = %record.kind(), "✅ 备份恢复完成");
                Ok(true)
            }
            Err(e) => {
                error!(record_id = record.id(), kind = %record.kind(), "❌ 备份恢复失败: {}", e);
                Err(e)
            }
        }
    }

    async fn restore_from_artifact(
        &self,
        record: &BackupRecord,
        artifact: &Path,
        scratch: &ScratchSpace,
        target_root: Option<&Path>,
    ) -> Result<()> {
        // 未压缩的数据库备份本身就是转储文件
        if record.kind() == BackupKind::Database && !record.is_compressed() {
            return self.dump_producer.replay_dump(artifact).await;
        }

        let extracted = scratch.join("extracted");
        let archive = artifact.to_path_buf();
        let destination = extracted.clone();
        let count = tokio::task::spawn_blocking(move || extract_all(&archive, &destination)).await??;
        info!("解压完成: {} 个文件", count);

        if record.kind().includes_database() {
            let dump = extracted.join(DATABASE_DUMP_ENTRY);
            if !dump.is_file() {
                return Err(BackupError::restore(format!(
                    "归档中缺少数据库转储 {DATABASE_DUMP_ENTRY}"
                )));
            }
            self.dump_producer.replay_dump(&dump).await?;
        }

        if record.kind().includes_files() {
            let plan = self.archived_directories(record);
            let target_root = target_root.map(Path::to_path_buf);

            tokio::task::spawn_blocking(move || {
                copy_directories_back(&extracted, &plan, target_root.as_deref())
            })
            .await??;
        }

        Ok(())
    }

    /// 归档前缀到原始目录的对应关系
    ///
    /// 优先使用备份时登记的信息；旧记录没有登记时按当前配置重新计算。
    fn archived_directories(&self, record: &BackupRecord) -> BTreeMap<String, PathBuf> {
        record
            .options()
            .extra
            .get(ARCHIVED_DIRECTORIES_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_else(|| self.directory_plan(record.options()))
    }
}

/// 只有已完成且备份文件存在的记录可以恢复，检查失败时不改动任何文件
fn ensure_restorable(record: &BackupRecord) -> Result<PathBuf> {
    if record.status() != BackupStatus::Completed {
        return Err(BackupError::InvalidState {
            id: record.id(),
            status: record.status(),
            reason: "只有已完成的备份可以恢复".to_string(),
        });
    }

    match record.file_path() {
        Some(path) if record.file_exists() => Ok(path.to_path_buf()),
        _ => Err(BackupError::InvalidState {
            id: record.id(),
            status: record.status(),
            reason: "备份文件不存在".to_string(),
        }),
    }
}

fn copy_directories_back(
    extracted: &Path,
    plan: &BTreeMap<String, PathBuf>,
    target_root: Option<&Path>,
) -> Result<()> {
    for (prefix, original) in plan {
        let source = extracted.join(prefix);
        if !source.is_dir() {
            warn!("归档中没有目录 {}/，跳过", prefix);
            continue;
        }

        let destination = match target_root {
            Some(root) => root.join(prefix),
            None => original.clone(),
        };

        let copied = copy_tree(&source, &destination)?;
        info!("恢复目录 {}/ -> {} ({} 个文件)", prefix, destination.display(), copied);
    }
    Ok(())
}

/// 复制目录树，已存在的文件会被覆盖
fn copy_tree(source: &Path, destination: &Path) -> Result<usize> {
    let mut copied = 0;

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(source)?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| {
                BackupError::restore(format!("无法写入 {}: {e}", target.display()))
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}
