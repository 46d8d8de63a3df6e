use crate::app::CliApp;
use crate::utils::confirm;
use backup_core::{BackupKind, Result};
use std::path::Path;
use tracing::{error, info, warn};

/// 从备份恢复
pub async fn run_restore(
    app: &CliApp,
    backup_id: i64,
    target: Option<&Path>,
    force: bool,
) -> Result<()> {
    let record = app.orchestrator.get(backup_id).await?;

    if !force {
        match (record.kind(), target) {
            (BackupKind::Files, Some(_)) => {}
            (BackupKind::Database, _) | (BackupKind::Full, _) => {
                warn!(
                    "⚠️  警告: 此操作将把备份中的数据回放到数据库 {}!",
                    app.config.database.database
                );
            }
            (BackupKind::Files, None) => {
                warn!("⚠️  警告: 此操作将覆盖应用目录中的同名文件!");
            }
        }

        if !confirm(&format!("请确认您要从备份 {backup_id} 恢复"))? {
            warn!("操作已取消");
            return Ok(());
        }
    }

    info!("开始恢复备份 {} ({})...", record.id(), record.name());

    let result = match target {
        Some(target) => {
            info!("   目录恢复位置: {}", target.display());
            app.orchestrator.restore_to(&record, target).await
        }
        None => app.orchestrator.restore(&record).await,
    };

    match result {
        Ok(_) => {
            info!("✅ 恢复完成");
            Ok(())
        }
        Err(e) => {
            error!("❌ 恢复失败: {}", e);
            info!("💡 请检查:");
            info!("   - 数据库客户端 {} 是否可用", app.config.database.client_binary);
            info!("   - 数据库连接信息是否正确");
            info!("   - 目标目录是否有写入权限");
            Err(e)
        }
    }
}
