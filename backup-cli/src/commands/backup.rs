use crate::app::CliApp;
use crate::utils::format_size;
use backup_core::constants::dump::STRATEGY_OPTION_KEY;
use backup_core::{BackupKind, BackupOptions, BackupRecord, BackupStatus, Result};
use chrono::Duration;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// `create` 命令参数
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub kind: BackupKind,
    pub name: Option<String>,
    pub dirs: Vec<PathBuf>,
    pub no_compress: bool,
    pub description: Option<String>,
    pub requested_by: Option<i64>,
}

impl CreateRequest {
    fn options(&self) -> BackupOptions {
        let mut options = BackupOptions::default();
        if !self.dirs.is_empty() {
            options = options.with_directories(self.dirs.clone());
        }
        if self.no_compress {
            options = options.with_compress(false);
        }
        options
    }
}

/// 创建备份
pub async fn run_create(app: &CliApp, request: CreateRequest) -> Result<()> {
    info!("💾 创建{}备份", kind_display(request.kind));
    info!("===============");

    if request.no_compress && request.kind != BackupKind::Database {
        warn!("⚠️  --no-compress 只对数据库备份生效，文件和完整备份始终为 ZIP 归档");
    }

    if request.kind.includes_files() {
        let dirs = if request.dirs.is_empty() {
            &app.config.backup.directories
        } else {
            &request.dirs
        };
        info!("   备份目录:");
        for dir in dirs {
            let resolved = app.config.resolve_app_path(dir);
            if resolved.is_dir() {
                info!("     ✅ {}", resolved.display());
            } else {
                warn!("     ⚠️  {} (不存在，将被跳过)", resolved.display());
            }
        }
    }
    if request.kind.includes_database() {
        info!(
            "   数据库: {}@{}:{}/{}",
            app.config.database.username,
            app.config.database.host,
            app.config.database.port,
            app.config.database.database
        );
    }
    info!("   存储目录: {}", app.config.get_backup_dir().display());

    let options = request.options();
    match app
        .orchestrator
        .create(
            request.kind,
            request.name,
            options,
            request.description,
            request.requested_by,
        )
        .await
    {
        Ok(record) => {
            info!("🎉 备份创建成功！");
            print_record_details(&record);

            if record.options().extra_str(STRATEGY_OPTION_KEY) == Some("synthetic") {
                warn!("⚠️  未找到可用的数据库转储工具，本次备份只包含合成的占位转储！");
                info!("💡 请安装 {} 或在配置中设置 alternate_bin_dir", app.config.database.dump_binary);
            }
            Ok(())
        }
        Err(e) => {
            error!("❌ 备份创建失败: {}", e);
            info!("💡 请检查:");
            info!("   - 备份目录是否有写入权限");
            info!("   - 磁盘空间是否充足");
            info!("   - 数据库配置是否正确");
            info!("   失败记录可通过 'backup-cli list' 查看");
            Err(e)
        }
    }
}

/// 列出备份
pub async fn run_list(app: &CliApp) -> Result<()> {
    let backups = app.orchestrator.list().await?;

    if backups.is_empty() {
        info!("📦 暂无备份记录");
        info!("💡 使用以下命令创建备份:");
        info!("   backup-cli create full");
        return Ok(());
    }

    info!("📦 备份列表");
    info!("============");

    let mut available = 0;
    let mut missing = 0;
    let mut failed = 0;
    let mut total_size = 0u64;

    info!(
        "{:<4} {:<8} {:<20} {:<12} {:<10} {}",
        "ID", "类型", "创建时间", "状态", "大小", "名称"
    );
    info!("{}", "-".repeat(90));

    for backup in &backups {
        let status_display = match backup.status() {
            BackupStatus::Completed if backup.file_exists() => {
                available += 1;
                "✅ 可用"
            }
            BackupStatus::Completed => {
                missing += 1;
                "❌ 文件缺失"
            }
            BackupStatus::Failed => {
                failed += 1;
                "❌ 失败"
            }
            BackupStatus::InProgress => "⏳ 进行中",
            BackupStatus::Pending => "⏳ 等待中",
        };

        let size_display = match backup.file_size() {
            Some(size) if backup.file_exists() => {
                total_size += size;
                format_size(size)
            }
            _ => "---".to_string(),
        };

        info!(
            "{:<4} {:<8} {:<20} {:<12} {:<10} {}",
            backup.id(),
            kind_display(backup.kind()),
            backup.created_at().format("%Y-%m-%d %H:%M:%S"),
            status_display,
            size_display,
            backup.name()
        );

        if backup.status() == BackupStatus::Completed && !backup.file_exists() {
            warn!("     ⚠️  警告: 备份文件不存在，无法用于恢复！");
            if let Some(path) = backup.file_path() {
                warn!("         预期路径: {}", path.display());
            }
        }
    }

    info!("{}", "-".repeat(90));

    info!("📊 备份统计:");
    info!("   总备份数: {}", backups.len());
    info!("   可用备份: {} ✅", available);
    if failed > 0 {
        warn!("   失败备份: {} ❌", failed);
    }
    if missing > 0 {
        warn!("   文件缺失: {} ❌", missing);
    }
    if total_size > 0 {
        info!("   总大小: {}", format_size(total_size));
    }

    if available > 0 {
        info!("💡 可用操作:");
        info!("   - 查看详情: backup-cli show <备份ID>");
        info!("   - 校验备份: backup-cli verify <备份ID>");
        info!("   - 从备份恢复: backup-cli restore <备份ID>");
    }

    Ok(())
}

/// 显示备份详情
pub async fn run_show(app: &CliApp, backup_id: i64) -> Result<()> {
    let record = app.orchestrator.get(backup_id).await?;
    info!("📦 备份详情");
    info!("============");
    print_record_details(&record);
    Ok(())
}

/// 校验备份
pub async fn run_verify(app: &CliApp, backup_id: i64) -> Result<()> {
    let record = app.orchestrator.get(backup_id).await?;

    if record.file_hash().is_none() {
        warn!("⚠️  备份 {} 没有记录哈希，无法校验 (状态: {})", backup_id, record.status());
        return Ok(());
    }

    if app.orchestrator.verify(&record).await? {
        info!("✅ 备份 {} 校验通过", backup_id);
        Ok(())
    } else {
        error!("❌ 备份 {} 校验失败：文件缺失或内容已被修改", backup_id);
        Err(backup_core::BackupError::custom(format!(
            "备份 {backup_id} 完整性校验失败"
        )))
    }
}

/// 删除备份
pub async fn run_delete(app: &CliApp, backup_id: i64) -> Result<()> {
    app.orchestrator.delete(backup_id).await?;
    info!("🗑️  已删除备份 {}", backup_id);
    Ok(())
}

/// 清理过期备份
pub async fn run_sweep(app: &CliApp, days: Option<u32>) -> Result<()> {
    let max_age = match days {
        Some(days) => Duration::days(i64::from(days)),
        None => app.orchestrator.retention_period(),
    };

    info!("🧹 清理 {} 天前的备份...", max_age.num_days());
    let removed = app.orchestrator.sweep_expired(max_age).await?;

    if removed == 0 {
        info!("✅ 没有需要清理的备份");
    } else {
        info!("✅ 已清理 {} 个过期备份", removed);
    }
    Ok(())
}

fn kind_display(kind: BackupKind) -> &'static str {
    match kind {
        BackupKind::Full => "完整",
        BackupKind::Database => "数据库",
        BackupKind::Files => "文件",
    }
}

fn print_record_details(record: &BackupRecord) {
    info!("   备份ID: {}", record.id());
    info!("   名称: {}", record.name());
    info!("   类型: {}", kind_display(record.kind()));
    info!("   状态: {}", record.status());
    if let Some(description) = record.description() {
        info!("   说明: {}", description);
    }
    if let Some(user) = record.created_by() {
        info!("   发起人: {}", user);
    }
    info!("   创建时间: {}", record.created_at().format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed_at) = record.completed_at() {
        info!("   结束时间: {}", completed_at.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(path) = record.file_path() {
        info!("   备份文件: {}", path.display());
    }
    if let Some(size) = record.file_size() {
        info!("   文件大小: {}", format_size(size));
    }
    if let Some(hash) = record.file_hash() {
        info!("   SHA-256: {}", hash);
    }
    info!("   压缩: {}", if record.is_compressed() { "是" } else { "否" });
    if let Some(strategy) = record.options().extra_str(STRATEGY_OPTION_KEY) {
        info!("   转储方式: {}", strategy);
    }
    if let Some(message) = record.error_message() {
        error!("   错误信息: {}", message);
    }
    if !record.options().extra.is_empty() || record.options().directories.is_some() {
        if let Ok(options) = serde_json::to_string(record.options()) {
            info!("   选项: {}", options);
        }
    }
}
