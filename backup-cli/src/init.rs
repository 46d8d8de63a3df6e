use backup_core::constants::config::{CONFIG_FILE_NAME, get_database_path};
use backup_core::{AppConfig, BackupRepository, Result};
use std::path::Path;
use tracing::{info, warn};

/// 运行独立的初始化流程
pub async fn run_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    info!("💾 Backup CLI 初始化");
    info!("====================");

    let config_path = config_path.unwrap_or(Path::new(CONFIG_FILE_NAME));
    let db_path = get_database_path();

    if !initialize(AppConfig::default(), config_path, &db_path, force).await? {
        warn!("⚠️  检测到已存在的配置文件或数据库文件");
        info!("如果您要重新初始化，请使用 --force 参数");
        info!("示例: backup-cli init --force");
        return Ok(());
    }

    info!("🎉 初始化完成！");
    info!("");
    info!("📝 接下来的步骤:");
    info!("   1️⃣  编辑 {} 填写数据库连接信息和要备份的目录", config_path.display());
    info!("   2️⃣  运行 'backup-cli create full' 创建第一个完整备份");
    info!("   3️⃣  运行 'backup-cli verify <备份ID>' 校验备份文件");
    info!("");
    info!("💡 提示:");
    info!("   - 数据库文件: {} (存储备份记录)", db_path.display());
    info!("   - 使用 'backup-cli --help' 查看所有可用命令");

    Ok(())
}

/// 写入配置文件、创建目录并初始化数据库
///
/// 已经初始化过且没有 `force` 时不做任何修改，返回 `false`。
async fn initialize(
    config: AppConfig,
    config_path: &Path,
    db_path: &Path,
    force: bool,
) -> Result<bool> {
    if !force && (config_path.exists() || db_path.exists()) {
        return Ok(false);
    }

    info!("📋 步骤 1: 创建配置文件和目录结构");
    config.save_to_file(config_path)?;
    info!("   ✅ 创建配置文件: {}", config_path.display());

    config.ensure_storage_dirs()?;
    info!("   ✅ 创建目录结构:");
    info!("      - {} (备份存储目录)", config.get_backup_dir().display());
    info!("      - {} (临时工作目录)", config.get_temp_dir().display());

    info!("📋 步骤 2: 初始化数据库");
    BackupRepository::connect(db_path).await?;
    info!("   ✅ 创建DuckDB数据库: {}", db_path.display());

    Ok(true)
}
