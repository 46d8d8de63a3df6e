use anyhow::Context;
use backup_core::constants::config::get_database_path;
use backup_core::{AppConfig, BackupError, BackupOrchestrator, BackupRepository, Result};
use std::path::Path;
use tracing::debug;

use crate::cli::Commands;
use crate::commands;

#[derive(Clone)]
pub struct CliApp {
    pub config: AppConfig,
    pub orchestrator: BackupOrchestrator,
}

impl CliApp {
    /// 加载配置并初始化CLI应用
    ///
    /// 未指定配置文件时按默认顺序查找。
    pub async fn new_with_config(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => AppConfig::load_from_file(path),
            None => AppConfig::find_and_load_config(),
        }
        .context("加载配置失败")?;

        let db_path = get_database_path();
        debug!("打开备份记录数据库: {}", db_path.display());
        let repository = BackupRepository::connect(&db_path)
            .await
            .with_context(|| format!("无法打开备份记录数据库 {}", db_path.display()))?;

        let orchestrator = BackupOrchestrator::new(config.clone(), repository)
            .context("初始化备份存储目录失败")?;

        Ok(Self {
            config,
            orchestrator,
        })
    }

    /// 运行应用命令
    pub async fn run_command(&self, command: Commands) -> Result<()> {
        match command {
            // 已经在 main.rs 中处理
            Commands::Init { .. } => Err(BackupError::custom("init 命令不需要加载配置")),
            Commands::Create {
                kind,
                name,
                dirs,
                no_compress,
                description,
                requested_by,
            } => {
                let request = commands::CreateRequest {
                    kind: kind.into(),
                    name,
                    dirs,
                    no_compress,
                    description,
                    requested_by,
                };
                commands::run_create(self, request).await
            }
            Commands::List => commands::run_list(self).await,
            Commands::Show { id } => commands::run_show(self, id).await,
            Commands::Restore { id, target, force } => {
                commands::run_restore(self, id, target.as_deref(), force).await
            }
            Commands::Verify { id } => commands::run_verify(self, id).await,
            Commands::Delete { id } => commands::run_delete(self, id).await,
            Commands::Sweep { days } => commands::run_sweep(self, days).await,
        }
    }
}
