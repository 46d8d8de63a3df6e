use backup_core::BackupKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// 备份类型参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// 数据库 + 应用目录
    Full,
    /// 仅数据库
    Database,
    /// 仅应用目录
    Files,
}

impl From<KindArg> for BackupKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Full => BackupKind::Full,
            KindArg::Database => BackupKind::Database,
            KindArg::Files => BackupKind::Files,
        }
    }
}

/// Backup CLI - 应用数据库与文件的备份、校验和恢复工具
#[derive(Parser, Debug)]
#[command(name = "backup-cli")]
#[command(version, about)]
pub struct Cli {
    /// 配置文件路径（默认依次查找 config.toml、backup.toml、.backup.toml）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 首次使用时初始化，创建配置文件、目录和数据库
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 创建备份
    Create {
        /// 备份类型
        #[arg(value_enum)]
        kind: KindArg,
        /// 备份名称
        #[arg(long)]
        name: Option<String>,
        /// 要备份的目录，可以重复指定（默认使用配置中的目录）
        #[arg(long = "dir", value_name = "DIR")]
        dirs: Vec<PathBuf>,
        /// 数据库备份不压缩，直接保存 SQL 文件
        #[arg(long)]
        no_compress: bool,
        /// 备份说明
        #[arg(long)]
        description: Option<String>,
        /// 发起备份的用户ID
        #[arg(long)]
        requested_by: Option<i64>,
    },
    /// 列出所有备份
    List,
    /// 显示备份详情
    Show {
        /// 备份 ID
        id: i64,
    },
    /// 从备份恢复
    Restore {
        /// 备份 ID
        id: i64,
        /// 把目录恢复到指定位置，而不是覆盖原目录
        #[arg(long)]
        target: Option<PathBuf>,
        /// 跳过确认
        #[arg(long)]
        force: bool,
    },
    /// 校验备份文件完整性
    Verify {
        /// 备份 ID
        id: i64,
    },
    /// 删除备份
    Delete {
        /// 备份 ID
        id: i64,
    },
    /// 清理过期备份
    Sweep {
        /// 保留天数（默认使用配置中的 retention_days）
        #[arg(long)]
        days: Option<u32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create_with_directories() {
        let cli = Cli::try_parse_from([
            "backup-cli",
            "-v",
            "create",
            "files",
            "--dir",
            "public",
            "--dir",
            "storage/app",
            "--requested-by",
            "7",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert!(cli.config.is_none());
        match cli.command {
            Commands::Create {
                kind,
                dirs,
                requested_by,
                no_compress,
                ..
            } => {
                assert_eq!(BackupKind::from(kind), BackupKind::Files);
                assert_eq!(
                    dirs,
                    vec![PathBuf::from("public"), PathBuf::from("storage/app")]
                );
                assert_eq!(requested_by, Some(7));
                assert!(!no_compress);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_restore_to_target() {
        let cli = Cli::try_parse_from([
            "backup-cli",
            "--config",
            "custom.toml",
            "restore",
            "12",
            "--target",
            "/tmp/restore",
            "--force",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Commands::Restore { id, target, force } => {
                assert_eq!(id, 12);
                assert_eq!(target, Some(PathBuf::from("/tmp/restore")));
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["backup-cli", "create", "weekly"]).is_err());
    }
}
