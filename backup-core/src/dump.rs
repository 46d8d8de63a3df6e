use crate::config::DatabaseConfig;
use crate::constants::dump::{
    DUMP_FILE_NAME, SUPPORTED_ENGINE, SYNTHETIC_DUMP_MARKER, SYNTHETIC_SENTINEL_TABLE,
};
use crate::{BackupError, Result};
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// 单个策略的执行结果：成功时返回转储文件路径，失败时返回原因
pub type StrategyResult = std::result::Result<PathBuf, String>;

/// 数据库转储策略，按顺序尝试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpStrategy {
    /// PATH 中（或配置为绝对路径）的转储工具
    NativeClient,
    /// 备用安装目录中的同名工具
    AlternatePath,
    /// 合成的最小转储，不包含真实数据
    Synthetic,
}

impl DumpStrategy {
    /// 策略链
    pub const CHAIN: [DumpStrategy; 3] = [
        DumpStrategy::NativeClient,
        DumpStrategy::AlternatePath,
        DumpStrategy::Synthetic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DumpStrategy::NativeClient => "native",
            DumpStrategy::AlternatePath => "alternate_path",
            DumpStrategy::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for DumpStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 转储结果
#[derive(Debug, Clone)]
pub struct DumpOutcome {
    pub path: PathBuf,
    pub strategy: DumpStrategy,
}

impl DumpOutcome {
    /// 合成转储不代表真实数据
    pub fn is_synthetic(&self) -> bool {
        self.strategy == DumpStrategy::Synthetic
    }
}

/// 数据库转储生成器
#[derive(Debug, Clone)]
pub struct DumpProducer {
    config: DatabaseConfig,
}

impl DumpProducer {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    /// 在 `output_dir` 下生成 `database.sql`，返回第一个成功策略的结果
    pub async fn produce_dump(&self, output_dir: &Path) -> Result<DumpOutcome> {
        self.ensure_supported_engine()?;
        tokio::fs::create_dir_all(output_dir).await?;

        let target = output_dir.join(DUMP_FILE_NAME);
        let mut failures = Vec::new();

        for strategy in DumpStrategy::CHAIN {
            debug!("尝试转储策略: {}", strategy);
            match self.run_strategy(strategy, &target).await {
                Ok(path) => {
                    if strategy == DumpStrategy::Synthetic {
                        warn!(
                            "⚠️  原生转储工具不可用，使用合成转储；该备份不包含数据库 {} 的真实数据",
                            self.config.database
                        );
                    } else {
                        info!("数据库转储完成 (策略: {}): {}", strategy, path.display());
                    }
                    return Ok(DumpOutcome { path, strategy });
                }
                Err(reason) => {
                    warn!("转储策略 {} 失败: {}", strategy, reason);
                    failures.push(format!("{strategy}: {reason}"));
                }
            }
        }

        let _ = tokio::fs::remove_file(&target).await;
        Err(BackupError::dump_unavailable(failures.join("; ")))
    }

    /// 将转储文件回放到配置的数据库
    pub async fn replay_dump(&self, dump_path: &Path) -> Result<()> {
        self.ensure_supported_engine()?;

        if !dump_path.is_file() {
            return Err(BackupError::restore(format!(
                "转储文件不存在: {}",
                dump_path.display()
            )));
        }

        let client = self.resolve_binary(&self.config.client_binary).ok_or_else(|| {
            BackupError::restore(format!(
                "未找到数据库客户端 {}",
                self.config.client_binary
            ))
        })?;

        info!("回放数据库转储: {} -> {}", dump_path.display(), self.config.database);

        let input = std::fs::File::open(dump_path)?;
        let child = Command::new(&client)
            .args(self.connection_args())
            .arg(&self.config.database)
            .stdin(Stdio::from(input))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackupError::restore(format!("无法启动 {}: {e}", client.display())))?;

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BackupError::restore(format!(
                "{} 退出码 {}: {}",
                client.display(),
                output
                    .status
                    .code()
                    .map_or_else(|| "未知".to_string(), |code| code.to_string()),
                stderr
            )));
        }

        Ok(())
    }

    fn ensure_supported_engine(&self) -> Result<()> {
        if self.config.engine.eq_ignore_ascii_case(SUPPORTED_ENGINE) {
            Ok(())
        } else {
            Err(BackupError::UnsupportedEngine(self.config.engine.clone()))
        }
    }

    async fn run_strategy(&self, strategy: DumpStrategy, target: &Path) -> StrategyResult {
        match strategy {
            DumpStrategy::NativeClient => {
                let binary = which::which(&self.config.dump_binary)
                    .map_err(|e| format!("{} 不可用: {e}", self.config.dump_binary))?;
                self.run_dump_binary(&binary, target).await
            }
            DumpStrategy::AlternatePath => {
                let binary = self
                    .alternate_binary(&self.config.dump_binary)
                    .ok_or_else(|| "未配置备用安装目录".to_string())?;
                if !binary.is_file() {
                    return Err(format!("{} 不存在", binary.display()));
                }
                self.run_dump_binary(&binary, target).await
            }
            DumpStrategy::Synthetic => self.write_synthetic_dump(target).await,
        }
    }

    async fn run_dump_binary(&self, binary: &Path, target: &Path) -> StrategyResult {
        let output_file = std::fs::File::create(target)
            .map_err(|e| format!("无法创建转储文件 {}: {e}", target.display()))?;

        let child = Command::new(binary)
            .args(self.connection_args())
            .args(["--single-transaction", "--routines", "--triggers"])
            .arg(&self.config.database)
            .stdin(Stdio::null())
            .stdout(Stdio::from(output_file))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("无法启动 {}: {e}", binary.display()))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("等待 {} 结束失败: {e}", binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("退出状态 {}: {}", output.status, stderr.trim()));
        }

        Self::check_non_empty(target)
    }

    async fn write_synthetic_dump(&self, target: &Path) -> StrategyResult {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let content = format!(
            "-- {SYNTHETIC_DUMP_MARKER}\n\
             -- database: {database}\n\
             -- generated at: {now}\n\
             -- Native dump tools were unavailable. This file does NOT contain application data.\n\
             SET NAMES utf8mb4;\n\
             CREATE TABLE IF NOT EXISTS `{SYNTHETIC_SENTINEL_TABLE}` (\n\
             \x20 `id` INT UNSIGNED NOT NULL AUTO_INCREMENT,\n\
             \x20 `created_at` DATETIME NOT NULL,\n\
             \x20 `note` VARCHAR(255) NOT NULL,\n\
             \x20 PRIMARY KEY (`id`)\n\
             ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;\n\
             INSERT INTO `{SYNTHETIC_SENTINEL_TABLE}` (`created_at`, `note`) VALUES ('{now}', '{SYNTHETIC_DUMP_MARKER}');\n",
            database = self.config.database,
        );

        tokio::fs::write(target, content)
            .await
            .map_err(|e| format!("无法写入合成转储 {}: {e}", target.display()))?;

        Self::check_non_empty(target)
    }

    fn check_non_empty(target: &Path) -> StrategyResult {
        match std::fs::metadata(target) {
            Ok(metadata) if metadata.len() > 0 => Ok(target.to_path_buf()),
            Ok(_) => Err("转储文件为空".to_string()),
            Err(e) => Err(format!("转储文件不存在: {e}")),
        }
    }

    /// 先在 PATH 中查找，再尝试备用安装目录
    fn resolve_binary(&self, binary: &str) -> Option<PathBuf> {
        which::which(binary)
            .ok()
            .or_else(|| self.alternate_binary(binary).filter(|path| path.is_file()))
    }

    fn alternate_binary(&self, binary: &str) -> Option<PathBuf> {
        let dir = self.config.alternate_bin_dir.as_ref()?;
        let file_name = Path::new(binary).file_name()?;
        Some(dir.join(file_name))
    }

    fn connection_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--host={}", self.config.host),
            format!("--port={}", self.config.port),
            format!("--user={}", self.config.username),
        ];
        if !self.config.password.is_empty() {
            args.push(format!("--password={}", self.config.password));
        }
        args
    }
}
