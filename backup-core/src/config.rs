use crate::constants::{backup, config, dump};
use crate::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub backup: BackupConfig,
}

/// 数据库连接及转储工具配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// 数据库引擎，目前只支持 mysql
    pub engine: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    /// 转储工具，可以是命令名或绝对路径
    #[serde(default = "default_dump_binary")]
    pub dump_binary: String,
    /// 客户端工具，可以是命令名或绝对路径
    #[serde(default = "default_client_binary")]
    pub client_binary: String,
    /// 非标准安装位置的 bin 目录（例如 /usr/local/mysql/bin）
    #[serde(default)]
    pub alternate_bin_dir: Option<PathBuf>,
}

/// 存储位置配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// 应用根目录，文件类备份的相对目录以此为基准
    pub app_root: PathBuf,
    /// 备份文件的永久存储目录
    pub backup_dir: PathBuf,
    /// 临时工作目录
    pub temp_dir: PathBuf,
}

/// 备份行为配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackupConfig {
    /// 数据库备份是否压缩
    pub compress: bool,
    /// 压缩级别 (0-9)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    /// 文件类备份默认包含的目录
    pub directories: Vec<PathBuf>,
    /// 备份保留天数
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_dump_binary() -> String {
    dump::DUMP_BINARY.to_string()
}

fn default_client_binary() -> String {
    dump::CLIENT_BINARY.to_string()
}

fn default_compression_level() -> u32 {
    backup::DEFAULT_COMPRESSION_LEVEL
}

fn default_retention_days() -> u32 {
    backup::DEFAULT_RETENTION_DAYS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: dump::SUPPORTED_ENGINE.to_string(),
            host: "127.0.0.1".to_string(),
            port: dump::DEFAULT_PORT,
            username: "root".to_string(),
            password: String::new(),
            database: "app".to_string(),
            dump_binary: default_dump_binary(),
            client_binary: default_client_binary(),
            alternate_bin_dir: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            storage: StorageConfig {
                app_root: PathBuf::from("."),
                backup_dir: backup::get_default_storage_dir(),
                temp_dir: backup::get_default_temp_dir(),
            },
            backup: BackupConfig {
                compress: true,
                compression_level: backup::DEFAULT_COMPRESSION_LEVEL,
                directories: backup::DEFAULT_DIRECTORIES
                    .iter()
                    .map(PathBuf::from)
                    .collect(),
                retention_days: backup::DEFAULT_RETENTION_DAYS,
            },
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：config.toml -> backup.toml -> .backup.toml
    pub fn find_and_load_config() -> Result<Self> {
        for config_file in &config::CONFIG_SEARCH_ORDER {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }

        Err(BackupError::ConfigNotFound)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            return Err(BackupError::ConfigNotFound);
        }
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_with_comments()?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&path, content)?;
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> Result<String> {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        // 字符串和数组交给 toml 序列化，保证转义正确
        let quoted = |value: &str| toml::Value::String(value.to_string()).to_string();
        let directories = toml::Value::try_from(&self.backup.directories)?.to_string();
        let alternate_bin_dir = match &self.database.alternate_bin_dir {
            Some(dir) => format!("alternate_bin_dir = {}", quoted(&dir.to_string_lossy())),
            None => "# alternate_bin_dir = \"/usr/local/mysql/bin\"".to_string(),
        };

        let values = [
            ("engine", quoted(&self.database.engine)),
            ("host", quoted(&self.database.host)),
            ("port", self.database.port.to_string()),
            ("username", quoted(&self.database.username)),
            ("password", quoted(&self.database.password)),
            ("database", quoted(&self.database.database)),
            ("dump_binary", quoted(&self.database.dump_binary)),
            ("client_binary", quoted(&self.database.client_binary)),
            ("alternate_bin_dir", alternate_bin_dir),
            ("app_root", quoted(&self.storage.app_root.to_string_lossy())),
            ("backup_dir", quoted(&self.storage.backup_dir.to_string_lossy())),
            ("temp_dir", quoted(&self.storage.temp_dir.to_string_lossy())),
            ("compress", self.backup.compress.to_string()),
            ("compression_level", self.backup.compression_level.to_string()),
            ("directories", directories),
            ("retention_days", self.backup.retention_days.to_string()),
        ];

        Ok(fill_placeholders(TEMPLATE, &values))
    }

    /// 确保备份目录和临时目录存在
    pub fn ensure_storage_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.storage.backup_dir)?;
        fs::create_dir_all(&self.storage.temp_dir)?;
        Ok(())
    }

    /// 获取备份目录路径
    pub fn get_backup_dir(&self) -> &Path {
        &self.storage.backup_dir
    }

    /// 获取临时工作目录路径
    pub fn get_temp_dir(&self) -> &Path {
        &self.storage.temp_dir
    }

    /// 解析目录：相对路径以应用根目录为基准
    pub fn resolve_app_path(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.storage.app_root.join(dir)
        }
    }
}

/// 一次扫描替换模板中的 `{name}` 占位符，替换进去的内容不会再被处理
fn fill_placeholders(template: &str, values: &[(&str, String)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let value = after.find('}').and_then(|end| {
            values
                .iter()
                .find(|(name, _)| *name == &after[..end])
                .map(|(_, value)| (value, end))
        });

        match value {
            Some((value, end)) => {
                output.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_roundtrip_through_template() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.database.password = "p\"w".to_string();
        config.database.alternate_bin_dir = Some(PathBuf::from("/opt/mysql/bin"));
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.database.engine, "mysql");
        assert_eq!(loaded.database.password, "p\"w");
        assert_eq!(
            loaded.database.alternate_bin_dir,
            Some(PathBuf::from("/opt/mysql/bin"))
        );
        assert_eq!(loaded.backup.directories.len(), 3);
        assert!(loaded.backup.compress);
    }

    #[test]
    fn test_values_containing_placeholders_are_kept_verbatim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.database.username = "{password}".to_string();
        config.database.password = "secret".to_string();
        config.database.host = "{port}{unknown".to_string();
        config.save_to_file(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("secret").count(), 1);

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.database.username, "{password}");
        assert_eq!(loaded.database.password, "secret");
        assert_eq!(loaded.database.host, "{port}{unknown");
    }

    #[test]
    fn test_fill_placeholders_leaves_unknown_braces() {
        let values = [("a", "{b}".to_string()), ("b", "2".to_string())];
        assert_eq!(fill_placeholders("{a} {b} {c} {", &values), "{b} 2 {c} {");
    }

    #[test]
    fn test_missing_config_file() {
        let result = AppConfig::load_from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(BackupError::ConfigNotFound)));
    }

    #[test]
    fn test_optional_fields_use_defaults() {
        let content = r#"
[database]
engine = "mysql"
host = "db"
port = 3307
username = "app"
database = "shop"

[storage]
app_root = "/srv/app"
backup_dir = "/srv/backups"
temp_dir = "/tmp/scratch"

[backup]
compress = false
directories = ["public"]
"#;
        let config: AppConfig = toml::from_str(content).unwrap();
        assert_eq!(config.database.dump_binary, "mysqldump");
        assert_eq!(config.database.client_binary, "mysql");
        assert!(config.database.password.is_empty());
        assert_eq!(config.backup.retention_days, 30);
        assert_eq!(
            config.resolve_app_path(Path::new("public")),
            PathBuf::from("/srv/app/public")
        );
    }
}
