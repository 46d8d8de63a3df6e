/// 归档内部路径常量
///
/// ZIP 内部统一使用 `/` 作为分隔符，与平台无关
pub mod archive {
    /// 数据库转储在归档中的目录
    pub const DATABASE_DIR: &str = "database";

    /// 数据库转储在归档中的完整路径
    pub const DATABASE_DUMP_ENTRY: &str = "database/database.sql";

    /// 应用根目录之外的目录在归档中的前缀
    pub const EXTERNAL_PREFIX: &str = "external";

    /// 记录归档前缀与原始目录对应关系的选项键
    pub const ARCHIVED_DIRECTORIES_KEY: &str = "archived_directories";

    /// 大于该大小的条目需要开启 ZIP64
    pub const ZIP64_THRESHOLD: u64 = u32::MAX as u64;
}

/// 备份相关常量
pub mod backup {
    use std::path::{Path, PathBuf};

    /// 备份目录名
    pub const BACKUP_DIR_NAME: &str = "backups";

    /// 临时工作目录名
    pub const TEMP_DIR_NAME: &str = "backup-temp";

    /// 备份文件前缀
    pub const BACKUP_PREFIX: &str = "backup_";

    /// 压缩备份文件扩展名
    pub const ARCHIVE_EXTENSION: &str = "zip";

    /// 未压缩数据库转储扩展名
    pub const DUMP_EXTENSION: &str = "sql";

    /// 转移中的备份文件后缀
    pub const PARTIAL_SUFFIX: &str = ".partial";

    /// 临时目录前缀
    pub const SCRATCH_PREFIX: &str = "backup-scratch-";

    /// 默认压缩级别 (0-9)
    pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

    /// 默认保留天数
    pub const DEFAULT_RETENTION_DAYS: u32 = 30;

    /// 文件类备份默认包含的应用目录（相对于应用根目录）
    pub const DEFAULT_DIRECTORIES: [&str; 3] = ["storage/app", "public", "config"];

    /// 获取默认备份存储目录（用于配置）
    pub fn get_default_storage_dir() -> PathBuf {
        Path::new(".").join("storage").join(BACKUP_DIR_NAME)
    }

    /// 获取默认临时工作目录
    pub fn get_default_temp_dir() -> PathBuf {
        std::env::temp_dir().join(TEMP_DIR_NAME)
    }
}

/// 数据库转储相关常量
pub mod dump {
    /// 唯一支持的数据库引擎
    pub const SUPPORTED_ENGINE: &str = "mysql";

    /// 转储工具名
    pub const DUMP_BINARY: &str = "mysqldump";

    /// 客户端工具名
    pub const CLIENT_BINARY: &str = "mysql";

    /// 转储文件名
    pub const DUMP_FILE_NAME: &str = "database.sql";

    /// 默认数据库端口
    pub const DEFAULT_PORT: u16 = 3306;

    /// 合成转储中的标记，用于识别非真实备份
    pub const SYNTHETIC_DUMP_MARKER: &str = "BACKUP-ENGINE SYNTHETIC FALLBACK DUMP";

    /// 合成转储中的哨兵表
    pub const SYNTHETIC_SENTINEL_TABLE: &str = "backup_fallback_sentinel";

    /// 记录转储策略的选项键
    pub const STRATEGY_OPTION_KEY: &str = "dump_strategy";
}

/// 完整性校验相关常量
pub mod integrity {
    /// 流式哈希读取缓冲区大小
    pub const HASH_BUFFER_SIZE: usize = 64 * 1024;
}

/// 应用配置相关常量
pub mod config {
    use std::path::{Path, PathBuf};

    /// 配置文件名
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// 配置文件查找顺序
    pub const CONFIG_SEARCH_ORDER: [&str; 3] = ["config.toml", "backup.toml", ".backup.toml"];

    /// 数据目录名
    pub const DATA_DIR_NAME: &str = "data";

    /// 数据库文件名
    pub const DATABASE_FILE_NAME: &str = "backups.db";

    /// 获取数据库文件路径（跨平台）
    pub fn get_database_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(DATABASE_FILE_NAME)
    }
}
