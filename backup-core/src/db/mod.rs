// 备份记录存储模块
//
// DuckDB 要求单线程访问，这里沿用 Actor 模式：
// - BackupRepository: 对外的异步接口，可克隆
// - RepositoryActor: 内部 Actor，持有连接并执行 SQL
// - DbMessage: 两者之间的消息定义

mod actor;
mod manager;
mod messages;

// 公开核心接口
pub use manager::BackupRepository;
