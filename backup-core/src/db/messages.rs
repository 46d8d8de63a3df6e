use crate::Result;
use crate::record::BackupRecord;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

/// DuckDB数据库操作消息
#[derive(Debug)]
pub enum DbMessage {
    /// 初始化数据库表
    InitTables {
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 插入新的备份记录，返回分配的ID
    InsertRecord {
        record: BackupRecord,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    /// 保存备份记录的生命周期字段
    SaveRecord {
        record: BackupRecord,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 根据ID获取备份记录
    GetRecord {
        id: i64,
        respond_to: oneshot::Sender<Result<Option<BackupRecord>>>,
    },
    /// 获取所有备份记录
    ListRecords {
        respond_to: oneshot::Sender<Result<Vec<BackupRecord>>>,
    },
    /// 获取创建时间早于指定时间的记录
    ListCreatedBefore {
        cutoff: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<Vec<BackupRecord>>>,
    },
    /// 删除备份记录，返回是否删除了记录
    DeleteRecord {
        id: i64,
        respond_to: oneshot::Sender<Result<bool>>,
    },
}
