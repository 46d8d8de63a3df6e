use crate::Result;
use crate::record::{BackupOptions, BackupRecord, StoredRecord};
use chrono::{DateTime, Utc};
use duckdb::{Connection, Row, params};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::DbMessage;

const SELECT_COLUMNS: &str = "SELECT id, name, kind, status, options, description, file_path, \
     file_name, file_size, file_hash, is_compressed, error_message, created_by, created_at, \
     completed_at FROM backups";

/// 从数据库行读出的原始值，字符串列在actor外转换为枚举
struct RawRow {
    id: i64,
    name: String,
    kind: String,
    status: String,
    options: String,
    description: Option<String>,
    file_path: Option<String>,
    file_name: Option<String>,
    file_size: Option<i64>,
    file_hash: Option<String>,
    is_compressed: bool,
    error_message: Option<String>,
    created_by: Option<i64>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            status: row.get(3)?,
            options: row.get(4)?,
            description: row.get(5)?,
            file_path: row.get(6)?,
            file_name: row.get(7)?,
            file_size: row.get(8)?,
            file_hash: row.get(9)?,
            is_compressed: row.get(10)?,
            error_message: row.get(11)?,
            created_by: row.get(12)?,
            created_at: row.get(13)?,
            completed_at: row.get(14)?,
        })
    }

    fn into_record(self) -> Result<BackupRecord> {
        let options: BackupOptions = serde_json::from_str(&self.options)?;
        Ok(BackupRecord::from_stored(StoredRecord {
            id: self.id,
            name: self.name,
            kind: self.kind.parse()?,
            status: self.status.parse()?,
            options,
            description: self.description,
            file_path: self.file_path.map(PathBuf::from),
            file_name: self.file_name,
            file_size: self.file_size.map(|size| size.max(0) as u64),
            file_hash: self.file_hash,
            is_compressed: self.is_compressed,
            error_message: self.error_message,
            created_by: self.created_by,
            created_at: self.created_at,
            completed_at: self.completed_at,
        }))
    }
}

/// DuckDB Actor - 确保单线程访问DuckDB
pub struct RepositoryActor {
    connection: Connection,
}

impl RepositoryActor {
    /// 创建新的DuckDB Actor
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let connection = Connection::open(db_path)?;
        Ok(Self { connection })
    }

    /// 创建内存DuckDB Actor
    pub fn new_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self { connection })
    }

    /// 运行Actor消息循环
    pub async fn run(mut self, mut receiver: mpsc::Receiver<DbMessage>) {
        debug!("备份记录存储 Actor 已启动");

        while let Some(message) = receiver.recv().await {
            self.handle_message(message);
        }

        debug!("备份记录存储 Actor 已关闭");
    }

    /// 处理数据库消息
    fn handle_message(&mut self, message: DbMessage) {
        match message {
            DbMessage::InitTables { respond_to } => {
                let _ = respond_to.send(self.init_tables());
            }
            DbMessage::InsertRecord { record, respond_to } => {
                let _ = respond_to.send(self.insert_record(&record));
            }
            DbMessage::SaveRecord { record, respond_to } => {
                let _ = respond_to.send(self.save_record(&record));
            }
            DbMessage::GetRecord { id, respond_to } => {
                let _ = respond_to.send(self.get_record(id));
            }
            DbMessage::ListRecords { respond_to } => {
                let _ = respond_to.send(self.list_records());
            }
            DbMessage::ListCreatedBefore { cutoff, respond_to } => {
                let _ = respond_to.send(self.list_created_before(cutoff));
            }
            DbMessage::DeleteRecord { id, respond_to } => {
                let _ = respond_to.send(self.delete_record(id));
            }
        }
    }

    /// 初始化数据库表
    fn init_tables(&mut self) -> Result<()> {
        debug!("正在初始化DuckDB表...");

        let sql_content = include_str!("../../migrations/init_duckdb.sql");

        // 按分号分割SQL语句并执行
        for statement in sql_content.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                self.connection.execute(trimmed, [])?;
            }
        }

        info!("DuckDB表初始化完成");
        Ok(())
    }

    /// 插入备份记录
    fn insert_record(&mut self, record: &BackupRecord) -> Result<i64> {
        let options = serde_json::to_string(record.options())?;

        self.connection.execute(
            "INSERT INTO backups (name, kind, status, options, description, is_compressed, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.name(),
                record.kind().as_str(),
                record.status().as_str(),
                options,
                record.description(),
                record.is_compressed(),
                record.created_by(),
                record.created_at(),
            ],
        )?;

        // 获取最后插入的ID
        let id: i64 = self
            .connection
            .query_row("SELECT currval('backup_id_seq')", [], |row| row.get(0))?;

        Ok(id)
    }

    /// 保存生命周期字段
    fn save_record(&mut self, record: &BackupRecord) -> Result<()> {
        let options = serde_json::to_string(record.options())?;
        let file_path = record
            .file_path()
            .map(|path| path.to_string_lossy().to_string());
        let file_size = record.file_size().map(|size| size as i64);

        let updated = self.connection.execute(
            "UPDATE backups SET status = ?, options = ?, file_path = ?, file_name = ?, file_size = ?,
             file_hash = ?, error_message = ?, completed_at = ? WHERE id = ?",
            params![
                record.status().as_str(),
                options,
                file_path,
                record.file_name(),
                file_size,
                record.file_hash(),
                record.error_message(),
                record.completed_at(),
                record.id(),
            ],
        )?;

        if updated == 0 {
            return Err(crate::BackupError::RecordNotFound(record.id()));
        }
        Ok(())
    }

    /// 根据ID获取备份记录
    fn get_record(&mut self, id: i64) -> Result<Option<BackupRecord>> {
        let mut stmt = self
            .connection
            .prepare(&format!("{SELECT_COLUMNS} WHERE id = ?"))?;
        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(RawRow::from_row(row)?.into_record()?))
        } else {
            Ok(None)
        }
    }

    /// 获取所有备份记录，最新的在前
    fn list_records(&mut self) -> Result<Vec<BackupRecord>> {
        let mut stmt = self
            .connection
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC"))?;
        let rows = stmt.query_map([], RawRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    /// 获取创建时间早于 cutoff 的记录
    fn list_created_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<BackupRecord>> {
        let mut stmt = self.connection.prepare(&format!(
            "{SELECT_COLUMNS} WHERE created_at < ? ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![cutoff], RawRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    /// 删除备份记录
    fn delete_record(&mut self, id: i64) -> Result<bool> {
        let deleted = self
            .connection
            .execute("DELETE FROM backups WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }
}
