use crate::record::{BackupKind, BackupOptions, BackupRecord};
use crate::{BackupError, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

use super::actor::RepositoryActor;
use super::messages::DbMessage;

/// 备份记录存储
///
/// 可以廉价克隆，所有克隆共享同一个后台 Actor。
#[derive(Debug, Clone)]
pub struct BackupRepository {
    sender: mpsc::Sender<DbMessage>,
}

impl BackupRepository {
    /// 连接到数据库文件
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // 确保数据库文件的父目录存在
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let actor = RepositoryActor::new(db_path)?;
        Self::start(actor).await
    }

    /// 连接到内存数据库 (主要用于测试)
    pub async fn connect_memory() -> Result<Self> {
        let actor = RepositoryActor::new_memory()?;
        Self::start(actor).await
    }

    async fn start(actor: RepositoryActor) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(100);
        tokio::spawn(actor.run(receiver));

        let repository = Self { sender };
        repository
            .request(|respond_to| DbMessage::InitTables { respond_to })
            .await?;

        Ok(repository)
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<Result<T>>) -> DbMessage,
    ) -> Result<T> {
        let (respond_to, receiver) = oneshot::channel();

        self.sender
            .send(message(respond_to))
            .await
            .map_err(|_| BackupError::custom("数据库Actor已关闭"))?;

        receiver
            .await
            .map_err(|_| BackupError::custom("等待数据库响应失败"))?
    }

    /// 创建一条 Pending 状态的备份记录并分配ID
    pub async fn create_scheduled(
        &self,
        name: impl Into<String>,
        kind: BackupKind,
        options: BackupOptions,
        description: Option<String>,
        requested_by: Option<i64>,
    ) -> Result<BackupRecord> {
        let mut record =
            BackupRecord::create_scheduled(name, kind, options, description, requested_by);

        let id = self
            .request(|respond_to| DbMessage::InsertRecord {
                record: record.clone(),
                respond_to,
            })
            .await?;
        record.assign_id(id);

        Ok(record)
    }

    /// 保存记录当前的生命周期字段
    pub async fn save(&self, record: &BackupRecord) -> Result<()> {
        self.request(|respond_to| DbMessage::SaveRecord {
            record: record.clone(),
            respond_to,
        })
        .await
    }

    /// 根据ID获取备份记录
    pub async fn get(&self, id: i64) -> Result<Option<BackupRecord>> {
        self.request(|respond_to| DbMessage::GetRecord { id, respond_to })
            .await
    }

    /// 获取所有备份记录，最新的在前
    pub async fn list(&self) -> Result<Vec<BackupRecord>> {
        self.request(|respond_to| DbMessage::ListRecords { respond_to })
            .await
    }

    /// 获取创建时间早于 cutoff 的记录
    pub async fn list_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<BackupRecord>> {
        self.request(|respond_to| DbMessage::ListCreatedBefore { cutoff, respond_to })
            .await
    }

    /// 删除备份记录
    pub async fn delete(&self, id: i64) -> Result<bool> {
        self.request(|respond_to| DbMessage::DeleteRecord { id, respond_to })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BackupStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_and_fetch_record() {
        let repo = BackupRepository::connect_memory().await.unwrap();

        let options = BackupOptions::default().with_directories(vec!["public".into()]);
        let record = repo
            .create_scheduled(
                "weekly",
                BackupKind::Files,
                options.clone(),
                Some("before deploy".to_string()),
                Some(3),
            )
            .await
            .unwrap();
        assert!(record.id() > 0);

        let fetched = repo.get(record.id()).await.unwrap().unwrap();
        assert_eq!(fetched.name(), "weekly");
        assert_eq!(fetched.kind(), BackupKind::Files);
        assert_eq!(fetched.status(), BackupStatus::Pending);
        assert_eq!(fetched.options(), &options);
        assert_eq!(fetched.description(), Some("before deploy"));
        assert_eq!(fetched.created_by(), Some(3));
        assert!(fetched.is_compressed());
    }

    #[tokio::test]
    async fn test_save_lifecycle_fields() {
        let repo = BackupRepository::connect_memory().await.unwrap();
        let mut record = repo
            .create_scheduled("db", BackupKind::Database, BackupOptions::default(), None, None)
            .await
            .unwrap();

        record.mark_as_in_progress().unwrap();
        repo.save(&record).await.unwrap();
        record
            .mark_as_completed("/backups/backup_database.zip", 1234, "deadbeef")
            .unwrap();
        repo.save(&record).await.unwrap();

        let fetched = repo.get(record.id()).await.unwrap().unwrap();
        assert_eq!(fetched.status(), BackupStatus::Completed);
        assert_eq!(
            fetched.file_path(),
            Some(Path::new("/backups/backup_database.zip"))
        );
        assert_eq!(fetched.file_name(), Some("backup_database.zip"));
        assert_eq!(fetched.file_size(), Some(1234));
        assert_eq!(fetched.file_hash(), Some("deadbeef"));
        assert!(fetched.completed_at().is_some());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let repo = BackupRepository::connect_memory().await.unwrap();
        let first = repo
            .create_scheduled("one", BackupKind::Files, BackupOptions::default(), None, None)
            .await
            .unwrap();
        let second = repo
            .create_scheduled("two", BackupKind::Full, BackupOptions::default(), None, None)
            .await
            .unwrap();
        assert_ne!(first.id(), second.id());

        assert_eq!(repo.list().await.unwrap().len(), 2);

        assert!(repo.delete(first.id()).await.unwrap());
        assert!(!repo.delete(first.id()).await.unwrap());
        assert!(repo.get(first.id()).await.unwrap().is_none());

        let remaining = repo.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), second.id());
    }

    #[tokio::test]
    async fn test_list_created_before() {
        let repo = BackupRepository::connect_memory().await.unwrap();
        repo.create_scheduled("old", BackupKind::Files, BackupOptions::default(), None, None)
            .await
            .unwrap();

        let past = Utc::now() - chrono::Duration::days(1);
        assert!(repo.list_created_before(past).await.unwrap().is_empty());

        let future = Utc::now() + chrono::Duration::days(1);
        assert_eq!(repo.list_created_before(future).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_database_persists_records() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("data/backups.db");

        let id = {
            let repo = BackupRepository::connect(&db_path).await.unwrap();
            repo.create_scheduled("persisted", BackupKind::Files, BackupOptions::default(), None, None)
                .await
                .unwrap()
                .id()
        };
        assert!(db_path.exists());

        // 等待上一个 Actor 随发送端一起退出后再重新打开
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let repo = BackupRepository::connect(&db_path).await.unwrap();
        let fetched = repo.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.name(), "persisted");
    }
}
