use super::BackupOrchestrator;
use crate::{BackupError, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// 记录当前被哪类操作占用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RecordClaim {
    /// 正在恢复，允许多个恢复同时进行
    Restoring(usize),
    /// 正在删除或清理
    Deleting,
}

pub(super) type ClaimTable = Arc<DashMap<i64, RecordClaim>>;

/// 恢复租约，存在期间该记录不能被删除或清理
pub(super) struct RestoreLease {
    claims: ClaimTable,
    id: i64,
}

impl Drop for RestoreLease {
    fn drop(&mut self) {
        if let Some(mut claim) = self.claims.get_mut(&self.id) {
            if let RecordClaim::Restoring(count) = &mut *claim {
                *count = count.saturating_sub(1);
            }
        }
        self.claims
            .remove_if(&self.id, |_, claim| *claim == RecordClaim::Restoring(0));
    }
}

/// 删除占用，存在期间该记录不能开始恢复
pub(super) struct RemovalClaim {
    claims: ClaimTable,
    id: i64,
}

impl Drop for RemovalClaim {
    fn drop(&mut self) {
        self.claims
            .remove_if(&self.id, |_, claim| *claim == RecordClaim::Deleting);
    }
}

impl BackupOrchestrator {
    /// 占用记录用于恢复；记录正在删除时返回 `RecordBusy`
    ///
    /// 检查和登记在同一个分片锁内完成。
    pub(super) fn acquire_restore_lease(&self, id: i64) -> Result<RestoreLease> {
        match self.claims.entry(id) {
            Entry::Occupied(mut occupied) => match occupied.get_mut() {
                RecordClaim::Restoring(count) => *count += 1,
                RecordClaim::Deleting => return Err(BackupError::RecordBusy(id)),
            },
            Entry::Vacant(vacant) => {
                vacant.insert(RecordClaim::Restoring(1));
            }
        }

        Ok(RestoreLease {
            claims: Arc::clone(&self.claims),
            id,
        })
    }

    /// 占用记录用于删除；记录正在恢复或删除时返回 `RecordBusy`
    pub(super) fn claim_for_removal(&self, id: i64) -> Result<RemovalClaim> {
        match self.claims.entry(id) {
            Entry::Occupied(_) => Err(BackupError::RecordBusy(id)),
            Entry::Vacant(vacant) => {
                vacant.insert(RecordClaim::Deleting);
                Ok(RemovalClaim {
                    claims: Arc::clone(&self.claims),
                    id,
                })
            }
        }
    }

    pub(super) fn is_restoring(&self, id: i64) -> bool {
        self.claims
            .get(&id)
            .is_some_and(|claim| matches!(*claim, RecordClaim::Restoring(count) if count > 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::BackupRepository;
    use tempfile::tempdir;

    async fn orchestrator(root: &std::path::Path) -> BackupOrchestrator {
        let mut config = AppConfig::default();
        config.storage.app_root = root.join("app");
        config.storage.backup_dir = root.join("backups");
        config.storage.temp_dir = root.join("tmp");
        let repository = BackupRepository::connect_memory().await.unwrap();
        BackupOrchestrator::new(config, repository).unwrap()
    }

    #[tokio::test]
    async fn test_restore_leases_are_counted() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(dir.path()).await;

        let first = orchestrator.acquire_restore_lease(7).unwrap();
        let second = orchestrator.acquire_restore_lease(7).unwrap();
        assert!(orchestrator.is_restoring(7));
        assert!(matches!(
            orchestrator.claim_for_removal(7),
            Err(BackupError::RecordBusy(7))
        ));

        drop(first);
        assert!(orchestrator.is_restoring(7));
        drop(second);
        assert!(!orchestrator.is_restoring(7));
        assert!(orchestrator.claims.is_empty());
    }

    #[tokio::test]
    async fn test_removal_claim_blocks_restore_and_removal() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(dir.path()).await;

        let claim = orchestrator.claim_for_removal(3).unwrap();
        assert!(!orchestrator.is_restoring(3));
        assert!(matches!(
            orchestrator.acquire_restore_lease(3),
            Err(BackupError::RecordBusy(3))
        ));
        assert!(matches!(
            orchestrator.claim_for_removal(3),
            Err(BackupError::RecordBusy(3))
        ));

        // 其它记录不受影响
        drop(orchestrator.acquire_restore_lease(4).unwrap());

        drop(claim);
        assert!(orchestrator.claims.is_empty());
        drop(orchestrator.acquire_restore_lease(3).unwrap());
        assert!(orchestrator.claims.is_empty());
    }
}
