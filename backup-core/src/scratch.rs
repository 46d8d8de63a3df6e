use crate::Result;
use crate::constants::backup::SCRATCH_PREFIX;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// 操作私有的临时工作目录
///
/// 目录名带随机后缀，并发操作之间不会冲突。
/// 值被丢弃时目录连同内容一起删除，任何退出路径都会清理。
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    /// 在 `base` 下创建临时目录，`label` 用于区分操作类型
    pub fn acquire(base: &Path, label: &str) -> Result<Self> {
        std::fs::create_dir_all(base)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{SCRATCH_PREFIX}{label}-"))
            .tempdir_in(base)?;

        debug!("创建临时目录: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }

    /// 显式删除临时目录，删除失败只记录警告
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("清理临时目录失败 {}: {}", path.display(), e);
        } else {
            debug!("已清理临时目录: {}", path.display());
        }
    }
}
